use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where an interpreter came from, in the resolution order described by
/// spec §4.F: an already-managed install wins over a fresh download, which
/// wins over locating one already on the system `PATH`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpreterOrigin {
    ManagedDownload,
    System,
    UserLocal,
}

/// `{implementation, exact_version, executable_path, origin}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub implementation: String,
    pub exact_version: String,
    pub executable_path: PathBuf,
    pub origin: InterpreterOrigin,
}

impl Interpreter {
    #[must_use]
    pub fn matches_spec(&self, version_spec: &str) -> bool {
        self.exact_version == version_spec
    }

    /// `name@version` form used by the fingerprint canonicalization (§4.J).
    #[must_use]
    pub fn fingerprint_entry(&self) -> String {
        format!("{}@{}", self.implementation, self.exact_version)
    }
}
