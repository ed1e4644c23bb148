use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `{tool_id, exact_version, isolated_root, entrypoint, wrapper_path}`.
///
/// The wrapper is a stub that, when invoked, re-enters the isolated
/// installation with the pinned version; it is the only path by which a
/// dev tool is invoked during DHT operations (spec §4.H).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInstallation {
    pub tool_id: String,
    pub exact_version: String,
    pub isolated_root: PathBuf,
    pub entrypoint: PathBuf,
    pub wrapper_path: PathBuf,
}

impl ToolInstallation {
    /// `name@version` form used by the fingerprint canonicalization (§4.J).
    #[must_use]
    pub fn fingerprint_entry(&self) -> String {
        format!("{}@{}", self.tool_id, self.exact_version)
    }
}
