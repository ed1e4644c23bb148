//! The `.dhtconfig` manifest: a versioned document holding only the fields
//! an engine cannot infer from the rest of the project tree (spec §3, §4.E).

mod codec;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use codec::{read_manifest, write_manifest, ManifestCodecError};

/// Current major/minor the engine understands. A manifest declaring a
/// newer major version fails closed (`ManifestVersionTooNew`); older minor
/// versions are migrated forward transparently.
pub const SCHEMA_VERSION_MAJOR: u32 = 1;
pub const SCHEMA_VERSION_MINOR: u32 = 0;
pub const ENGINE_VERSION: &str = "0.1.0";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    pub schema_version: u32,
    pub engine_min_version: Option<String>,
    pub interpreter_version: Option<String>,
    pub interpreter_implementation: Option<String>,
    pub capabilities: Vec<String>,
    pub capability_overrides: BTreeMap<String, String>,
    pub tools: BTreeMap<String, String>,
    pub fingerprint_environment: Option<String>,
    pub fingerprint_config: Option<String>,
    pub strict: bool,
    /// Keys the codec does not recognize, preserved verbatim on rewrite.
    pub unknown: BTreeMap<String, toml_edit::Item>,
}

impl Manifest {
    #[must_use]
    pub fn new_minimal() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_MAJOR,
            engine_min_version: Some(ENGINE_VERSION.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn path_for(project_root: &Path) -> PathBuf {
        project_root.join(".dhtconfig")
    }

    /// Drops any field whose value equals what the introspector would infer
    /// anyway, per §4.E's minimality contract. `inferred_interpreter` and
    /// `inferred_capabilities` come from the Project Introspector output for
    /// the same tree.
    pub fn minimize(
        &mut self,
        inferred_interpreter: Option<&str>,
        inferred_capabilities: &[String],
    ) {
        if self.interpreter_version.as_deref() == inferred_interpreter {
            self.interpreter_version = None;
        }
        self.capabilities
            .retain(|cap| !inferred_capabilities.contains(cap));
    }
}
