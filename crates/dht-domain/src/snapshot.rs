use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::interpreter::Interpreter;
use crate::tool::ToolInstallation;

/// `{interpreter, installed_packages[], tools[], capabilities_present[], env_vars_declared[], config_hashes_by_path}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub interpreter: Interpreter,
    /// `name@version` entries, build metadata already excluded.
    pub installed_packages: Vec<String>,
    /// For each installed package, the sorted hashes of its declared
    /// installed files restricted to Python source files.
    pub package_file_hashes: BTreeMap<String, Vec<String>>,
    pub tools: Vec<ToolInstallation>,
    /// Declared capability id paired with the *resolved platform package
    /// id*, not the arbitrary local package version — this is what makes
    /// fingerprints comparable across platform families (spec §4.J / Testable
    /// Property 5).
    pub capabilities_present: Vec<(String, String)>,
    pub env_vars_declared: Vec<String>,
    pub config_hashes_by_path: BTreeMap<String, String>,
}

/// Canonicalized digest over an `EnvironmentSnapshot`, grounded directly on
/// the teacher's `manifest_fingerprint` (which hashes project identity plus
/// sorted dependency/group/env entries) generalized to the full snapshot
/// described in spec §4.J.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehavioralFingerprint(pub String);

impl BehavioralFingerprint {
    #[must_use]
    pub fn compute(snapshot: &EnvironmentSnapshot) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(b"interpreter:");
        hasher.update(snapshot.interpreter.fingerprint_entry().as_bytes());
        hasher.update(b"\n");

        let mut packages = snapshot.installed_packages.clone();
        packages.sort();
        packages.dedup();
        for pkg in &packages {
            hasher.update(b"pkg:");
            hasher.update(pkg.as_bytes());
            hasher.update(b"\n");
        }

        for (name, hashes) in &snapshot.package_file_hashes {
            let mut sorted = hashes.clone();
            sorted.sort();
            hasher.update(b"files:");
            hasher.update(name.as_bytes());
            for h in sorted {
                hasher.update(b":");
                hasher.update(h.as_bytes());
            }
            hasher.update(b"\n");
        }

        let mut tools = snapshot
            .tools
            .iter()
            .map(ToolInstallation::fingerprint_entry)
            .collect::<Vec<_>>();
        tools.sort();
        for tool in tools {
            hasher.update(b"tool:");
            hasher.update(tool.as_bytes());
            hasher.update(b"\n");
        }

        let mut capabilities = snapshot.capabilities_present.clone();
        capabilities.sort();
        for (cap, pkg_id) in capabilities {
            hasher.update(b"cap:");
            hasher.update(cap.as_bytes());
            hasher.update(b"=");
            hasher.update(pkg_id.as_bytes());
            hasher.update(b"\n");
        }

        let mut env_vars = snapshot.env_vars_declared.clone();
        env_vars.sort();
        env_vars.dedup();
        for var in env_vars {
            hasher.update(b"env:");
            hasher.update(var.as_bytes());
            hasher.update(b"\n");
        }

        for (path, hash) in &snapshot.config_hashes_by_path {
            hasher.update(b"config:");
            hasher.update(path.as_bytes());
            hasher.update(b"=");
            hasher.update(hash.as_bytes());
            hasher.update(b"\n");
        }

        Self(format!("{:x}", hasher.finalize()))
    }
}

/// One entry of a structured drift diff, typed as spec §4.J requires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffEntryKind {
    Missing,
    Extra,
    VersionMismatch,
    HashMismatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub kind: DiffEntryKind,
    pub subject: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub entries: Vec<DiffEntry>,
}

impl SnapshotDiff {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    /// Structured diff between a manifest-recorded snapshot and a freshly
    /// observed one, covering packages and tools (interpreter/capabilities
    /// are compared the same way by the validator before calling this for
    /// the bulk collections).
    #[must_use]
    pub fn compare_packages(expected: &[String], actual: &[String]) -> Vec<DiffEntry> {
        let expected_map: BTreeMap<&str, &str> = expected
            .iter()
            .filter_map(|e| e.split_once('@'))
            .collect();
        let actual_map: BTreeMap<&str, &str> =
            actual.iter().filter_map(|e| e.split_once('@')).collect();
        let mut entries = Vec::new();
        for (name, version) in &expected_map {
            match actual_map.get(name) {
                None => entries.push(DiffEntry {
                    kind: DiffEntryKind::Missing,
                    subject: (*name).to_string(),
                    expected: Some((*version).to_string()),
                    actual: None,
                }),
                Some(actual_version) if actual_version != version => {
                    entries.push(DiffEntry {
                        kind: DiffEntryKind::VersionMismatch,
                        subject: (*name).to_string(),
                        expected: Some((*version).to_string()),
                        actual: Some((*actual_version).to_string()),
                    });
                }
                Some(_) => {}
            }
        }
        for (name, version) in &actual_map {
            if !expected_map.contains_key(name) {
                entries.push(DiffEntry {
                    kind: DiffEntryKind::Extra,
                    subject: (*name).to_string(),
                    expected: None,
                    actual: Some((*version).to_string()),
                });
            }
        }
        entries
    }
}
