use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Index,
    Vcs,
    Local,
}

/// A single content hash under a named algorithm, e.g. `sha256`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgoHash {
    pub algorithm: String,
    pub digest: String,
}

/// `{name, exact_version, source_kind, hash_list, extras[], markers}`.
/// Uniqueness key is `name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedDependency {
    pub name: String,
    pub exact_version: String,
    pub source_kind: SourceKind,
    pub hash_list: Vec<AlgoHash>,
    #[serde(default)]
    pub extras: Vec<String>,
    #[serde(default)]
    pub markers: Option<String>,
}

impl PinnedDependency {
    #[must_use]
    pub fn matches_hash(&self, digest: &str) -> bool {
        self.hash_list.iter().any(|h| h.digest == digest)
    }

    /// `name@version` form used by the fingerprint canonicalization (§4.J).
    #[must_use]
    pub fn fingerprint_entry(&self) -> String {
        format!("{}@{}", self.name.to_ascii_lowercase(), self.exact_version)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    pub resolver_id: String,
    pub resolver_version: String,
    pub python_spec: String,
    pub created_at: String,
}

/// Ordered set of `PinnedDependency`, plus resolver metadata.
///
/// Invariant: for every dependency, the closure of its own declared
/// dependencies is present (checked by [`LockFile::check_closure`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    pub metadata: LockMetadata,
    pub dependencies: Vec<PinnedDependency>,
    /// name -> names of packages it declares as its own direct requirements.
    #[serde(default)]
    pub requires: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum LockFileError {
    #[error("duplicate pinned dependency `{0}`")]
    DuplicateName(String),
    #[error("dependency cycle detected involving `{0}`")]
    Cycle(String),
    #[error("lockfile is missing a transitive dependency `{missing}` required by `{by}`")]
    IncompleteClosure { missing: String, by: String },
}

impl LockFile {
    /// Validates the uniqueness-by-name invariant and the closure
    /// invariant, and rejects cyclic dependency graphs at load time
    /// (spec §9: "Cyclic references ... rejected").
    pub fn validate(&self) -> Result<(), LockFileError> {
        let mut seen = std::collections::HashSet::new();
        for dep in &self.dependencies {
            if !seen.insert(dep.name.to_ascii_lowercase()) {
                return Err(LockFileError::DuplicateName(dep.name.clone()));
            }
        }
        for (name, reqs) in &self.requires {
            for req in reqs {
                if !seen.contains(&req.to_ascii_lowercase()) {
                    return Err(LockFileError::IncompleteClosure {
                        missing: req.clone(),
                        by: name.clone(),
                    });
                }
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), LockFileError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Temp,
            Done,
        }
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

        fn visit<'a>(
            name: &'a str,
            requires: &'a BTreeMap<String, Vec<String>>,
            marks: &mut BTreeMap<&'a str, Mark>,
        ) -> Result<(), LockFileError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Temp) => return Err(LockFileError::Cycle(name.to_string())),
                None => {}
            }
            marks.insert(name, Mark::Temp);
            if let Some(children) = requires.get(name) {
                for child in children {
                    visit(child, requires, marks)?;
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for name in self.requires.keys() {
            visit(name, &self.requires, &mut marks)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&PinnedDependency> {
        self.dependencies
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str) -> PinnedDependency {
        PinnedDependency {
            name: name.to_string(),
            exact_version: "1.0.0".to_string(),
            source_kind: SourceKind::Index,
            hash_list: vec![AlgoHash {
                algorithm: "sha256".into(),
                digest: "abc".into(),
            }],
            extras: vec![],
            markers: None,
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let lock = LockFile {
            metadata: LockMetadata {
                resolver_id: "r".into(),
                resolver_version: "1".into(),
                python_spec: "==3.11.7".into(),
                created_at: "now".into(),
            },
            dependencies: vec![dep("requests"), dep("Requests")],
            requires: BTreeMap::new(),
        };
        assert!(matches!(
            lock.validate(),
            Err(LockFileError::DuplicateName(_))
        ));
    }

    #[test]
    fn rejects_incomplete_closure() {
        let mut requires = BTreeMap::new();
        requires.insert("requests".to_string(), vec!["urllib3".to_string()]);
        let lock = LockFile {
            metadata: LockMetadata {
                resolver_id: "r".into(),
                resolver_version: "1".into(),
                python_spec: "==3.11.7".into(),
                created_at: "now".into(),
            },
            dependencies: vec![dep("requests")],
            requires,
        };
        assert!(matches!(
            lock.validate(),
            Err(LockFileError::IncompleteClosure { .. })
        ));
    }

    #[test]
    fn rejects_cycles() {
        let mut requires = BTreeMap::new();
        requires.insert("a".to_string(), vec!["b".to_string()]);
        requires.insert("b".to_string(), vec!["a".to_string()]);
        let lock = LockFile {
            metadata: LockMetadata {
                resolver_id: "r".into(),
                resolver_version: "1".into(),
                python_spec: "==3.11.7".into(),
                created_at: "now".into(),
            },
            dependencies: vec![dep("a"), dep("b")],
            requires,
        };
        assert!(matches!(lock.validate(), Err(LockFileError::Cycle(_))));
    }

    #[test]
    fn accepts_clean_closure() {
        let mut requires = BTreeMap::new();
        requires.insert("a".to_string(), vec!["b".to_string()]);
        let lock = LockFile {
            metadata: LockMetadata {
                resolver_id: "r".into(),
                resolver_version: "1".into(),
                python_spec: "==3.11.7".into(),
                created_at: "now".into(),
            },
            dependencies: vec![dep("a"), dep("b")],
            requires,
        };
        assert!(lock.validate().is_ok());
    }
}
