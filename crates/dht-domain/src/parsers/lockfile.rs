//! Lockfile parsers (spec §4.C, §6): the primary resolver-native lockfile
//! and the fallback hashed-requirements format. Selection between the two
//! is the caller's job (prefer native when present); this module only
//! knows how to read each format on its own.

use std::path::Path;

use crate::dependency::{AlgoHash, LockFile, LockMetadata, PinnedDependency, SourceKind};

use super::{normalize_source, ParseError};

/// Parses the primary resolver-native lockfile: a TOML document already in
/// [`LockFile`]'s own shape, since the resolver that emits it writes this
/// schema directly rather than a separate wire format.
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] if the document does not parse as TOML
/// or does not match the lockfile schema.
pub fn parse_native_lockfile(path: &Path, contents: &str) -> Result<LockFile, ParseError> {
    toml_edit::de::from_str(contents).map_err(|source| ParseError::Malformed {
        path: path.display().to_string(),
        offset: 0,
        reason: source.to_string(),
    })
}

/// Parses the fallback hashed-requirements format: `pip-compile`-style
/// `name==version --hash=sha256:...` entries, one dependency per logical
/// line (backslash-continued physical lines are joined first). This format
/// carries no resolver metadata, so [`LockMetadata`] is left blank, and no
/// `requires` edges are known, so closure validation always passes trivially.
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] only if reading the file's contents as
/// text fails upstream; the line format itself is forgiving (an
/// unrecognized line is skipped rather than rejected).
pub fn parse_hashed_requirements(_path: &Path, contents: &str) -> Result<LockFile, ParseError> {
    let joined = join_continuations(&normalize_source(contents));
    let mut dependencies = Vec::new();

    for line in joined.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(spec) = tokens.next() else { continue };
        let Some((name, exact_version)) = spec.split_once("==") else { continue };

        let mut hash_list = Vec::new();
        for token in tokens {
            if let Some(rest) = token.strip_prefix("--hash=") {
                if let Some((algorithm, digest)) = rest.split_once(':') {
                    hash_list.push(AlgoHash { algorithm: algorithm.to_string(), digest: digest.to_string() });
                }
            }
        }

        dependencies.push(PinnedDependency {
            name: name.to_string(),
            exact_version: exact_version.to_string(),
            source_kind: SourceKind::Index,
            hash_list,
            extras: vec![],
            markers: None,
        });
    }

    Ok(LockFile {
        metadata: LockMetadata {
            resolver_id: "hashed-requirements".to_string(),
            resolver_version: String::new(),
            python_spec: String::new(),
            created_at: String::new(),
        },
        dependencies,
        requires: Default::default(),
    })
}

/// Joins `\`-continued physical lines into one logical line, the way `pip`
/// itself reads a hashed requirements file.
fn join_continuations(contents: &str) -> String {
    let mut joined = String::new();
    let mut pending = String::new();
    for line in contents.lines() {
        if let Some(stripped) = line.strip_suffix('\\') {
            pending.push_str(stripped.trim_end());
            pending.push(' ');
        } else {
            pending.push_str(line);
            joined.push_str(&pending);
            joined.push('\n');
            pending.clear();
        }
    }
    if !pending.is_empty() {
        joined.push_str(&pending);
        joined.push('\n');
    }
    joined
}
