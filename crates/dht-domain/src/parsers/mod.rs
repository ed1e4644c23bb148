//! Source parsers (spec §4.C): one per format, each deterministic and
//! side-effect free. Parsers never execute the source they read; Python
//! scripts are parsed syntactically and shell scripts are tokenized only
//! far enough to discover sourced files, function names, exported
//! variables, and invoked commands.

mod cargo_toml;
mod go_mod;
mod lockfile;
mod package_json;
mod pyproject;
mod python_imports;
mod requirements;
mod shell;

pub use cargo_toml::{parse_cargo_toml, CargoManifestRecord};
pub use go_mod::{parse_go_mod, GoModRecord};
pub use lockfile::{parse_hashed_requirements, parse_native_lockfile};
pub use package_json::{parse_package_json, PackageJsonRecord};
pub use pyproject::{parse_pyproject, PyprojectRecord};
pub use python_imports::{scan_python_imports, ImportRecord};
pub use requirements::{parse_requirements, RequirementsRecord};
pub use shell::{parse_shell_script, ShellScriptRecord};

/// A byte offset into the source the parser read, used by [`ParseError`] to
/// pin down where a document stopped making sense.
pub type ByteOffset = usize;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{path}:{offset}: {reason}")]
    Malformed {
        path: String,
        offset: ByteOffset,
        reason: String,
    },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Strips a UTF-8 BOM if present and normalizes CRLF to LF, so every parser
/// sees the same input regardless of the editor or platform that produced
/// the file (spec §4.C).
#[must_use]
pub fn normalize_source(contents: &str) -> String {
    contents
        .strip_prefix('\u{feff}')
        .unwrap_or(contents)
        .replace("\r\n", "\n")
}

/// Directory fragments a directory walk must never descend into when
/// discovering source files for introspection (spec §4.C).
pub const IGNORED_DIR_FRAGMENTS: &[&str] = &[
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    ".git",
    "target",
    "dist",
    "build",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
];

#[must_use]
pub fn is_ignored_path(path: &std::path::Path) -> bool {
    path.components().any(|c| {
        let Some(name) = c.as_os_str().to_str() else {
            return false;
        };
        IGNORED_DIR_FRAGMENTS.contains(&name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn normalize_strips_bom_and_crlf() {
        let raw = "\u{feff}line1\r\nline2\r\n";
        assert_eq!(normalize_source(raw), "line1\nline2\n");
    }

    #[test]
    fn ignored_dir_fragments_are_detected_anywhere_in_path() {
        assert!(is_ignored_path(Path::new("proj/.venv/lib/foo.py")));
        assert!(is_ignored_path(Path::new("proj/node_modules/x/index.js")));
        assert!(!is_ignored_path(Path::new("proj/src/main.py")));
    }
}
