use std::path::Path;

use super::{normalize_source, ParseError};

/// What the Project Introspector needs from a `go.mod` sitting next to a
/// Python project's sidecar Go service — a project-kind marker, nothing
/// more.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GoModRecord {
    pub module_path: Option<String>,
    pub go_version: Option<String>,
    /// `require` entries as `module@version`, sorted (unordered set).
    pub requires: Vec<String>,
}

/// Line-oriented `go.mod` parser covering the `module`, `go`, and both
/// single-line and block `require` forms. Deterministic and side-effect
/// free, matching the other format parsers in this module (spec §4.C).
///
/// # Errors
///
/// This parser is forgiving by design; [`ParseError`] is kept for parity
/// with sibling parsers and is not currently produced.
pub fn parse_go_mod(_path: &Path, contents: &str) -> Result<GoModRecord, ParseError> {
    let contents = normalize_source(contents);
    let mut module_path = None;
    let mut go_version = None;
    let mut requires = Vec::new();
    let mut in_require_block = false;

    for raw_line in contents.lines() {
        let line = strip_line_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if in_require_block {
            if line == ")" {
                in_require_block = false;
                continue;
            }
            if let Some(entry) = parse_require_entry(line) {
                requires.push(entry);
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("module ") {
            module_path = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("go ") {
            go_version = Some(rest.trim().to_string());
        } else if line == "require (" {
            in_require_block = true;
        } else if let Some(rest) = line.strip_prefix("require ") {
            if let Some(entry) = parse_require_entry(rest.trim()) {
                requires.push(entry);
            }
        }
    }

    requires.sort();
    requires.dedup();

    Ok(GoModRecord {
        module_path,
        go_version,
        requires,
    })
}

fn parse_require_entry(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let module = parts.next()?;
    let version = parts.next()?;
    Some(format!("{module}@{version}"))
}

fn strip_line_comment(line: &str) -> &str {
    line.find("//").map_or(line, |idx| &line[..idx])
}
