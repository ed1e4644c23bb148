use std::path::Path;

use super::{normalize_source, ParseError};

/// One `import`/`from ... import` statement found in a Python source file.
/// Only the top-level module name is kept — submodule paths are irrelevant
/// to capability inference (spec §4.D maps `psycopg2`, not
/// `psycopg2.extras`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImportRecord {
    pub module: String,
    pub offset: usize,
}

/// Scans Python source for `import`/`from` statements without executing
/// anything, tokenizing just far enough to skip string and comment bodies
/// so a module name inside a docstring is never mistaken for a real import.
/// Returns records sorted and deduplicated by module name (unordered set,
/// spec §4.C).
///
/// # Errors
///
/// This parser never fails on malformed Python — unrecognized constructs
/// are simply not reported as imports. [`ParseError`] is reserved for
/// future structural checks and kept in the signature for parity with the
/// other format parsers.
pub fn scan_python_imports(contents: &str) -> Result<Vec<ImportRecord>, ParseError> {
    let contents = normalize_source(contents);
    let mut modules = std::collections::BTreeSet::new();

    for (line_no, raw_line) in statement_lines(&contents) {
        let line = raw_line.trim_start();
        if let Some(rest) = line.strip_prefix("import ") {
            for module in rest.split(',') {
                if let Some(name) = top_level_module(module) {
                    modules.insert((name, line_no));
                }
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            if let Some((module, _)) = rest.split_once(" import") {
                if let Some(name) = top_level_module(module) {
                    modules.insert((name, line_no));
                }
            }
        }
    }

    Ok(modules
        .into_iter()
        .map(|(module, offset)| ImportRecord { module, offset })
        .collect())
}

/// Extracts the leftmost dotted component, stripping any `as alias`.
fn top_level_module(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('.') {
        return None; // relative import: no external capability to infer
    }
    let before_alias = raw.split(" as ").next().unwrap_or(raw).trim();
    let name = before_alias.split('.').next().unwrap_or(before_alias).trim();
    if name.is_empty() || !name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') {
        return None;
    }
    Some(name.to_string())
}

/// Yields `(byte offset of line start, line text)` for every logical
/// source line, skipping triple-quoted string bodies so module names that
/// merely appear in a docstring are not picked up as imports.
fn statement_lines(contents: &str) -> Vec<(usize, &str)> {
    let mut result = Vec::new();
    let mut in_triple: Option<&str> = None;
    let mut offset = 0;

    for line in contents.split_inclusive('\n') {
        let trimmed_line = line.trim_end_matches('\n');
        if let Some(quote) = in_triple {
            if trimmed_line.contains(quote) {
                in_triple = None;
            }
            offset += line.len();
            continue;
        }
        let stripped = trimmed_line.trim_start();
        if stripped.starts_with("\"\"\"") || stripped.starts_with("'''") {
            let quote = &stripped[..3];
            let after = &stripped[3..];
            if !after.contains(quote) {
                in_triple = Some(quote);
            }
            offset += line.len();
            continue;
        }
        result.push((offset, trimmed_line));
        offset += line.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_plain_and_from_imports() {
        let src = "import os\nimport psycopg2, sys\nfrom flask import Flask\n";
        let imports = scan_python_imports(src).unwrap();
        let names: Vec<_> = imports.iter().map(|r| r.module.as_str()).collect();
        assert_eq!(names, vec!["flask", "os", "psycopg2", "sys"]);
    }

    #[test]
    fn ignores_relative_imports() {
        let src = "from . import helpers\nfrom .models import User\n";
        let imports = scan_python_imports(src).unwrap();
        assert!(imports.is_empty());
    }

    #[test]
    fn strips_submodule_path_and_alias() {
        let src = "import numpy.typing as npt\nfrom sqlalchemy.orm import Session\n";
        let imports = scan_python_imports(src).unwrap();
        let names: Vec<_> = imports.iter().map(|r| r.module.as_str()).collect();
        assert_eq!(names, vec!["numpy", "sqlalchemy"]);
    }

    #[test]
    fn does_not_pick_up_module_names_inside_docstrings() {
        let src = "\"\"\"\nimport psycopg2\n\"\"\"\nimport os\n";
        let imports = scan_python_imports(src).unwrap();
        let names: Vec<_> = imports.iter().map(|r| r.module.as_str()).collect();
        assert_eq!(names, vec!["os"]);
    }
}
