use std::path::Path;

use toml_edit::{DocumentMut, Item};

use super::{normalize_source, ParseError};

/// What the Project Introspector needs from a `Cargo.toml` sitting next to
/// a Python project's native extension crate — a project-kind marker and
/// nothing more; DHT never manages the Rust toolchain itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CargoManifestRecord {
    pub package_name: Option<String>,
    pub is_workspace: bool,
    pub dependency_names: Vec<String>,
    pub has_cdylib_target: bool,
}

/// # Errors
///
/// Returns [`ParseError::Malformed`] if the text is not valid TOML.
pub fn parse_cargo_toml(path: &Path, contents: &str) -> Result<CargoManifestRecord, ParseError> {
    let contents = normalize_source(contents);
    let doc: DocumentMut = contents.parse().map_err(|source: toml_edit::TomlError| {
        let offset = source.span().map_or(0, |s| s.start);
        ParseError::Malformed {
            path: path.display().to_string(),
            offset,
            reason: source.message().to_string(),
        }
    })?;

    let package_name = doc
        .get("package")
        .and_then(Item::as_table)
        .and_then(|t| t.get("name"))
        .and_then(Item::as_str)
        .map(str::to_string);

    let is_workspace = doc.get("workspace").is_some();

    let mut dependency_names: Vec<String> = doc
        .get("dependencies")
        .and_then(Item::as_table)
        .map(|t| t.iter().map(|(k, _)| k.to_string()).collect())
        .unwrap_or_default();
    dependency_names.sort();

    let has_cdylib_target = doc
        .get("lib")
        .and_then(Item::as_table)
        .and_then(|t| t.get("crate-type"))
        .and_then(Item::as_array)
        .is_some_and(|arr| arr.iter().any(|v| v.as_str() == Some("cdylib")));

    Ok(CargoManifestRecord {
        package_name,
        is_workspace,
        dependency_names,
        has_cdylib_target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_cdylib_native_extension() {
        let text = r#"
[package]
name = "ext"

[lib]
crate-type = ["cdylib"]

[dependencies]
pyo3 = "0.22"
"#;
        let record = parse_cargo_toml(Path::new("Cargo.toml"), text).unwrap();
        assert_eq!(record.package_name.as_deref(), Some("ext"));
        assert!(record.has_cdylib_target);
        assert_eq!(record.dependency_names, vec!["pyo3".to_string()]);
    }

    #[test]
    fn workspace_manifests_have_no_package_name() {
        let text = "[workspace]\nmembers = [\"crates/a\"]\n";
        let record = parse_cargo_toml(Path::new("Cargo.toml"), text).unwrap();
        assert!(record.is_workspace);
        assert_eq!(record.package_name, None);
    }
}
