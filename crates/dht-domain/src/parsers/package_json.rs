use std::path::Path;

use serde_json::Value;

use super::{normalize_source, ParseError};

/// What the Project Introspector needs from a `package.json` sitting
/// alongside a Python project (e.g. a frontend subtree bundled with a
/// Flask/Django app) — enough to contribute a project-kind marker and
/// inferred dev tools, never enough to manage the Node side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageJsonRecord {
    pub name: Option<String>,
    pub dependency_names: Vec<String>,
    pub dev_dependency_names: Vec<String>,
    pub scripts: Vec<String>,
    pub declares_node_engine: bool,
}

/// # Errors
///
/// Returns [`ParseError::Malformed`] if the text is not valid JSON.
pub fn parse_package_json(path: &Path, contents: &str) -> Result<PackageJsonRecord, ParseError> {
    let contents = normalize_source(contents);
    let value: Value = serde_json::from_str(&contents).map_err(|source| ParseError::Malformed {
        path: path.display().to_string(),
        offset: source.column(),
        reason: source.to_string(),
    })?;

    let name = value.get("name").and_then(Value::as_str).map(str::to_string);

    let dependency_names = string_keys_sorted(value.get("dependencies"));
    let dev_dependency_names = string_keys_sorted(value.get("devDependencies"));

    let mut scripts: Vec<String> = value
        .get("scripts")
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    scripts.sort();

    let declares_node_engine = value
        .get("engines")
        .and_then(Value::as_object)
        .is_some_and(|m| m.contains_key("node"));

    Ok(PackageJsonRecord {
        name,
        dependency_names,
        dev_dependency_names,
        scripts,
        declares_node_engine,
    })
}

fn string_keys_sorted(value: Option<&Value>) -> Vec<String> {
    let mut keys: Vec<String> = value
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_dependencies_scripts_and_engines() {
        let text = r#"{
            "name": "web",
            "dependencies": {"react": "^18.0.0", "axios": "^1.0.0"},
            "devDependencies": {"vite": "^5.0.0"},
            "scripts": {"build": "vite build", "test": "vitest"},
            "engines": {"node": ">=20"}
        }"#;
        let record = parse_package_json(Path::new("package.json"), text).unwrap();
        assert_eq!(record.name.as_deref(), Some("web"));
        assert_eq!(record.dependency_names, vec!["axios", "react"]);
        assert_eq!(record.dev_dependency_names, vec!["vite"]);
        assert_eq!(record.scripts, vec!["build", "test"]);
        assert!(record.declares_node_engine);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = parse_package_json(Path::new("package.json"), "{not json").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }
}
