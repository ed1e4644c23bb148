use std::path::Path;

use toml_edit::{DocumentMut, Item};

use super::{normalize_source, ParseError};

/// What the Project Introspector needs out of `pyproject.toml`: declared
/// runtime dependencies, optional-dependency groups, the declared
/// interpreter constraint, and the build backend (used as one of the
/// project-kind scoring markers, spec §4.D). Grounded on
/// `read_dependencies_from_doc`/`read_optional_dependency_group`
/// (`px-domain/src/project/manifest/mod.rs`, `dependency_groups.rs`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PyprojectRecord {
    pub name: Option<String>,
    /// `project.dependencies`, preserved in declaration order.
    pub dependencies: Vec<String>,
    /// `project.optional-dependencies`, group name to specs in order,
    /// groups sorted by name (unordered set of groups, spec §4.C).
    pub optional_dependency_groups: Vec<(String, Vec<String>)>,
    /// `project.requires-python`.
    pub requires_python: Option<String>,
    /// `build-system.build-backend`.
    pub build_backend: Option<String>,
    pub declares_scripts: bool,
}

/// # Errors
///
/// Returns [`ParseError::Malformed`] if the text is not valid TOML.
pub fn parse_pyproject(path: &Path, contents: &str) -> Result<PyprojectRecord, ParseError> {
    let contents = normalize_source(contents);
    let doc: DocumentMut = contents.parse().map_err(|source: toml_edit::TomlError| {
        let offset = source.span().map_or(0, |s| s.start);
        ParseError::Malformed {
            path: path.display().to_string(),
            offset,
            reason: source.message().to_string(),
        }
    })?;

    let project = doc.get("project").and_then(Item::as_table);

    let name = project
        .and_then(|t| t.get("name"))
        .and_then(Item::as_str)
        .map(str::to_string);

    let dependencies = project
        .and_then(|t| t.get("dependencies"))
        .and_then(Item::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut optional_dependency_groups: Vec<(String, Vec<String>)> = project
        .and_then(|t| t.get("optional-dependencies"))
        .and_then(Item::as_table)
        .map(|table| {
            table
                .iter()
                .map(|(group, item)| {
                    let specs = item
                        .as_array()
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    (group.to_string(), specs)
                })
                .collect()
        })
        .unwrap_or_default();
    optional_dependency_groups.sort_by(|a, b| a.0.cmp(&b.0));

    let requires_python = project
        .and_then(|t| t.get("requires-python"))
        .and_then(Item::as_str)
        .map(str::to_string);

    let build_backend = doc
        .get("build-system")
        .and_then(Item::as_table)
        .and_then(|t| t.get("build-backend"))
        .and_then(Item::as_str)
        .map(str::to_string);

    let declares_scripts = project
        .and_then(|t| t.get("scripts"))
        .and_then(Item::as_table)
        .is_some_and(|t| !t.is_empty());

    Ok(PyprojectRecord {
        name,
        dependencies,
        optional_dependency_groups,
        requires_python,
        build_backend,
        declares_scripts,
    })
}
