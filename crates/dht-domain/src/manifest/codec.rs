use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use toml_edit::{value, Array, DocumentMut, Item, Table};

use super::{Manifest, ENGINE_VERSION, SCHEMA_VERSION_MAJOR};

#[derive(Debug, thiserror::Error)]
pub enum ManifestCodecError {
    #[error("{path}: {reason}")]
    Invalid { path: String, reason: String },
    #[error("{path}: manifest schema_version {found} is newer than engine's supported major {supported}")]
    VersionTooNew {
        path: String,
        found: u32,
        supported: u32,
    },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml_edit::TomlError,
    },
}

const RECOGNIZED_KEYS: &[&str] = &[
    "schema_version",
    "engine",
    "interpreter",
    "capabilities",
    "capability_overrides",
    "tools",
    "fingerprint",
    "strict",
];

/// Reads and validates a `.dhtconfig` document, performing forward
/// migrations for older minor schema versions and failing closed on a
/// newer major version (`ManifestVersionTooNew`, spec §4.E).
pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestCodecError> {
    let path_display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| ManifestCodecError::Io {
        path: path_display.clone(),
        source,
    })?;
    parse_manifest(&contents, &path_display)
}

fn parse_manifest(contents: &str, path_display: &str) -> Result<Manifest, ManifestCodecError> {
    let doc: DocumentMut =
        contents
            .parse()
            .map_err(|source| ManifestCodecError::Parse {
                path: path_display.to_string(),
                source,
            })?;

    let schema_version = doc
        .get("schema_version")
        .and_then(Item::as_integer)
        .ok_or_else(|| ManifestCodecError::Invalid {
            path: path_display.to_string(),
            reason: "missing required key `schema_version`".to_string(),
        })?;
    let schema_version = u32::try_from(schema_version).map_err(|_| ManifestCodecError::Invalid {
        path: path_display.to_string(),
        reason: "schema_version must be a non-negative integer".to_string(),
    })?;

    if schema_version > SCHEMA_VERSION_MAJOR {
        return Err(ManifestCodecError::VersionTooNew {
            path: path_display.to_string(),
            found: schema_version,
            supported: SCHEMA_VERSION_MAJOR,
        });
    }
    // schema_version < SCHEMA_VERSION_MAJOR: older minor versions migrate
    // forward with no structural change needed yet (no migrations defined
    // before 1.0), so parsing continues unchanged.

    let engine_min_version = doc
        .get("engine")
        .and_then(Item::as_table)
        .and_then(|t| t.get("min_version"))
        .and_then(Item::as_str)
        .map(str::to_string);

    let interpreter = doc.get("interpreter").and_then(Item::as_table);
    let interpreter_version = interpreter
        .and_then(|t| t.get("version"))
        .and_then(Item::as_str)
        .map(str::to_string);
    let interpreter_implementation = interpreter
        .and_then(|t| t.get("implementation"))
        .and_then(Item::as_str)
        .map(str::to_string);

    let capabilities = doc
        .get("capabilities")
        .and_then(Item::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let capability_overrides = doc
        .get("capability_overrides")
        .and_then(Item::as_table)
        .map(|t| {
            t.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.to_string(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let tools = doc
        .get("tools")
        .and_then(Item::as_table)
        .map(|t| {
            t.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.to_string(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let fingerprint = doc.get("fingerprint").and_then(Item::as_table);
    let fingerprint_environment = fingerprint
        .and_then(|t| t.get("environment"))
        .and_then(Item::as_str)
        .map(str::to_string);
    let fingerprint_config = fingerprint
        .and_then(|t| t.get("config"))
        .and_then(Item::as_str)
        .map(str::to_string);

    let strict = doc
        .get("strict")
        .and_then(Item::as_bool)
        .unwrap_or(false);

    let mut unknown = BTreeMap::new();
    for (key, item) in doc.iter() {
        if !RECOGNIZED_KEYS.contains(&key) {
            unknown.insert(key.to_string(), item.clone());
        }
    }

    Ok(Manifest {
        schema_version,
        engine_min_version,
        interpreter_version,
        interpreter_implementation,
        capabilities,
        capability_overrides,
        tools,
        fingerprint_environment,
        fingerprint_config,
        strict,
        unknown,
    })
}

/// Writes the canonical form: stable key order, LF endings, trailing
/// newline, two-space indent. Refuses to write a field equal to what the
/// Project Introspector would infer — callers are expected to have already
/// called [`super::Manifest::minimize`].
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), ManifestCodecError> {
    let rendered = render_canonical(manifest);
    fs::write(path, rendered).map_err(|source| ManifestCodecError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn render_canonical(manifest: &Manifest) -> String {
    let mut doc = DocumentMut::new();
    doc["schema_version"] = value(i64::from(manifest.schema_version));

    if let Some(min_version) = &manifest.engine_min_version {
        let mut engine = Table::new();
        engine["min_version"] = value(min_version.as_str());
        doc["engine"] = Item::Table(engine);
    } else {
        let mut engine = Table::new();
        engine["min_version"] = value(ENGINE_VERSION);
        doc["engine"] = Item::Table(engine);
    }

    if manifest.interpreter_version.is_some() || manifest.interpreter_implementation.is_some() {
        let mut interpreter = Table::new();
        if let Some(version) = &manifest.interpreter_version {
            interpreter["version"] = value(version.as_str());
        }
        if let Some(implementation) = &manifest.interpreter_implementation {
            interpreter["implementation"] = value(implementation.as_str());
        }
        doc["interpreter"] = Item::Table(interpreter);
    }

    if !manifest.capabilities.is_empty() {
        let mut caps = manifest.capabilities.clone();
        caps.sort();
        caps.dedup();
        let mut array = Array::new();
        for cap in caps {
            array.push(cap);
        }
        doc["capabilities"] = value(array);
    }

    if !manifest.capability_overrides.is_empty() {
        let mut table = Table::new();
        for (key, val) in &manifest.capability_overrides {
            table[key.as_str()] = value(val.as_str());
        }
        doc["capability_overrides"] = Item::Table(table);
    }

    if !manifest.tools.is_empty() {
        let mut table = Table::new();
        for (key, val) in &manifest.tools {
            table[key.as_str()] = value(val.as_str());
        }
        doc["tools"] = Item::Table(table);
    }

    if manifest.fingerprint_environment.is_some() || manifest.fingerprint_config.is_some() {
        let mut table = Table::new();
        if let Some(env) = &manifest.fingerprint_environment {
            table["environment"] = value(env.as_str());
        }
        if let Some(cfg) = &manifest.fingerprint_config {
            table["config"] = value(cfg.as_str());
        }
        doc["fingerprint"] = Item::Table(table);
    }

    if manifest.strict {
        doc["strict"] = value(true);
    }

    for (key, item) in &manifest.unknown {
        doc[key.as_str()] = item.clone();
    }

    let mut rendered = doc.to_string().replace("\r\n", "\n");
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    #[test]
    fn round_trip_minimal_manifest() {
        let text = "schema_version = 1\n\n[engine]\nmin_version = \"0.1\"\n";
        let manifest = parse_manifest(text, "<mem>").expect("parses");
        assert_eq!(manifest.schema_version, 1);
        assert_eq!(manifest.engine_min_version.as_deref(), Some("0.1"));

        let rendered = render_canonical(&manifest);
        let reparsed = parse_manifest(&rendered, "<mem>").expect("re-parses");
        assert_eq!(manifest, reparsed);
    }

    #[test]
    fn rejects_newer_major_version() {
        let text = "schema_version = 99\n";
        let err = parse_manifest(text, "<mem>").unwrap_err();
        assert!(matches!(err, ManifestCodecError::VersionTooNew { .. }));
    }

    #[test]
    fn rejects_missing_schema_version() {
        let text = "strict = true\n";
        let err = parse_manifest(text, "<mem>").unwrap_err();
        assert!(matches!(err, ManifestCodecError::Invalid { .. }));
    }

    #[test]
    fn unknown_keys_survive_rewrite() {
        let text = "schema_version = 1\nfuture_key = \"kept\"\n";
        let manifest = parse_manifest(text, "<mem>").expect("parses");
        assert!(manifest.unknown.contains_key("future_key"));
        let rendered = render_canonical(&manifest);
        assert!(rendered.contains("future_key"));
    }

    #[test]
    fn canonical_output_uses_lf_and_trailing_newline() {
        let manifest = Manifest::new_minimal();
        let rendered = render_canonical(&manifest);
        assert!(!rendered.contains('\r'));
        assert!(rendered.ends_with('\n'));
    }
}
