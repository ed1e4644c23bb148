//! Canonical import-name → capability mapping (spec §4.D): "for each
//! imported package in the Python AST, map it through a canonical table to
//! zero or more capabilities (e.g. `psycopg2` → `postgresql_client`)".
//! Grounded directly in the teacher's `package_capability_rules`
//! (`px-core/src/core/system_deps.rs`), generalized to carry [`Authority`]
//! provenance so the Capability Registry can tell a built-in inference from
//! one a user declared in the manifest's `capability_overrides` (resolves
//! the spec's open question on import-table sourcing).

use std::collections::BTreeSet;

use crate::capability::Authority;

/// One row of the built-in import table.
struct Rule {
    capability_id: &'static str,
    import_names: &'static [&'static str],
}

const BUILTIN_RULES: &[Rule] = &[
    Rule {
        capability_id: "postgresql_client",
        import_names: &["psycopg2", "psycopg2_binary", "asyncpg", "pg8000"],
    },
    Rule {
        capability_id: "mysql_client",
        import_names: &["mysqlclient", "MySQLdb", "pymysql", "mariadb"],
    },
    Rule {
        capability_id: "image_codecs_jpeg",
        import_names: &["PIL", "Pillow"],
    },
    Rule {
        capability_id: "xml_processing",
        import_names: &["lxml"],
    },
    Rule {
        capability_id: "ldap_client",
        import_names: &["ldap", "ldap3", "pyldap"],
    },
    Rule {
        capability_id: "ffi_bridge",
        import_names: &["cffi"],
    },
    Rule {
        capability_id: "tls_curl",
        import_names: &["pycurl"],
    },
    Rule {
        capability_id: "geospatial",
        import_names: &["osgeo", "rasterio", "fiona", "pyproj", "shapely"],
    },
    Rule {
        capability_id: "numerical_compiled",
        import_names: &["numpy", "scipy", "pandas"],
    },
    Rule {
        capability_id: "cryptography",
        import_names: &["cryptography", "nacl", "OpenSSL"],
    },
];

/// `(capability_id, provenance)` pairs inferred for one import name. Most
/// imports map to nothing; multiple capabilities for one import are
/// possible (an import implying both a system library and a protocol
/// client), hence `Vec` rather than `Option`.
#[must_use]
pub fn capabilities_for_import(module: &str) -> Vec<(String, Authority)> {
    BUILTIN_RULES
        .iter()
        .filter(|rule| rule.import_names.iter().any(|name| name.eq_ignore_ascii_case(module)))
        .map(|rule| (rule.capability_id.to_string(), Authority::Builtin))
        .collect()
}

/// Unions the capabilities inferred from a set of imports with capabilities
/// already declared in the manifest. Declared capabilities always carry
/// [`Authority::UserDeclared`], even if the built-in table would have
/// inferred the same id from an import in the same project — the manifest
/// entry is the more specific source of truth.
#[must_use]
pub fn union_capabilities<'a>(
    imported_modules: impl IntoIterator<Item = &'a str>,
    declared_capabilities: &[String],
) -> BTreeSet<(String, Authority)> {
    let mut result: BTreeSet<(String, Authority)> = imported_modules
        .into_iter()
        .flat_map(capabilities_for_import)
        .collect();
    result.retain(|(id, _)| !declared_capabilities.iter().any(|d| d == id));
    for declared in declared_capabilities {
        result.insert((declared.clone(), Authority::UserDeclared));
    }
    result
}
