//! Capability Registry (spec §4.B): a static, versioned table mapping
//! `(capability_id, platform_key)` to the best-matching `PlatformMapping` by
//! longest-prefix match, ties broken by declaration order. Grounded on the
//! teacher's `system_deps::package_capability_rules` idiom
//! (`px-core/src/core/system_deps.rs`) of a declarative Rust table parsed
//! once and looked up many times, generalized here to load from an
//! embedded TOML document per spec §4.B ("data-driven from an embedded TOML
//! document parsed at first use").

use std::sync::OnceLock;

use dht_domain::{Arch, Capability, CapabilityId, DhtError, PackageManager, PlatformFamily, PlatformKey, PlatformMapping, PostInstallStep};

/// Bundled registry data. Kept small and explicit here rather than in a
/// separate asset file, matching the scale of the teacher's own
/// `system_deps` table.
const REGISTRY_TOML: &str = r#"
[[capability]]
id = "postgresql_client"
category = "database"
description = "PostgreSQL client libraries (libpq) needed to build psycopg2 from source"

[[capability]]
id = "image_codecs_jpeg"
category = "media"
description = "JPEG codec headers/libraries needed by Pillow and friends"

[[capability]]
id = "build_toolchain"
category = "compiler"
description = "C compiler and headers needed to build native extensions"

[[mapping]]
capability_id = "postgresql_client"
manager_id = "apt"
package_name = "libpq-dev"
family = "linux"
distribution = "ubuntu"

[[mapping]]
capability_id = "postgresql_client"
manager_id = "apt"
package_name = "libpq-dev"
family = "linux"
distribution = "debian"

[[mapping]]
capability_id = "postgresql_client"
manager_id = "dnf"
package_name = "libpq-devel"
family = "linux"
distribution = "fedora"

[[mapping]]
capability_id = "postgresql_client"
manager_id = "apk"
package_name = "libpq-dev"
family = "linux"
distribution = "alpine"

[[mapping]]
capability_id = "postgresql_client"
manager_id = "brew"
package_name = "libpq"
family = "mac"
post_install = [["brew", ["link", "--force", "libpq"]]]

[[mapping]]
capability_id = "image_codecs_jpeg"
manager_id = "apt"
package_name = "libjpeg-dev"
family = "linux"
distribution = "ubuntu"

[[mapping]]
capability_id = "image_codecs_jpeg"
manager_id = "apt"
package_name = "libjpeg-dev"
family = "linux"
distribution = "debian"

[[mapping]]
capability_id = "image_codecs_jpeg"
manager_id = "brew"
package_name = "jpeg"
family = "mac"

[[mapping]]
capability_id = "build_toolchain"
manager_id = "apt"
package_name = "build-essential"
family = "linux"
distribution = "ubuntu"

[[mapping]]
capability_id = "build_toolchain"
manager_id = "apt"
package_name = "build-essential"
family = "linux"
distribution = "debian"

[[mapping]]
capability_id = "build_toolchain"
manager_id = "dnf"
package_name = "gcc"
family = "linux"
distribution = "fedora"

[[mapping]]
capability_id = "build_toolchain"
manager_id = "brew"
package_name = "gcc"
family = "mac"

[[manager]]
id = "apt"
detect_cmd = ["apt-get", "--version"]
install_cmd_template = ["sudo", "apt-get", "install", "-y", "{package}"]
query_installed_cmd_template = ["dpkg", "-s", "{package}"]
needs_privilege = true
supported_platforms = ["linux"]

[[manager]]
id = "dnf"
detect_cmd = ["dnf", "--version"]
install_cmd_template = ["sudo", "dnf", "install", "-y", "{package}"]
query_installed_cmd_template = ["rpm", "-q", "{package}"]
needs_privilege = true
supported_platforms = ["linux"]

[[manager]]
id = "apk"
detect_cmd = ["apk", "--version"]
install_cmd_template = ["sudo", "apk", "add", "{package}"]
query_installed_cmd_template = ["apk", "info", "-e", "{package}"]
needs_privilege = true
supported_platforms = ["linux"]

[[manager]]
id = "brew"
detect_cmd = ["brew", "--version"]
install_cmd_template = ["brew", "install", "{package}"]
query_installed_cmd_template = ["brew", "list", "{package}"]
needs_privilege = false
supported_platforms = ["mac"]
"#;

#[derive(Debug, Clone, serde::Deserialize)]
struct RawMapping {
    capability_id: String,
    manager_id: String,
    package_name: String,
    family: String,
    distribution: Option<String>,
    version_range: Option<String>,
    arch: Option<String>,
    #[serde(default)]
    post_install: Vec<(String, Vec<String>)>,
    #[serde(default)]
    alternatives: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawManager {
    id: String,
    detect_cmd: Vec<String>,
    install_cmd_template: Vec<String>,
    query_installed_cmd_template: Vec<String>,
    needs_privilege: bool,
    supported_platforms: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawRegistry {
    #[serde(rename = "capability", default)]
    capabilities: Vec<Capability>,
    #[serde(rename = "mapping", default)]
    mappings: Vec<RawMapping>,
    #[serde(rename = "manager", default)]
    managers: Vec<RawManager>,
}

fn parse_family(value: &str) -> PlatformFamily {
    match value {
        "mac" => PlatformFamily::Mac,
        "windows" => PlatformFamily::Windows,
        "linux" => PlatformFamily::Linux,
        _ => PlatformFamily::Other,
    }
}

fn parse_arch(value: &str) -> Arch {
    match value {
        "x64" => Arch::X64,
        "arm64" => Arch::Arm64,
        _ => Arch::Other,
    }
}

pub struct CapabilityRegistry {
    capabilities: Vec<Capability>,
    mappings: Vec<PlatformMapping>,
    managers: Vec<PackageManager>,
}

impl CapabilityRegistry {
    fn from_raw(raw: RawRegistry) -> Self {
        let mappings = raw
            .mappings
            .into_iter()
            .map(|m| PlatformMapping {
                capability_id: CapabilityId::new(m.capability_id),
                platform_key: PlatformKey {
                    family: parse_family(&m.family),
                    distribution: m.distribution,
                    version_range: m.version_range,
                    arch: m.arch.as_deref().map(parse_arch),
                },
                manager_id: m.manager_id,
                package_name: m.package_name,
                post_install_steps: m
                    .post_install
                    .into_iter()
                    .map(|(program, args)| PostInstallStep { program, args })
                    .collect(),
                alternatives: m.alternatives,
            })
            .collect();

        let managers = raw
            .managers
            .into_iter()
            .map(|m| PackageManager {
                id: m.id,
                detect_cmd: m.detect_cmd,
                install_cmd_template: m.install_cmd_template,
                query_installed_cmd_template: m.query_installed_cmd_template,
                needs_privilege: m.needs_privilege,
                supported_platforms: m.supported_platforms.iter().map(|p| parse_family(p)).collect(),
            })
            .collect();

        Self { capabilities: raw.capabilities, mappings, managers }
    }

    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    #[must_use]
    pub fn managers(&self) -> &[PackageManager] {
        &self.managers
    }

    #[must_use]
    pub fn manager(&self, manager_id: &str) -> Option<&PackageManager> {
        self.managers.iter().find(|m| m.id == manager_id)
    }

    /// Looks up the best-matching mapping for `capability_id` on
    /// `platform_key` by longest-prefix match, ties broken by declaration
    /// order (spec §4.B). A missing mapping is the first-class
    /// `NoMappingForPlatform` error.
    ///
    /// # Errors
    ///
    /// Returns `DhtError::NoMappingForPlatform` if no declared mapping's
    /// platform key matches `platform_key`.
    pub fn lookup(&self, capability_id: &str, platform_key: &PlatformKey) -> Result<&PlatformMapping, DhtError> {
        let mut best: Option<&PlatformMapping> = None;
        for mapping in &self.mappings {
            if mapping.capability_id.as_str() != capability_id || !mapping.platform_key.matches(platform_key) {
                continue;
            }
            let candidate_specificity = mapping.platform_key.specificity();
            match best {
                Some(current) if candidate_specificity <= current.platform_key.specificity() => {}
                _ => best = Some(mapping),
            }
        }
        best.ok_or_else(|| DhtError::NoMappingForPlatform {
            capability_id: capability_id.to_string(),
            platform_key: platform_key.to_string(),
        })
    }
}

static REGISTRY: OnceLock<CapabilityRegistry> = OnceLock::new();

/// Returns the process-wide capability registry, parsing the embedded TOML
/// document on first use (spec §4.B, §9 "effectively process-wide
/// constants built at startup and never mutated thereafter").
#[must_use]
pub fn registry() -> &'static CapabilityRegistry {
    REGISTRY.get_or_init(|| {
        let raw: RawRegistry =
            toml_edit::de::from_str(REGISTRY_TOML).expect("embedded registry TOML is well-formed");
        CapabilityRegistry::from_raw(raw)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_exact_distribution_match() {
        let key = PlatformKey {
            family: PlatformFamily::Linux,
            distribution: Some("ubuntu".to_string()),
            version_range: None,
            arch: Some(Arch::X64),
        };
        let mapping = registry().lookup("postgresql_client", &key).unwrap();
        assert_eq!(mapping.manager_id, "apt");
        assert_eq!(mapping.package_name, "libpq-dev");
    }

    #[test]
    fn missing_mapping_is_no_mapping_for_platform() {
        let key = PlatformKey {
            family: PlatformFamily::Windows,
            ..PlatformKey::default()
        };
        let err = registry().lookup("postgresql_client", &key).unwrap_err();
        assert!(matches!(err, DhtError::NoMappingForPlatform { .. }));
    }

    #[test]
    fn mac_mapping_carries_post_install_step() {
        let key = PlatformKey { family: PlatformFamily::Mac, ..PlatformKey::default() };
        let mapping = registry().lookup("postgresql_client", &key).unwrap();
        assert_eq!(mapping.post_install_steps.len(), 1);
        assert_eq!(mapping.post_install_steps[0].program, "brew");
    }

    #[test]
    fn tied_specificity_resolves_to_first_declared_mapping() {
        let registry = CapabilityRegistry {
            capabilities: vec![],
            mappings: vec![
                PlatformMapping {
                    capability_id: CapabilityId::new("build_toolchain"),
                    platform_key: PlatformKey { family: PlatformFamily::Linux, ..PlatformKey::default() },
                    manager_id: "apt".to_string(),
                    package_name: "first-declared".to_string(),
                    post_install_steps: vec![],
                    alternatives: vec![],
                },
                PlatformMapping {
                    capability_id: CapabilityId::new("build_toolchain"),
                    platform_key: PlatformKey { family: PlatformFamily::Linux, ..PlatformKey::default() },
                    manager_id: "dnf".to_string(),
                    package_name: "second-declared".to_string(),
                    post_install_steps: vec![],
                    alternatives: vec![],
                },
            ],
            managers: vec![],
        };
        let key = PlatformKey { family: PlatformFamily::Linux, ..PlatformKey::default() };
        let mapping = registry.lookup("build_toolchain", &key).unwrap();
        assert_eq!(mapping.package_name, "first-declared");
    }

    #[test]
    fn registry_capabilities_and_managers_are_populated() {
        assert!(!registry().capabilities().is_empty());
        assert!(registry().manager("apt").is_some());
    }
}
