use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic handle for a requirement independent of platform, e.g.
/// `postgresql_client` or `image_codecs_jpeg`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapabilityId(pub String);

impl CapabilityId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a capability mapping or import association came from. Recorded so
/// that a heuristic guess is never silently conflated with a declared,
/// authoritative fact (spec §9 Open Questions).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Authority {
    /// Shipped as part of the capability registry's own data tables.
    Builtin,
    /// Declared explicitly by the project's manifest.
    UserDeclared,
}

/// `{id, category, description}`. Immutable, process-wide.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: CapabilityId,
    pub category: String,
    pub description: String,
}

/// `{family, distribution?, version_range?, arch?}` used for longest-prefix
/// matching in the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformKey {
    pub family: PlatformFamily,
    pub distribution: Option<String>,
    pub version_range: Option<String>,
    pub arch: Option<Arch>,
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.family)?;
        if let Some(dist) = &self.distribution {
            write!(f, "/{dist}")?;
        }
        if let Some(range) = &self.version_range {
            write!(f, "@{range}")?;
        }
        if let Some(arch) = &self.arch {
            write!(f, "#{arch}")?;
        }
        Ok(())
    }
}

impl PlatformKey {
    /// Specificity score used to rank candidate matches: more populated
    /// fields wins, ties broken by declaration order by the caller.
    #[must_use]
    pub fn specificity(&self) -> u8 {
        let mut score = 0;
        if self.distribution.is_some() {
            score += 1;
        }
        if self.version_range.is_some() {
            score += 1;
        }
        if self.arch.is_some() {
            score += 1;
        }
        score
    }

    /// Whether `self` (a registry entry's key) matches `probe` (the host's
    /// observed platform), honoring unset fields as wildcards.
    #[must_use]
    pub fn matches(&self, probe: &PlatformKey) -> bool {
        if self.family != probe.family {
            return false;
        }
        if let Some(dist) = &self.distribution {
            if probe.distribution.as_deref() != Some(dist.as_str()) {
                return false;
            }
        }
        if let Some(arch) = &self.arch {
            if probe.arch.as_ref() != Some(arch) {
                return false;
            }
        }
        if let Some(range) = &self.version_range {
            let Some(probe_version) = &probe.version_range else {
                return false;
            };
            if !version_in_range(probe_version, range) {
                return false;
            }
        }
        true
    }
}

/// A minimal `"min-max"`/`"min-"`/`"-max"`/exact version-range check over
/// dotted version strings, used only for distribution version ranges
/// (e.g. Ubuntu `20.04-22.04`). Not a general PEP 440 evaluator: that lives
/// in the interpreter/dependency layers, which operate on Python versions.
fn version_in_range(probe: &str, range: &str) -> bool {
    fn parse(v: &str) -> Vec<u64> {
        v.split('.').filter_map(|p| p.parse().ok()).collect()
    }
    if let Some((min, max)) = range.split_once('-') {
        let probe_v = parse(probe);
        if !min.is_empty() && probe_v < parse(min) {
            return false;
        }
        if !max.is_empty() && probe_v > parse(max) {
            return false;
        }
        true
    } else {
        probe == range
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformFamily {
    #[default]
    Linux,
    Mac,
    Windows,
    Other,
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlatformFamily::Linux => "linux",
            PlatformFamily::Mac => "mac",
            PlatformFamily::Windows => "windows",
            PlatformFamily::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arch {
    X64,
    Arm64,
    Other,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
            Arch::Other => "other",
        };
        f.write_str(s)
    }
}

/// One step to run after a package is installed, e.g. enabling a systemd
/// unit or running `ldconfig`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInstallStep {
    pub program: String,
    pub args: Vec<String>,
}

/// `{capability_id, platform_key, manager_id, package_name, post_install_steps[], alternatives[]}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMapping {
    pub capability_id: CapabilityId,
    pub platform_key: PlatformKey,
    pub manager_id: String,
    pub package_name: String,
    #[serde(default)]
    pub post_install_steps: Vec<PostInstallStep>,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// `{id, detect_cmd, install_cmd_template, query_installed_cmd_template, needs_privilege, supported_platforms[]}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManager {
    pub id: String,
    pub detect_cmd: Vec<String>,
    pub install_cmd_template: Vec<String>,
    pub query_installed_cmd_template: Vec<String>,
    pub needs_privilege: bool,
    pub supported_platforms: Vec<PlatformFamily>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_key_display_includes_populated_fields() {
        let key = PlatformKey {
            family: PlatformFamily::Linux,
            distribution: Some("ubuntu".into()),
            version_range: Some("20.04-24.04".into()),
            arch: Some(Arch::X64),
        };
        assert_eq!(key.to_string(), "linux/ubuntu@20.04-24.04#x64");
    }

    #[test]
    fn longest_prefix_beats_family_only() {
        let probe = PlatformKey {
            family: PlatformFamily::Linux,
            distribution: Some("ubuntu".into()),
            version_range: Some("22.04".into()),
            arch: Some(Arch::X64),
        };
        let generic = PlatformKey {
            family: PlatformFamily::Linux,
            ..Default::default()
        };
        let specific = PlatformKey {
            family: PlatformFamily::Linux,
            distribution: Some("ubuntu".into()),
            ..Default::default()
        };
        assert!(generic.matches(&probe));
        assert!(specific.matches(&probe));
        assert!(specific.specificity() > generic.specificity());
    }

    #[test]
    fn version_range_rejects_out_of_bounds() {
        let key = PlatformKey {
            family: PlatformFamily::Linux,
            distribution: Some("ubuntu".into()),
            version_range: Some("20.04-22.04".into()),
            arch: None,
        };
        let probe_ok = PlatformKey {
            family: PlatformFamily::Linux,
            distribution: Some("ubuntu".into()),
            version_range: Some("21.10".into()),
            arch: Some(Arch::X64),
        };
        let probe_bad = PlatformKey {
            family: PlatformFamily::Linux,
            distribution: Some("ubuntu".into()),
            version_range: Some("24.04".into()),
            arch: Some(Arch::X64),
        };
        assert!(key.matches(&probe_ok));
        assert!(!key.matches(&probe_bad));
    }
}
