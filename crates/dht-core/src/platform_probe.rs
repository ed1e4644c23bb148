//! Platform Probe (spec §4.A): pure queries over the host, no mutation.
//! Package-manager detection shells out through [`crate::process`] with a
//! short timeout, classifying missing binaries, non-zero exit, and timeouts
//! distinctly, following the teacher's proxy-aware command runner.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use dht_domain::{Arch, PlatformFamily, PlatformKey};
use serde::{Deserialize, Serialize};

use crate::effects::Effects;

const DETECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerAvailability {
    Available,
    Missing,
    TimedOut,
    NonZeroExit,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformReport {
    pub family: PlatformFamily,
    pub distribution: Option<String>,
    pub distribution_version: Option<String>,
    pub arch: Arch,
    pub privilege_available: bool,
    pub package_managers_available: BTreeMap<String, ManagerAvailability>,
    pub shell: Option<String>,
    pub proxies: BTreeMap<String, String>,
    pub filesystem_case_sensitive: bool,
    pub long_paths_supported: bool,
}

impl PlatformReport {
    #[must_use]
    pub fn platform_key(&self) -> PlatformKey {
        PlatformKey {
            family: self.family,
            distribution: self.distribution.clone(),
            version_range: self.distribution_version.clone(),
            arch: Some(self.arch),
        }
    }

    #[must_use]
    pub fn has_manager(&self, manager_id: &str) -> bool {
        matches!(
            self.package_managers_available.get(manager_id),
            Some(ManagerAvailability::Available)
        )
    }
}

#[must_use]
fn detect_family() -> PlatformFamily {
    match std::env::consts::OS {
        "linux" => PlatformFamily::Linux,
        "macos" => PlatformFamily::Mac,
        "windows" => PlatformFamily::Windows,
        _ => PlatformFamily::Other,
    }
}

#[must_use]
fn detect_arch() -> Arch {
    match std::env::consts::ARCH {
        "x86_64" => Arch::X64,
        "aarch64" => Arch::Arm64,
        _ => Arch::Other,
    }
}

/// Parses `/etc/os-release`-formatted content into `(id, version_id)`.
#[must_use]
fn parse_os_release(contents: &str) -> (Option<String>, Option<String>) {
    let mut id = None;
    let mut version = None;
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else { continue };
        let value = value.trim().trim_matches('"').to_string();
        match key {
            "ID" => id = Some(value),
            "VERSION_ID" => version = Some(value),
            _ => {}
        }
    }
    (id, version)
}

fn detect_distribution(effects: &dyn Effects) -> (Option<String>, Option<String>) {
    if detect_family() != PlatformFamily::Linux {
        return (None, None);
    }
    match effects.fs().read_to_string(Path::new("/etc/os-release")) {
        Ok(contents) => parse_os_release(&contents),
        Err(_) => (None, None),
    }
}

fn detect_manager(effects: &dyn Effects, manager_id: &str, detect_cmd: &[String]) -> ManagerAvailability {
    let Some((program, args)) = detect_cmd.split_first() else {
        return ManagerAvailability::Missing;
    };
    match effects
        .process()
        .run_with_timeout(program, args, &[], Path::new("."), DETECT_TIMEOUT)
    {
        Ok(output) if output.code == crate::process::TIMEOUT_EXIT_CODE => ManagerAvailability::TimedOut,
        Ok(output) if output.code == crate::process::MISSING_BINARY_EXIT_CODE => ManagerAvailability::Missing,
        Ok(output) if output.success() => ManagerAvailability::Available,
        Ok(_) => ManagerAvailability::NonZeroExit,
        Err(_) => {
            let _ = manager_id;
            ManagerAvailability::Missing
        }
    }
}

const KNOWN_MANAGERS: &[(&str, &[&str])] = &[
    ("apt", &["apt-get", "--version"]),
    ("dnf", &["dnf", "--version"]),
    ("yum", &["yum", "--version"]),
    ("pacman", &["pacman", "--version"]),
    ("apk", &["apk", "--version"]),
    ("brew", &["brew", "--version"]),
    ("winget", &["winget", "--version"]),
    ("choco", &["choco", "--version"]),
];

fn detect_proxies() -> BTreeMap<String, String> {
    let mut proxies = BTreeMap::new();
    for key in ["HTTP_PROXY", "HTTPS_PROXY", "ALL_PROXY", "NO_PROXY"] {
        if let Ok(value) = std::env::var(key) {
            if !value.is_empty() {
                proxies.insert(key.to_string(), value);
            }
        }
    }
    proxies
}

/// Runs the full platform probe: OS family/distribution/arch, package
/// manager availability, proxy settings, shell, and filesystem traits.
#[must_use]
pub fn probe(effects: &dyn Effects) -> PlatformReport {
    let family = detect_family();
    let (distribution, distribution_version) = detect_distribution(effects);
    let arch = detect_arch();

    let mut package_managers_available = BTreeMap::new();
    for (id, cmd) in KNOWN_MANAGERS {
        let detect_cmd: Vec<String> = cmd.iter().map(|s| (*s).to_string()).collect();
        package_managers_available.insert((*id).to_string(), detect_manager(effects, id, &detect_cmd));
    }

    let shell = std::env::var("SHELL").ok();
    let privilege_available = privilege_available(effects, family);

    PlatformReport {
        family,
        distribution,
        distribution_version,
        arch,
        privilege_available,
        package_managers_available,
        shell,
        proxies: detect_proxies(),
        filesystem_case_sensitive: !matches!(family, PlatformFamily::Windows | PlatformFamily::Mac),
        long_paths_supported: !matches!(family, PlatformFamily::Windows),
    }
}

#[cfg(unix)]
fn privilege_available(effects: &dyn Effects, _family: PlatformFamily) -> bool {
    effects
        .process()
        .run("id", &["-u".to_string()], &[], Path::new("."))
        .map(|output| output.success() && output.stdout.trim() == "0")
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn privilege_available(_effects: &dyn Effects, _family: PlatformFamily) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ubuntu_style_os_release() {
        let contents = "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\n";
        let (id, version) = parse_os_release(contents);
        assert_eq!(id.as_deref(), Some("ubuntu"));
        assert_eq!(version.as_deref(), Some("22.04"));
    }

    #[test]
    fn parses_os_release_missing_version() {
        let (id, version) = parse_os_release("ID=alpine\n");
        assert_eq!(id.as_deref(), Some("alpine"));
        assert_eq!(version, None);
    }

    #[test]
    fn detect_manager_classifies_missing_binary() {
        let effects = crate::effects::fake::FakeEffects::new();
        let availability = detect_manager(&effects, "definitely-not-a-real-manager", &["nope".to_string()]);
        assert_eq!(availability, ManagerAvailability::Missing);
    }

    #[test]
    fn detect_manager_classifies_available_and_non_zero() {
        let effects = crate::effects::fake::FakeEffects::new();
        effects.process.stub(
            "apt-get",
            crate::process::RunOutput { code: 0, stdout: "ok".into(), stderr: String::new() },
        );
        let availability = detect_manager(&effects, "apt", &["apt-get".to_string(), "--version".to_string()]);
        assert_eq!(availability, ManagerAvailability::Available);
    }
}
