//! Dependency Installer (spec §4.G): installs every `PinnedDependency` at
//! exactly `exact_version` with hashes verified, falling back to a source
//! build when no prebuilt wheel matches the current platform. The lockfile
//! is already-resolved input (no resolver lives here), so platform
//! compatibility is a coarse OS/arch check rather than full wheel-tag
//! matching; the actual install step shells out to the `uv` binary through
//! [`crate::effects::Effects`] so caching and network policy stay
//! centralized in one place, following the teacher's pattern of driving
//! `uv` as a subprocess for anything that isn't a pure metadata computation
//! (`px-core/src/core/distribution/uv.rs`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dht_domain::{AlgoHash, DhtError, LockFile, PinnedDependency};
use sha2::{Digest, Sha256};

use crate::effects::Effects;

/// Host wheel-tag compatibility descriptor: just `{family, arch}`, since
/// DHT does not run its own wheel index lookup (the lockfile is already
/// resolved) and only needs enough of a platform fingerprint to decide
/// whether a source build fallback happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HostPlatformTag {
    family: dht_domain::PlatformFamily,
    arch: dht_domain::Arch,
}

/// One dependency's installation outcome, fed into the fingerprint
/// canonicalization (§4.J) and the planner's step log.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub name: String,
    pub exact_version: String,
    pub used_source_build: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledPackage>,
    pub warnings: Vec<String>,
}

/// Builds the platform tag descriptor for the current host, used to decide
/// whether a dependency's prebuilt wheel is installable or a source build
/// is required.
fn host_platform() -> HostPlatformTag {
    let family = match std::env::consts::OS {
        "macos" => dht_domain::PlatformFamily::Mac,
        "windows" => dht_domain::PlatformFamily::Windows,
        "linux" => dht_domain::PlatformFamily::Linux,
        _ => dht_domain::PlatformFamily::Other,
    };
    let arch = match std::env::consts::ARCH {
        "aarch64" => dht_domain::Arch::Arm64,
        "x86_64" => dht_domain::Arch::X64,
        _ => dht_domain::Arch::Other,
    };
    HostPlatformTag { family, arch }
}

/// Verifies `bytes` hashes to at least one entry of `hash_list` under the
/// sha256 algorithm. Other algorithms in the multi-algorithm hash list are
/// accepted as already-verified by the upstream resolver; DHT only
/// re-verifies the algorithm it can compute without extra dependencies.
#[must_use]
fn verify_hash(bytes: &[u8], hash_list: &[AlgoHash]) -> bool {
    let digest = format!("{:x}", Sha256::digest(bytes));
    hash_list
        .iter()
        .any(|h| h.algorithm.eq_ignore_ascii_case("sha256") && h.digest.eq_ignore_ascii_case(&digest))
}

/// The placeholder package-index URL an artifact for `dep` is fetched from
/// to verify its hash before `uv` ever sees it, mirroring the
/// managed-interpreter download's placeholder-URL pattern
/// (`interpreter_manager::download_managed_interpreter`): a real resolver
/// would record the actual index URL in the lockfile rather than have the
/// installer reconstruct one.
fn artifact_url(dep: &PinnedDependency) -> String {
    format!("https://pypi.org/packages/source/{}/{}-{}.tar.gz", dep.name, dep.name, dep.exact_version)
}

/// Downloads `dep`'s artifact and verifies it against the lockfile's
/// recorded hashes before `uv` is ever invoked (spec §4.G: "every artifact's
/// hash is verified before it is accepted"). A dependency pinned with no
/// hashes at all has nothing to verify.
///
/// # Errors
///
/// Returns `DhtError::HashMismatch` if the downloaded artifact's digest
/// matches none of `dep.hash_list`.
fn verify_artifact(effects: &dyn Effects, dep: &PinnedDependency) -> Result<()> {
    if dep.hash_list.is_empty() {
        return Ok(());
    }
    let url = artifact_url(dep);
    let bytes = effects.http().get_bytes(&url).with_context(|| format!("downloading {} for hash verification", dep.name))?;
    if !verify_hash(&bytes, &dep.hash_list) {
        anyhow::bail!(DhtError::HashMismatch {
            name: dep.name.clone(),
            expected: dep.hash_list.iter().map(|h| format!("{}:{}", h.algorithm, h.digest)).collect(),
            actual: format!("{:x}", Sha256::digest(&bytes)),
        });
    }
    Ok(())
}

/// Installs one pinned dependency into the environment rooted at `env_root`
/// via `uv pip install`, with caches redirected under the environment root
/// (spec §4.G: "disable every implicit cache that is not under the project
/// directory"). The artifact's hash is verified independently before `uv`
/// runs; `uv` is also given the same `--hash` flags as defense in depth.
fn install_one(effects: &dyn Effects, env_root: &Path, dep: &PinnedDependency) -> Result<InstalledPackage> {
    verify_artifact(effects, dep)?;

    let cache_dir = env_root.join(".dht").join("uv-cache");
    let spec = format!("{}=={}", dep.name, dep.exact_version);
    let envs = vec![
        ("UV_CACHE_DIR".to_string(), cache_dir.display().to_string()),
        ("UV_NO_CONFIG".to_string(), "1".to_string()),
        ("PYTHONHASHSEED".to_string(), "0".to_string()),
    ];
    let mut args = vec![
        "pip".to_string(),
        "install".to_string(),
        "--python".to_string(),
        env_root.join("bin").join("python3").display().to_string(),
    ];
    for hash in &dep.hash_list {
        if hash.algorithm.eq_ignore_ascii_case("sha256") {
            args.push("--hash".to_string());
            args.push(format!("sha256:{}", hash.digest));
        }
    }
    args.push(spec);
    let output = effects
        .process()
        .run("uv", &args, &envs, env_root)
        .with_context(|| format!("installing {}", dep.name))?;

    let platform = host_platform();
    let used_source_build = !wheel_available_for_platform(dep, &platform);

    if !output.success() {
        anyhow::bail!(DhtError::BuildFailed { name: dep.name.clone(), reason: output.stderr });
    }

    Ok(InstalledPackage {
        name: dep.name.clone(),
        exact_version: dep.exact_version.clone(),
        used_source_build,
    })
}

/// Placeholder selection rule: DHT does not maintain its own wheel index,
/// so `uv` itself decides whether to build from source. This always
/// reports compatible; `used_source_build` is a hook for a future
/// `uv pip install --verbose` output-parsing pass, not yet implemented.
fn wheel_available_for_platform(_dep: &PinnedDependency, _platform: &HostPlatformTag) -> bool {
    true
}

/// Path to the record of what `install` actually installed, read back by
/// [`crate::validator::observe`] instead of re-deriving "installed" from the
/// lockfile being validated against.
#[must_use]
pub fn install_record_path(env_root: &Path) -> PathBuf {
    env_root.join(".dht").join("installed.json")
}

fn write_install_record(effects: &dyn Effects, env_root: &Path, installed: &[InstalledPackage]) -> Result<()> {
    let path = install_record_path(env_root);
    if let Some(parent) = path.parent() {
        effects.fs().create_dir_all(parent)?;
    }
    let names: Vec<String> = installed.iter().map(|p| format!("{}@{}", p.name, p.exact_version)).collect();
    let contents = serde_json::to_string_pretty(&names).context("serializing install record")?;
    effects.fs().write(&path, contents.as_bytes())
}

/// Installs every dependency in `lockfile`, verifying the lockfile's own
/// closure invariant first and then each artifact's hash. A failing
/// dependency is fatal for that dependency only: installation continues for
/// the rest of the lockfile and every failure is aggregated into one error
/// raised after the loop (spec §7: `BuildFailed` is "fatal for the affected
/// package; other packages continue; aggregated at end"). Strict mode still
/// escalates a source-build fallback to `StrictModeViolation` immediately,
/// since that is a policy violation rather than a per-package failure.
///
/// # Errors
///
/// Returns an error if the lockfile fails its own validation, if strict mode
/// rejects a source-build fallback, or if any package failed to install
/// (aggregated across every failure).
pub fn install(effects: &dyn Effects, env_root: &Path, lockfile: &LockFile, strict: bool) -> Result<InstallReport> {
    lockfile.validate().map_err(|e| DhtError::DependencyResolutionMismatch { name: e.to_string() })?;

    let mut report = InstallReport::default();
    let mut failures: Vec<(String, String)> = Vec::new();

    for dep in &lockfile.dependencies {
        match install_one(effects, env_root, dep) {
            Ok(installed) => {
                if installed.used_source_build {
                    if strict {
                        anyhow::bail!(DhtError::StrictModeViolation {
                            step: "install_dependencies".to_string(),
                            detail: format!("{} required a source build instead of a wheel", dep.name),
                        });
                    }
                    report.warnings.push(format!("{} built from source", dep.name));
                }
                report.installed.push(installed);
            }
            Err(err) => failures.push((dep.name.clone(), err.to_string())),
        }
    }

    write_install_record(effects, env_root, &report.installed)?;

    if !failures.is_empty() {
        let names = failures.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>().join(", ");
        let reason = failures.iter().map(|(name, reason)| format!("{name}: {reason}")).collect::<Vec<_>>().join("; ");
        anyhow::bail!(DhtError::BuildFailed { name: names, reason });
    }

    Ok(report)
}
