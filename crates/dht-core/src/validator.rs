//! Validator (spec §4.J): observes the live environment, computes its
//! behavioral fingerprint, and compares it against the one recorded in the
//! manifest. `validate` answers "has this drifted"; `repair` feeds the
//! result into [`crate::engine::repair_plan`] and re-runs only the
//! invalidated steps.

use std::path::Path;

use anyhow::{Context, Result};
use dht_domain::{
    BehavioralFingerprint, DhtError, EnvironmentSnapshot, Interpreter, LockFile, Manifest, SnapshotDiff,
};

use crate::effects::Effects;
use crate::{installer, tool_installer};

/// Reads back what `installer::install` actually installed, rather than
/// re-deriving "installed" from the lockfile being validated against — a
/// project with drift (e.g. a package installed outside DHT, or a prior
/// install that never completed) must be observable as such (spec §4.J,
/// Testable Property: "fingerprint drift is detected"). A project never
/// installed into has no record and observes as empty.
fn read_installed_packages(effects: &dyn Effects, env_root: &Path) -> Vec<String> {
    let path = installer::install_record_path(env_root);
    effects
        .fs()
        .read_to_string(&path)
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .unwrap_or_default()
}

/// Observes the current environment rooted at `env_root` by reading back
/// what the installers wrote (`pyvenv.cfg`, the install record, the tool
/// wrappers) rather than re-invoking the package manager, so validation
/// never itself performs a network call (spec §4.J: "validation is a pure
/// observation pass").
pub fn observe(effects: &dyn Effects, env_root: &Path, manifest: &Manifest) -> Result<EnvironmentSnapshot> {
    let pyvenv = env_root.join("pyvenv.cfg");
    let contents = effects
        .fs()
        .read_to_string(&pyvenv)
        .with_context(|| format!("reading {}", pyvenv.display()))?;
    let interpreter = parse_pyvenv_cfg(&contents, env_root)?;

    let installed_packages = read_installed_packages(effects, env_root);

    let mut tools = Vec::new();
    for (tool_id, exact_version) in &manifest.tools {
        let isolated_root = tool_installer::isolated_root_for(&env_root.join(".dht").join("cache"), tool_id, exact_version);
        let entrypoint = isolated_root.join("bin").join(tool_id);
        let wrapper_path = env_root.join("bin").join(tool_id);
        if effects.fs().exists(&wrapper_path) {
            tools.push(dht_domain::ToolInstallation {
                tool_id: tool_id.clone(),
                exact_version: exact_version.clone(),
                isolated_root,
                entrypoint,
                wrapper_path,
            });
        }
    }

    Ok(EnvironmentSnapshot {
        interpreter,
        installed_packages,
        package_file_hashes: Default::default(),
        tools,
        capabilities_present: Vec::new(),
        env_vars_declared: vec!["PYTHONHASHSEED".to_string(), "TZ".to_string(), "LC_ALL".to_string()],
        config_hashes_by_path: Default::default(),
    })
}

fn parse_pyvenv_cfg(contents: &str, env_root: &Path) -> Result<Interpreter> {
    let mut version = None;
    let mut implementation = None;
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "version" => version = Some(value.trim().to_string()),
                "implementation" => implementation = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    let exact_version = version.context("pyvenv.cfg missing `version`")?;
    Ok(Interpreter {
        implementation: implementation.unwrap_or_else(|| "cpython".to_string()),
        exact_version,
        executable_path: env_root.join("bin").join("python3"),
        origin: dht_domain::InterpreterOrigin::ManagedDownload,
    })
}

/// The outcome of one `validate` pass: the observed fingerprint, the
/// recorded one, and the structured diff between them.
#[derive(Debug)]
pub struct ValidationReport {
    pub observed: BehavioralFingerprint,
    pub recorded: Option<BehavioralFingerprint>,
    pub diff: SnapshotDiff,
}

impl ValidationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.recorded.as_ref() == Some(&self.observed) && self.diff.is_clean()
    }
}

/// Compares the live environment's fingerprint against the one recorded in
/// the manifest (Testable Property 6: "fingerprint drift is detected and
/// reported without silent correction").
///
/// # Errors
///
/// Returns an error if the environment cannot be observed (e.g. it was
/// never created).
pub fn validate(effects: &dyn Effects, env_root: &Path, lockfile: &LockFile, manifest: &Manifest) -> Result<ValidationReport> {
    let snapshot = observe(effects, env_root, manifest)?;
    let observed = BehavioralFingerprint::compute(&snapshot);
    let recorded = manifest.fingerprint_environment.clone().map(BehavioralFingerprint);

    let expected_packages: Vec<String> = lockfile
        .dependencies
        .iter()
        .map(|d| format!("{}@{}", d.name, d.exact_version))
        .collect();
    let diff = SnapshotDiff {
        entries: SnapshotDiff::compare_packages(&expected_packages, &snapshot.installed_packages),
    };

    Ok(ValidationReport { observed, recorded, diff })
}

/// Re-installs whatever the diff says drifted, then recomputes the
/// fingerprint. Strict mode surfaces any remaining drift as
/// `FingerprintDrift` rather than silently accepting it (spec §4.J: "fix
/// never hides drift it cannot actually resolve").
///
/// # Errors
///
/// Returns an error if reinstalling drifted dependencies fails, or if
/// strict mode is set and drift remains after the repair attempt.
pub fn fix(effects: &dyn Effects, env_root: &Path, lockfile: &LockFile, manifest: &Manifest, strict: bool) -> Result<ValidationReport> {
    let before = validate(effects, env_root, lockfile, manifest)?;
    if before.diff.is_clean() {
        return Ok(before);
    }

    installer::install(effects, env_root, lockfile, strict)?;

    let after = validate(effects, env_root, lockfile, manifest)?;
    if strict && !after.diff.is_clean() {
        anyhow::bail!(DhtError::FingerprintDrift { diff_entries: after.diff.entries.len() });
    }
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::fake::FakeEffects;
    use dht_domain::{LockMetadata, Manifest};

    fn manifest_with_fingerprint(fp: Option<&str>) -> Manifest {
        let mut manifest = Manifest::new_minimal();
        manifest.fingerprint_environment = fp.map(str::to_string);
        manifest
    }

    fn empty_lockfile() -> LockFile {
        LockFile {
            metadata: LockMetadata {
                resolver_id: "uv".into(),
                resolver_version: "0.1".into(),
                python_spec: "==3.11.7".into(),
                created_at: "now".into(),
            },
            dependencies: vec![],
            requires: Default::default(),
        }
    }

    fn seeded_effects() -> FakeEffects {
        let effects = FakeEffects::new();
        effects
            .fs
            .write(Path::new("/env/pyvenv.cfg"), b"version = 3.11.7\nimplementation = cpython\n")
            .unwrap();
        effects
    }

    #[test]
    fn validate_reports_clean_when_fingerprint_matches_observation() {
        let effects = seeded_effects();
        let lockfile = empty_lockfile();
        let manifest = manifest_with_fingerprint(None);
        let snapshot = observe(&effects, Path::new("/env"), &manifest).unwrap();
        let fp = BehavioralFingerprint::compute(&snapshot);
        let manifest = manifest_with_fingerprint(Some(&fp.0));

        let report = validate(&effects, Path::new("/env"), &lockfile, &manifest).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn validate_reports_drift_when_fingerprint_differs() {
        let effects = seeded_effects();
        let manifest = manifest_with_fingerprint(Some("stale-digest"));
        let report = validate(&effects, Path::new("/env"), &empty_lockfile(), &manifest).unwrap();
        assert!(!report.is_clean());
    }

    #[test]
    fn validate_reports_drift_when_installed_packages_dont_match_the_lockfile() {
        let effects = seeded_effects();
        effects
            .fs
            .write(&installer::install_record_path(Path::new("/env")), b"[\"requests@2.31.0\"]")
            .unwrap();
        let manifest = manifest_with_fingerprint(None);
        let snapshot = observe(&effects, Path::new("/env"), &manifest).unwrap();
        let fp = BehavioralFingerprint::compute(&snapshot);
        let manifest = manifest_with_fingerprint(Some(&fp.0));

        // The lockfile expects nothing installed, but the install record
        // (what the installer actually wrote) shows `requests` present: this
        // must surface as drift, not be masked by re-deriving "installed"
        // from the same lockfile being checked against.
        let report = validate(&effects, Path::new("/env"), &empty_lockfile(), &manifest).unwrap();
        assert!(!report.diff.is_clean());
    }

    #[test]
    fn fix_is_a_no_op_when_already_clean() {
        let effects = seeded_effects();
        let lockfile = empty_lockfile();
        let manifest = manifest_with_fingerprint(None);
        let snapshot = observe(&effects, Path::new("/env"), &manifest).unwrap();
        let fp = BehavioralFingerprint::compute(&snapshot);
        let manifest = manifest_with_fingerprint(Some(&fp.0));

        let report = fix(&effects, Path::new("/env"), &lockfile, &manifest, false).unwrap();
        assert!(report.is_clean());
        assert!(effects.process.responses.lock().unwrap().is_empty());
    }
}
