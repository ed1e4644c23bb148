//! Regeneration Engine (spec §4.I): planner + executor composing the
//! interpreter manager, dependency installer, and dev-tool installer plus
//! system capabilities via the registry, with checkpointing. The
//! environment-root lock follows `core::project::lock::ProjectLock` (see
//! [`lock::EnvironmentLock`]).

pub mod lock;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dht_domain::{
    BehavioralFingerprint, Checkpoint, CheckpointLog, DhtError, EnvironmentSnapshot, Interpreter, LockFile, Manifest,
    ProjectProfile, SnapshotDiff, ToolInstallation,
};
use sha2::{Digest, Sha256};

use crate::effects::Effects;
use crate::{installer, interpreter_manager, platform_probe, registry, tool_installer};

/// The ten ordered planner steps from spec §4.I, 2 and 3 consulting the
/// Platform Probe/Capability Registry, 4-8 strictly sequential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    ValidateEngineVersion,
    ProbePlatform,
    InstallCapabilities,
    EnsureInterpreter,
    CreateEnvironment,
    InstallDependencies,
    InstallDevTools,
    InstallHooks,
    EmitActivationScripts,
    ComputeFingerprint,
}

impl Step {
    pub const ORDER: [Step; 10] = [
        Step::ValidateEngineVersion,
        Step::ProbePlatform,
        Step::InstallCapabilities,
        Step::EnsureInterpreter,
        Step::CreateEnvironment,
        Step::InstallDependencies,
        Step::InstallDevTools,
        Step::InstallHooks,
        Step::EmitActivationScripts,
        Step::ComputeFingerprint,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Step::ValidateEngineVersion => "validate_engine_version",
            Step::ProbePlatform => "probe_platform",
            Step::InstallCapabilities => "install_capabilities",
            Step::EnsureInterpreter => "ensure_interpreter",
            Step::CreateEnvironment => "create_environment",
            Step::InstallDependencies => "install_dependencies",
            Step::InstallDevTools => "install_dev_tools",
            Step::InstallHooks => "install_hooks",
            Step::EmitActivationScripts => "emit_activation_scripts",
            Step::ComputeFingerprint => "compute_fingerprint",
        }
    }
}

/// One planner step's outcome, feeding both the checkpoint log and the
/// strict-mode violation check (Testable Property 6).
#[derive(Clone, Debug)]
pub struct StepRecord {
    pub step: Step,
    pub warnings: Vec<String>,
    pub fallback_taken: bool,
}

/// Whether the manifest/lockfile/environment were mutually consistent
/// before planning began, generalizing the teacher's
/// `ProjectStateKind::{Clean, NeedsLock, NeedsEnv}` (`px-domain/src/project/state.rs`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegenerationState {
    Clean,
    NeedsPlan,
    NeedsRepair,
}

#[derive(Debug)]
pub struct RegenerationOutcome {
    pub snapshot: EnvironmentSnapshot,
    pub fingerprint: BehavioralFingerprint,
    pub steps: Vec<StepRecord>,
    pub resumed_from_step: usize,
}

/// Per-step input digest: the step's position plus the profile's own input
/// digest, so any change upstream of the scanner invalidates every step
/// from there forward while an unchanged rerun resumes every step (spec
/// §4.I: "A step is invalidated when its input digest changes").
fn step_digest(step_index: usize, profile_digest: &str, manifest_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(step_index.to_le_bytes());
    hasher.update(profile_digest.as_bytes());
    hasher.update(manifest_digest.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn manifest_digest(manifest: &Manifest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(manifest.engine_min_version.as_deref().unwrap_or_default().as_bytes());
    hasher.update(manifest.interpreter_version.as_deref().unwrap_or_default().as_bytes());
    for cap in &manifest.capabilities {
        hasher.update(cap.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn checkpoint_log_path(env_root: &Path, task_id: &str) -> PathBuf {
    CheckpointLog::path(env_root, task_id)
}

fn load_checkpoint_log(effects: &dyn Effects, env_root: &Path, task_id: &str) -> CheckpointLog {
    let path = checkpoint_log_path(env_root, task_id);
    effects
        .fs()
        .read_to_string(&path)
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .unwrap_or_default()
}

/// Persists the checkpoint log as pretty-printed JSON under the environment
/// root's lock (the caller holds an [`lock::EnvironmentLock`] for the
/// whole regeneration run, so a concurrent writer can't interleave).
fn save_checkpoint_log(effects: &dyn Effects, env_root: &Path, task_id: &str, log: &CheckpointLog) -> Result<()> {
    let path = checkpoint_log_path(env_root, task_id);
    if let Some(parent) = path.parent() {
        effects.fs().create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(log).context("serializing checkpoint log")?;
    effects.fs().write(&path, contents.as_bytes())
}

struct StepContext<'a> {
    effects: &'a dyn Effects,
    env_root: &'a Path,
    cache_root: &'a Path,
    manifest: &'a Manifest,
    profile: &'a ProjectProfile,
    lockfile: &'a LockFile,
    online: bool,
    strict: bool,
    interpreter: Option<Interpreter>,
    installed_packages: Vec<String>,
    tools: Vec<ToolInstallation>,
    capabilities_present: Vec<(String, String)>,
}

fn run_step(ctx: &mut StepContext<'_>, step: Step) -> Result<StepRecord> {
    let mut warnings = Vec::new();
    let mut fallback_taken = false;

    match step {
        Step::ValidateEngineVersion => {
            if let Some(min_version) = &ctx.manifest.engine_min_version {
                if min_version.as_str() > dht_domain::manifest::ENGINE_VERSION {
                    anyhow::bail!(DhtError::ManifestVersionTooNew {
                        path: Manifest::path_for(ctx.env_root),
                        found: 0,
                        supported: dht_domain::manifest::SCHEMA_VERSION_MAJOR,
                    });
                }
            }
        }
        Step::ProbePlatform => {
            let report = platform_probe::probe(ctx.effects);
            if !report.privilege_available {
                warnings.push("no elevated privilege available; capability installs may fail".to_string());
            }
        }
        Step::InstallCapabilities => {
            let report = platform_probe::probe(ctx.effects);
            let platform_key = report.platform_key();
            for capability_id in &ctx.profile.required_capability_ids {
                match registry::registry().lookup(capability_id, &platform_key) {
                    Ok(mapping) => {
                        if let Some(present) =
                            install_capability(ctx.effects, ctx.env_root, &report, capability_id, mapping, &mut warnings, &mut fallback_taken)?
                        {
                            ctx.capabilities_present.push(present);
                        }
                    }
                    Err(err) => {
                        warnings.push(format!("{err}"));
                    }
                }
            }
        }
        Step::EnsureInterpreter => {
            let version_spec = ctx
                .manifest
                .interpreter_version
                .clone()
                .or_else(|| ctx.profile.declared_interpreter_constraint.clone())
                .context("no interpreter version declared in manifest or inferred from the project")?;
            let interpreter = interpreter_manager::ensure(ctx.effects, ctx.cache_root, &version_spec, ctx.online)?;
            if interpreter.origin != dht_domain::InterpreterOrigin::ManagedDownload {
                fallback_taken = true;
                warnings.push(format!("using {:?} interpreter instead of a managed download", interpreter.origin));
                if ctx.strict {
                    anyhow::bail!(DhtError::StrictModeViolation {
                        step: step.name().to_string(),
                        detail: "non-managed interpreter used while strict mode is enabled".to_string(),
                    });
                }
            }
            ctx.interpreter = Some(interpreter);
        }
        Step::CreateEnvironment => {
            let interpreter = ctx.interpreter.as_ref().context("interpreter must be ensured before creating the environment")?;
            interpreter_manager::create_environment(ctx.effects, ctx.env_root, interpreter)?;
        }
        Step::InstallDependencies => {
            let report = installer::install(ctx.effects, ctx.env_root, ctx.lockfile, ctx.strict)?;
            if !report.warnings.is_empty() {
                fallback_taken = true;
            }
            warnings.extend(report.warnings);
            ctx.installed_packages = report.installed.iter().map(|p| format!("{}@{}", p.name, p.exact_version)).collect();
        }
        Step::InstallDevTools => {
            for (tool_id, version) in &ctx.manifest.tools {
                let installation = tool_installer::install_tool(ctx.effects, ctx.cache_root, ctx.env_root, tool_id, version)?;
                ctx.tools.push(installation);
            }
            for tool_id in &ctx.profile.inferred_dev_tools {
                if ctx.manifest.tools.contains_key(tool_id) {
                    continue;
                }
                warnings.push(format!("dev tool `{tool_id}` inferred but no pinned version declared; skipped"));
            }
        }
        Step::InstallHooks => {
            // Hook installation (e.g. pre-commit) is declared via `tools`/manifest
            // capability overrides; DHT installs no hooks unless one is declared.
        }
        Step::EmitActivationScripts => {
            emit_activation_script(ctx.effects, ctx.env_root)?;
        }
        Step::ComputeFingerprint => {}
    }

    Ok(StepRecord { step, warnings, fallback_taken })
}

/// Substitutes `{package}` in a manager's command template, splitting the
/// rendered tokens into a program and its arguments.
fn render_command(template: &[String], package: &str) -> Option<(String, Vec<String>)> {
    let rendered: Vec<String> = template.iter().map(|t| t.replace("{package}", package)).collect();
    let (program, args) = rendered.split_first()?;
    Some((program.clone(), args.to_vec()))
}

/// Installs one required capability via its resolved [`dht_domain::PlatformMapping`]
/// (spec §4.B, §4.I step 3): checks the manager is actually present on the
/// host, skips the install if a candidate package is already present per
/// `query_installed_cmd_template`, otherwise installs `package_name` and
/// falls back through `alternatives` in declaration order on failure, then
/// runs `post_install_steps` for whichever candidate succeeded.
///
/// # Errors
///
/// Returns an error if a post-install step cannot be spawned.
fn install_capability(
    effects: &dyn Effects,
    env_root: &Path,
    report: &platform_probe::PlatformReport,
    capability_id: &str,
    mapping: &dht_domain::PlatformMapping,
    warnings: &mut Vec<String>,
    fallback_taken: &mut bool,
) -> Result<Option<(String, String)>> {
    let Some(manager) = registry::registry().manager(&mapping.manager_id) else {
        warnings.push(format!("capability `{capability_id}` maps to unknown manager `{}`", mapping.manager_id));
        return Ok(None);
    };

    if !report.has_manager(&mapping.manager_id) {
        warnings.push(
            DhtError::PackageManagerMissing {
                manager_id: mapping.manager_id.clone(),
                blocked_capability: Some(capability_id.to_string()),
            }
            .to_string(),
        );
        return Ok(None);
    }

    let mut candidates = vec![mapping.package_name.clone()];
    candidates.extend(mapping.alternatives.iter().cloned());

    let mut installed_package = None;
    for package in &candidates {
        if let Some((program, args)) = render_command(&manager.query_installed_cmd_template, package) {
            if let Ok(output) = effects.process().run(&program, &args, &[], env_root) {
                if output.success() {
                    installed_package = Some(package.clone());
                    break;
                }
            }
        }
        let Some((program, args)) = render_command(&manager.install_cmd_template, package) else {
            continue;
        };
        match effects.process().run(&program, &args, &[], env_root) {
            Ok(output) if output.success() => {
                installed_package = Some(package.clone());
                break;
            }
            Ok(output) => warnings.push(format!("installing `{package}` via `{}` failed: {}", manager.id, output.stderr)),
            Err(err) => warnings.push(format!("installing `{package}` via `{}` failed: {err}", manager.id)),
        }
    }

    let Some(package) = installed_package else {
        *fallback_taken = true;
        warnings.push(format!("no candidate package satisfied capability `{capability_id}` via `{}`", manager.id));
        return Ok(None);
    };

    for step in &mapping.post_install_steps {
        let output = effects
            .process()
            .run(&step.program, &step.args, &[], env_root)
            .with_context(|| format!("running post-install step for `{capability_id}`"))?;
        if !output.success() {
            warnings.push(format!("post-install step for `{capability_id}` failed: {}", output.stderr));
        }
    }

    Ok(Some((capability_id.to_string(), package)))
}

fn emit_activation_script(effects: &dyn Effects, env_root: &Path) -> Result<()> {
    let bin = env_root.join("bin");
    let contents = format!(
        "# generated by the regeneration engine, do not edit\nexport PATH=\"{}:$PATH\"\nexport PYTHONHASHSEED=0\nexport TZ=UTC\nexport LC_ALL=C.UTF-8\nexport PYTHONDONTWRITEBYTECODE=1\n",
        bin.display()
    );
    effects.fs().write(&env_root.join("activate.sh"), contents.as_bytes())
}

fn build_snapshot(ctx: &StepContext<'_>) -> Result<EnvironmentSnapshot> {
    let interpreter = ctx.interpreter.clone().context("interpreter missing at fingerprint step")?;
    Ok(EnvironmentSnapshot {
        interpreter,
        installed_packages: ctx.installed_packages.clone(),
        package_file_hashes: BTreeMap::new(),
        tools: ctx.tools.clone(),
        capabilities_present: ctx.capabilities_present.clone(),
        env_vars_declared: vec!["PYTHONHASHSEED".to_string(), "TZ".to_string(), "LC_ALL".to_string()],
        config_hashes_by_path: BTreeMap::new(),
    })
}

/// Runs (or resumes) the regeneration plan for `task_id`, executing steps
/// from the first invalidated checkpoint onward.
///
/// # Errors
///
/// Returns an error if any step fails; steps already checkpointed on a
/// prior run are skipped rather than re-executed.
#[allow(clippy::too_many_arguments)]
pub fn regenerate(
    effects: &dyn Effects,
    env_root: &Path,
    cache_root: &Path,
    task_id: &str,
    manifest: &Manifest,
    profile: &ProjectProfile,
    lockfile: &LockFile,
    online: bool,
    strict: bool,
) -> Result<RegenerationOutcome> {
    let mut log = load_checkpoint_log(effects, env_root, task_id);
    let manifest_dig = manifest_digest(manifest);
    let digests: Vec<String> = (0..Step::ORDER.len())
        .map(|i| step_digest(i, &profile.input_digest, &manifest_dig))
        .collect();
    let resume_from = log.first_pending_step(&digests);

    let mut ctx = StepContext {
        effects,
        env_root,
        cache_root,
        manifest,
        profile,
        lockfile,
        online,
        strict,
        interpreter: None,
        installed_packages: Vec::new(),
        tools: Vec::new(),
        capabilities_present: Vec::new(),
    };

    let mut records = Vec::new();
    for (index, step) in Step::ORDER.iter().enumerate() {
        if index < resume_from {
            continue;
        }
        let record = run_step(&mut ctx, *step)?;
        log.record(Checkpoint {
            task_id: task_id.to_string(),
            step_index: index,
            step_name: step.name().to_string(),
            completed_at: "now".to_string(),
            payload_digest: digests[index].clone(),
            fallback_taken: record.fallback_taken,
        });
        save_checkpoint_log(effects, env_root, task_id, &log)?;
        records.push(record);
    }

    let snapshot = build_snapshot(&ctx)?;
    let fingerprint = BehavioralFingerprint::compute(&snapshot);

    Ok(RegenerationOutcome { snapshot, fingerprint, steps: records, resumed_from_step: resume_from })
}

/// Classifies whether the manifest/lockfile/environment were mutually
/// consistent before planning (spec's `RegenerationState`, generalized from
/// the teacher's `ProjectStateKind`).
#[must_use]
pub fn classify_state(env_root: &Path, manifest: &Manifest, effects: &dyn Effects) -> RegenerationState {
    if !effects.fs().exists(&Manifest::path_for(env_root)) {
        return RegenerationState::NeedsPlan;
    }
    if manifest.fingerprint_environment.is_none() {
        return RegenerationState::NeedsPlan;
    }
    if !effects.fs().exists(&env_root.join("bin")) {
        return RegenerationState::NeedsRepair;
    }
    RegenerationState::Clean
}

/// Consumes a drift diff and returns the minimal set of steps that must
/// re-run (spec §4.J `repair`).
#[must_use]
pub fn repair_plan(diff: &SnapshotDiff) -> Vec<Step> {
    let mut steps = Vec::new();
    if diff.entries.iter().any(|e| e.subject.contains("interpreter")) {
        steps.push(Step::EnsureInterpreter);
    }
    if !diff.entries.is_empty() {
        steps.push(Step::InstallDependencies);
    }
    steps.push(Step::ComputeFingerprint);
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::fake::FakeEffects;
    use crate::process::RunOutput;
    use dht_domain::{LockMetadata, Manifest};

    fn minimal_manifest() -> Manifest {
        let mut manifest = Manifest::new_minimal();
        manifest.interpreter_version = Some("3.11.7".to_string());
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

    #[test]
    fn regenerate_runs_every_step_on_a_fresh_environment() {
        let effects = FakeEffects::new();
        effects.process.stub("id", RunOutput { code: 0, stdout: "1000".to_string(), stderr: String::new() });
        effects.process.stub("python3", RunOutput { code: 0, stdout: "Python 3.11.7".to_string(), stderr: String::new() });
        let manifest = minimal_manifest();
        let profile = ProjectProfile {
            kind: "python-script".to_string(),
            required_capability_ids: vec![],
            inferred_dev_tools: vec![],
            declared_interpreter_constraint: None,
            input_digest: "abc".to_string(),
        };
        let outcome = regenerate(
            &effects,
            Path::new("/env"),
            Path::new("/cache"),
            "t1",
            &manifest,
            &profile,
            &empty_lockfile(),
            false,
            false,
        )
        .unwrap();
        assert_eq!(outcome.resumed_from_step, 0);
        assert_eq!(outcome.steps.len(), Step::ORDER.len());
    }

    #[test]
    fn second_run_with_unchanged_inputs_resumes_past_every_step() {
        let effects = FakeEffects::new();
        effects.process.stub("id", RunOutput { code: 0, stdout: "1000".to_string(), stderr: String::new() });
        effects.process.stub("python3", RunOutput { code: 0, stdout: "Python 3.11.7".to_string(), stderr: String::new() });
        let manifest = minimal_manifest();
        let profile = ProjectProfile {
            kind: "python-script".to_string(),
            required_capability_ids: vec![],
            inferred_dev_tools: vec![],
            declared_interpreter_constraint: None,
            input_digest: "abc".to_string(),
        };
        let lockfile = empty_lockfile();
        regenerate(&effects, Path::new("/env"), Path::new("/cache"), "t1", &manifest, &profile, &lockfile, false, false).unwrap();
        let second = regenerate(&effects, Path::new("/env"), Path::new("/cache"), "t1", &manifest, &profile, &lockfile, false, false).unwrap();
        assert_eq!(second.resumed_from_step, Step::ORDER.len());
        assert!(second.steps.is_empty());
    }

    #[test]
    fn install_capabilities_skips_install_when_already_present() {
        let effects = FakeEffects::new();
        effects.process.stub("id", RunOutput { code: 0, stdout: "1000".to_string(), stderr: String::new() });
        effects.process.stub("python3", RunOutput { code: 0, stdout: "Python 3.11.7".to_string(), stderr: String::new() });
        effects.process.stub("apt-get", RunOutput { code: 0, stdout: "ok".to_string(), stderr: String::new() });
        effects.process.stub("dpkg", RunOutput { code: 0, stdout: "installed".to_string(), stderr: String::new() });
        effects.fs.write(Path::new("/etc/os-release"), b"ID=ubuntu\nVERSION_ID=\"22.04\"\n").unwrap();

        let manifest = minimal_manifest();
        let profile = ProjectProfile {
            kind: "python-script".to_string(),
            required_capability_ids: vec!["build_toolchain".to_string()],
            inferred_dev_tools: vec![],
            declared_interpreter_constraint: None,
            input_digest: "abc".to_string(),
        };
        let outcome = regenerate(
            &effects,
            Path::new("/env"),
            Path::new("/cache"),
            "t1",
            &manifest,
            &profile,
            &empty_lockfile(),
            false,
            false,
        )
        .unwrap();
        assert!(outcome.snapshot.capabilities_present.iter().any(|(id, _)| id == "build_toolchain"));
        assert!(effects.process.responses.lock().unwrap().get("sudo").is_none());
    }

    #[test]
    fn strict_mode_rejects_system_interpreter_fallback() {
        let effects = FakeEffects::new();
        effects.process.stub("id", RunOutput { code: 0, stdout: "1000".to_string(), stderr: String::new() });
        effects.process.stub("python3", RunOutput { code: 0, stdout: "Python 3.11.7".to_string(), stderr: String::new() });
        let manifest = minimal_manifest();
        let profile = ProjectProfile {
            kind: "python-script".to_string(),
            required_capability_ids: vec![],
            inferred_dev_tools: vec![],
            declared_interpreter_constraint: None,
            input_digest: "abc".to_string(),
        };
        let err = regenerate(&effects, Path::new("/env"), Path::new("/cache"), "t1", &manifest, &profile, &empty_lockfile(), false, true)
            .unwrap_err();
        let dht_err = err.downcast_ref::<DhtError>().expect("expected DhtError");
        assert!(matches!(dht_err, DhtError::StrictModeViolation { .. }));
    }
}
