//! Public entry points: `setup`, `regenerate`, `validate`, `fix`, `clean`,
//! `run`, each a thin composition of the lower modules bound together by a
//! [`CommandContext`], mirroring the teacher's `core::commands` boundary
//! (one function per CLI subcommand, all engine/environment I/O behind
//! `Effects`; manifest I/O goes through the real filesystem directly, since
//! the manifest codec itself is the one part of `dht-domain` documented to
//! perform its own I/O).

use std::path::PathBuf;

use anyhow::{Context, Result};
use dht_domain::{
    build_profile, parsers, read_manifest, write_manifest, DhtError, LockFile, LockMetadata, Manifest,
    ManifestCodecError, ProjectProfile, ScanFacts,
};

use crate::context::CommandContext;
use crate::engine::{self, RegenerationOutcome};
use crate::progress::ProgressReporter;
use crate::validator::{self, ValidationReport};

fn env_root(ctx: &CommandContext<'_>) -> Result<PathBuf> {
    Ok(ctx.project_root()?.join(".dht-env"))
}

/// Scans the project tree rooted at `ctx.project_root()` into a
/// [`ScanFacts`] by running each applicable source parser over the files
/// the filesystem effect reports, then classifies it into a
/// [`ProjectProfile`] (spec §4.D). `declared_capabilities` are the
/// `capabilities[]` already recorded in an existing `.dhtconfig`, if any;
/// they're unioned with what the scanner infers rather than replaced by it
/// (spec: "capabilities already declared in the manifest are unioned in").
///
/// # Errors
///
/// Returns an error if the project root cannot be walked.
pub fn scan_project(ctx: &CommandContext<'_>, declared_capabilities: &[String]) -> Result<ProjectProfile> {
    let root = ctx.project_root()?;
    let files = ctx.shared_effects().fs().read_dir_recursive(&root)?;
    let mut facts = ScanFacts { declared_capabilities: declared_capabilities.to_vec(), ..ScanFacts::default() };

    for file in &files {
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else { continue };
        let Ok(contents) = ctx.shared_effects().fs().read_to_string(file) else { continue };

        match name {
            "pyproject.toml" => {
                if let Ok(record) = parsers::parse_pyproject(file, &contents) {
                    facts.pyproject_dependencies.extend(record.dependencies);
                    facts.build_backend = record.build_backend;
                    facts.declared_interpreter_constraint = record.requires_python;
                }
            }
            "requirements.txt" => {
                if let Ok(record) = parsers::parse_requirements(file, &contents) {
                    facts.requirements_specs.extend(record.specs);
                }
            }
            _ if name.ends_with(".py") => {
                if let Ok(imports) = parsers::scan_python_imports(&contents) {
                    facts.imported_modules.extend(imports.into_iter().map(|i| i.module));
                }
            }
            _ => {}
        }
        facts.entrypoint_filenames.push(name.to_string());
    }

    Ok(build_profile(&facts))
}

/// Creates the initial `.dhtconfig` for a project that doesn't have one
/// yet, storing only fields the introspector cannot infer (spec §4.E).
///
/// # Errors
///
/// Returns an error if the project has already been set up, or if the
/// manifest cannot be written.
pub fn setup(ctx: &CommandContext<'_>) -> Result<Manifest> {
    let root = ctx.project_root()?;
    let manifest_path = Manifest::path_for(&root);
    if manifest_path.exists() {
        anyhow::bail!(DhtError::ManifestInvalid {
            path: manifest_path,
            reason: "a manifest already exists; use `fix` to repair it".to_string(),
        });
    }

    // Nothing is user-declared yet at setup time, so there is nothing for the
    // scanner to infer away: the manifest stores only the schema/engine
    // fields every `.dhtconfig` needs (spec §4.E). `interpreter_version` and
    // `capabilities` stay empty until a later `fix`/manual edit declares
    // something the scanner itself would not have found.
    let manifest = Manifest::new_minimal();

    write_manifest(&manifest_path, &manifest).map_err(|err| codec_error(err, &manifest_path))?;
    Ok(manifest)
}

fn codec_error(err: ManifestCodecError, path: &std::path::Path) -> anyhow::Error {
    match err {
        ManifestCodecError::VersionTooNew { found, supported, .. } => {
            DhtError::ManifestVersionTooNew { path: path.to_path_buf(), found, supported }.into()
        }
        other => DhtError::ManifestInvalid { path: path.to_path_buf(), reason: other.to_string() }.into(),
    }
}

fn load_manifest(ctx: &CommandContext<'_>) -> Result<Manifest> {
    let root = ctx.project_root()?;
    let path = Manifest::path_for(&root);
    read_manifest(&path).map_err(|err| codec_error(err, &path))
}

fn empty_lockfile() -> LockFile {
    LockFile {
        metadata: LockMetadata {
            resolver_id: "uv".to_string(),
            resolver_version: env!("CARGO_PKG_VERSION").to_string(),
            python_spec: String::new(),
            created_at: String::new(),
        },
        dependencies: Vec::new(),
        requires: Default::default(),
    }
}

const NATIVE_LOCKFILE_NAME: &str = ".dht-lock.toml";
const HASHED_REQUIREMENTS_LOCKFILE_NAME: &str = "requirements.lock.txt";

/// Reads the project's lockfile, preferring the primary resolver-native
/// format over the fallback hashed-requirements format when both are
/// present (spec §6: "Selection prefers the native format when present").
/// A project with neither file yet (e.g. before its first dependency is
/// pinned) gets an empty lockfile rather than an error.
///
/// # Errors
///
/// Returns an error if a lockfile is present but fails to parse.
fn load_lockfile(ctx: &CommandContext<'_>) -> Result<LockFile> {
    let root = ctx.project_root()?;
    let native_path = root.join(NATIVE_LOCKFILE_NAME);
    let hashed_path = root.join(HASHED_REQUIREMENTS_LOCKFILE_NAME);

    if let Ok(contents) = ctx.shared_effects().fs().read_to_string(&native_path) {
        return parsers::parse_native_lockfile(&native_path, &contents)
            .with_context(|| format!("parsing lockfile {}", native_path.display()));
    }
    if let Ok(contents) = ctx.shared_effects().fs().read_to_string(&hashed_path) {
        return parsers::parse_hashed_requirements(&hashed_path, &contents)
            .with_context(|| format!("parsing lockfile {}", hashed_path.display()));
    }
    Ok(empty_lockfile())
}

/// Runs the Regeneration Engine end to end for the current project (spec
/// §4.I), resuming from the last durable checkpoint when one exists.
///
/// # Errors
///
/// Returns an error if the manifest is missing/invalid, or if any engine
/// step fails.
pub fn regenerate(ctx: &CommandContext<'_>, task_id: &str) -> Result<RegenerationOutcome> {
    let manifest = load_manifest(ctx)?;
    let profile = scan_project(ctx, &manifest.capabilities)?;
    let lockfile = load_lockfile(ctx)?;
    let env_root = env_root(ctx)?;
    let reporter = ProgressReporter::new(ctx.global);

    reporter.step_started("regenerate");
    let outcome = engine::regenerate(
        ctx.effects(),
        &env_root,
        &ctx.config().cache().root,
        task_id,
        &manifest,
        &profile,
        &lockfile,
        ctx.is_online(),
        ctx.is_strict(),
    )?;
    reporter.step_finished("regenerate", Some(&outcome.fingerprint.0));
    Ok(outcome)
}

/// Observes the live environment and reports drift against the manifest's
/// recorded fingerprint (spec §4.J), performing no mutation.
///
/// # Errors
///
/// Returns an error if the environment cannot be observed.
pub fn validate(ctx: &CommandContext<'_>) -> Result<ValidationReport> {
    let manifest = load_manifest(ctx)?;
    let lockfile = load_lockfile(ctx)?;
    let env_root = env_root(ctx)?;
    validator::validate(ctx.effects(), &env_root, &lockfile, &manifest)
}

/// Re-installs whatever `validate` found drifted (spec §4.J).
///
/// # Errors
///
/// Returns an error if repair fails, or (in strict mode) if drift remains
/// after the repair attempt.
pub fn fix(ctx: &CommandContext<'_>) -> Result<ValidationReport> {
    let manifest = load_manifest(ctx)?;
    let lockfile = load_lockfile(ctx)?;
    let env_root = env_root(ctx)?;
    validator::fix(ctx.effects(), &env_root, &lockfile, &manifest, ctx.is_strict())
}

/// Removes the environment directory entirely (spec §3: "deletion is
/// explicit via a clean command").
///
/// # Errors
///
/// Returns an error if the environment directory exists but cannot be
/// removed.
pub fn clean(ctx: &CommandContext<'_>) -> Result<()> {
    let env_root = env_root(ctx)?;
    ctx.shared_effects().fs().remove_dir_all(&env_root)
}

/// Runs an arbitrary command inside the project environment, prefixing
/// `PATH` with the environment's bin directory so pinned tool wrappers
/// take effect (spec §6 activation contract).
///
/// # Errors
///
/// Returns an error if the subprocess cannot be spawned.
pub fn run(ctx: &CommandContext<'_>, program: &str, args: &[String]) -> Result<crate::process::RunOutput> {
    let env_root = env_root(ctx)?;
    let bin = env_root.join("bin");
    let path_var = std::env::var("PATH").unwrap_or_default();
    let envs = vec![("PATH".to_string(), format!("{}:{path_var}", bin.display()))];
    let root = ctx.project_root()?;
    ctx.effects().process().run(program, args, &envs, &root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalOptions;
    use crate::effects::fake::FakeEffects;
    use std::sync::Arc;

    fn test_context(global: &GlobalOptions, root: &std::path::Path) -> CommandContext<'_> {
        CommandContext::testing(global, Arc::new(FakeEffects::new()), root.to_path_buf())
    }

    #[test]
    fn setup_writes_a_minimal_manifest_when_none_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let global = GlobalOptions::default();
        let ctx = test_context(&global, tmp.path());

        let manifest = setup(&ctx).unwrap();
        assert_eq!(manifest.schema_version, dht_domain::manifest::SCHEMA_VERSION_MAJOR);
        assert!(Manifest::path_for(tmp.path()).exists());
    }

    #[test]
    fn setup_refuses_to_overwrite_an_existing_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let global = GlobalOptions::default();
        let ctx = test_context(&global, tmp.path());

        setup(&ctx).unwrap();
        let err = setup(&ctx).unwrap_err();
        let dht_err = err.downcast_ref::<DhtError>().expect("expected DhtError");
        assert!(matches!(dht_err, DhtError::ManifestInvalid { .. }));
    }

    #[test]
    fn clean_removes_the_environment_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let global = GlobalOptions::default();
        let ctx = test_context(&global, tmp.path());

        let root = env_root(&ctx).unwrap();
        ctx.shared_effects().fs().write(&root.join("bin").join("python3"), b"").unwrap();
        clean(&ctx).unwrap();
        assert!(!ctx.shared_effects().fs().exists(&root.join("bin").join("python3")));
    }
}
