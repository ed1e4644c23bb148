//! Subprocess execution, generalized from the teacher's
//! `core::runtime::process` (`px-core/src/core/runtime/process.rs`): every
//! package-manager detect/install command, managed-interpreter download
//! helper, and wheel build step goes through here so proxy-variable
//! stripping and output capture are consistent everywhere (spec §6).

use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

const PROXY_VARS: [&str; 8] = [
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "NO_PROXY",
    "no_proxy",
];

fn is_proxy_env(key: &str) -> bool {
    PROXY_VARS.contains(&key)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

fn configured_command(program: &str, args: &[String], envs: &[(String, String)], cwd: &Path) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in envs {
        if value.is_empty() && is_proxy_env(key) {
            command.env_remove(key);
            continue;
        }
        command.env(key, value);
    }
    command.current_dir(cwd);
    command
}

/// Runs `program` with captured stdout/stderr and no stdin.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned or its output cannot
/// be read to completion.
pub fn run_command(program: &str, args: &[String], envs: &[(String, String)], cwd: &Path) -> Result<RunOutput> {
    let mut command = configured_command(program, args, envs, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let output = command
        .output()
        .with_context(|| format!("failed to start {program}"))?;
    let code = output.status.code().unwrap_or(-1);
    Ok(RunOutput {
        code,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Like [`run_command`] but tees output to the parent process's own
/// stdout/stderr as it arrives, used for long-running installer steps
/// where the operator benefits from live output.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned, its pipes cannot be
/// taken, or either tee thread panics.
pub fn run_command_streaming(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
) -> Result<RunOutput> {
    let mut command = configured_command(program, args, envs, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;

    let stdout_handle = thread::spawn(move || tee_to_string(&mut stdout, io::stdout()));
    let stderr_handle = thread::spawn(move || tee_to_string(&mut stderr, io::stderr()));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    let code = status.code().unwrap_or(-1);
    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let stderr = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;

    Ok(RunOutput { code, stdout, stderr })
}

fn tee_to_string(reader: &mut dyn Read, mut writer: impl Write) -> Result<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        writer.write_all(&chunk[..read])?;
        buffer.extend_from_slice(&chunk[..read]);
    }
    writer.flush().ok();
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

/// Runs `program` with a wall-clock timeout by polling the child's exit
/// status, killing it and returning a synthetic timeout code if it runs
/// past `timeout` (used by the Platform Probe's detect commands, spec
/// §4.A: "≤ 2 s").
///
/// # Errors
///
/// Returns an error if the program cannot be spawned.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
    timeout: Duration,
) -> Result<RunOutput> {
    let mut command = configured_command(program, args, envs, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let start = std::time::Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut out) = child.stdout.take() {
                out.read_to_string(&mut stdout).ok();
            }
            if let Some(mut err) = child.stderr.take() {
                err.read_to_string(&mut stderr).ok();
            }
            return Ok(RunOutput {
                code: status.code().unwrap_or(-1),
                stdout,
                stderr,
            });
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(RunOutput {
                code: TIMEOUT_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("{program} timed out after {timeout:?}"),
            });
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Like [`run_command_with_timeout`] but polls `cancel_flag` instead of (or
/// in addition to) a fixed deadline: once the flag is set, the child is
/// given `grace` to exit on its own before being killed. This is the
/// subprocess-boundary half of task cancellation (spec §4.K): the scheduler
/// sets the flag when `cancel()` is called on a `Running` task, and whatever
/// step is blocked in a subprocess call here is the thing that actually
/// terminates it.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned.
pub fn run_command_cancelable(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
    cancel_flag: &std::sync::atomic::AtomicBool,
    grace: Duration,
) -> Result<RunOutput> {
    use std::sync::atomic::Ordering;

    let mut command = configured_command(program, args, envs, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let mut canceled_at: Option<std::time::Instant> = None;
    loop {
        if let Some(status) = child.try_wait()? {
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut out) = child.stdout.take() {
                out.read_to_string(&mut stdout).ok();
            }
            if let Some(mut err) = child.stderr.take() {
                err.read_to_string(&mut stderr).ok();
            }
            return Ok(RunOutput {
                code: status.code().unwrap_or(-1),
                stdout,
                stderr,
            });
        }
        if cancel_flag.load(Ordering::SeqCst) {
            let since = *canceled_at.get_or_insert_with(std::time::Instant::now);
            if since.elapsed() >= grace {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(RunOutput {
                    code: CANCELED_EXIT_CODE,
                    stdout: String::new(),
                    stderr: format!("{program} canceled"),
                });
            }
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Sentinel exit code for a timed-out detect command, distinct from any
/// real process exit code and from a missing binary (spec §4.A: "classify
/// non-zero exit, missing binary, and timeout distinctly").
pub const TIMEOUT_EXIT_CODE: i32 = -2;
/// Sentinel for a binary that could not be spawned at all.
pub const MISSING_BINARY_EXIT_CODE: i32 = -3;
/// Sentinel for a process killed because its task was canceled.
pub const CANCELED_EXIT_CODE: i32 = -4;
