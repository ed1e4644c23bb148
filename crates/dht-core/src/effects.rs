//! Every side-effecting capability behind a trait object, generalized from
//! the teacher's `core::runtime::effects::Effects`
//! (`px-core/src/core/runtime/effects.rs`): the Regeneration Engine and
//! Task Runner depend only on these traits, never on `std::process`/`std::fs`
//! directly, so both can be driven under test with a fake implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::process::{run_command, run_command_streaming, run_command_with_timeout, RunOutput};

pub trait ProcessRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], envs: &[(String, String)], cwd: &Path) -> Result<RunOutput>;
    fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        cwd: &Path,
    ) -> Result<RunOutput>;
    fn run_with_timeout(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<RunOutput>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn read_dir_recursive(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Fetches from the package index and the managed-interpreter downloader.
/// Kept as a trait (rather than a bare `reqwest::Client`) so tests never
/// touch the network, matching the teacher's `PypiClient` seam.
pub trait HttpClient: Send + Sync {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;
    fn get_json(&self, url: &str) -> Result<serde_json::Value>;
}

pub trait Effects: Send + Sync {
    fn process(&self) -> &dyn ProcessRunner;
    fn fs(&self) -> &dyn FileSystem;
    fn http(&self) -> &dyn HttpClient;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, program: &str, args: &[String], envs: &[(String, String)], cwd: &Path) -> Result<RunOutput> {
        run_command(program, args, envs, cwd)
    }

    fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        cwd: &Path,
    ) -> Result<RunOutput> {
        run_command_streaming(program, args, envs, cwd)
    }

    fn run_with_timeout(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<RunOutput> {
        run_command_with_timeout(program, args, envs, cwd, timeout)
    }
}

pub struct SystemFileSystem;

impl FileSystem for SystemFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs_err::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs_err::write(path, contents).with_context(|| format!("writing {}", path.display()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs_err::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs_err::remove_dir_all(path).with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs_err::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir_recursive(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(path)
            .into_iter()
            .filter_entry(|e| !dht_domain::parsers::is_ignored_path(e.path()))
        {
            let entry = entry.with_context(|| format!("walking {}", path.display()))?;
            if entry.file_type().is_file() {
                entries.push(entry.into_path());
            }
        }
        Ok(entries)
    }
}

pub struct SystemHttpClient {
    client: reqwest::blocking::Client,
}

impl SystemHttpClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for SystemHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for SystemHttpClient {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().with_context(|| format!("GET {url}"))?;
        Ok(response.bytes().with_context(|| format!("reading body of {url}"))?.to_vec())
    }

    fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self.client.get(url).send().with_context(|| format!("GET {url}"))?;
        response
            .json()
            .with_context(|| format!("parsing JSON body of {url}"))
    }
}

pub struct SystemEffects {
    process: Arc<SystemProcessRunner>,
    fs: Arc<SystemFileSystem>,
    http: Arc<SystemHttpClient>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            process: Arc::new(SystemProcessRunner),
            fs: Arc::new(SystemFileSystem),
            http: Arc::new(SystemHttpClient::new()),
        }
    }

    #[must_use]
    pub fn shared() -> SharedEffects {
        Arc::new(Self::new())
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn process(&self) -> &dyn ProcessRunner {
        self.process.as_ref()
    }

    fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }
}
