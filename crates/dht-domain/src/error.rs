use std::path::PathBuf;

/// The closed set of fatal/structured error kinds a component may surface.
///
/// Every component returns this enum (wrapped in `anyhow::Error` at call
/// sites that also need free-form context) so the CLI boundary can perform
/// one exhaustive match from error kind to process exit code.
#[derive(thiserror::Error, Debug)]
pub enum DhtError {
    #[error("manifest at {path} is invalid: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("manifest at {path} requires schema major version {found}, engine supports up to {supported}")]
    ManifestVersionTooNew {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("interpreter {version_spec} is unavailable on this host")]
    InterpreterUnavailable { version_spec: String },

    #[error("no platform mapping for capability `{capability_id}` on {platform_key}")]
    NoMappingForPlatform {
        capability_id: String,
        platform_key: String,
    },

    #[error("package manager `{manager_id}` is required but not installed")]
    PackageManagerMissing {
        manager_id: String,
        blocked_capability: Option<String>,
    },

    #[error("dependency `{name}` has no artifact matching the recorded hashes")]
    DependencyResolutionMismatch { name: String },

    #[error("build failed for `{name}`: {reason}")]
    BuildFailed { name: String, reason: String },

    #[error("hash mismatch for `{name}`: expected one of {expected:?}, got {actual}")]
    HashMismatch {
        name: String,
        expected: Vec<String>,
        actual: String,
    },

    #[error("{limit} exceeded while running step `{step}`")]
    ResourceExceeded { step: String, limit: String },

    #[error("step `{step}` timed out after {elapsed_secs}s")]
    Timeout { step: String, elapsed_secs: u64 },

    #[error("transient network error: {reason}")]
    TransientNetwork { reason: String },

    #[error("package index unavailable: {reason}")]
    PackageIndexUnavailable { reason: String },

    #[error("environment fingerprint drifted from the manifest")]
    FingerprintDrift { diff_entries: usize },

    #[error("strict mode forbids fallback in step `{step}`: {detail}")]
    StrictModeViolation { step: String, detail: String },
}

impl DhtError {
    /// Whether the runner should consider this kind for its retry budget.
    ///
    /// Only transient, externally-caused failures are retryable; everything
    /// else propagates immediately per spec §7.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DhtError::TransientNetwork { .. } | DhtError::PackageIndexUnavailable { .. }
        )
    }

    /// The exit code the CLI boundary should map this error kind to (§6).
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            DhtError::ManifestInvalid { .. } | DhtError::ManifestVersionTooNew { .. } => 2,
            DhtError::StrictModeViolation { .. } => 5,
            DhtError::FingerprintDrift { .. } => 3,
            DhtError::InterpreterUnavailable { .. }
            | DhtError::NoMappingForPlatform { .. }
            | DhtError::PackageManagerMissing { .. }
            | DhtError::DependencyResolutionMismatch { .. }
            | DhtError::BuildFailed { .. }
            | DhtError::HashMismatch { .. }
            | DhtError::ResourceExceeded { .. }
            | DhtError::Timeout { .. }
            | DhtError::TransientNetwork { .. }
            | DhtError::PackageIndexUnavailable { .. } => 4,
        }
    }
}
