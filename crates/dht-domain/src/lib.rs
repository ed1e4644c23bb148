#![allow(dead_code)]
#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

//! Domain types and pure logic for DHT: the parts of the engine with no
//! opinion about the host filesystem, network, or subprocesses. Nothing in
//! this crate performs I/O beyond the manifest codec's own file reads;
//! `dht-core` wires these types to the rest of the world through its
//! `Effects` facade.

pub mod capability;
pub mod dependency;
pub mod error;
pub mod import_table;
pub mod interpreter;
pub mod introspect;
pub mod manifest;
pub mod parsers;
pub mod snapshot;
pub mod task;
pub mod tool;

pub use capability::{
    Arch, Authority, Capability, CapabilityId, PackageManager, PlatformFamily, PlatformKey,
    PlatformMapping, PostInstallStep,
};
pub use dependency::{
    AlgoHash, LockFile, LockFileError, LockMetadata, PinnedDependency, SourceKind,
};
pub use error::DhtError;
pub use import_table::{capabilities_for_import, union_capabilities};
pub use interpreter::{Interpreter, InterpreterOrigin};
pub use introspect::{build_profile, ProjectKind, ProjectProfile, ScanFacts};
pub use manifest::{read_manifest, write_manifest, Manifest, ManifestCodecError};
pub use snapshot::{
    BehavioralFingerprint, DiffEntry, DiffEntryKind, EnvironmentSnapshot, SnapshotDiff,
};
pub use task::{Checkpoint, CheckpointLog, ResourceLimits, Task, TaskKind, TaskResult, TaskState};
pub use tool::ToolInstallation;
