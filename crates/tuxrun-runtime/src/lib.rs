//! Runtime backends and process supervision for tuxrun jobs.
//!
//! This crate implements the execution layer: backend selection (`null`,
//! `docker`, `podman`), mount binding bookkeeping, engine command-line
//! construction with host capability probes, a scoped run of the primary
//! process, best-effort kill, and the engine-specific pre/post run hooks.

pub mod backend;
pub mod binding;
pub mod command;
pub mod config;
pub mod hooks;
pub mod host;
pub mod mock;
pub mod process;
pub mod runtime;

pub use backend::{select, Backend};
pub use binding::{Binding, BindingSet};
pub use command::{build_command, CommandOptions};
pub use config::RuntimeConfig;
pub use host::HostProbe;
pub use process::{LaunchSpec, Process, ProcessLauncher, Sleeper, StdioMode, SystemLauncher};
pub use runtime::{RunScope, Runtime};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown runtime '{0}' (expected one of: docker, podman, null)")]
    UnknownRuntime(String),
    #[error("invalid runtime configuration: {0}")]
    Config(String),
    #[error("Duplicated mount destination '{0}'")]
    DuplicateDestination(String),
    #[error(transparent)]
    Spawn(#[from] std::io::Error),
    #[error("Unable to create {engine} socket at {}", path.display())]
    SocketTimeout { engine: String, path: PathBuf },
}
