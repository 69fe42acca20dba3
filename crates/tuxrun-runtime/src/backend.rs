use crate::runtime::Runtime;
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Execution backend driving the primary process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Run the command directly on the host.
    Null,
    Docker,
    Podman,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Null, Backend::Docker, Backend::Podman];

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Null => "null",
            Backend::Docker => "docker",
            Backend::Podman => "podman",
        }
    }

    /// The engine binary for container backends, `None` for `Null`.
    pub fn engine(self) -> Option<&'static str> {
        match self {
            Backend::Null => None,
            Backend::Docker => Some("docker"),
            Backend::Podman => Some("podman"),
        }
    }

    pub fn is_container(self) -> bool {
        self.engine().is_some()
    }

    /// Construct a runtime for this backend rooted at `directory`.
    pub fn runtime(self, directory: impl Into<PathBuf>) -> Runtime {
        Runtime::new(self, directory)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Backend::Null),
            "docker" => Ok(Backend::Docker),
            "podman" => Ok(Backend::Podman),
            other => Err(RuntimeError::UnknownRuntime(other.to_owned())),
        }
    }
}

pub fn select(name: &str) -> Result<Backend, RuntimeError> {
    name.parse()
}
