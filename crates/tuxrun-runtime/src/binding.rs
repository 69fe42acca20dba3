use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A host path exposed inside the guest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binding {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub writable: bool,
    /// Added by the runtime itself rather than requested by the caller.
    pub implicit: bool,
}

impl Binding {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        Self {
            destination: source.clone(),
            source,
            writable: true,
            implicit: false,
        }
    }

    #[must_use]
    pub fn to(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    #[must_use]
    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }

    pub fn mode(&self) -> &'static str {
        if self.writable {
            "rw"
        } else {
            "ro"
        }
    }

    /// Render as the `source:destination:mode` value of a `-v` flag.
    pub fn volume_spec(&self) -> String {
        format!(
            "{}:{}:{}",
            self.source.display(),
            self.destination.display(),
            self.mode()
        )
    }
}

/// Bindings in insertion order. Uniqueness of destinations is only
/// checked when a command is assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSet {
    bindings: Vec<Binding>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Binding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn last(&self) -> Option<&Binding> {
        self.bindings.last()
    }

    pub fn as_slice(&self) -> &[Binding] {
        &self.bindings
    }

    /// Fail on the first destination that appears twice.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let mut seen = DestinationSet::default();
        for binding in &self.bindings {
            seen.claim(&binding.destination)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a BindingSet {
    type Item = &'a Binding;
    type IntoIter = std::slice::Iter<'a, Binding>;

    fn into_iter(self) -> Self::IntoIter {
        self.bindings.iter()
    }
}

/// Guest mount points already taken while assembling a command.
#[derive(Debug, Default)]
pub(crate) struct DestinationSet {
    seen: HashSet<PathBuf>,
}

impl DestinationSet {
    pub(crate) fn claim(&mut self, destination: &Path) -> Result<(), RuntimeError> {
        if self.seen.insert(destination.to_path_buf()) {
            Ok(())
        } else {
            Err(RuntimeError::DuplicateDestination(
                destination.display().to_string(),
            ))
        }
    }
}
