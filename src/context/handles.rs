//! Handles returned by a build context
//!
//! Handles are plain values naming a resource. All state lives in the context; a handle
//! only proves that the resource went through the corresponding registration step.

use crate::types::ResourceStatus;
use std::path::{Path, PathBuf};

/// A resource that was processed during the current build and may carry messages and
/// attributes.
pub trait ProcessedResource {
    fn resource(&self) -> &Path;
}

/// A registered input and the status computed at its first registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputMetadata {
    pub(crate) resource: PathBuf,
    pub(crate) status: ResourceStatus,
}

impl InputMetadata {
    pub fn resource(&self) -> &Path {
        &self.resource
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }
}

/// An input processed during the current build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Input {
    pub(crate) resource: PathBuf,
}

impl Input {
    pub fn resource(&self) -> &Path {
        &self.resource
    }
}

impl ProcessedResource for Input {
    fn resource(&self) -> &Path {
        &self.resource
    }
}

/// An output produced during the current build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Output {
    pub(crate) resource: PathBuf,
}

impl Output {
    pub fn resource(&self) -> &Path {
        &self.resource
    }
}

impl ProcessedResource for Output {
    fn resource(&self) -> &Path {
        &self.resource
    }
}
