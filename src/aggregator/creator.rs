//! Callbacks supplied by aggregator users

use crate::context::{BuildContext, Input, Output};
use crate::types::{Metadata, ResourceStatus};
use std::path::{Path, PathBuf};

/// One input of an aggregate, as handed to an [`AggregateCreator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateInput {
    pub(crate) resource: PathBuf,
    pub(crate) basedir: PathBuf,
    pub(crate) status: ResourceStatus,
}

impl AggregateInput {
    pub fn resource(&self) -> &Path {
        &self.resource
    }

    /// Base directory the input was enumerated from.
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    /// Path relative to the base directory.
    pub fn relative_path(&self) -> &Path {
        self.resource
            .strip_prefix(&self.basedir)
            .unwrap_or(&self.resource)
    }
}

/// Derives a metadata fragment from a changed input.
pub trait InputProcessor {
    fn process(
        &mut self,
        input: &Input,
        context: &mut BuildContext,
    ) -> anyhow::Result<Option<Metadata>>;
}

impl<F> InputProcessor for F
where
    F: FnMut(&Input, &mut BuildContext) -> anyhow::Result<Option<Metadata>>,
{
    fn process(
        &mut self,
        input: &Input,
        context: &mut BuildContext,
    ) -> anyhow::Result<Option<Metadata>> {
        self(input, context)
    }
}

/// Writes an aggregate from its full input list.
pub trait AggregateCreator {
    fn create(&mut self, output: &Output, inputs: &[AggregateInput]) -> anyhow::Result<()>;
}

impl<F> AggregateCreator for F
where
    F: FnMut(&Output, &[AggregateInput]) -> anyhow::Result<()>,
{
    fn create(&mut self, output: &Output, inputs: &[AggregateInput]) -> anyhow::Result<()> {
        self(output, inputs)
    }
}

/// Writes an aggregate from the merged metadata of its inputs.
pub trait MetadataAggregateCreator {
    fn create(&mut self, output: &Output, metadata: &Metadata) -> anyhow::Result<()>;
}

impl<F> MetadataAggregateCreator for F
where
    F: FnMut(&Output, &Metadata) -> anyhow::Result<()>,
{
    fn create(&mut self, output: &Output, metadata: &Metadata) -> anyhow::Result<()> {
        self(output, metadata)
    }
}
