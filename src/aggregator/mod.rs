//! Aggregate outputs: one output built from a dynamically enumerated set of inputs
//!
//! An [`AggregatorBuildContext`] links every matched input to the aggregate and decides
//! whether the aggregate must be recreated, either from input statuses
//! ([`AggregatorBuildContext::create_if_necessary`]) or from metadata extracted from the
//! inputs ([`AggregatorBuildContext::create_if_necessary_with_metadata`]). Aggregates that
//! are neither recreated nor confirmed up to date are deleted at commit.

pub mod creator;

pub use creator::{AggregateCreator, AggregateInput, InputProcessor, MetadataAggregateCreator};

use crate::config::Configuration;
use crate::context::{
    BuildContext, ContextBuilder, FinalizePolicy, InputMetadata, Reconciliation,
};
use crate::error::BuildError;
use crate::resource::normalize_resource;
use crate::types::{Metadata, ResourceStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Attribute holding the metadata fragment an input contributed to its aggregate.
pub const AGGREGATE_METADATA: &str = "aggregate.metadata";

/// A registered aggregate output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateOutput {
    resource: PathBuf,
}

impl AggregateOutput {
    pub fn resource(&self) -> &Path {
        &self.resource
    }
}

/// Keeps recreated and up-to-date aggregates, deletes the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregatorPolicy;

impl FinalizePolicy for AggregatorPolicy {
    fn name(&self) -> &'static str {
        "aggregator"
    }

    fn assert_association(&self, _input: &Path, _output: &Path) -> Result<(), BuildError> {
        Ok(())
    }

    fn finalize(&self, rec: &mut Reconciliation<'_>) -> Result<(), BuildError> {
        let old_outputs: Vec<PathBuf> = rec.old().outputs().cloned().collect();
        for output in old_outputs {
            if rec.is_output_processed(&output) {
                continue;
            }
            if rec.is_up_to_date(&output) {
                rec.carry_metadata(&output);
            } else {
                rec.delete_output(&output)?;
            }
        }
        Ok(())
    }
}

/// Build context for aggregate outputs.
pub struct AggregatorBuildContext {
    context: BuildContext,
    /// Registered aggregates with the metadata fragment of each associated input.
    aggregates: BTreeMap<PathBuf, BTreeMap<PathBuf, Metadata>>,
    basedirs: BTreeMap<PathBuf, PathBuf>,
}

impl AggregatorBuildContext {
    pub fn open(
        state_file: impl Into<PathBuf>,
        configuration: &Configuration,
    ) -> Result<Self, BuildError> {
        Self::from_builder(BuildContext::builder(state_file).configuration(configuration.clone()))
    }

    /// Build from a configured builder; the finalize policy is always [`AggregatorPolicy`].
    pub fn from_builder(builder: ContextBuilder) -> Result<Self, BuildError> {
        Ok(Self {
            context: builder.policy(AggregatorPolicy).build()?,
            aggregates: BTreeMap::new(),
            basedirs: BTreeMap::new(),
        })
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut BuildContext {
        &mut self.context
    }

    pub fn is_escalated(&self) -> bool {
        self.context.is_escalated()
    }

    fn ensure_open(&self) -> Result<(), BuildError> {
        if self.context.is_closed() {
            Err(BuildError::closed())
        } else {
            Ok(())
        }
    }

    /// Register an aggregate output. Each output has a single writer per build.
    pub fn register_output(&mut self, path: impl AsRef<Path>) -> Result<AggregateOutput, BuildError> {
        self.ensure_open()?;
        let resource = normalize_resource(path.as_ref())?;
        if self.aggregates.contains_key(&resource) {
            return Err(BuildError::InvalidState(format!(
                "aggregate output {} already registered",
                resource.display()
            )));
        }
        self.aggregates.insert(resource.clone(), BTreeMap::new());
        Ok(AggregateOutput { resource })
    }

    /// Link matching inputs to `output`, processing the changed ones.
    pub fn associate_inputs<I, E>(
        &mut self,
        output: &AggregateOutput,
        basedir: &Path,
        includes: I,
        excludes: E,
    ) -> Result<Vec<InputMetadata>, BuildError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        self.associate(output, basedir, includes, excludes, None)
    }

    /// Like [`associate_inputs`](Self::associate_inputs), asking `processor` for the
    /// metadata fragment of each changed input. Unchanged inputs contribute the fragment
    /// stored by the previous build.
    pub fn associate_inputs_with<I, E, P>(
        &mut self,
        output: &AggregateOutput,
        basedir: &Path,
        includes: I,
        excludes: E,
        mut processor: P,
    ) -> Result<Vec<InputMetadata>, BuildError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: InputProcessor,
    {
        self.associate(
            output,
            basedir,
            includes,
            excludes,
            Some(&mut processor as &mut dyn InputProcessor),
        )
    }

    fn associate<I, E>(
        &mut self,
        output: &AggregateOutput,
        basedir: &Path,
        includes: I,
        excludes: E,
        mut processor: Option<&mut dyn InputProcessor>,
    ) -> Result<Vec<InputMetadata>, BuildError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        self.ensure_open()?;
        self.ensure_registered(&output.resource)?;
        let basedir = normalize_resource(basedir)?;
        let matched = self.context.register_inputs(&basedir, includes, excludes)?;

        let mut fragments = BTreeMap::new();
        for metadata in &matched {
            let resource = metadata.resource();
            self.basedirs
                .insert(resource.to_path_buf(), basedir.clone());

            if metadata.status() != ResourceStatus::Unmodified {
                if self.context.is_processed(resource) {
                    return Err(BuildError::InvalidState(format!(
                        "input {} already processed",
                        resource.display()
                    )));
                }
                let input = self.context.process(metadata)?;
                if let Some(processor) = processor.as_mut() {
                    let fragment = processor.process(&input, &mut self.context).map_err(|cause| {
                        BuildError::Callback {
                            context: format!("input processor failed for {}", resource.display()),
                            cause,
                        }
                    })?;
                    if let Some(fragment) = fragment {
                        self.context
                            .set_attribute(&input, AGGREGATE_METADATA, &fragment)?;
                        fragments.insert(resource.to_path_buf(), fragment);
                    }
                }
            } else if let Some(fragment) = self
                .context
                .get_attribute::<Metadata>(resource, AGGREGATE_METADATA)?
            {
                fragments.insert(resource.to_path_buf(), fragment);
            }

            self.context.link(resource, &output.resource);
        }

        debug!(
            output = %output.resource.display(),
            inputs = matched.len(),
            "Associated aggregate inputs"
        );
        if let Some(inputs) = self.aggregates.get_mut(&output.resource) {
            inputs.extend(fragments);
        }
        Ok(matched)
    }

    fn ensure_registered(&self, output: &Path) -> Result<(), BuildError> {
        if self.aggregates.contains_key(output) {
            Ok(())
        } else {
            Err(BuildError::InvalidArgument(format!(
                "{} is not a registered aggregate output",
                output.display()
            )))
        }
    }

    /// Recreate `output` if any input was added, changed or removed, or the aggregate
    /// itself changed on disk. Returns whether `creator` ran.
    pub fn create_if_necessary(
        &mut self,
        output: &AggregateOutput,
        mut creator: impl AggregateCreator,
    ) -> Result<bool, BuildError> {
        self.ensure_open()?;
        self.ensure_registered(&output.resource)?;
        let resource = &output.resource;

        let current: BTreeSet<PathBuf> = self
            .context
            .current_state()
            .inputs_of(resource)
            .cloned()
            .unwrap_or_default();
        let old: BTreeSet<PathBuf> = self
            .context
            .old_state()
            .inputs_of(resource)
            .cloned()
            .unwrap_or_default();

        let required = self.context.is_escalated()
            || current.iter().any(|input| {
                self.context
                    .registered_status(input)
                    .map_or(true, |status| !status.is_unmodified())
            })
            || current != old
            || self.context.output_changed_on_disk(resource)?;

        if !required {
            debug!(output = %resource.display(), "Aggregate up to date");
            self.context.mark_up_to_date(resource);
            return Ok(false);
        }

        let handle = self.context.process_output(resource)?;
        let inputs: Vec<AggregateInput> = current
            .iter()
            .map(|input| AggregateInput {
                resource: input.clone(),
                basedir: self.basedirs.get(input).cloned().unwrap_or_default(),
                status: self
                    .context
                    .registered_status(input)
                    .unwrap_or(ResourceStatus::New),
            })
            .collect();

        creator
            .create(&handle, &inputs)
            .map_err(|cause| BuildError::Callback {
                context: format!("aggregate creator failed for {}", resource.display()),
                cause,
            })?;
        info!(output = %resource.display(), inputs = inputs.len(), "Created aggregate");
        Ok(true)
    }

    /// Recreate `output` if the merged metadata of its inputs differs from the previous
    /// build's, or the aggregate itself changed on disk. Returns whether `creator` ran.
    pub fn create_if_necessary_with_metadata(
        &mut self,
        output: &AggregateOutput,
        mut creator: impl MetadataAggregateCreator,
    ) -> Result<bool, BuildError> {
        self.ensure_open()?;
        self.ensure_registered(&output.resource)?;
        let resource = &output.resource;
        // Merged in input path order, the same order as the previous build's fragments.
        let merged: Metadata = self
            .aggregates
            .get(resource)
            .into_iter()
            .flat_map(|inputs| inputs.values())
            .flat_map(|fragment| fragment.iter())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let required = self.context.is_escalated()
            || self.context.output_changed_on_disk(resource)?
            || merged != self.old_merged_metadata(resource)?;

        if !required {
            debug!(output = %resource.display(), "Aggregate metadata unchanged");
            self.context.mark_up_to_date(resource);
            return Ok(false);
        }

        let handle = self.context.process_output(resource)?;
        creator
            .create(&handle, &merged)
            .map_err(|cause| BuildError::Callback {
                context: format!("aggregate creator failed for {}", resource.display()),
                cause,
            })?;
        info!(output = %resource.display(), keys = merged.len(), "Created aggregate from metadata");
        Ok(true)
    }

    fn old_merged_metadata(&self, output: &Path) -> Result<Metadata, BuildError> {
        let old = self.context.old_state();
        let mut merged = Metadata::new();
        for input in old.inputs_of(output).into_iter().flatten() {
            let stored = old
                .attributes(input)
                .and_then(|attributes| attributes.get(AGGREGATE_METADATA));
            if let Some(value) = stored {
                let fragment: Metadata =
                    serde_json::from_value(value.clone()).map_err(|e| BuildError::Attribute {
                        key: AGGREGATE_METADATA.to_string(),
                        reason: e.to_string(),
                    })?;
                merged.extend(fragment);
            }
        }
        Ok(merged)
    }

    pub fn commit(&mut self) -> Result<(), BuildError> {
        self.context.commit()
    }
}
