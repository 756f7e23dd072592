//! Build context: change detection and output bookkeeping for one build
//!
//! A context is opened against the snapshot of the previous build, collects
//! registrations and processing results, and at [`BuildContext::commit`] reconciles the
//! two generations and writes the new snapshot. After commit every operation fails with
//! [`BuildError::InvalidState`].
//!
//! Typical flow:
//!
//! ```no_run
//! use buildavoid::{BuildContext, Configuration};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), buildavoid::BuildError> {
//! let mut ctx = BuildContext::open("target/state/compile.buildstate", &Configuration::new())?;
//! for input in ctx.register_and_process_inputs(Path::new("src"), ["**/*.txt"], Vec::<String>::new())? {
//!     let out = input.resource().with_extension("out");
//!     std::fs::copy(input.resource(), &out).map_err(|e| buildavoid::BuildError::InvalidArgument(e.to_string()))?;
//!     ctx.associate_output(&input, &out)?;
//! }
//! ctx.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod handles;
pub mod policy;

pub use handles::{Input, InputMetadata, Output, ProcessedResource};
pub use policy::{BasicPolicy, FinalizePolicy, Reconciliation, StandardPolicy};

use crate::config::{Configuration, EngineSettings};
use crate::error::BuildError;
use crate::message::{Message, MessageSink, Severity, TracingSink};
use crate::resource::digest::digest_if_exists;
use crate::resource::{normalize_resource, DigestMode, Digester, FileMatcher};
use crate::state::{BuildState, QualifiedName, SnapshotStore};
use crate::types::{Digest, ResourceStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Configures and opens a [`BuildContext`].
pub struct ContextBuilder {
    state_file: PathBuf,
    configuration: Configuration,
    digester: Option<Box<dyn Digester>>,
    sink: Option<Box<dyn MessageSink>>,
    policy: Option<Box<dyn FinalizePolicy>>,
}

impl ContextBuilder {
    fn new(state_file: PathBuf) -> Self {
        Self {
            state_file,
            configuration: Configuration::new(),
            digester: None,
            sink: None,
            policy: None,
        }
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn digester(mut self, digester: impl Digester + 'static) -> Self {
        self.digester = Some(Box::new(digester));
        self
    }

    pub fn digest_mode(mut self, mode: DigestMode) -> Self {
        self.digester = Some(mode.digester());
        self
    }

    pub fn message_sink(mut self, sink: impl MessageSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn policy(mut self, policy: impl FinalizePolicy + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Use [`BasicPolicy`]: no association tracking.
    pub fn basic(self) -> Self {
        self.policy(BasicPolicy)
    }

    pub fn settings(self, settings: &EngineSettings) -> Self {
        self.digest_mode(settings.digest)
    }

    /// Load the previous snapshot and open the context.
    pub fn build(self) -> Result<BuildContext, BuildError> {
        let store = SnapshotStore::new(self.state_file);
        let loaded = store.load();
        let configuration = self.configuration.digest();

        let snapshot_escalated = loaded.escalated;
        let configuration_changed = loaded.state.configuration() != Some(configuration);
        let requested = self.configuration.escalation_requested();
        let escalated = snapshot_escalated || configuration_changed || requested;

        let policy = self.policy.unwrap_or_else(|| Box::new(StandardPolicy));
        info!(
            snapshot = %store.path().display(),
            policy = policy.name(),
            escalated,
            snapshot_escalated,
            configuration_changed,
            requested,
            "Opened build context"
        );

        Ok(BuildContext {
            store,
            digester: self.digester.unwrap_or_else(|| DigestMode::Content.digester()),
            sink: self.sink.unwrap_or_else(|| Box::new(TracingSink)),
            policy,
            configuration,
            old: loaded.state,
            state: BuildState::new(),
            escalated,
            statuses: BTreeMap::new(),
            processed: BTreeSet::new(),
            processed_outputs: BTreeSet::new(),
            loose_outputs: BTreeSet::new(),
            carried_outputs: BTreeSet::new(),
            up_to_date: BTreeSet::new(),
            deleted: BTreeSet::new(),
            skip_execution: false,
            closed: false,
        })
    }
}

/// Incremental build context for one build execution.
pub struct BuildContext {
    store: SnapshotStore,
    digester: Box<dyn Digester>,
    sink: Box<dyn MessageSink>,
    policy: Box<dyn FinalizePolicy>,
    configuration: Digest,
    old: BuildState,
    state: BuildState,
    escalated: bool,
    /// Registered inputs with the status computed at first registration.
    statuses: BTreeMap<PathBuf, ResourceStatus>,
    processed: BTreeSet<PathBuf>,
    processed_outputs: BTreeSet<PathBuf>,
    loose_outputs: BTreeSet<PathBuf>,
    carried_outputs: BTreeSet<PathBuf>,
    up_to_date: BTreeSet<PathBuf>,
    deleted: BTreeSet<PathBuf>,
    skip_execution: bool,
    closed: bool,
}

impl BuildContext {
    /// Open a context with the default digester, sink and policy.
    pub fn open(
        state_file: impl Into<PathBuf>,
        configuration: &Configuration,
    ) -> Result<Self, BuildError> {
        Self::builder(state_file)
            .configuration(configuration.clone())
            .build()
    }

    pub fn builder(state_file: impl Into<PathBuf>) -> ContextBuilder {
        ContextBuilder::new(state_file.into())
    }

    /// True when incremental state cannot be trusted and everything is rebuilt.
    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn state_file(&self) -> &Path {
        self.store.path()
    }

    fn ensure_open(&self) -> Result<(), BuildError> {
        if self.closed {
            Err(BuildError::closed())
        } else {
            Ok(())
        }
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Register an input and compute its status against the previous build.
    ///
    /// The status is computed once; registering the same input again returns it unchanged.
    pub fn register_input(&mut self, path: impl AsRef<Path>) -> Result<InputMetadata, BuildError> {
        self.ensure_open()?;
        let resource = normalize_resource(path.as_ref())?;

        if let Some(status) = self.statuses.get(&resource) {
            return Ok(InputMetadata {
                resource,
                status: *status,
            });
        }

        let digest = self
            .digester
            .digest(&resource)
            .map_err(|e| BuildError::from_io(&resource, e))?;
        let status = self.compute_input_status(&resource, digest)?;

        debug!(resource = %resource.display(), %status, "Registered input");
        self.state.put_resource(resource.clone(), digest);
        self.statuses.insert(resource.clone(), status);
        Ok(InputMetadata { resource, status })
    }

    /// Register every file under `basedir` matching the patterns.
    pub fn register_inputs<I, E>(
        &mut self,
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
        self.ensure_open()?;
        let matcher = FileMatcher::new(basedir, includes, excludes)?;
        let files = matcher.matches()?;
        debug!(basedir = %basedir.display(), matches = files.len(), "Enumerated inputs");
        files
            .into_iter()
            .map(|file| self.register_input(file))
            .collect()
    }

    /// Register matching files and process those that are not unmodified.
    pub fn register_and_process_inputs<I, E>(
        &mut self,
        basedir: &Path,
        includes: I,
        excludes: E,
    ) -> Result<Vec<Input>, BuildError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let registered = self.register_inputs(basedir, includes, excludes)?;
        self.process_changed(registered)
    }

    /// Register an explicit list of inputs and process those that are not unmodified.
    pub fn register_and_process<P>(
        &mut self,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<Vec<Input>, BuildError>
    where
        P: AsRef<Path>,
    {
        let registered = paths
            .into_iter()
            .map(|path| self.register_input(path))
            .collect::<Result<Vec<_>, _>>()?;
        self.process_changed(registered)
    }

    fn process_changed(&mut self, registered: Vec<InputMetadata>) -> Result<Vec<Input>, BuildError> {
        let mut inputs = Vec::new();
        for metadata in registered {
            if !metadata.status.is_unmodified() {
                inputs.push(self.process(&metadata)?);
            }
        }
        Ok(inputs)
    }

    fn compute_input_status(
        &self,
        resource: &Path,
        digest: Digest,
    ) -> Result<ResourceStatus, BuildError> {
        let old_digest = match self.old.digest(resource) {
            Some(old_digest) => old_digest,
            None => return Ok(ResourceStatus::New),
        };
        if self.escalated || old_digest != digest {
            return Ok(ResourceStatus::Modified);
        }

        if let Some(included) = self.old.included_inputs_of(resource) {
            for (path, old) in included {
                if self.current_digest(path)? != Some(*old) {
                    debug!(resource = %resource.display(), included = %path.display(), "Included input changed");
                    return Ok(ResourceStatus::Modified);
                }
            }
        }

        if let Some(outputs) = self.old.outputs_of(resource) {
            for output in outputs {
                if self.current_digest(output)? != self.old.digest(output) {
                    debug!(resource = %resource.display(), output = %output.display(), "Output changed");
                    return Ok(ResourceStatus::Modified);
                }
            }
        }

        Ok(ResourceStatus::Unmodified)
    }

    fn current_digest(&self, path: &Path) -> Result<Option<Digest>, BuildError> {
        digest_if_exists(self.digester.as_ref(), path).map_err(|e| BuildError::ResourceUnavailable {
            path: path.to_path_buf(),
            source: e,
        })
    }

    // ---------------------------------------------------------------------
    // Processing
    // ---------------------------------------------------------------------

    /// Mark a registered input as processed in this build.
    ///
    /// Fails with `InvalidState` if the file changed since it was registered.
    pub fn process(&mut self, metadata: &InputMetadata) -> Result<Input, BuildError> {
        self.ensure_open()?;
        let resource = &metadata.resource;
        if !self.statuses.contains_key(resource) {
            return Err(BuildError::InvalidArgument(format!(
                "{} is not a registered input",
                resource.display()
            )));
        }
        if self.processed.contains(resource) {
            return Ok(Input {
                resource: resource.clone(),
            });
        }

        let registered = self.state.digest(resource);
        let now = self
            .digester
            .digest(resource)
            .map_err(|e| BuildError::from_io(resource, e))?;
        if registered != Some(now) {
            return Err(BuildError::InvalidState(format!(
                "{} changed after registration",
                resource.display()
            )));
        }

        debug!(resource = %resource.display(), status = %metadata.status, "Processing input");
        self.processed.insert(resource.clone());
        Ok(Input {
            resource: resource.clone(),
        })
    }

    /// Record that `input` produced `path`.
    pub fn associate_output(
        &mut self,
        input: &Input,
        path: impl AsRef<Path>,
    ) -> Result<Output, BuildError> {
        self.ensure_open()?;
        self.ensure_processed(&input.resource)?;
        let output = normalize_resource(path.as_ref())?;
        if output == input.resource {
            return Err(BuildError::InvalidArgument(format!(
                "{} cannot be its own output",
                output.display()
            )));
        }
        self.policy.assert_association(&input.resource, &output)?;

        self.state.mark_output(output.clone());
        self.state.associate(&input.resource, &output);
        self.processed_outputs.insert(output.clone());
        debug!(input = %input.resource.display(), output = %output.display(), "Associated output");
        Ok(Output { resource: output })
    }

    /// Record that `input` read `path`; a later change of `path` makes `input` modified.
    pub fn associate_included_input(
        &mut self,
        input: &Input,
        path: impl AsRef<Path>,
    ) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.ensure_processed(&input.resource)?;
        let included = normalize_resource(path.as_ref())?;
        let digest = self
            .digester
            .digest(&included)
            .map_err(|e| BuildError::from_io(&included, e))?;
        self.state
            .add_included_input(&input.resource, included, digest);
        Ok(())
    }

    /// Register and process an output that has no producing input.
    pub fn process_output(&mut self, path: impl AsRef<Path>) -> Result<Output, BuildError> {
        self.ensure_open()?;
        let output = normalize_resource(path.as_ref())?;
        self.state.mark_output(output.clone());
        self.processed_outputs.insert(output.clone());
        self.loose_outputs.insert(output.clone());
        debug!(output = %output.display(), "Processing output");
        Ok(Output { resource: output })
    }

    /// Keep an output of the previous build that is not processed in this one.
    pub fn carry_over_output(&mut self, path: impl AsRef<Path>) -> Result<(), BuildError> {
        self.ensure_open()?;
        let output = normalize_resource(path.as_ref())?;
        if !self.old.is_output(&output) {
            return Err(BuildError::InvalidArgument(format!(
                "{} is not an output of the previous build",
                output.display()
            )));
        }
        self.carried_outputs.insert(output);
        Ok(())
    }

    fn ensure_processed(&self, input: &Path) -> Result<(), BuildError> {
        if self.processed.contains(input) {
            Ok(())
        } else {
            Err(BuildError::InvalidArgument(format!(
                "{} was not processed in this build",
                input.display()
            )))
        }
    }

    fn is_resource_processed(&self, resource: &Path) -> bool {
        self.processed.contains(resource) || self.processed_outputs.contains(resource)
    }

    // ---------------------------------------------------------------------
    // Messages and attributes
    // ---------------------------------------------------------------------

    /// Attach a message to a processed resource. Messages of a processed resource replace
    /// those of the previous build.
    pub fn add_message(
        &mut self,
        resource: &impl ProcessedResource,
        line: u32,
        column: u32,
        text: impl Into<String>,
        severity: Severity,
        cause: Option<String>,
    ) -> Result<(), BuildError> {
        self.ensure_open()?;
        let mut message = Message::new(line, column, text, severity);
        message.cause = cause;
        self.state.add_message(resource.resource(), message);
        Ok(())
    }

    /// Messages of `path`: this build's if it was processed, the previous build's otherwise.
    pub fn messages(&self, path: impl AsRef<Path>) -> Result<Option<Vec<Message>>, BuildError> {
        self.ensure_open()?;
        let resource = normalize_resource(path.as_ref())?;
        let state = if self.is_resource_processed(&resource) {
            &self.state
        } else {
            &self.old
        };
        Ok(state.messages(&resource).map(<[Message]>::to_vec))
    }

    /// Set an attribute and return the previous value: the one set earlier in this build,
    /// otherwise the one from the previous build.
    pub fn set_attribute<T>(
        &mut self,
        resource: &impl ProcessedResource,
        key: &str,
        value: &T,
    ) -> Result<Option<T>, BuildError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.ensure_open()?;
        let path = resource.resource();
        let encoded = serde_json::to_value(value).map_err(|e| BuildError::Attribute {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let previous = self
            .state
            .set_attribute(path, key, encoded)
            .or_else(|| {
                self.old
                    .attributes(path)
                    .and_then(|attributes| attributes.get(key))
                    .cloned()
            });
        previous.map(|value| decode_attribute(key, value)).transpose()
    }

    /// Read an attribute: this build's value if the resource was processed, the previous
    /// build's otherwise.
    pub fn get_attribute<T>(&self, path: impl AsRef<Path>, key: &str) -> Result<Option<T>, BuildError>
    where
        T: DeserializeOwned,
    {
        self.ensure_open()?;
        let resource = normalize_resource(path.as_ref())?;
        let state = if self.is_resource_processed(&resource) {
            &self.state
        } else {
            &self.old
        };
        state
            .attributes(&resource)
            .and_then(|attributes| attributes.get(key))
            .cloned()
            .map(|value| decode_attribute(key, value))
            .transpose()
    }

    // ---------------------------------------------------------------------
    // Capability/requirement index
    // ---------------------------------------------------------------------

    pub fn add_requirement(
        &mut self,
        input: &Input,
        qualifier: &str,
        local_name: &str,
    ) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.ensure_processed(&input.resource)?;
        self.state
            .add_requirement(QualifiedName::new(qualifier, local_name), &input.resource);
        Ok(())
    }

    pub fn add_capability(
        &mut self,
        input: &Input,
        qualifier: &str,
        local_name: &str,
    ) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.ensure_processed(&input.resource)?;
        self.state
            .add_capability(QualifiedName::new(qualifier, local_name), &input.resource);
        Ok(())
    }

    /// Inputs of the previous build that required the capability and are registered in
    /// this build.
    pub fn get_dependent_inputs(
        &self,
        qualifier: &str,
        local_name: &str,
    ) -> Result<Vec<InputMetadata>, BuildError> {
        self.ensure_open()?;
        let name = QualifiedName::new(qualifier, local_name);
        let dependents = self
            .old
            .requirers(&name)
            .into_iter()
            .flatten()
            .filter_map(|input| {
                self.statuses.get(input).map(|status| InputMetadata {
                    resource: input.clone(),
                    status: *status,
                })
            })
            .collect();
        Ok(dependents)
    }

    /// Inputs providing the capability: declared in this build, or carried from the
    /// previous build by registered inputs that were not processed.
    pub fn capability_providers(
        &self,
        qualifier: &str,
        local_name: &str,
    ) -> Result<Vec<PathBuf>, BuildError> {
        self.ensure_open()?;
        let name = QualifiedName::new(qualifier, local_name);
        let mut providers: BTreeSet<PathBuf> =
            self.state.providers(&name).cloned().unwrap_or_default();
        for input in self.old.providers(&name).into_iter().flatten() {
            if self.statuses.contains_key(input) && !self.processed.contains(input) {
                providers.insert(input.clone());
            }
        }
        Ok(providers.into_iter().collect())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn input_status(&self, path: impl AsRef<Path>) -> Result<Option<ResourceStatus>, BuildError> {
        self.ensure_open()?;
        let resource = normalize_resource(path.as_ref())?;
        Ok(self.statuses.get(&resource).copied())
    }

    /// Status of an output relative to the previous build.
    pub fn output_status(&self, path: impl AsRef<Path>) -> Result<ResourceStatus, BuildError> {
        self.ensure_open()?;
        let output = normalize_resource(path.as_ref())?;
        let current = self.current_digest(&output)?;
        let old = match self.old.digest(&output) {
            Some(old) => old,
            None => return Ok(ResourceStatus::New),
        };
        let current = match current {
            Some(current) => current,
            None => return Ok(ResourceStatus::Removed),
        };
        if self.escalated || current != old {
            return Ok(ResourceStatus::Modified);
        }

        let mut producers: BTreeSet<PathBuf> =
            self.state.inputs_of(&output).cloned().unwrap_or_default();
        for input in self.old.inputs_of(&output).into_iter().flatten() {
            if self.statuses.contains_key(input) && !self.processed.contains(input) {
                producers.insert(input.clone());
            }
        }
        let old_producers = self.old.inputs_of(&output).cloned().unwrap_or_default();
        if producers != old_producers {
            return Ok(ResourceStatus::Modified);
        }
        Ok(ResourceStatus::Unmodified)
    }

    /// Registered inputs, followed by inputs of the previous build that were not
    /// registered, reported as removed.
    pub fn registered_inputs(&self) -> Result<Vec<InputMetadata>, BuildError> {
        self.ensure_open()?;
        let mut inputs: Vec<InputMetadata> = self
            .statuses
            .iter()
            .map(|(resource, status)| InputMetadata {
                resource: resource.clone(),
                status: *status,
            })
            .collect();
        inputs.extend(self.removed_inputs()?.into_iter().map(|resource| InputMetadata {
            resource,
            status: ResourceStatus::Removed,
        }));
        Ok(inputs)
    }

    pub fn removed_inputs(&self) -> Result<Vec<PathBuf>, BuildError> {
        self.ensure_open()?;
        Ok(self
            .old
            .inputs()
            .filter(|input| !self.statuses.contains_key(*input))
            .cloned()
            .collect())
    }

    /// Outputs of this build: those processed so far, old outputs of registered inputs
    /// that were not processed, and old loose outputs that may still be carried over.
    pub fn processed_outputs(&self) -> Result<Vec<PathBuf>, BuildError> {
        self.ensure_open()?;
        let mut outputs = self.processed_outputs.clone();
        for output in self.old.outputs() {
            let carried = self.old.inputs_of(output).map_or(false, |inputs| {
                inputs
                    .iter()
                    .any(|input| self.statuses.contains_key(input) && !self.processed.contains(input))
            });
            if carried {
                outputs.insert(output.clone());
            }
        }
        outputs.extend(self.old_loose_outputs().cloned());
        Ok(outputs.into_iter().collect())
    }

    /// Outputs of `input`: this build's associations if it was processed, the previous
    /// build's otherwise.
    pub fn associated_outputs(&self, input: &InputMetadata) -> Result<Vec<PathBuf>, BuildError> {
        self.ensure_open()?;
        let state = if self.processed.contains(&input.resource) {
            &self.state
        } else {
            &self.old
        };
        Ok(state
            .outputs_of(&input.resource)
            .map(|outputs| outputs.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Whether any work is needed in this build.
    pub fn is_processing_required(&self) -> Result<bool, BuildError> {
        self.ensure_open()?;
        if self.escalated {
            return Ok(true);
        }
        if self.statuses.values().any(|status| !status.is_unmodified()) {
            return Ok(true);
        }
        if self.old.inputs().any(|input| !self.statuses.contains_key(input)) {
            return Ok(true);
        }
        if !self.policy.tracks_outputs() {
            return Ok(false);
        }
        // A processed loose output forces a rebuild even when every input is unmodified.
        if !self.loose_outputs.is_empty() || !self.processed.is_empty() {
            return Ok(true);
        }
        for output in self.old_loose_outputs() {
            if self.current_digest(output)? != self.old.digest(output) {
                debug!(output = %output.display(), "Loose output changed");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Outputs of the previous build that no input produced.
    fn old_loose_outputs(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        self.old.outputs().filter(|output| {
            self.old
                .inputs_of(output)
                .map_or(true, |inputs| inputs.is_empty())
        })
    }

    // ---------------------------------------------------------------------
    // Stale outputs
    // ---------------------------------------------------------------------

    /// Old outputs whose producers are all gone from this build or were processed
    /// without associating them again.
    fn stale_candidates(&self, only_input: Option<&Path>) -> Vec<PathBuf> {
        let outputs: Vec<&PathBuf> = match only_input {
            Some(input) => self.old.outputs_of(input).into_iter().flatten().collect(),
            None => self.old.outputs().collect(),
        };

        outputs
            .into_iter()
            .filter(|output| {
                if self.state.is_output(output) || self.loose_outputs.contains(*output) {
                    return false;
                }
                match self.old.inputs_of(output) {
                    Some(producers) if !producers.is_empty() => producers.iter().all(|input| {
                        !self.statuses.contains_key(input) || self.processed.contains(input)
                    }),
                    _ => false,
                }
            })
            .cloned()
            .collect()
    }

    /// Find stale outputs of the previous build.
    ///
    /// With `eager`, deletes them now and returns the deleted paths, each at most once per
    /// build. Otherwise returns nothing and leaves removal to commit.
    pub fn delete_stale_outputs(&mut self, eager: bool) -> Result<Vec<PathBuf>, BuildError> {
        self.ensure_open()?;
        let candidates = self.stale_candidates(None);
        if !eager {
            debug!(candidates = candidates.len(), "Deferring stale output removal to commit");
            return Ok(Vec::new());
        }
        self.delete_candidates(candidates)
    }

    /// Delete stale outputs of one input.
    pub fn delete_stale_outputs_of(
        &mut self,
        input: &InputMetadata,
    ) -> Result<Vec<PathBuf>, BuildError> {
        self.ensure_open()?;
        let candidates = self.stale_candidates(Some(&input.resource));
        self.delete_candidates(candidates)
    }

    fn delete_candidates(&mut self, candidates: Vec<PathBuf>) -> Result<Vec<PathBuf>, BuildError> {
        let mut deleted = Vec::new();
        for output in candidates {
            if policy::delete_output_file(&output, &mut self.deleted)? {
                deleted.push(output);
            }
        }
        Ok(deleted)
    }

    // ---------------------------------------------------------------------
    // Commit
    // ---------------------------------------------------------------------

    /// Keep the previous build's state unchanged at commit.
    pub fn mark_skip_execution(&mut self) -> Result<(), BuildError> {
        self.ensure_open()?;
        if !self.processed.is_empty() || !self.processed_outputs.is_empty() {
            return Err(BuildError::InvalidState(
                "cannot skip execution after resources were processed".to_string(),
            ));
        }
        self.skip_execution = true;
        Ok(())
    }

    /// Reconcile the build with the previous one, persist the result and close.
    #[instrument(skip(self), fields(snapshot = %self.store.path().display(), policy = self.policy.name()))]
    pub fn commit(&mut self) -> Result<(), BuildError> {
        self.ensure_open()?;

        let next = if self.skip_execution {
            debug!("Execution skipped, keeping previous state");
            self.old.clone()
        } else {
            let mut next = self.reconcile()?;
            next.configuration = Some(self.configuration);
            next
        };

        for (resource, messages) in &next.messages {
            for message in messages {
                self.sink.message(resource, message);
            }
        }

        self.store.save(&next)?;
        info!(
            resources = next.resources.len(),
            outputs = next.outputs.len(),
            processed = self.processed.len(),
            deleted = self.deleted.len(),
            "Committed build state"
        );
        self.state = next;
        self.closed = true;
        Ok(())
    }

    fn reconcile(&mut self) -> Result<BuildState, BuildError> {
        let mut next = self.state.clone();

        for (input, status) in &self.statuses {
            if self.processed.contains(input) {
                continue;
            }
            let now = self
                .digester
                .digest(input)
                .map_err(|e| BuildError::from_io(input, e))?;
            if next.digest(input) != Some(now) {
                return Err(BuildError::InvalidState(format!(
                    "{} changed after registration",
                    input.display()
                )));
            }
            if !status.is_unmodified() {
                // Keep the pending change visible to the next build.
                match self.old.digest(input) {
                    Some(old) => next.put_resource(input.clone(), old),
                    None => {
                        next.forget(input);
                        continue;
                    }
                }
            }
            next.carry_metadata(&self.old, input);
            next.carry_input_links(&self.old, input);
        }

        for output in &self.processed_outputs {
            let digest = self
                .digester
                .digest(output)
                .map_err(|e| BuildError::ResourceUnavailable {
                    path: output.clone(),
                    source: e,
                })?;
            next.put_resource(output.clone(), digest);
            next.mark_output(output.clone());
        }

        let mut reconciliation = Reconciliation {
            old: &self.old,
            state: &mut next,
            registered: &self.statuses,
            processed: &self.processed,
            processed_outputs: &self.processed_outputs,
            carried_outputs: &self.carried_outputs,
            up_to_date: &self.up_to_date,
            deleted: &mut self.deleted,
        };
        self.policy.finalize(&mut reconciliation)?;

        next.prune_dangling_edges();
        Ok(next)
    }

    // ---------------------------------------------------------------------
    // Aggregator support
    // ---------------------------------------------------------------------

    pub(crate) fn old_state(&self) -> &BuildState {
        &self.old
    }

    pub(crate) fn current_state(&self) -> &BuildState {
        &self.state
    }

    pub(crate) fn is_processed(&self, input: &Path) -> bool {
        self.processed.contains(input)
    }

    pub(crate) fn registered_status(&self, input: &Path) -> Option<ResourceStatus> {
        self.statuses.get(input).copied()
    }

    /// Link a registered input to an output without requiring the input to be processed.
    pub(crate) fn link(&mut self, input: &Path, output: &Path) {
        self.state.associate(input, output);
    }

    /// Whether the output on disk differs from the previous build's record.
    pub(crate) fn output_changed_on_disk(&self, output: &Path) -> Result<bool, BuildError> {
        let old = self.old.digest(output);
        Ok(old.is_none() || self.current_digest(output)? != old)
    }

    /// Keep an output of the previous build without reprocessing it.
    pub(crate) fn mark_up_to_date(&mut self, output: &Path) {
        if let Some(digest) = self.old.digest(output) {
            self.state.put_resource(output.to_path_buf(), digest);
        }
        self.state.mark_output(output.to_path_buf());
        self.up_to_date.insert(output.to_path_buf());
    }
}

fn decode_attribute<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<T, BuildError> {
    serde_json::from_value(value).map_err(|e| BuildError::Attribute {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
