//! Build state: the per-generation record of resources, associations and metadata
//!
//! A context holds two of these: the *old* state loaded from the previous build's
//! snapshot, never mutated, and the *current* state filled in while the build runs and
//! persisted at commit.

pub mod persistence;

use crate::message::Message;
use crate::types::{Digest, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

pub use persistence::{LoadedSnapshot, SnapshotStore};

/// Key of the capability/requirement index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub qualifier: String,
    pub local_name: String,
}

impl QualifiedName {
    pub fn new(qualifier: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            local_name: local_name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.qualifier, self.local_name)
    }
}

/// One build generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildState {
    pub(crate) resources: BTreeMap<PathBuf, Digest>,
    pub(crate) outputs: BTreeSet<PathBuf>,
    pub(crate) attributes: BTreeMap<PathBuf, Metadata>,
    pub(crate) messages: BTreeMap<PathBuf, Vec<Message>>,
    pub(crate) input_outputs: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    pub(crate) output_inputs: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    pub(crate) included_inputs: BTreeMap<PathBuf, BTreeMap<PathBuf, Digest>>,
    pub(crate) requirements: BTreeMap<QualifiedName, BTreeSet<PathBuf>>,
    pub(crate) capabilities: BTreeMap<QualifiedName, BTreeSet<PathBuf>>,
    pub(crate) configuration: Option<Digest>,
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }

    pub fn digest(&self, resource: &Path) -> Option<Digest> {
        self.resources.get(resource).copied()
    }

    pub fn contains(&self, resource: &Path) -> bool {
        self.resources.contains_key(resource)
    }

    pub fn is_output(&self, resource: &Path) -> bool {
        self.outputs.contains(resource)
    }

    /// Tracked resources that are not outputs.
    pub fn inputs(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        self.resources
            .keys()
            .filter(move |path| !self.outputs.contains(*path))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        self.outputs.iter()
    }

    pub fn outputs_of(&self, input: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.input_outputs.get(input)
    }

    pub fn inputs_of(&self, output: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.output_inputs.get(output)
    }

    pub fn included_inputs_of(&self, input: &Path) -> Option<&BTreeMap<PathBuf, Digest>> {
        self.included_inputs.get(input)
    }

    pub fn attributes(&self, resource: &Path) -> Option<&Metadata> {
        self.attributes.get(resource)
    }

    pub fn messages(&self, resource: &Path) -> Option<&[Message]> {
        self.messages.get(resource).map(Vec::as_slice)
    }

    pub fn configuration(&self) -> Option<Digest> {
        self.configuration
    }

    pub(crate) fn put_resource(&mut self, resource: PathBuf, digest: Digest) {
        self.resources.insert(resource, digest);
    }

    pub(crate) fn mark_output(&mut self, output: PathBuf) {
        self.outputs.insert(output);
    }

    /// Add an edge to both halves of the association graph.
    pub(crate) fn associate(&mut self, input: &Path, output: &Path) {
        self.input_outputs
            .entry(input.to_path_buf())
            .or_default()
            .insert(output.to_path_buf());
        self.output_inputs
            .entry(output.to_path_buf())
            .or_default()
            .insert(input.to_path_buf());
    }

    pub(crate) fn set_attribute(
        &mut self,
        resource: &Path,
        key: &str,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.attributes
            .entry(resource.to_path_buf())
            .or_default()
            .insert(key.to_string(), value)
    }

    pub(crate) fn add_message(&mut self, resource: &Path, message: Message) {
        self.messages
            .entry(resource.to_path_buf())
            .or_default()
            .push(message);
    }

    pub(crate) fn add_included_input(&mut self, input: &Path, included: PathBuf, digest: Digest) {
        self.included_inputs
            .entry(input.to_path_buf())
            .or_default()
            .insert(included, digest);
    }

    pub(crate) fn add_requirement(&mut self, name: QualifiedName, input: &Path) {
        self.requirements
            .entry(name)
            .or_default()
            .insert(input.to_path_buf());
    }

    pub(crate) fn add_capability(&mut self, name: QualifiedName, input: &Path) {
        self.capabilities
            .entry(name)
            .or_default()
            .insert(input.to_path_buf());
    }

    pub(crate) fn requirers(&self, name: &QualifiedName) -> Option<&BTreeSet<PathBuf>> {
        self.requirements.get(name)
    }

    pub(crate) fn providers(&self, name: &QualifiedName) -> Option<&BTreeSet<PathBuf>> {
        self.capabilities.get(name)
    }

    /// Copy attributes and messages of `resource` from `old`.
    pub(crate) fn carry_metadata(&mut self, old: &BuildState, resource: &Path) {
        if let Some(attributes) = old.attributes.get(resource) {
            self.attributes
                .insert(resource.to_path_buf(), attributes.clone());
        }
        if let Some(messages) = old.messages.get(resource) {
            self.messages.insert(resource.to_path_buf(), messages.clone());
        }
    }

    /// Copy the index entries and read dependencies declared by `input` in `old`.
    pub(crate) fn carry_input_links(&mut self, old: &BuildState, input: &Path) {
        if let Some(included) = old.included_inputs.get(input) {
            self.included_inputs
                .insert(input.to_path_buf(), included.clone());
        }
        for (name, inputs) in &old.requirements {
            if inputs.contains(input) {
                self.add_requirement(name.clone(), input);
            }
        }
        for (name, inputs) in &old.capabilities {
            if inputs.contains(input) {
                self.add_capability(name.clone(), input);
            }
        }
    }

    /// Copy an old output with its digest and metadata, restoring the edges from
    /// producers accepted by `keep_edge`.
    pub(crate) fn carry_output<F>(&mut self, old: &BuildState, output: &Path, keep_edge: F)
    where
        F: Fn(&Path) -> bool,
    {
        if let Some(digest) = old.digest(output) {
            self.put_resource(output.to_path_buf(), digest);
        }
        self.mark_output(output.to_path_buf());
        self.carry_metadata(old, output);
        if let Some(inputs) = old.inputs_of(output) {
            for input in inputs {
                if keep_edge(input.as_path()) {
                    self.associate(input, output);
                }
            }
        }
    }

    /// Remove every trace of `resource`.
    pub(crate) fn forget(&mut self, resource: &Path) {
        self.resources.remove(resource);
        self.outputs.remove(resource);
        self.attributes.remove(resource);
        self.messages.remove(resource);
        self.included_inputs.remove(resource);
        if let Some(outputs) = self.input_outputs.remove(resource) {
            for output in outputs {
                if let Some(inputs) = self.output_inputs.get_mut(&output) {
                    inputs.remove(resource);
                }
            }
        }
        if let Some(inputs) = self.output_inputs.remove(resource) {
            for input in inputs {
                if let Some(outputs) = self.input_outputs.get_mut(&input) {
                    outputs.remove(resource);
                }
            }
        }
        for inputs in self.requirements.values_mut() {
            inputs.remove(resource);
        }
        for inputs in self.capabilities.values_mut() {
            inputs.remove(resource);
        }
        self.requirements.retain(|_, inputs| !inputs.is_empty());
        self.capabilities.retain(|_, inputs| !inputs.is_empty());
    }

    /// Drop edges whose input is untracked or whose output is not an output.
    pub(crate) fn prune_dangling_edges(&mut self) {
        let resources = &self.resources;
        let outputs = &self.outputs;
        self.input_outputs.retain(|input, targets| {
            targets.retain(|output| outputs.contains(output));
            resources.contains_key(input) && !targets.is_empty()
        });
        self.rebuild_reverse_index();
    }

    /// Rebuild `output_inputs` from `input_outputs`.
    pub(crate) fn rebuild_reverse_index(&mut self) {
        self.output_inputs.clear();
        for (input, outputs) in &self.input_outputs {
            for output in outputs {
                self.output_inputs
                    .entry(output.clone())
                    .or_default()
                    .insert(input.clone());
            }
        }
    }
}
