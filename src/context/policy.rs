//! Finalize policies: how old outputs are reconciled with the current build at commit

use crate::error::BuildError;
use crate::state::BuildState;
use crate::types::ResourceStatus;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Variant-specific commit behavior of a build context.
pub trait FinalizePolicy: Send {
    /// Short name used in log events.
    fn name(&self) -> &'static str;

    /// Whether this variant accepts input/output associations.
    fn assert_association(&self, input: &Path, output: &Path) -> Result<(), BuildError>;

    /// Whether processed resources and changed loose outputs make processing required,
    /// in addition to input changes.
    fn tracks_outputs(&self) -> bool {
        true
    }

    /// Carry over or delete old outputs. Runs once, during commit, after the current
    /// state holds every processed input and output.
    fn finalize(&self, reconciliation: &mut Reconciliation<'_>) -> Result<(), BuildError>;
}

/// View of both generations handed to [`FinalizePolicy::finalize`].
pub struct Reconciliation<'a> {
    pub(crate) old: &'a BuildState,
    pub(crate) state: &'a mut BuildState,
    pub(crate) registered: &'a BTreeMap<PathBuf, ResourceStatus>,
    pub(crate) processed: &'a BTreeSet<PathBuf>,
    pub(crate) processed_outputs: &'a BTreeSet<PathBuf>,
    pub(crate) carried_outputs: &'a BTreeSet<PathBuf>,
    pub(crate) up_to_date: &'a BTreeSet<PathBuf>,
    pub(crate) deleted: &'a mut BTreeSet<PathBuf>,
}

impl<'a> Reconciliation<'a> {
    pub fn old(&self) -> &BuildState {
        self.old
    }

    pub fn state(&self) -> &BuildState {
        self.state
    }

    pub fn is_registered(&self, input: &Path) -> bool {
        self.registered.contains_key(input)
    }

    pub fn is_processed(&self, input: &Path) -> bool {
        self.processed.contains(input)
    }

    pub fn is_output_processed(&self, output: &Path) -> bool {
        self.processed_outputs.contains(output)
    }

    pub fn is_carried(&self, output: &Path) -> bool {
        self.carried_outputs.contains(output)
    }

    pub fn is_up_to_date(&self, output: &Path) -> bool {
        self.up_to_date.contains(output)
    }

    pub fn anything_processed(&self) -> bool {
        !self.processed.is_empty() || !self.processed_outputs.is_empty()
    }

    /// Keep `output` from the old build, with edges from inputs that were registered but
    /// not processed.
    pub fn carry_output(&mut self, output: &Path) {
        let registered = self.registered;
        let processed = self.processed;
        self.state.carry_output(self.old, output, |input| {
            registered.contains_key(input) && !processed.contains(input)
        });
    }

    /// Copy an old resource verbatim, including its output flag.
    pub fn carry_resource(&mut self, resource: &Path) {
        if let Some(digest) = self.old.digest(resource) {
            self.state.put_resource(resource.to_path_buf(), digest);
        }
        if self.old.is_output(resource) {
            self.state.mark_output(resource.to_path_buf());
        }
        self.state.carry_metadata(self.old, resource);
    }

    pub fn carry_metadata(&mut self, resource: &Path) {
        self.state.carry_metadata(self.old, resource);
    }

    /// Delete an old output from disk and from the current state.
    pub fn delete_output(&mut self, output: &Path) -> Result<(), BuildError> {
        delete_output_file(output, self.deleted)?;
        self.state.forget(output);
        Ok(())
    }
}

/// Remove `path` unless it was already deleted this build. Returns whether this call
/// was the first to delete it.
pub(crate) fn delete_output_file(
    path: &Path,
    deleted: &mut BTreeSet<PathBuf>,
) -> Result<bool, BuildError> {
    if deleted.contains(path) {
        return Ok(false);
    }
    match fs::remove_file(path) {
        Ok(()) => info!(output = %path.display(), "Deleted stale output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(BuildError::ResourceUnavailable {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
    deleted.insert(path.to_path_buf());
    Ok(true)
}

/// Full association tracking.
///
/// Old outputs of inputs that were registered but not processed survive with their edges.
/// Explicitly carried loose outputs survive. Every other old output that is not an output
/// of the current build is deleted.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPolicy;

impl FinalizePolicy for StandardPolicy {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn assert_association(&self, _input: &Path, _output: &Path) -> Result<(), BuildError> {
        Ok(())
    }

    fn finalize(&self, rec: &mut Reconciliation<'_>) -> Result<(), BuildError> {
        let old_outputs: Vec<PathBuf> = rec.old.outputs().cloned().collect();
        for output in old_outputs {
            if rec.state.is_output(&output) {
                continue;
            }
            if rec.is_carried(&output) {
                rec.carry_output(&output);
                continue;
            }
            let pending_producer = rec.old.inputs_of(&output).map_or(false, |inputs| {
                inputs
                    .iter()
                    .any(|input| rec.is_registered(input) && !rec.is_processed(input))
            });
            if pending_producer {
                rec.carry_output(&output);
            } else {
                rec.delete_output(&output)?;
            }
        }
        Ok(())
    }
}

/// No association tracking: either everything is rebuilt or nothing is.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPolicy;

impl FinalizePolicy for BasicPolicy {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn assert_association(&self, input: &Path, output: &Path) -> Result<(), BuildError> {
        Err(BuildError::InvalidState(format!(
            "basic build context does not track associations ({} -> {})",
            input.display(),
            output.display()
        )))
    }

    fn tracks_outputs(&self) -> bool {
        false
    }

    fn finalize(&self, rec: &mut Reconciliation<'_>) -> Result<(), BuildError> {
        if rec.anything_processed() {
            let old_outputs: Vec<PathBuf> = rec.old.outputs().cloned().collect();
            for output in old_outputs {
                if !rec.state.is_output(&output) {
                    rec.delete_output(&output)?;
                }
            }
        } else {
            let old_resources: Vec<PathBuf> = rec.old.resources.keys().cloned().collect();
            for resource in old_resources {
                rec.carry_resource(&resource);
            }
        }
        Ok(())
    }
}
