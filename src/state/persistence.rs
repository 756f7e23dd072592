//! Durable snapshot of a build state
//!
//! File layout: 4-byte magic, little-endian `u32` format version, 32-byte BLAKE3 checksum
//! of the payload, then the bincode payload. Attribute values are stored as independent
//! JSON documents inside the payload so one unreadable value is detected on its own.
//!
//! Loading never fails: anything short of a fully valid snapshot yields an empty state
//! flagged as escalated.

use crate::error::StorageError;
use crate::message::Message;
use crate::state::{BuildState, QualifiedName};
use crate::types::Digest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SNAPSHOT_MAGIC: &[u8; 4] = b"BAVS";
const SNAPSHOT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 32;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPayload {
    resources: BTreeMap<PathBuf, Digest>,
    outputs: BTreeSet<PathBuf>,
    attributes: BTreeMap<PathBuf, BTreeMap<String, String>>,
    messages: BTreeMap<PathBuf, Vec<Message>>,
    input_outputs: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    included_inputs: BTreeMap<PathBuf, BTreeMap<PathBuf, Digest>>,
    requirements: BTreeMap<QualifiedName, BTreeSet<PathBuf>>,
    capabilities: BTreeMap<QualifiedName, BTreeSet<PathBuf>>,
    configuration: Option<Digest>,
}

/// Result of loading a snapshot.
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub state: BuildState,
    /// True when the snapshot was missing or unreadable.
    pub escalated: bool,
}

/// Reads and atomically replaces the snapshot file of one build execution.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous build's state.
    pub fn load(&self) -> LoadedSnapshot {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(snapshot = %self.path.display(), "No previous build state");
                return LoadedSnapshot {
                    state: BuildState::new(),
                    escalated: true,
                };
            }
            Err(e) => {
                warn!(snapshot = %self.path.display(), error = %e, "Build state unreadable, escalating");
                return LoadedSnapshot {
                    state: BuildState::new(),
                    escalated: true,
                };
            }
        };

        match decode(&self.path, &bytes) {
            Ok(state) => {
                debug!(
                    snapshot = %self.path.display(),
                    resources = state.resources.len(),
                    outputs = state.outputs.len(),
                    "Loaded build state"
                );
                LoadedSnapshot {
                    state,
                    escalated: false,
                }
            }
            Err(e) => {
                warn!(snapshot = %self.path.display(), error = %e, "Build state corrupt, escalating");
                LoadedSnapshot {
                    state: BuildState::new(),
                    escalated: true,
                }
            }
        }
    }

    /// Persist `state`, replacing any previous snapshot atomically.
    pub fn save(&self, state: &BuildState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let bytes = encode(state)?;

        let temp_path = temp_path_for(&self.path);
        fs::write(&temp_path, &bytes).map_err(|e| StorageError::Io {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::Io {
                path: self.path.clone(),
                source: e,
            }
        })?;

        debug!(
            snapshot = %self.path.display(),
            bytes = bytes.len(),
            "Saved build state"
        );
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn encode(state: &BuildState) -> Result<Vec<u8>, StorageError> {
    let mut attributes = BTreeMap::new();
    for (resource, values) in &state.attributes {
        let mut encoded = BTreeMap::new();
        for (key, value) in values {
            let text = serde_json::to_string(value).map_err(|e| {
                StorageError::Serialization(format!("attribute '{}' of {:?}: {}", key, resource, e))
            })?;
            encoded.insert(key.clone(), text);
        }
        attributes.insert(resource.clone(), encoded);
    }

    let payload = SnapshotPayload {
        resources: state.resources.clone(),
        outputs: state.outputs.clone(),
        attributes,
        messages: state.messages.clone(),
        input_outputs: state.input_outputs.clone(),
        included_inputs: state.included_inputs.clone(),
        requirements: state.requirements.clone(),
        capabilities: state.capabilities.clone(),
        configuration: state.configuration,
    };
    let payload = bincode::serialize(&payload)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(blake3::hash(&payload).as_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode(path: &Path, bytes: &[u8]) -> Result<BuildState, StorageError> {
    if bytes.len() < HEADER_LEN {
        return Err(StorageError::InvalidHeader {
            path: path.to_path_buf(),
            reason: format!("truncated ({} bytes)", bytes.len()),
        });
    }
    if &bytes[0..4] != SNAPSHOT_MAGIC {
        return Err(StorageError::InvalidHeader {
            path: path.to_path_buf(),
            reason: "bad magic".to_string(),
        });
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..8]);
    let version = u32::from_le_bytes(version);
    if version != SNAPSHOT_VERSION {
        return Err(StorageError::VersionMismatch {
            expected: SNAPSHOT_VERSION,
            actual: version,
        });
    }

    let expected = &bytes[8..HEADER_LEN];
    let payload = &bytes[HEADER_LEN..];
    let actual = blake3::hash(payload);
    if expected != actual.as_bytes() {
        return Err(StorageError::ChecksumMismatch {
            expected: hex::encode(expected),
            actual: actual.to_hex().to_string(),
        });
    }

    let payload: SnapshotPayload = bincode::deserialize(payload)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut attributes = BTreeMap::new();
    for (resource, values) in payload.attributes {
        let mut decoded = BTreeMap::new();
        for (key, text) in values {
            let value = serde_json::from_str(&text).map_err(|e| {
                StorageError::Serialization(format!(
                    "attribute '{}' of {:?}: {}",
                    key, resource, e
                ))
            })?;
            decoded.insert(key, value);
        }
        attributes.insert(resource, decoded);
    }

    let mut state = BuildState {
        resources: payload.resources,
        outputs: payload.outputs,
        attributes,
        messages: payload.messages,
        input_outputs: payload.input_outputs,
        output_inputs: BTreeMap::new(),
        included_inputs: payload.included_inputs,
        requirements: payload.requirements,
        capabilities: payload.capabilities,
        configuration: payload.configuration,
    };
    state.rebuild_reverse_index();
    Ok(state)
}
