//! Core value types shared across the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw 32-byte BLAKE3 hash.
pub type Hash = [u8; 32];

/// Metadata map attached to resources and merged into aggregates.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Comparable fingerprint of a resource's content or state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(Hash);

impl Digest {
    pub fn from_hash(hash: Hash) -> Self {
        Digest(hash)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Digest of arbitrary bytes.
    pub fn of(data: &[u8]) -> Self {
        Digest(*blake3::hash(data).as_bytes())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &hex::encode(self.0)[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Status of a resource relative to the previous build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceStatus {
    /// No entry in the previous build.
    New,
    /// Changed since the previous build.
    Modified,
    /// Unchanged, and nothing it depends on changed.
    Unmodified,
    /// Known to the previous build but gone now.
    Removed,
}

impl ResourceStatus {
    pub fn is_unmodified(self) -> bool {
        self == ResourceStatus::Unmodified
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::New => "new",
            ResourceStatus::Modified => "modified",
            ResourceStatus::Unmodified => "unmodified",
            ResourceStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}
