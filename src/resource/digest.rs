//! Resource fingerprints using BLAKE3
//!
//! A [`Digester`] turns a resource into a comparable [`Digest`]. Two implementations are
//! provided: full content hashing and the cheaper modification-time plus length check.

use crate::types::Digest;
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Computes the fingerprint of a resource.
///
/// Implementations must fail for resources that do not exist or are not regular files.
pub trait Digester: Send + Sync {
    fn digest(&self, path: &Path) -> io::Result<Digest>;
}

/// Digest of the file bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDigester;

impl Digester for ContentDigester {
    fn digest(&self, path: &Path) -> io::Result<Digest> {
        ensure_file(path)?;
        let content = fs::read(path)?;
        Ok(compute_content_digest(&content))
    }
}

/// Digest of the modification time and length.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataDigester;

impl Digester for MetadataDigester {
    fn digest(&self, path: &Path) -> io::Result<Digest> {
        let metadata = ensure_file(path)?;
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        let mut hasher = Hasher::new();
        hasher.update(b"metadata");
        hasher.update(&modified.to_be_bytes());
        hasher.update(&metadata.len().to_be_bytes());
        Ok(Digest::from_hash(*hasher.finalize().as_bytes()))
    }
}

/// Which built-in digester a context uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestMode {
    #[default]
    Content,
    Metadata,
}

impl DigestMode {
    pub fn digester(self) -> Box<dyn Digester> {
        match self {
            DigestMode::Content => Box::new(ContentDigester),
            DigestMode::Metadata => Box::new(MetadataDigester),
        }
    }
}

/// Compute content digest for file bytes
pub fn compute_content_digest(content: &[u8]) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(b"content");
    hasher.update(content);
    Digest::from_hash(*hasher.finalize().as_bytes())
}

/// Digest a resource, treating absence as `None`.
pub(crate) fn digest_if_exists(digester: &dyn Digester, path: &Path) -> io::Result<Option<Digest>> {
    match digester.digest(path) {
        Ok(digest) => Ok(Some(digest)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(None),
        Err(e) => Err(e),
    }
}

fn ensure_file(path: &Path) -> io::Result<fs::Metadata> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        ));
    }
    Ok(metadata)
}
