//! Resource identity, fingerprints and enumeration

pub mod digest;
pub mod path;
pub mod pattern;
pub mod walker;

pub use digest::{ContentDigester, DigestMode, Digester, MetadataDigester};
pub use path::normalize_resource;
pub use pattern::{AntPattern, PatternSet};
pub use walker::FileMatcher;
