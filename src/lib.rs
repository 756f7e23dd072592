//! Buildavoid: Incremental Build Avoidance
//!
//! Tracks which inputs changed between builds, which outputs each input produced, and
//! removes outputs that are no longer produced. State is persisted as a snapshot per
//! build execution and reconciled at commit.

pub mod aggregator;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod message;
pub mod resource;
pub mod state;
pub mod types;

pub use aggregator::{AggregateOutput, AggregatorBuildContext};
pub use config::{ConfigLoader, Configuration, EngineSettings};
pub use context::{BuildContext, ContextBuilder, Input, InputMetadata, Output, ProcessedResource};
pub use error::BuildError;
pub use message::{Message, MessageSink, Severity};
pub use types::{Digest, Metadata, ResourceStatus};
