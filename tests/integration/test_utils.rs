//! Shared test utilities for integration tests
//!
//! A [`Workspace`] is a temporary directory holding inputs, outputs and the snapshot of
//! one build execution. Each `open*` call starts a new build against that snapshot.

use buildavoid::message::RecordingSink;
use buildavoid::{AggregatorBuildContext, BuildContext, Configuration};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Workspace {
    _dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        Self { _dir: dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Write a file, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).unwrap();
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn state_file(&self) -> PathBuf {
        self.path(".buildavoid/state/test.buildstate")
    }

    pub fn open(&self) -> BuildContext {
        self.open_with(&Configuration::new())
    }

    pub fn open_with(&self, configuration: &Configuration) -> BuildContext {
        BuildContext::open(self.state_file(), configuration).unwrap()
    }

    pub fn open_recording(&self) -> (BuildContext, RecordingSink) {
        let sink = RecordingSink::new();
        let ctx = BuildContext::builder(self.state_file())
            .message_sink(sink.clone())
            .build()
            .unwrap();
        (ctx, sink)
    }

    pub fn open_basic(&self) -> BuildContext {
        BuildContext::builder(self.state_file())
            .basic()
            .build()
            .unwrap()
    }

    pub fn open_aggregator(&self) -> AggregatorBuildContext {
        AggregatorBuildContext::open(self.state_file(), &Configuration::new()).unwrap()
    }

    /// Run one build that processes `input` and writes `output` from it.
    pub fn build_one(&self, input: &str, output: &str) {
        let mut ctx = self.open();
        let meta = ctx.register_input(self.path(input)).unwrap();
        let processed = ctx.process(&meta).unwrap();
        let content = self.read(input);
        self.write(output, &content.to_uppercase());
        ctx.associate_output(&processed, self.path(output)).unwrap();
        ctx.commit().unwrap();
    }
}
