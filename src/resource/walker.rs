//! Filesystem enumeration for include/exclude pattern sets

use crate::error::BuildError;
use crate::resource::path::relative_slash_path;
use crate::resource::pattern::PatternSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Enumerates the regular files under a base directory matching a [`PatternSet`].
///
/// Symbolic links are not followed. A base directory that does not exist yields no
/// matches.
#[derive(Debug, Clone)]
pub struct FileMatcher {
    basedir: PathBuf,
    patterns: PatternSet,
}

impl FileMatcher {
    pub fn new<I, E>(basedir: &Path, includes: I, excludes: E) -> Result<Self, BuildError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Ok(Self {
            basedir: basedir.to_path_buf(),
            patterns: PatternSet::new(includes, excludes)?,
        })
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Collect matching files, sorted by path for determinism.
    pub fn matches(&self) -> Result<Vec<PathBuf>, BuildError> {
        let root = match dunce::canonicalize(&self.basedir) {
            Ok(root) if root.is_dir() => root,
            _ => return Ok(Vec::new()),
        };

        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed"));
                BuildError::ResourceUnavailable { path, source }
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if let Some(relative) = relative_slash_path(&root, path) {
                if self.patterns.matches(&relative) {
                    files.push(path.to_path_buf());
                }
            }
        }

        files.sort();
        Ok(files)
    }
}
