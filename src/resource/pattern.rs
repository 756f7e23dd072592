//! Ant-style path patterns
//!
//! Patterns are split on `/` into segments. `**` matches zero or more whole segments;
//! every other segment is a `glob` pattern (`*`, `?`, `[...]`) that never crosses a
//! separator. A trailing `/` is shorthand for `/**` and a leading `/` is ignored.

use crate::error::BuildError;
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum Segment {
    AnyDirs,
    Glob(Pattern),
}

/// A compiled Ant-style pattern.
#[derive(Debug, Clone)]
pub struct AntPattern {
    source: String,
    segments: Vec<Segment>,
}

impl AntPattern {
    pub fn new(pattern: &str) -> Result<Self, BuildError> {
        let mut normalized = pattern.replace('\\', "/");
        if normalized.ends_with('/') {
            normalized.push_str("**");
        }
        let trimmed = normalized.trim_start_matches('/');

        let mut segments = Vec::new();
        for part in trimmed.split('/').filter(|s| !s.is_empty()) {
            if part == "**" {
                // Consecutive `**` are equivalent to one.
                if !matches!(segments.last(), Some(Segment::AnyDirs)) {
                    segments.push(Segment::AnyDirs);
                }
                continue;
            }
            let glob = Pattern::new(part).map_err(|e| {
                BuildError::InvalidArgument(format!("invalid pattern '{}': {}", pattern, e))
            })?;
            segments.push(Segment::Glob(glob));
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a `/`-separated path relative to the pattern's base directory.
    pub fn matches(&self, relative: &str) -> bool {
        let parts: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> bool {
    match segments.split_first() {
        None => parts.is_empty(),
        Some((Segment::AnyDirs, rest)) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((Segment::Glob(glob), rest)) => match parts.split_first() {
            Some((head, tail)) => {
                glob.matches_with(head, MATCH_OPTIONS) && match_segments(rest, tail)
            }
            None => false,
        },
    }
}

/// Include/exclude pattern set with Ant precedence rules.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    includes: Vec<AntPattern>,
    excludes: Vec<AntPattern>,
}

impl PatternSet {
    pub fn new<I, E>(includes: I, excludes: E) -> Result<Self, BuildError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let includes = includes
            .into_iter()
            .map(|p| AntPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let excludes = excludes
            .into_iter()
            .map(|p| AntPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { includes, excludes })
    }

    /// Empty includes match everything; excludes always win.
    pub fn matches(&self, relative: &str) -> bool {
        let included =
            self.includes.is_empty() || self.includes.iter().any(|p| p.matches(relative));
        included && !self.excludes.iter().any(|p| p.matches(relative))
    }
}
