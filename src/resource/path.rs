//! Resource identity normalization
//!
//! Every map in the build state is keyed by a normalized absolute path. Inputs exist when
//! they are registered, outputs may not, so normalization canonicalizes the longest
//! existing prefix and resolves the remainder lexically.

use crate::error::BuildError;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Normalize a resource path into its stable identity.
///
/// This function:
/// 1. Makes the path absolute (relative to the current directory)
/// 2. Canonicalizes the existing prefix (resolves symlinks, `..`, `.`)
/// 3. Normalizes Unicode to NFC
/// 4. Removes trailing slashes (except root)
pub fn normalize_resource(path: &Path) -> Result<PathBuf, BuildError> {
    if path.as_os_str().is_empty() {
        return Err(BuildError::InvalidArgument(
            "resource path must not be empty".to_string(),
        ));
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| {
            BuildError::InvalidArgument(format!("cannot resolve {}: {}", path.display(), e))
        })?;
        cwd.join(path)
    };
    let absolute = lexical_clean(&absolute);

    let resolved = match dunce::canonicalize(&absolute) {
        Ok(canonical) => canonical,
        Err(_) => canonicalize_existing_prefix(&absolute),
    };

    Ok(PathBuf::from(normalize_path_string(&resolved.to_string_lossy())))
}

/// Normalize a path string (without filesystem access)
///
/// Used when a path is already canonical and only needs Unicode and separator cleanup.
pub fn normalize_path_string(path: &str) -> String {
    let mut result: String = path.nfc().collect();
    if result.len() > 1 {
        while result.ends_with('/') || result.ends_with('\\') {
            result.pop();
        }
    }
    result
}

/// Path of `path` relative to `base`, with `/` separators.
pub fn relative_slash_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            missing.push(name.to_os_string());
        }
        if let Ok(canonical) = dunce::canonicalize(parent) {
            let mut resolved = canonical;
            for name in missing.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
        current = parent;
    }
    path.to_path_buf()
}
