//! Path handling shared by every backend.
//!
//! Callers may use either separator style; everything is normalized to forward slashes
//! without leading or trailing separators before it reaches a storage system.

use crate::error::StorageError;
use std::path::{Path, PathBuf};

/// Converts backslashes to forward slashes and drops empty and `.` segments.
///
/// `..` segments are preserved so that the caller can decide how to treat them.
///
/// ```rust
/// use filegate_storage::path::normalize;
///
/// assert_eq!(normalize("\\docs\\.\\report.txt/"), "docs/report.txt");
/// assert_eq!(normalize("/"), "");
/// ```
#[must_use]
pub fn normalize(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalizes a path and collapses `..` lexically, failing if it climbs above the root.
pub fn resolve_relative(path: &str) -> Result<String, StorageError> {
    let mut out: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {},
            ".." => {
                if out.pop().is_none() {
                    return Err(StorageError::PathTraversalAttempt {
                        message: path.to_owned().into(),
                        context: Some("Path attempted to escape the backend root via '..'".into()),
                    });
                }
            },
            other => out.push(other),
        }
    }

    Ok(out.join("/"))
}

/// Joins two normalized paths.
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() { name.to_owned() } else { format!("{dir}/{name}") }
}

/// Returns the parent of a normalized path, or `None` for top-level entries.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

/// Resolves a request path against the canonical `root` of a local backend.
///
/// `..` is collapsed lexically and may not climb above `root`. The deepest existing
/// ancestor of the result is then canonicalized and must still lie under `root`, which
/// rejects symlinks pointing out of the jail. Existing targets are returned canonical,
/// missing ones as joined.
pub(crate) fn resolve_jailed(root: &Path, path: &str) -> Result<PathBuf, StorageError> {
    let candidate = root.join(resolve_relative(path)?);

    let mut existing = candidate.as_path();
    let canonical = loop {
        match existing.canonicalize() {
            Ok(canonical) => break canonical,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                existing = existing
                    .parent()
                    .filter(|parent| parent.starts_with(root))
                    .ok_or_else(|| escape(path, "No existing ancestor inside the base path"))?;
            },
            Err(e) => {
                return Err(StorageError::Io {
                    source: e,
                    context: Some(format!("Failed to resolve {}", existing.display()).into()),
                });
            },
        }
    };

    if !canonical.starts_with(root) {
        return Err(escape(path, "Resolved path is outside the base path"));
    }
    if existing == candidate.as_path() { Ok(canonical) } else { Ok(candidate) }
}

fn escape(path: &str, reason: &'static str) -> StorageError {
    StorageError::PathTraversalAttempt { message: path.to_owned().into(), context: Some(reason.into()) }
}

/// Renders `path` relative to `root` using forward slashes.
pub(crate) fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> =
        rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    Some(parts.join("/"))
}
