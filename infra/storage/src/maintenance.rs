use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{error, info};
use walkdir::{DirEntry, WalkDir};

/// Marker embedded in the names of in-flight atomic writes.
pub(crate) const TMP_MARKER: &str = ".fgtmp.";

const STALE_AFTER: Duration = Duration::from_secs(300);

/// Removes temp files abandoned by interrupted writes under `root`.
pub(crate) async fn purge_tmp(backend_id: &str, root: &Path) {
    let root = root.to_path_buf();
    let now = SystemTime::now();

    match tokio::task::spawn_blocking(move || remove_stale(&root, now, STALE_AFTER)).await {
        Ok((removed, failed)) if removed > 0 || failed > 0 => {
            info!(backend = backend_id, removed, failed, "Cleaned up temporary files");
        },
        Err(e) => {
            error!(backend = backend_id, error = %e, "Temp file cleanup task panicked");
        },
        _ => {},
    }
}

pub(crate) fn is_tmp_name(name: &str) -> bool {
    name.contains(TMP_MARKER)
}

fn remove_stale(root: &Path, now: SystemTime, threshold: Duration) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    WalkDir::new(root)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file() && is_tmp(entry))
        .filter(|entry| is_stale(entry, now, threshold))
        .for_each(|entry| match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Stale temp removal failed");
                failed += 1;
            },
        });

    (removed, failed)
}

fn is_tmp(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(is_tmp_name)
}

fn is_stale(entry: &DirEntry, now: SystemTime, threshold: Duration) -> bool {
    entry
        .metadata()
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|modified| now.duration_since(modified).ok())
        .is_none_or(|age| age > threshold)
}
