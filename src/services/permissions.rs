//! Permission and ownership normalization
//!
//! After a rebuild the data file must carry the uid/gid and mode the
//! service process expects inside its container user namespace. Failures
//! here degrade the run (the container may run as root and not care), so
//! the caller gets warnings back instead of errors.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{info, warn};

/// Apply the expected owner and mode to the persisted data file.
///
/// Returns the warnings to surface in the final report; an empty vec
/// means the file now matches expectations.
pub fn normalize(path: &Path, uid: u32, gid: u32, mode: u32) -> Vec<String> {
    let mut warnings = Vec::new();

    if !path.exists() {
        warnings.push(format!(
            "data file {} absent, nothing to normalize",
            path.display()
        ));
        return warnings;
    }

    if let Err(e) = std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
        warn!(path = %path.display(), uid, gid, error = %e, "chown failed");
        warnings.push(format!(
            "could not set owner {uid}:{gid} on {}: {e}",
            path.display()
        ));
    }

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        warn!(path = %path.display(), mode = format!("{mode:o}"), error = %e, "chmod failed");
        warnings.push(format!(
            "could not set mode {mode:o} on {}: {e}",
            path.display()
        ));
    }

    if warnings.is_empty() {
        info!(path = %path.display(), uid, gid, mode = format!("{mode:o}"), "data file normalized");
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let warnings = normalize(&dir.path().join("absent.db"), 1000, 1000, 0o644);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("absent"));
    }

    #[test]
    fn test_mode_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teams.db");
        std::fs::write(&path, b"data").unwrap();

        // chown to the file's current owner always succeeds; the mode
        // change is the observable part.
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::metadata(&path).unwrap();
        let warnings = normalize(&path, meta.uid(), meta.gid(), 0o600);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
