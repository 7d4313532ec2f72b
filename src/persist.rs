//! Writes a finished bundle to disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::bootstrap::PkiBundle;
use crate::error::{PkiError, Result};

/// Writes the six PEM artifacts of `bundle` into `dir`.
///
/// The directory is created if missing. Existing files are truncated. On Unix
/// the files are created with mode `0600`.
pub fn write_bundle(dir: &Path, bundle: &PkiBundle) -> Result<Vec<PathBuf>> {
    // encode everything first so a failure leaves nothing half written
    let artifacts = bundle.artifacts()?;

    fs::create_dir_all(dir).map_err(|e| {
        PkiError::PersistenceError(format!("failed to create {}: {e}", dir.display()))
    })?;

    let mut written = Vec::with_capacity(artifacts.len());
    for (name, contents) in artifacts {
        let path = dir.join(name);
        write_private_file(&path, contents.as_bytes())?;
        info!(path = %path.display(), "wrote artifact");
        written.push(path);
    }
    Ok(written)
}

fn write_private_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| {
        PkiError::PersistenceError(format!("failed to open {} for writing: {e}", path.display()))
    })?;
    file.write_all(data)
        .and_then(|()| file.flush())
        .map_err(|e| PkiError::PersistenceError(format!("failed to write {}: {e}", path.display())))
}

/// Reads a PEM file written by [`write_bundle`].
pub fn read_artifact(dir: &Path, name: &str) -> Result<String> {
    let path = dir.join(name);
    fs::read_to_string(&path)
        .map_err(|e| PkiError::PersistenceError(format!("failed to read {}: {e}", path.display())))
}
