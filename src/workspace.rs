//! Per-session temporary workspace.
//!
//! The workspace holds the (possibly full-size) video copy and the tor data
//! directory. It must be removed explicitly with [`Workspace::release`] so a
//! failed removal is visible; dropping it only makes a silent best effort.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{Result, SessionError};

const WORKSPACE_PREFIX: &str = "torshare-";

/// File name of the video served to viewers.
pub const VIDEO_FILENAME: &str = "vid-compressed.mp4";

/// Subdirectory holding the tor client's state.
const TOR_DIRNAME: &str = "tor";

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `root` (or the system temp dir).
    pub fn acquire(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| SessionError::resource("Error creating temporary directory", e))?;

        info!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the transcoded or linked video lives.
    pub fn video_path(&self) -> PathBuf {
        self.dir.path().join(VIDEO_FILENAME)
    }

    /// Private data directory for the tor client, created on first use.
    pub fn tor_dir(&self) -> Result<PathBuf> {
        let dir = self.dir.path().join(TOR_DIRNAME);
        fs::create_dir_all(&dir)
            .map_err(|e| SessionError::resource("Error creating tor data directory", e))?;

        // Tor refuses data directories readable by other users
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| SessionError::resource("Error restricting tor data directory", e))?;
        }

        Ok(dir)
    }

    /// Recursively delete the workspace and everything beneath it.
    pub fn release(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        debug!("Removing workspace {}", path.display());
        self.dir.close()?;
        info!("Removed workspace {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_creates_unique_prefixed_dirs() {
        let root = tempdir().unwrap();
        let a = Workspace::acquire(Some(root.path())).unwrap();
        let b = Workspace::acquire(Some(root.path())).unwrap();

        assert!(a.path().is_dir());
        assert_ne!(a.path(), b.path());
        let name = a.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(WORKSPACE_PREFIX));
        assert_eq!(a.video_path(), a.path().join(VIDEO_FILENAME));
    }

    #[test]
    fn test_release_removes_contents() {
        let root = tempdir().unwrap();
        let workspace = Workspace::acquire(Some(root.path())).unwrap();
        let path = workspace.path().to_path_buf();

        fs::write(workspace.video_path(), b"video").unwrap();
        let tor_dir = workspace.tor_dir().unwrap();
        fs::write(tor_dir.join("state"), b"state").unwrap();

        workspace.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_acquire_fails_for_missing_root() {
        let root = tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let err = Workspace::acquire(Some(&missing)).unwrap_err();
        assert!(matches!(err, SessionError::Resource { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_tor_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempdir().unwrap();
        let workspace = Workspace::acquire(Some(root.path())).unwrap();
        let dir = workspace.tor_dir().unwrap();
        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        workspace.release().unwrap();
    }
}
