use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::ApiError;

/// On-disk file storage under a single upload root.
///
/// Every file lives at `{home}/{dir}/{name}`, where `dir` and `name` are
/// single path components checked by the caller.
pub struct Storage {
    home: PathBuf,
}

impl Storage {
    pub fn new(home: PathBuf) -> Result<Self> {
        fs::create_dir_all(&home)?;
        info!("File storage root: {}", home.display());
        Ok(Self { home })
    }

    pub fn path(&self, dir: &str, name: &str) -> PathBuf {
        self.home.join(dir).join(name)
    }

    pub fn ensure_dir(&self, dir: &str) -> std::io::Result<PathBuf> {
        let path = self.home.join(dir);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    pub fn exists(&self, dir: &str, name: &str) -> bool {
        self.path(dir, name).is_file()
    }

    /// Move `{from_dir}/{name}` to `{to_dir}/{name}`.
    ///
    /// A missing source is reported as `SourceFileMissing` so a replayed
    /// request surfaces instead of silently succeeding.
    pub fn move_file(&self, from_dir: &str, name: &str, to_dir: &str) -> Result<PathBuf, ApiError> {
        let src = self.path(from_dir, name);
        let dst = self.path(to_dir, name);

        if !src.is_file() {
            return Err(ApiError::SourceFileMissing(src));
        }

        match fs::rename(&src, &dst) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ApiError::SourceFileMissing(src));
            }
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                fs::copy(&src, &dst)?;
                fs::remove_file(&src)?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!("Moved {} -> {}", src.display(), dst.display());
        Ok(dst)
    }

    /// Delete `{dir}/{name}`. Returns false when the file was already gone.
    pub fn remove(&self, dir: &str, name: &str) -> std::io::Result<bool> {
        let path = self.path(dir, name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("File {} already gone", path.display());
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Write an uploaded file into the holding directory.
    pub async fn save_temp(&self, tmp_dir: &str, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let dir = self.home.join(tmp_dir);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(name);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        Ok(path)
    }
}
