//! Per-job transient files.
//!
//! Every file a job writes to local disk is registered here before it is
//! written, and removed by [`TransientFiles::cleanup`] whatever the outcome.
//! Dropping the guard without calling `cleanup` removes them synchronously.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// Tracks the transient files of one job under a private directory.
#[derive(Debug)]
pub struct TransientFiles {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    cleaned: bool,
}

impl TransientFiles {
    /// Create (or reuse) `work_dir/namespace` for a job's files.
    pub async fn create(work_dir: impl AsRef<Path>, namespace: &str) -> MediaResult<Self> {
        let dir = work_dir.as_ref().join(namespace);
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            paths: Vec::new(),
            cleaned: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register `name` inside the job directory and return its path.
    pub fn track(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        self.track_path(path.clone());
        path
    }

    /// Register an arbitrary path for removal.
    pub fn track_path(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every tracked file and the job directory if it is empty.
    /// Returns the number of files actually removed.
    pub async fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for path in &self.paths {
            match fs::remove_file(path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove transient file {}: {}", path.display(), e),
            }
        }
        // Fails harmlessly when something untracked is still inside
        let _ = fs::remove_dir(&self.dir).await;

        self.cleaned = true;
        debug!(dir = %self.dir.display(), removed = removed, "Cleaned up transient files");
        removed
    }
}

impl Drop for TransientFiles {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        for path in &self.paths {
            let _ = std::fs::remove_file(path);
        }
        let _ = std::fs::remove_dir(&self.dir);
    }
}
