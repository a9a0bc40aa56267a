//! PID file with an exclusive `fs2` lock.
//!
//! A second server pointed at the same PID file fails at startup instead of
//! fighting over the port.  The file is removed when the guard drops.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;

/// Holds the lock for as long as it lives.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Create `path` (and its parent directories), lock it, and write our pid.
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("opening PID file {}", path.display()))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "another deskcmd instance is running (PID file {} is locked)",
                path.display()
            )
        })?;

        // Only truncate once the lock is ours, so a losing instance never
        // clobbers the winner's pid.
        file.set_len(0)?;
        let pid = std::process::id();
        (&file).write_all(format!("{pid}\n").as_bytes())?;
        (&file).flush()?;

        tracing::info!(path = %path.display(), pid, "PID file written");
        Ok(Self {
            path: path.to_owned(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(path = %self.path.display(), "PID file removed"),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove PID file")
            }
        }
    }
}
