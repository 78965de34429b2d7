//! Delete-mirroring directory sync
//!
//! Wraps `rsync -a --delete --itemize-changes`. After a successful run the
//! destination matches the source exactly, apart from excluded paths, which are
//! neither copied nor deleted.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error};

use crate::errors::HostKitError;

/// Mirror one directory into another with rsync
#[derive(Debug, Clone)]
pub struct Mirror {
    rsync_bin: String,
}

impl Mirror {
    pub fn new(rsync_bin: impl Into<String>) -> Self {
        Self {
            rsync_bin: rsync_bin.into(),
        }
    }

    /// Check if rsync is installed and runnable
    pub async fn check_available(&self) -> bool {
        Command::new(&self.rsync_bin)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Make `dest` a copy of the contents of `src`, returning the number of files
    /// transferred.
    ///
    /// `excludes` are rsync patterns; a leading `/` anchors one at the root of the
    /// transfer.
    pub async fn mirror(
        &self,
        src: &Path,
        dest: &Path,
        excludes: &[&str],
    ) -> Result<u64, HostKitError> {
        if !src.is_dir() {
            return Err(HostKitError::SyncError(format!(
                "source {} is not a directory",
                src.display()
            )));
        }
        tokio::fs::create_dir_all(dest).await?;

        let mut cmd = Command::new(&self.rsync_bin);
        cmd.arg("-a").arg("--delete").arg("--itemize-changes");
        for pattern in excludes {
            cmd.arg(format!("--exclude={pattern}"));
        }
        // trailing slash = copy contents
        cmd.arg(format!("{}/", src.display()))
            .arg(format!("{}/", dest.display()))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("Mirroring {} -> {}", src.display(), dest.display());
        let output = cmd.output().await.map_err(|e| {
            HostKitError::SyncError(format!("failed to run {}: {}", self.rsync_bin, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                "rsync {} -> {} failed: {}",
                src.display(),
                dest.display(),
                stderr.trim()
            );
            return Err(HostKitError::SyncError(format!(
                "rsync exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let synced = count_transferred(&String::from_utf8_lossy(&output.stdout));
        debug!("Mirrored {} files into {}", synced, dest.display());
        Ok(synced)
    }
}

/// Count regular-file lines in `--itemize-changes` output
pub fn count_transferred(itemized: &str) -> u64 {
    itemized
        .lines()
        .filter(|line| line.chars().nth(1) == Some('f'))
        .count() as u64
}
