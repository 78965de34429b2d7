//! Recursive ownership changes

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

/// Runs `chown -R owner:owner`
#[derive(Debug, Clone)]
pub struct Ownership {
    chown_bin: String,
}

impl Ownership {
    pub fn new(chown_bin: impl Into<String>) -> Self {
        Self {
            chown_bin: chown_bin.into(),
        }
    }

    /// Hand `dir` to `owner`. Failure is logged and reported as `false`, never raised.
    pub async fn apply(&self, dir: &Path, owner: &str) -> bool {
        let spec = format!("{owner}:{owner}");
        let result = Command::new(&self.chown_bin)
            .arg("-R")
            .arg(&spec)
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                debug!("Set ownership of {} to {}", dir.display(), spec);
                true
            }
            Ok(output) => {
                warn!(
                    "chown {} {} failed ({:?}): {}",
                    spec,
                    dir.display(),
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                warn!("Unable to run {}: {}", self.chown_bin, e);
                false
            }
        }
    }
}
