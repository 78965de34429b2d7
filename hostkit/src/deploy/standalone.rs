//! Standalone Next.js normalizer
//!
//! A standalone build scatters its output: the server tree lives under the
//! standalone root while static assets and `public/` stay next to the original
//! sources. Normalizing mirrors the three pieces into one release directory.

use std::path::Path;

use hostkit_models::BuildClassification;
use tracing::{debug, info};

use crate::errors::HostKitError;
use crate::sync::ownership::Ownership;
use crate::sync::rsync::Mirror;

const STATIC_SUBTREE: &str = ".next/static";
const PUBLIC_SUBTREE: &str = "public";

/// Server-tree excludes; these destinations belong to the later steps
const SERVER_TREE_EXCLUDES: &[&str] = &["/.next/static", "/public"];

/// Reshapes standalone builds into a release directory
#[derive(Debug, Clone)]
pub struct Normalizer {
    mirror: Mirror,
    ownership: Ownership,
}

impl Normalizer {
    pub fn new(mirror: Mirror, ownership: Ownership) -> Self {
        Self { mirror, ownership }
    }

    /// Mirror a standalone build into `release_dir` and hand it to `owner`.
    ///
    /// Returns the number of files transferred, for logging only.
    pub async fn normalize(
        &self,
        source_dir: &Path,
        classification: &BuildClassification,
        release_dir: &Path,
        owner: &str,
    ) -> Result<u64, HostKitError> {
        if !classification.is_standalone() {
            return Err(HostKitError::NotStandalone(
                classification.build_type().to_string(),
            ));
        }
        let (root, entry) = match (classification.standalone_root(), classification.server_entry())
        {
            (Some(root), Some(entry)) => (root, entry),
            _ => {
                return Err(HostKitError::ServerNotFound(
                    "classification carries no server entry".to_string(),
                ))
            }
        };
        if !entry.is_file() {
            return Err(HostKitError::ServerNotFound(entry.display().to_string()));
        }

        let mut synced = self
            .mirror
            .mirror(root, release_dir, SERVER_TREE_EXCLUDES)
            .await?;

        // Asset subtrees are resolved against the source dir, not the standalone root
        for subtree in [STATIC_SUBTREE, PUBLIC_SUBTREE] {
            synced += self
                .mirror_subtree(&source_dir.join(subtree), &release_dir.join(subtree))
                .await?;
        }

        self.ownership.apply(release_dir, owner).await;

        info!(
            "Normalized standalone build {} into {} ({} files)",
            root.display(),
            release_dir.display(),
            synced
        );
        Ok(synced)
    }

    async fn mirror_subtree(&self, src: &Path, dest: &Path) -> Result<u64, HostKitError> {
        if src.is_dir() {
            return self.mirror.mirror(src, dest, &[]).await;
        }
        if dest.exists() {
            debug!("Removing {} (absent from source)", dest.display());
            tokio::fs::remove_dir_all(dest).await?;
        }
        Ok(0)
    }
}
