//! Git-backed mirror of the source repository.
//!
//! Runs the system `git` binary as a child process. A pull counts as a change
//! when the `HEAD` commit differs before and after it.
//!
//! A mirror only counts as present once `HEAD` resolves. A `.git` directory
//! without a commit, as left behind by a clone that was killed, is removed
//! and cloned again.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::SyncError;

use super::SourceSyncer;

/// Location of the mirror and the upstream it follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepository {
    /// Local working copy
    pub path: PathBuf,

    /// Upstream URL (anything `git clone` accepts, including local paths)
    pub url: String,
}

impl SourceRepository {
    pub fn new(path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
        }
    }
}

/// [`SourceSyncer`] that shells out to `git`.
///
/// # Example
///
/// ```ignore
/// use image_ladder::sync::{GitSyncer, SourceRepository, SourceSyncer};
///
/// let repository = SourceRepository::new("./data/repo", "https://example.com/images.git");
/// let syncer = GitSyncer::new(repository);
/// syncer.ensure_mirror().await?;
/// if syncer.refresh().await? {
///     // rebuild derivatives
/// }
/// ```
pub struct GitSyncer {
    repository: SourceRepository,

    /// `HEAD` commit observed after the last successful clone or pull
    last_marker: RwLock<Option<String>>,
}

impl GitSyncer {
    pub fn new(repository: SourceRepository) -> Self {
        Self {
            repository,
            last_marker: RwLock::new(None),
        }
    }

    pub fn repository(&self) -> &SourceRepository {
        &self.repository
    }

    /// Whether a `.git` directory exists at the mirror path.
    ///
    /// This does not check that a clone completed; see [`SourceSyncer::ensure_mirror`].
    pub fn is_mirrored(&self) -> bool {
        self.repository.path.join(".git").exists()
    }

    /// Run git with the given arguments and capture its output.
    async fn git(&self, args: &[&str]) -> Result<Output, SyncError> {
        debug!("Executing: git {:?}", args);

        Command::new("git")
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SyncError::Io(format!("failed to run git {:?}: {}", args, e)))
    }

    /// Current `HEAD` commit of the mirror.
    async fn head(&self) -> Result<String, SyncError> {
        let path = self.path_str()?;
        let output = self.git(&["-C", path, "rev-parse", "HEAD"]).await?;

        if !output.status.success() {
            return Err(SyncError::unavailable("rev-parse", stderr_of(&output)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn path_str(&self) -> Result<&str, SyncError> {
        self.repository.path.to_str().ok_or_else(|| {
            SyncError::Io(format!(
                "mirror path is not valid UTF-8: {}",
                self.repository.path.display()
            ))
        })
    }
}

#[async_trait]
impl SourceSyncer for GitSyncer {
    async fn ensure_mirror(&self) -> Result<bool, SyncError> {
        if self.is_mirrored() {
            match self.head().await {
                Ok(head) => {
                    debug!(
                        path = %self.repository.path.display(),
                        "Mirror already exists, skipping clone"
                    );
                    self.last_marker.write().await.get_or_insert(head);
                    return Ok(false);
                }
                Err(SyncError::Unavailable { message, .. }) => {
                    warn!(
                        path = %self.repository.path.display(),
                        error = %message,
                        "Mirror has no valid HEAD, removing it and cloning again"
                    );
                    tokio::fs::remove_dir_all(&self.repository.path)
                        .await
                        .map_err(|e| {
                            SyncError::Io(format!(
                                "failed to remove broken mirror {}: {}",
                                self.repository.path.display(),
                                e
                            ))
                        })?;
                }
                Err(e) => return Err(e),
            }
        }

        let path = self.path_str()?;
        let existed_before = self.repository.path.exists();

        if let Some(parent) = self.repository.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SyncError::Io(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        info!(url = %self.repository.url, path = %path, "Mirror not found locally, cloning");

        let output = self
            .git(&["clone", "--quiet", self.repository.url.as_str(), path])
            .await?;

        if !output.status.success() {
            if !existed_before {
                if let Err(e) = tokio::fs::remove_dir_all(&self.repository.path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(error = %e, "Failed to remove partial mirror");
                    }
                }
            }
            return Err(SyncError::unavailable("clone", stderr_of(&output)));
        }

        let head = self.head().await?;
        info!(head = %head, "Mirror cloned");
        *self.last_marker.write().await = Some(head);

        Ok(true)
    }

    async fn refresh(&self) -> Result<bool, SyncError> {
        if !self.is_mirrored() {
            return Err(SyncError::unavailable(
                "pull",
                format!("no mirror at {}", self.repository.path.display()),
            ));
        }

        let path = self.path_str()?;
        let before = self.head().await?;

        let output = self.git(&["-C", path, "pull", "--ff-only", "--quiet"]).await?;
        if !output.status.success() {
            return Err(SyncError::unavailable("pull", stderr_of(&output)));
        }

        let after = self.head().await?;
        let changed = before != after;

        if changed {
            info!(from = %before, to = %after, "Mirror updated");
        } else {
            debug!(head = %after, "Mirror unchanged");
        }

        *self.last_marker.write().await = Some(after);

        Ok(changed)
    }

    fn mirror_path(&self) -> &Path {
        &self.repository.path
    }

    async fn last_marker(&self) -> Option<String> {
        self.last_marker.read().await.clone()
    }
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("git exited with {}", output.status)
    } else {
        stderr
    }
}

// =============================================================================
// Tests
// =============================================================================
