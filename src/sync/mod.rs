//! Source repository synchronization.
//!
//! This module keeps a local mirror of the upstream image repository and
//! reports whether a sync brought in new content.
//!
//! # Lifecycle
//!
//! ```text
//!                ensure_mirror() ok
//! Uninitialized ───────────────────► Mirrored ──refresh()──► Unchanged | Changed
//!       ▲   │                           ▲  │
//!       └───┘ clone failed              └──┘ pull failed
//!        (retry next tick)                (retry next tick)
//! ```
//!
//! # Components
//!
//! - [`SourceSyncer`]: Trait the scheduler drives; lets tests substitute a fake mirror
//! - [`GitSyncer`]: Implementation backed by the system `git` binary
//! - [`SourceImage`]: Raw image read from the mirror
//! - [`scan_images`]: Recursive enumeration of source images

mod git;
mod source;

use std::path::Path;

use async_trait::async_trait;

use crate::error::SyncError;

pub use git::{GitSyncer, SourceRepository};
pub use source::{
    identifier_for, index_by_identifier, is_source_image, scan_images, SourceImage,
    EXCLUDED_PREFIXES, SOURCE_EXTENSIONS,
};

// =============================================================================
// SourceSyncer Trait
// =============================================================================

/// Maintains the local mirror of the upstream repository.
///
/// Mirror operations are blocking from the caller's point of view and must
/// only be awaited on the scheduler task, never on the request path.
#[async_trait]
pub trait SourceSyncer: Send + Sync {
    /// Clone the upstream repository if the mirror does not exist yet.
    ///
    /// # Returns
    /// `true` if a fresh clone was made, `false` if the mirror already existed.
    async fn ensure_mirror(&self) -> Result<bool, SyncError>;

    /// Pull the latest upstream state into the mirror.
    ///
    /// # Returns
    /// `true` if the pull changed any files.
    async fn refresh(&self) -> Result<bool, SyncError>;

    /// Local path of the mirror.
    fn mirror_path(&self) -> &Path;

    /// Change marker observed by the last successful clone or pull.
    ///
    /// For git mirrors this is the `HEAD` commit id. `None` until a sync
    /// succeeds, or for mirrors that do not track one.
    async fn last_marker(&self) -> Option<String> {
        None
    }
}
