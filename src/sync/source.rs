//! Source image enumeration.
//!
//! Walks the mirror for raster images to build derivatives from. Only
//! `jpg`, `jpeg`, `png` and `webp` files are picked up, and site icons
//! (`favicon*`, `apple-touch-icon*`, `android-chrome*`) are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::error::ConversionError;

/// Extensions of files treated as source images (lowercase).
pub const SOURCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// File name prefixes of site icons that are never built (lowercase).
pub const EXCLUDED_PREFIXES: &[&str] = &["favicon", "apple-touch-icon", "android-chrome"];

// =============================================================================
// Source Image
// =============================================================================

/// Raw bytes of one image read fresh from the mirror.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// File name without extension; the store record key is derived from it
    pub identifier: String,

    /// Location in the mirror
    pub path: PathBuf,

    /// Undecoded file contents
    pub bytes: Bytes,
}

impl SourceImage {
    pub fn new(identifier: impl Into<String>, path: impl Into<PathBuf>, bytes: Bytes) -> Self {
        Self {
            identifier: identifier.into(),
            path: path.into(),
            bytes,
        }
    }

    /// Read an image from the mirror.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Read`] if the path has no usable file stem or
    /// the file cannot be read.
    pub async fn load(path: &Path) -> Result<Self, ConversionError> {
        let identifier = identifier_for(path).ok_or_else(|| ConversionError::Read {
            path: path.display().to_string(),
            message: "file name is not valid UTF-8".to_string(),
        })?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ConversionError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Ok(Self::new(identifier, path, Bytes::from(bytes)))
    }
}

/// Identifier of a source file: its file name with the extension stripped.
pub fn identifier_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Enumeration
// =============================================================================

/// Recursively list the source images under `root`, sorted by path.
///
/// Unreadable directory entries are logged and skipped. A missing root yields
/// an empty list.
pub fn scan_images(root: &Path) -> Vec<PathBuf> {
    let mut images = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_git_dir(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // The root itself is absent before the first clone
                if e.depth() > 0 {
                    warn!(error = %e, "Skipping unreadable mirror entry");
                }
                continue;
            }
        };

        if entry.file_type().is_file() && is_source_image(entry.path()) {
            images.push(entry.into_path());
        }
    }

    images.sort();
    images
}

/// Map each identifier to the file it is built from.
///
/// Paths are taken in the given order; when two files share an identifier the
/// later one wins and a warning is logged.
pub fn index_by_identifier(paths: Vec<PathBuf>) -> BTreeMap<String, PathBuf> {
    let mut index = BTreeMap::new();

    for path in paths {
        let Some(identifier) = identifier_for(&path) else {
            warn!(path = %path.display(), "Skipping source image with non UTF-8 name");
            continue;
        };

        if let Some(previous) = index.insert(identifier.clone(), path.clone()) {
            warn!(
                identifier = %identifier,
                replaced = %previous.display(),
                kept = %path.display(),
                "Duplicate image identifier in mirror"
            );
        }
    }

    index
}

/// Whether a file name denotes a source image that should be built.
pub fn is_source_image(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();

    let has_extension = Path::new(&name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));

    has_extension && !EXCLUDED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn is_git_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == ".git"
}

// =============================================================================
// Tests
// =============================================================================
