//! Test utilities for integration tests.
//!
//! This module provides fake mirrors, instrumented stores and helpers for
//! creating source images on disk.

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgb, RgbImage};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use image_ladder::derive::{DerivativeBuilder, DerivativeEncoder, DerivativeSet, WorkerPool};
use image_ladder::error::{StoreError, SyncError};
use image_ladder::ladder::{Label, ResolutionLadder};
use image_ladder::store::{DerivativeStore, MemoryStore};
use image_ladder::sync::SourceSyncer;

/// Ladder used throughout the integration tests.
pub const TEST_TIERS: [u32; 4] = [32, 64, 128, 256];

pub fn test_ladder() -> Arc<ResolutionLadder> {
    Arc::new(ResolutionLadder::new(TEST_TIERS.to_vec()).unwrap())
}

/// Builder with the fastest encoder settings.
pub fn fast_builder(ladder: Arc<ResolutionLadder>) -> DerivativeBuilder {
    DerivativeBuilder::new(ladder, DerivativeEncoder::new(50, 10), WorkerPool::new(2))
}

// =============================================================================
// Image Fixtures
// =============================================================================

/// Encode a gradient PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 5) as u8, (y * 3) as u8, ((x + y) * 2) as u8])
    });

    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Write a gradient PNG to `path`, creating parent directories.
pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, png_bytes(width, height)).unwrap();
}

/// Check for the ISO-BMFF `ftyp` box with an AVIF brand.
pub fn is_valid_avif(data: &[u8]) -> bool {
    image_ladder::derive::is_avif(data)
}

/// Synthetic derivative set for a 100x80 source with tagged payloads.
///
/// Tiers 32 and 64 carry `{tag}-32` and `{tag}-64`; every larger tier shares
/// `{tag}-orig`.
pub fn tagged_set(tag: &str) -> DerivativeSet {
    let resized = HashMap::from([
        (32, Bytes::from(format!("{}-32", tag))),
        (64, Bytes::from(format!("{}-64", tag))),
    ]);
    DerivativeSet::assemble(
        &test_ladder(),
        (100, 80),
        Bytes::from(format!("{}-orig", tag)),
        resized,
    )
    .unwrap()
}

// =============================================================================
// Fake Syncer
// =============================================================================

/// Mirror over a plain directory with a scripted change flag.
pub struct FakeSyncer {
    root: PathBuf,
    changed: AtomicBool,
    fail: AtomicBool,
    refreshes: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl FakeSyncer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            changed: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Make every `refresh` wait until the returned notifier fires.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn set_changed(&self, changed: bool) {
        self.changed.store(changed, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceSyncer for FakeSyncer {
    async fn ensure_mirror(&self) -> Result<bool, SyncError> {
        Ok(false)
    }

    async fn refresh(&self) -> Result<bool, SyncError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable {
                operation: "pull",
                message: "upstream offline".to_string(),
            });
        }

        Ok(self.changed.load(Ordering::SeqCst))
    }

    fn mirror_path(&self) -> &Path {
        &self.root
    }
}

// =============================================================================
// Tracking Store
// =============================================================================

/// In-memory store that records every `put` and can be told to fail.
#[derive(Default)]
pub struct TrackingStore {
    inner: MemoryStore,
    puts: Mutex<Vec<String>>,
    fail_puts: AtomicBool,
    fail_reads: Mutex<Option<StoreError>>,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Identifiers passed to `put`, in call order.
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every read and ping fail with `error`.
    pub fn set_fail_reads(&self, error: Option<StoreError>) {
        *self.fail_reads.lock().unwrap() = error;
    }

    fn read_failure(&self) -> Option<StoreError> {
        self.fail_reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl DerivativeStore for TrackingStore {
    async fn put(&self, identifier: &str, set: &DerivativeSet) -> Result<(), StoreError> {
        self.puts.lock().unwrap().push(identifier.to_string());

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Command("READONLY replica".to_string()));
        }

        self.inner.put(identifier, set).await
    }

    async fn get(&self, identifier: &str, label: Label) -> Result<Option<Bytes>, StoreError> {
        if let Some(error) = self.read_failure() {
            return Err(error);
        }
        self.inner.get(identifier, label).await
    }

    async fn labels(&self, identifier: &str) -> Result<Vec<Label>, StoreError> {
        if let Some(error) = self.read_failure() {
            return Err(error);
        }
        self.inner.labels(identifier).await
    }

    async fn record(&self, identifier: &str) -> Result<BTreeMap<Label, Bytes>, StoreError> {
        if let Some(error) = self.read_failure() {
            return Err(error);
        }
        self.inner.record(identifier).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self.read_failure() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
