//! Periodic sync and rebuild loop.
//!
//! The scheduler owns the write side of the system. On every tick it brings
//! the mirror up to date and, if anything changed, rebuilds every image and
//! commits each completed set to the store:
//!
//! ```text
//!           ┌──────────── interval (skip missed) ◄───────────┐
//!           ▼                                                 │
//!   ensure_mirror ─► refresh ─► changed? ──no──► report ──────┤
//!                                  │                          │
//!                                 yes                         │
//!                                  ▼                          │
//!              scan ─► build (≤ max_in_flight) ─► put ─► report
//! ```
//!
//! Ticks run inline, so a slow pass delays the next tick instead of
//! overlapping it. The first pass after startup always rebuilds, whether or
//! not the mirror changed. A rebuild that left images uncommitted (store
//! errors, unreadable files, cancellation) is repeated on the next tick even
//! when the mirror has not moved since.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::derive::DerivativeBuilder;
use crate::store::DerivativeStore;
use crate::sync::{index_by_identifier, scan_images, SourceImage, SourceSyncer};

/// Sync interval used when none is configured (5 minutes).
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(300_000);

// =============================================================================
// Tick Report
// =============================================================================

/// Outcome of one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The mirror was freshly cloned or a pull brought in new commits
    pub changed: bool,

    /// Source images found in the mirror (zero when nothing was rebuilt)
    pub images_found: usize,

    /// Derivative sets written to the store
    pub committed: usize,

    /// Images skipped because they could not be read, decoded or encoded
    pub conversion_failures: usize,

    /// Part of `conversion_failures`: source files that could not be read
    pub read_failures: usize,

    /// Completed sets the store refused
    pub store_failures: usize,

    /// Another pass was still running, so this one did nothing
    pub skipped: bool,

    /// Clone or pull failed
    pub sync_failed: bool,

    /// Cancellation stopped the pass before every image was launched
    pub cancelled: bool,

    /// Rebuilt because the previous rebuild did not commit everything
    pub retried: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Whether every image found was committed.
    pub fn is_clean(&self) -> bool {
        !self.sync_failed
            && !self.cancelled
            && self.conversion_failures == 0
            && self.store_failures == 0
    }

    /// Whether a rebuild left work that a later attempt could still commit.
    ///
    /// Images that fail to decode or encode are excluded: the same bytes would
    /// fail again until upstream changes them.
    pub fn needs_retry(&self) -> bool {
        self.cancelled || self.store_failures > 0 || self.read_failures > 0
    }
}

enum ImageOutcome {
    Committed,
    ReadFailed,
    ConversionFailed,
    StoreFailed,
}

// =============================================================================
// Sync Scheduler
// =============================================================================

/// Drives the mirror, builder and store on a fixed interval.
///
/// # Example
///
/// ```ignore
/// use image_ladder::scheduler::SyncScheduler;
/// use tokio_util::sync::CancellationToken;
///
/// let scheduler = SyncScheduler::new(syncer, builder, store, Duration::from_secs(300));
/// let token = CancellationToken::new();
/// tokio::spawn(async move { scheduler.run(token).await });
/// ```
pub struct SyncScheduler<Y: ?Sized, S: ?Sized> {
    syncer: Arc<Y>,
    builder: DerivativeBuilder,
    store: Arc<S>,
    interval: Duration,

    /// Images built concurrently within one pass
    max_in_flight: usize,

    in_flight: AtomicBool,

    /// The last rebuild did not commit every image
    retry_pending: AtomicBool,
}

impl<Y, S> SyncScheduler<Y, S>
where
    Y: SourceSyncer + ?Sized,
    S: DerivativeStore + ?Sized + 'static,
{
    /// Create a scheduler.
    ///
    /// The in-flight image window defaults to the builder's worker count.
    pub fn new(
        syncer: Arc<Y>,
        builder: DerivativeBuilder,
        store: Arc<S>,
        interval: Duration,
    ) -> Self {
        let max_in_flight = builder.pool().size();
        Self {
            syncer,
            builder,
            store,
            interval,
            max_in_flight,
            in_flight: AtomicBool::new(false),
            retry_pending: AtomicBool::new(false),
        }
    }

    /// Set how many images one pass builds at once (at least one).
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Whether a pass is currently running.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the next tick rebuilds regardless of mirror changes.
    pub fn is_retry_pending(&self) -> bool {
        self.retry_pending.load(Ordering::Acquire)
    }

    /// Run the initial population, then tick every interval until cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            max_in_flight = self.max_in_flight,
            "Starting sync scheduler"
        );

        if !token.is_cancelled() {
            self.initial_population(&token).await;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick(&token).await;
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    /// Sync the mirror and rebuild every image regardless of changes.
    pub async fn initial_population(&self, token: &CancellationToken) -> TickReport {
        self.pass(token, true).await
    }

    /// Sync the mirror and rebuild every image if it changed or the previous
    /// rebuild was incomplete.
    pub async fn tick(&self, token: &CancellationToken) -> TickReport {
        self.pass(token, false).await
    }

    /// Rebuild every image currently in the mirror without syncing first.
    pub async fn rebuild_all(&self, token: &CancellationToken) -> TickReport {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!("Sync pass still in flight, skipping rebuild");
            return TickReport::skipped();
        };

        let mut report = TickReport::default();
        self.rebuild(token, &mut report).await;
        log_report(&report);
        report
    }

    async fn pass(&self, token: &CancellationToken, force: bool) -> TickReport {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!("Sync pass still in flight, skipping tick");
            return TickReport::skipped();
        };

        let mut report = TickReport::default();

        let synced = tokio::select! {
            biased;
            _ = token.cancelled() => {
                // An interrupted pull may already have moved HEAD
                self.retry_pending.store(true, Ordering::Release);
                report.cancelled = true;
                return report;
            }
            synced = self.sync_mirror() => synced,
        };

        match synced {
            Ok(changed) => report.changed = changed,
            Err(changed) => {
                report.changed = changed;
                report.sync_failed = true;
            }
        }

        if report.changed || force {
            self.rebuild(token, &mut report).await;
        } else if self.is_retry_pending() {
            info!("Previous rebuild was incomplete, rebuilding again");
            report.retried = true;
            self.rebuild(token, &mut report).await;
        } else {
            debug!("Mirror unchanged, nothing to rebuild");
        }

        log_report(&report);
        report
    }

    /// Clone if needed, then pull.
    ///
    /// Returns whether the mirror changed; `Err` carries the same flag when
    /// either step failed.
    async fn sync_mirror(&self) -> Result<bool, bool> {
        let cloned = match self.syncer.ensure_mirror().await {
            Ok(cloned) => cloned,
            Err(e) => {
                error!(error = %e, "Failed to create mirror");
                return Err(false);
            }
        };

        match self.syncer.refresh().await {
            Ok(pulled) => Ok(cloned || pulled),
            Err(e) => {
                error!(error = %e, "Failed to refresh mirror");
                Err(cloned)
            }
        }
    }

    /// Build every image and record whether the result calls for a retry.
    async fn rebuild(&self, token: &CancellationToken, report: &mut TickReport) {
        let scanned = self.build_all(token, report).await;
        let pending = !scanned || report.needs_retry();

        if pending {
            warn!("Rebuild incomplete, retrying on the next tick");
        }
        self.retry_pending.store(pending, Ordering::Release);
    }

    /// Returns `false` if the mirror could not be scanned.
    async fn build_all(&self, token: &CancellationToken, report: &mut TickReport) -> bool {
        let root = self.syncer.mirror_path().to_path_buf();
        let index =
            match tokio::task::spawn_blocking(move || index_by_identifier(scan_images(&root)))
                .await
            {
                Ok(index) => index,
                Err(e) => {
                    error!(error = %e, "Failed to scan mirror");
                    report.sync_failed = true;
                    return false;
                }
            };

        report.images_found = index.len();
        info!(images = index.len(), "Rebuilding derivatives");

        let window = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        for (identifier, path) in index {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                permit = Arc::clone(&window).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled = true;
                info!("Cancellation requested, not launching further images");
                break;
            };

            let builder = self.builder.clone();
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let _permit = permit;
                process_image(&builder, store.as_ref(), &identifier, path).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ImageOutcome::Committed) => report.committed += 1,
                Ok(ImageOutcome::ReadFailed) => {
                    report.read_failures += 1;
                    report.conversion_failures += 1;
                }
                Ok(ImageOutcome::ConversionFailed) => report.conversion_failures += 1,
                Ok(ImageOutcome::StoreFailed) => report.store_failures += 1,
                Err(e) => {
                    error!(error = %e, "Image build task failed");
                    report.conversion_failures += 1;
                }
            }
        }

        true
    }
}

/// Load, build and commit one image. Failures are logged and reported, never raised.
async fn process_image<S>(
    builder: &DerivativeBuilder,
    store: &S,
    identifier: &str,
    path: PathBuf,
) -> ImageOutcome
where
    S: DerivativeStore + ?Sized,
{
    let image = match SourceImage::load(&path).await {
        Ok(image) => image,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable source image");
            return ImageOutcome::ReadFailed;
        }
    };

    let set = match builder.build(&image).await {
        Ok(set) => set,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping image that failed to convert");
            return ImageOutcome::ConversionFailed;
        }
    };

    match store.put(identifier, &set).await {
        Ok(()) => {
            debug!(
                identifier = %identifier,
                labels = set.len(),
                bytes = set.total_bytes(),
                "Committed derivative set"
            );
            ImageOutcome::Committed
        }
        Err(e) => {
            error!(identifier = %identifier, error = %e, "Failed to commit derivative set");
            ImageOutcome::StoreFailed
        }
    }
}

fn log_report(report: &TickReport) {
    info!(
        changed = report.changed,
        images_found = report.images_found,
        committed = report.committed,
        conversion_failures = report.conversion_failures,
        store_failures = report.store_failures,
        sync_failed = report.sync_failed,
        cancelled = report.cancelled,
        retried = report.retried,
        "Sync pass finished"
    );
}

/// Clears the in-flight flag when the pass ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Tests
// =============================================================================
