//! Derivative builder.
//!
//! Turns one [`SourceImage`] into a complete [`DerivativeSet`]:
//!
//! ```text
//!  bytes ──decode──► image ──encode──► original
//!                      │
//!                      ├── fits in N? ──yes──► reuse original bytes
//!                      │
//!                      └── no ──► resize (longer edge = N) ──encode──► NxN
//! ```
//!
//! Decoding, the original encode and every resized tier each run as one job
//! on the shared [`WorkerPool`]. Tiers of one image run concurrently; the set
//! is only returned once all of them have finished.

use std::collections::HashMap;
use std::sync::Arc;

use image::GenericImageView;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::ConversionError;
use crate::ladder::ResolutionLadder;
use crate::sync::SourceImage;

use super::encoder::DerivativeEncoder;
use super::pool::WorkerPool;
use super::set::DerivativeSet;

/// Builds derivative sets for source images.
///
/// Holds no per-image state; one builder is shared by every build of a pass.
///
/// # Example
///
/// ```ignore
/// use image_ladder::derive::{DerivativeBuilder, DerivativeEncoder, WorkerPool};
///
/// let encoder = DerivativeEncoder::default();
/// let builder = DerivativeBuilder::new(ladder, encoder, WorkerPool::default());
/// let set = builder.build(&image).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DerivativeBuilder {
    ladder: Arc<ResolutionLadder>,
    encoder: DerivativeEncoder,
    pool: WorkerPool,
}

impl DerivativeBuilder {
    pub fn new(
        ladder: Arc<ResolutionLadder>,
        encoder: DerivativeEncoder,
        pool: WorkerPool,
    ) -> Self {
        Self {
            ladder,
            encoder,
            pool,
        }
    }

    pub fn ladder(&self) -> &ResolutionLadder {
        &self.ladder
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Build every derivative of one image.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] if the source cannot be decoded or any
    /// derivative fails to encode. Nothing is returned for a partial set.
    pub async fn build(&self, image: &SourceImage) -> Result<DerivativeSet, ConversionError> {
        let encoder = self.encoder;

        let source = image.bytes.clone();
        let decoded = self.pool.run(move || encoder.decode(&source)).await??;
        let decoded = Arc::new(decoded);
        let (width, height) = decoded.dimensions();

        debug!(
            identifier = %image.identifier,
            width,
            height,
            "Decoded source image"
        );

        // Original and resized tiers are independent jobs
        let original = {
            let decoded = Arc::clone(&decoded);
            let pool = self.pool.clone();
            tokio::spawn(async move { pool.run(move || encoder.encode(&decoded)).await })
        };

        let mut tiers = JoinSet::new();
        for &edge in self.ladder.tiers() {
            if width <= edge && height <= edge {
                continue;
            }

            let decoded = Arc::clone(&decoded);
            let pool = self.pool.clone();
            tiers.spawn(async move {
                let payload = pool
                    .run(move || encoder.encode_tier(&decoded, edge))
                    .await??;
                Ok::<_, ConversionError>((edge, payload))
            });
        }

        let mut resized = HashMap::new();
        while let Some(joined) = tiers.join_next().await {
            let (edge, payload) = joined.map_err(|e| ConversionError::Worker {
                message: e.to_string(),
            })??;
            resized.insert(edge, payload);
        }

        let original = original.await.map_err(|e| ConversionError::Worker {
            message: e.to_string(),
        })???;

        let set = DerivativeSet::assemble(&self.ladder, (width, height), original, resized)?;

        debug!(
            identifier = %image.identifier,
            labels = set.len(),
            bytes = set.total_bytes(),
            "Built derivative set"
        );

        Ok(set)
    }
}

// =============================================================================
// Tests
// =============================================================================
