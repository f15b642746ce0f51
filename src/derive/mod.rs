//! Derivative build layer.
//!
//! This module converts source images into AVIF derivative sets covering every
//! tier of the resolution ladder.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             SyncScheduler               │
//! └────────────────────┬────────────────────┘
//!                      │ SourceImage
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           DerivativeBuilder             │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  WorkerPool  │  │  AVIF Encoder   │  │
//! │  │  (bounded    │  │  (decode →      │  │
//! │  │   blocking)  │  │   resize → enc) │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ DerivativeSet
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            DerivativeStore              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`DerivativeBuilder`]: Builds the complete set for one image
//! - [`DerivativeEncoder`]: Decodes sources and encodes AVIF payloads
//! - [`DerivativeSet`]: Label to payload mapping that is complete by construction
//! - [`WorkerPool`]: Bounds how many CPU-bound jobs run at once

mod builder;
mod encoder;
mod pool;
mod set;

pub use builder::DerivativeBuilder;
pub use encoder::{
    clamp_quality, fit_inside, is_avif, is_valid_quality, is_valid_speed, DerivativeEncoder,
    DEFAULT_AVIF_QUALITY, DEFAULT_AVIF_SPEED, DERIVATIVE_CONTENT_TYPE, MAX_AVIF_QUALITY,
    MAX_AVIF_SPEED, MIN_AVIF_QUALITY, MIN_AVIF_SPEED,
};
pub use pool::{default_worker_count, WorkerPool};
pub use set::DerivativeSet;
