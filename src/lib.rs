//! # image-ladder
//!
//! Multi-resolution AVIF derivatives for images kept in a git repository.
//!
//! A background scheduler mirrors the upstream repository, and whenever it
//! changes, re-encodes every source image as AVIF at a fixed ladder of square
//! sizes. Each image's derivatives are committed to Redis as one record. An
//! HTTP server answers `GET /<image>?size=<N>` straight from the store with
//! the smallest derivative that is at least `N` pixels.
//!
//! ## Features
//!
//! - **Pre-built derivatives**: no encoding on the request path
//! - **Never upscales**: sizes the source already fits in share the original
//! - **Atomic records**: readers never see a half-updated derivative set
//! - **Bounded work**: CPU-bound encoding runs on a fixed-size worker pool
//!
//! ## Architecture
//!
//! ```text
//!   upstream git ──► sync ──► derive ──► store (Redis) ◄── service ◄── server
//!                    └─────── scheduler ──────┘
//! ```
//!
//! - [`sync`] - Repository mirror and source image enumeration
//! - [`derive`] - Decoding, resizing and AVIF encoding
//! - [`store`] - Derivative storage (Redis and in-memory)
//! - [`ladder`] - Resolution ladder and size resolution
//! - [`scheduler`] - Periodic sync and rebuild loop
//! - [`service`] - Read path from request to stored derivative
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types

pub mod config;
pub mod derive;
pub mod error;
pub mod ladder;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use derive::{DerivativeBuilder, DerivativeEncoder, DerivativeSet, WorkerPool};
pub use error::{ConversionError, RequestError, StoreError, SyncError};
pub use ladder::{Label, ResolutionLadder, ResolutionResolver, DEFAULT_LADDER};
pub use scheduler::{SyncScheduler, TickReport};
pub use server::{create_router, AppState, RouterConfig};
pub use service::{parse_identifier, ImageResponse, ImageService};
pub use store::{record_key, DerivativeStore, MemoryStore, RedisStore};
pub use sync::{GitSyncer, SourceImage, SourceRepository, SourceSyncer};
