//! HTTP server layer.
//!
//! This module provides the read-only HTTP API over the derivative store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │               GET /{identifier}[.ext]?size={N}                  │
//! │                                                                 │
//! │  ┌──────────────────────┐        ┌───────────────────────────┐  │
//! │  │      handlers        │        │          routes           │  │
//! │  │ (image, health, 404) │        │  (router config, CORS)    │  │
//! │  └──────────────────────┘        └───────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    fallback_handler, health_handler, image_handler, AppState, ErrorResponse, HealthResponse,
    ImageQueryParams, DEFAULT_CACHE_MAX_AGE, RESOLUTION_HEADER,
};
pub use routes::{create_router, RouterConfig};
