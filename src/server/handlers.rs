//! HTTP request handlers for the image API.
//!
//! This module contains the Axum handlers for serving derivatives and health
//! checks.
//!
//! # Endpoints
//!
//! - `GET /{filename}?size={N}` - Serve a derivative
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::derive::DERIVATIVE_CONTENT_TYPE;
use crate::error::RequestError;
use crate::service::{parse_identifier, ImageService};
use crate::store::DerivativeStore;

/// Default Cache-Control max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Response header carrying the label a derivative was served at.
pub const RESOLUTION_HEADER: HeaderName = HeaderName::from_static("x-image-resolution");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the image service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: ?Sized> {
    /// The image service answering derivative requests
    pub image_service: Arc<ImageService<S>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl<S: DerivativeStore + ?Sized> AppState<S> {
    /// Create a new application state with the default cache max-age.
    pub fn new(image_service: ImageService<S>) -> Self {
        Self::with_cache_max_age(image_service, DEFAULT_CACHE_MAX_AGE)
    }

    /// Create a new application state with custom cache max-age.
    pub fn with_cache_max_age(image_service: ImageService<S>, cache_max_age: u32) -> Self {
        Self {
            image_service: Arc::new(image_service),
            cache_max_age,
        }
    }
}

impl<S: ?Sized> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            image_service: Arc::clone(&self.image_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for image requests.
#[derive(Debug, Default, Deserialize)]
pub struct ImageQueryParams {
    /// Requested edge length in pixels; anything but a positive integer
    /// serves the original
    #[serde(default)]
    pub size: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "internal_error")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" when the store answers, "degraded" otherwise
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert RequestError to HTTP response.
///
/// 404s are logged at DEBUG level; 500s at ERROR level with the internal
/// detail, which never reaches the client.
impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            RequestError::NotFound { identifier, label } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Image not found: {} at {}", identifier, label),
            ),
            RequestError::Internal { message } => {
                error!(
                    status = StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    "Server error: {}", message
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle image requests.
///
/// # Endpoint
///
/// `GET /{filename}`
///
/// # Path Parameters
///
/// - `filename`: Image identifier with an optional extension (`cat` or `cat.png`)
///
/// # Query Parameters
///
/// - `size`: Requested edge length in pixels (optional)
///
/// # Response
///
/// - `200 OK`: AVIF payload
/// - `404 Not Found`: Unknown image or resolution
/// - `500 Internal Server Error`: Stored payload is corrupt
///
/// # Headers
///
/// - `Content-Type: image/avif`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Image-Resolution: original|{N}x{N}`
pub async fn image_handler<S>(
    State(state): State<AppState<S>>,
    Path(filename): Path<String>,
    query: Result<Query<ImageQueryParams>, QueryRejection>,
) -> Result<Response, RequestError>
where
    S: DerivativeStore + ?Sized,
{
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            warn!(error = %rejection, "Ignoring malformed query string");
            ImageQueryParams::default()
        }
    };

    let identifier = parse_identifier(&filename);
    let response = state
        .image_service
        .get_image(identifier, query.size.as_deref())
        .await?;

    let headers = [
        (header::CONTENT_TYPE, DERIVATIVE_CONTENT_TYPE.to_string()),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (RESOLUTION_HEADER, response.label.to_string()),
    ];

    Ok((StatusCode::OK, headers, Body::from(response.data)).into_response())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` when the store answers a ping, `503 Service Unavailable` otherwise:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler<S>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<HealthResponse>)
where
    S: DerivativeStore + ?Sized,
{
    let (status, label) = match state.image_service.store().ping().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!(error = %e, "Health check could not reach the store");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Catch-all for routes that match nothing.
pub async fn fallback_handler() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not Found" })),
    )
}

// =============================================================================
// Tests
// =============================================================================
