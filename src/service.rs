//! Read path for derivative requests.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       ImageService                         │
//! │                                                            │
//! │   "/cat.png" ──parse──► "cat"                              │
//! │   size=50    ──resolve─► 64x64                             │
//! │                                                            │
//! │          get("cat", 64x64) ──► DerivativeStore             │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Store outages read as "no data": connection and command failures are logged
//! and answered as not found. A stored payload that cannot be decoded is an
//! internal error.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error};

use crate::error::{RequestError, StoreError};
use crate::ladder::{Label, ResolutionResolver};
use crate::store::DerivativeStore;

/// A derivative ready to be returned to a client.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    /// Encoded AVIF payload
    pub data: Bytes,

    /// Resolution the payload was served at
    pub label: Label,
}

/// Serves derivatives from the store.
pub struct ImageService<S: ?Sized> {
    store: Arc<S>,
    resolver: ResolutionResolver,
}

impl<S: DerivativeStore + ?Sized> ImageService<S> {
    pub fn new(store: Arc<S>, resolver: ResolutionResolver) -> Self {
        Self { store, resolver }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &ResolutionResolver {
        &self.resolver
    }

    /// Fetch the derivative of `identifier` closest to the requested size.
    ///
    /// # Errors
    ///
    /// - [`RequestError::NotFound`] if the image or the resolved resolution is
    ///   not stored, or the store is unreachable
    /// - [`RequestError::Internal`] if the stored payload is corrupt
    pub async fn get_image(
        &self,
        identifier: &str,
        size: Option<&str>,
    ) -> Result<ImageResponse, RequestError> {
        let label = self.resolver.resolve(size);

        let not_found = || RequestError::NotFound {
            identifier: identifier.to_string(),
            label: label.to_string(),
        };

        if identifier.is_empty() {
            return Err(not_found());
        }

        match self.store.get(identifier, label).await {
            Ok(Some(data)) => {
                debug!(
                    identifier = %identifier,
                    label = %label,
                    bytes = data.len(),
                    "Serving derivative"
                );
                Ok(ImageResponse { data, label })
            }
            Ok(None) => Err(not_found()),
            Err(e @ StoreError::Payload { .. }) => Err(RequestError::Internal {
                message: e.to_string(),
            }),
            Err(e) => {
                error!(identifier = %identifier, label = %label, error = %e, "Store read failed");
                Err(not_found())
            }
        }
    }
}

/// Image identifier of a request path segment.
///
/// Drops a leading `/` and the last extension: `"/cat.png"` becomes `"cat"`
/// and `"my.photo.jpg"` becomes `"my.photo"`. Dotfile-style names such as
/// `".png"` keep their text.
pub fn parse_identifier(raw: &str) -> &str {
    let trimmed = raw.strip_prefix('/').unwrap_or(raw);

    match trimmed.rfind('.') {
        Some(index) if index > 0 => &trimmed[..index],
        _ => trimmed,
    }
}

// =============================================================================
// Tests
// =============================================================================
