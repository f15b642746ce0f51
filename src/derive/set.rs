//! The complete set of derivatives built for one image.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use crate::error::ConversionError;
use crate::ladder::{Label, ResolutionLadder};

/// Mapping from resolution label to encoded payload for one image.
///
/// A set is only constructed through [`DerivativeSet::assemble`], which
/// guarantees one entry per ladder tier plus `original`, and that every tier the
/// source already fits in shares the original payload byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeSet {
    dimensions: (u32, u32),
    entries: BTreeMap<Label, Bytes>,
}

impl DerivativeSet {
    /// Assemble a complete set from the original payload and the resized tiers.
    ///
    /// # Arguments
    ///
    /// * `ladder` - The ladder the set must cover
    /// * `dimensions` - Source `(width, height)` in pixels
    /// * `original` - Full-resolution encoded payload
    /// * `resized` - Encoded payloads keyed by tier edge, for every tier the
    ///   source does not fit in
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::EncodeError`] if a tier that needs resizing
    /// has no payload in `resized`.
    pub fn assemble(
        ladder: &ResolutionLadder,
        dimensions: (u32, u32),
        original: Bytes,
        mut resized: HashMap<u32, Bytes>,
    ) -> Result<Self, ConversionError> {
        let (width, height) = dimensions;
        let mut entries = BTreeMap::new();

        for &edge in ladder.tiers() {
            let payload = if width <= edge && height <= edge {
                original.clone()
            } else {
                resized
                    .remove(&edge)
                    .ok_or_else(|| ConversionError::EncodeError {
                        message: format!("missing derivative for {}", Label::Square(edge)),
                    })?
            };
            entries.insert(Label::Square(edge), payload);
        }

        entries.insert(Label::Original, original);

        Ok(Self {
            dimensions,
            entries,
        })
    }

    /// Source `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    pub fn get(&self, label: Label) -> Option<&Bytes> {
        self.entries.get(&label)
    }

    pub fn original(&self) -> Option<&Bytes> {
        self.entries.get(&Label::Original)
    }

    /// Labels in ascending order, `original` first.
    pub fn labels(&self) -> Vec<Label> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Bytes)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the label set is exactly the ladder's labels plus `original`.
    pub fn is_complete(&self, ladder: &ResolutionLadder) -> bool {
        self.labels() == ladder.labels()
    }

    /// Total encoded size of all distinct payloads in bytes.
    pub fn total_bytes(&self) -> usize {
        let original_ptr = self.original().map(|b| b.as_ptr());
        self.entries
            .iter()
            .filter(|(label, payload)| {
                label.is_original() || Some(payload.as_ptr()) != original_ptr
            })
            .map(|(_, payload)| payload.len())
            .sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
