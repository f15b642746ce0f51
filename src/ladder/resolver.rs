//! Maps a requested pixel size onto a ladder label.
//!
//! Selection uses the ceiling policy: the smallest tier whose edge is at least
//! the requested size. Clients therefore never receive fewer pixels than they
//! asked for while a larger tier exists. Requests above the largest tier, and
//! requests that are not a positive integer, fall back to `original`.

use std::sync::Arc;

use super::{Label, ResolutionLadder};

/// Resolves requested sizes to ladder labels.
#[derive(Debug, Clone)]
pub struct ResolutionResolver {
    ladder: Arc<ResolutionLadder>,
}

impl ResolutionResolver {
    pub fn new(ladder: Arc<ResolutionLadder>) -> Self {
        Self { ladder }
    }

    /// Resolve the raw `size` query value of a request.
    ///
    /// Absent or unparseable values resolve to [`Label::Original`].
    pub fn resolve(&self, requested: Option<&str>) -> Label {
        match requested.and_then(parse_positive_size) {
            Some(size) => self.resolve_size(size),
            None => Label::Original,
        }
    }

    /// Resolve an already-parsed size.
    pub fn resolve_size(&self, size: u32) -> Label {
        if size == 0 {
            return Label::Original;
        }

        // Tiers are sorted, so the partition point is the first tier >= size
        let tiers = self.ladder.tiers();
        let index = tiers.partition_point(|&edge| edge < size);

        match tiers.get(index) {
            Some(&edge) => Label::Square(edge),
            None => Label::Original,
        }
    }

    /// The ladder this resolver selects from.
    pub fn ladder(&self) -> &ResolutionLadder {
        &self.ladder
    }
}

fn parse_positive_size(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().filter(|&size| size > 0)
}

// =============================================================================
// Tests
// =============================================================================
