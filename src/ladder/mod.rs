//! Resolution ladder and request resolution.
//!
//! The ladder is the fixed, strictly increasing set of square edge lengths for
//! which derivatives are pre-built. Every image carries one derivative per
//! ladder tier plus the `original` sentinel tier.
//!
//! ```text
//!   requested size ──► ResolutionResolver ──► Label ──► DerivativeStore
//!                             │
//!                             ▼
//!         original │ 32x32 │ 64x64 │ 128x128 │ ... │ 8192x8192
//! ```
//!
//! # Components
//!
//! - [`Label`]: Typed resolution label (`original` or `{N}x{N}`)
//! - [`ResolutionLadder`]: Immutable, validated list of tier edge lengths
//! - [`ResolutionResolver`]: Ceiling selection of a tier for a requested size

mod resolver;

use std::fmt;
use std::str::FromStr;

pub use resolver::ResolutionResolver;

/// Tier edge lengths used when none are configured.
pub const DEFAULT_LADDER: [u32; 9] = [32, 64, 128, 256, 512, 1024, 2048, 4096, 8192];

/// Field name of the full-resolution derivative.
pub const ORIGINAL_LABEL: &str = "original";

// =============================================================================
// Label
// =============================================================================

/// Resolution label of a stored derivative.
///
/// Ordering places `Original` first, then square tiers by edge length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    /// Full-resolution derivative
    Original,

    /// Square tier with the given edge length in pixels
    Square(u32),
}

impl Label {
    /// Edge length of a square tier, `None` for the original.
    pub fn edge(&self) -> Option<u32> {
        match self {
            Label::Original => None,
            Label::Square(edge) => Some(*edge),
        }
    }

    pub fn is_original(&self) -> bool {
        matches!(self, Label::Original)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Original => f.write_str(ORIGINAL_LABEL),
            Label::Square(edge) => write!(f, "{}x{}", edge, edge),
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ORIGINAL_LABEL {
            return Ok(Label::Original);
        }

        let (width, height) = s
            .split_once('x')
            .ok_or_else(|| format!("invalid resolution label: {}", s))?;
        let width: u32 = width
            .parse()
            .map_err(|_| format!("invalid resolution label: {}", s))?;
        let height: u32 = height
            .parse()
            .map_err(|_| format!("invalid resolution label: {}", s))?;

        if width != height || width == 0 {
            return Err(format!("resolution label is not a square tier: {}", s));
        }

        Ok(Label::Square(width))
    }
}

// =============================================================================
// Resolution Ladder
// =============================================================================

/// Fixed, strictly increasing set of square edge lengths.
///
/// Shared read-only by the derivative builder and the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionLadder {
    tiers: Vec<u32>,
}

impl ResolutionLadder {
    /// Create a ladder from tier edge lengths.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty, contains a zero edge, or is not
    /// strictly increasing.
    pub fn new(tiers: Vec<u32>) -> Result<Self, String> {
        if tiers.is_empty() {
            return Err("resolution ladder must contain at least one tier".to_string());
        }
        if tiers.contains(&0) {
            return Err("resolution ladder tiers must be greater than 0".to_string());
        }
        if tiers.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("resolution ladder must be strictly increasing".to_string());
        }

        Ok(Self { tiers })
    }

    /// Tier edge lengths in ascending order.
    pub fn tiers(&self) -> &[u32] {
        &self.tiers
    }

    /// Largest tier edge length.
    pub fn max_edge(&self) -> u32 {
        // Non-empty by construction
        self.tiers.last().copied().unwrap_or_default()
    }

    /// Whether `edge` is one of the ladder tiers.
    pub fn contains(&self, edge: u32) -> bool {
        self.tiers.binary_search(&edge).is_ok()
    }

    /// Every label a complete derivative set carries: `original` then each tier.
    pub fn labels(&self) -> Vec<Label> {
        std::iter::once(Label::Original)
            .chain(self.tiers.iter().map(|&edge| Label::Square(edge)))
            .collect()
    }

    /// Number of labels in a complete derivative set.
    pub fn label_count(&self) -> usize {
        self.tiers.len() + 1
    }
}

impl Default for ResolutionLadder {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_LADDER.to_vec(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
