//! Configuration for searches.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of concurrent trie walks per search call.
///
/// Both widths produce identical results; the wider one amortizes loop
/// overhead over two independent lane groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Width {
    /// One group of four lanes.
    X4,
    /// Two groups of four lanes.
    #[default]
    X8,
}

impl Width {
    /// Number of lanes.
    pub const fn lanes(self) -> usize {
        match self {
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }
}

/// Instruction set used for the lane groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Isa {
    /// SSE4.1 when the CPU supports it, otherwise portable.
    #[default]
    Auto,
    /// Emulated vectors; runs on every target.
    Portable,
    /// SSSE3/SSE4.1 intrinsics. Falls back to portable when unavailable.
    Sse41,
}

/// Configuration for [`search_with`](super::search_with).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchConfig {
    /// Lanes per call (default: [`Width::X8`])
    pub width: Width,
    /// Backend selection (default: [`Isa::Auto`])
    pub isa: Isa,
}

impl SearchConfig {
    /// Configuration with four lanes.
    pub fn x4() -> Self {
        Self {
            width: Width::X4,
            ..Self::default()
        }
    }

    /// Configuration with eight lanes.
    pub fn x8() -> Self {
        Self::default()
    }

    /// Set the number of lanes.
    pub fn with_width(mut self, width: Width) -> Self {
        self.width = width;
        self
    }

    /// Set the backend.
    pub fn with_isa(mut self, isa: Isa) -> Self {
        self.isa = isa;
        self
    }
}
