//! Packed transition words and the read-only transition table.
//!
//! A compiled rule set is a flat array of 64-bit transition words. Each word
//! points at a trie node and carries everything needed to pick that node's
//! successor for one input byte:
//!
//! ```text
//!  63                              32 31  29 28                           0
//! +----------------------------------+------+------------------------------+
//! |          node payload            | type |            index             |
//! +----------------------------------+------+------------------------------+
//! ```
//!
//! | Type     | Index                        | Payload                              |
//! |----------|------------------------------|--------------------------------------|
//! | `DFA`    | base of compacted successors | one correction byte per 64-byte group |
//! | `SINGLE` | base of the single successor | `0x7f7f7f7f`                         |
//! | `QRANGE` | base of up to 5 successors   | four sorted signed-byte boundaries   |
//! | `MATCH`  | result identifier            | unused                               |
//!
//! Inside the crate words are handled as [`Transition`] values; the packed
//! form only exists in the [`TransitionTable`] and the lane registers.

use alloc::vec::Vec;
use core::fmt;

use bytemuck::{Pod, Zeroable};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// =============================================================================
// Word layout
// =============================================================================

/// Bit position of the node-type tag in the low half of a word.
pub const TYPE_SHIFT: u32 = 29;

/// Node-type tag of a DFA node.
pub const NODE_DFA: u32 = 0;

/// Node-type tag of a range node with a single successor.
pub const NODE_SINGLE: u32 = 1 << TYPE_SHIFT;

/// Node-type tag of a range node with up to four boundaries.
pub const NODE_QRANGE: u32 = 3 << TYPE_SHIFT;

/// Node-type tag of a terminal node. Any word with this bit set is a match.
pub const NODE_MATCH: u32 = 4 << TYPE_SHIFT;

/// Mask of the node-type tag.
pub const NODE_TYPE: u32 = 7 << TYPE_SHIFT;

/// Mask of the index bits.
pub const NODE_INDEX: u32 = !NODE_TYPE;

/// Exclusive upper bound of an index or result identifier.
pub const MAX_INDEX: u32 = 1 << TYPE_SHIFT;

/// Payload of a range node whose every input byte selects successor 0.
pub const QUAD_SINGLE: u64 = 0x7f7f_7f7f_0000_0000;

/// Number of boundary bytes in a range node payload.
pub const QUAD_SIZE: usize = 4;

/// Maximum number of successors of a range node.
pub const QUAD_MAX: usize = QUAD_SIZE + 1;

/// Number of conceptual successors of a DFA node.
pub const DFA_SIZE: usize = 256;

/// Number of input values covered by one DFA correction byte.
pub const DFA_GR64_SIZE: usize = 64;

/// Number of correction bytes of a DFA node.
pub const DFA_GR64_NUM: usize = DFA_SIZE / DFA_GR64_SIZE;

/// Maximum number of result categories.
pub const MAX_CATEGORIES: usize = 16;

/// Number of categories merged by one vector operation.
pub const RESULTS_MULTIPLIER: usize = 4;

/// Result value meaning "no rule matched" for a category.
pub const NO_MATCH: u32 = 0;

// =============================================================================
// Errors
// =============================================================================

/// Error raised when a transition table or rule set fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// A byte image is not a whole number of 64-bit words.
    ImageLength {
        /// Length of the image in bytes.
        len: usize,
    },
    /// A word carries a node-type tag the decoder does not know.
    UnknownNodeType {
        /// The offending word.
        word: u64,
    },
    /// A range node's boundaries are not sorted as signed bytes.
    UnsortedBounds {
        /// The offending word.
        word: u64,
    },
    /// An index does not fit in the 29 index bits.
    IndexOverflow {
        /// The index that was requested.
        index: u32,
    },
    /// A DFA correction byte exceeds the base of its input group.
    InvalidCorrection {
        /// The offending word.
        word: u64,
    },
    /// A node's successors extend past the end of the table.
    SuccessorOutOfRange {
        /// The word pointing at the node.
        word: u64,
        /// Highest successor address the node can produce.
        address: usize,
        /// Number of words in the table.
        len: usize,
    },
    /// A match word names a result identifier with no match results entry.
    ResultOutOfRange {
        /// The result identifier.
        result: u32,
        /// Number of match results entries.
        matches: usize,
    },
    /// A node can reach itself, so a walk through it would never end.
    Cycle {
        /// A word on the cycle.
        word: u64,
    },
    /// The rule set has no tries.
    NoTries,
    /// The rule set's category count is zero or above [`MAX_CATEGORIES`].
    InvalidCategories {
        /// The requested category count.
        categories: usize,
    },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageLength { len } => {
                write!(f, "table image length {} is not a multiple of 8", len)
            }
            Self::UnknownNodeType { word } => {
                write!(f, "unknown node type in transition 0x{:016x}", word)
            }
            Self::UnsortedBounds { word } => {
                write!(f, "unsorted range boundaries in transition 0x{:016x}", word)
            }
            Self::IndexOverflow { index } => {
                write!(f, "index {} does not fit in {} bits", index, TYPE_SHIFT)
            }
            Self::InvalidCorrection { word } => {
                write!(f, "invalid DFA correction in transition 0x{:016x}", word)
            }
            Self::SuccessorOutOfRange { word, address, len } => write!(
                f,
                "transition 0x{:016x} reaches address {} in a table of {} words",
                word, address, len
            ),
            Self::ResultOutOfRange { result, matches } => write!(
                f,
                "result {} out of range ({} match entries)",
                result, matches
            ),
            Self::Cycle { word } => {
                write!(f, "transition 0x{:016x} is reachable from itself", word)
            }
            Self::NoTries => write!(f, "rule set has no tries"),
            Self::InvalidCategories { categories } => write!(
                f,
                "invalid category count {} (expected 1..={})",
                categories, MAX_CATEGORIES
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TableError {}

// =============================================================================
// Tagged transition
// =============================================================================

/// Which flavour of range node a [`Transition::Range`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RangeKind {
    /// One successor; every boundary is `0x7f`.
    Single,
    /// Up to five successors selected by four boundaries.
    Quad,
}

/// Decoded form of a packed transition word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Byte-indexed node stored as up to four 64-entry groups.
    ///
    /// The successor of input `b` lives at
    /// `index + b - corrections[b / 64]`.
    Dfa {
        /// Base of the compacted successor array.
        index: u32,
        /// Per-group offset correction, produced by the table compiler.
        corrections: [u8; DFA_GR64_NUM],
    },
    /// Node whose successor is `index + rank`, where `rank` counts the
    /// boundaries strictly below the input byte (both read as `i8`).
    Range {
        /// Node flavour.
        kind: RangeKind,
        /// Base of the successors.
        index: u32,
        /// Sorted signed boundaries; unused slots are `0x7f`.
        bounds: [i8; QUAD_SIZE],
    },
    /// Terminal node. Lanes parked here do not move.
    Match {
        /// Index into the rule set's match results.
        result: u32,
    },
}

impl Transition {
    /// Self-looping node used by lanes without work: every byte ranks 0.
    pub const fn idle(index: u32) -> Self {
        Self::Range {
            kind: RangeKind::Single,
            index,
            bounds: [i8::MAX; QUAD_SIZE],
        }
    }

    /// Decode a packed word.
    pub fn decode(word: u64) -> Result<Self, TableError> {
        let lo = word as u32;
        let payload = ((word >> 32) as u32).to_le_bytes();
        let index = lo & NODE_INDEX;

        if lo & NODE_MATCH != 0 {
            return Ok(Self::Match { result: index });
        }

        match lo & NODE_TYPE {
            NODE_DFA => Ok(Self::Dfa {
                index,
                corrections: payload,
            }),
            tag @ (NODE_SINGLE | NODE_QRANGE) => {
                let bounds = payload.map(|b| b as i8);
                if bounds.windows(2).any(|w| w[0] > w[1]) {
                    return Err(TableError::UnsortedBounds { word });
                }
                let kind = if tag == NODE_SINGLE {
                    RangeKind::Single
                } else {
                    RangeKind::Quad
                };
                Ok(Self::Range {
                    kind,
                    index,
                    bounds,
                })
            }
            _ => Err(TableError::UnknownNodeType { word }),
        }
    }

    /// Pack into a word, checking that the index fits.
    pub fn encode(self) -> Result<u64, TableError> {
        let (tag, index, payload) = match self {
            Self::Dfa { index, corrections } => (NODE_DFA, index, u32::from_le_bytes(corrections)),
            Self::Range {
                kind,
                index,
                bounds,
            } => {
                let tag = match kind {
                    RangeKind::Single => NODE_SINGLE,
                    RangeKind::Quad => NODE_QRANGE,
                };
                (tag, index, u32::from_le_bytes(bounds.map(|b| b as u8)))
            }
            Self::Match { result } => (NODE_MATCH, result, 0),
        };
        if index >= MAX_INDEX {
            return Err(TableError::IndexOverflow { index });
        }
        Ok((u64::from(payload) << 32) | u64::from(tag | index))
    }

    /// True for terminal nodes.
    #[inline]
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }

    /// Successor address for one input byte, or `None` on a match node (or a
    /// DFA correction that would underflow).
    ///
    /// This is the scalar statement of what the lane backends compute.
    pub fn successor(&self, byte: u8) -> Option<usize> {
        match *self {
            Self::Dfa { index, corrections } => {
                let group = (byte as usize) / DFA_GR64_SIZE;
                (index as usize + byte as usize).checked_sub(corrections[group] as usize)
            }
            Self::Range { index, bounds, .. } => {
                let rank = bounds.iter().filter(|&&b| (byte as i8) > b).count();
                Some(index as usize + rank)
            }
            Self::Match { .. } => None,
        }
    }

    /// Highest address [`successor`](Self::successor) can return, or `None`
    /// on a match node. `None` is also returned for a DFA correction larger
    /// than its group base, which can never produce a valid address.
    pub fn max_successor(&self) -> Option<usize> {
        match *self {
            Self::Dfa { index, corrections } => corrections
                .iter()
                .enumerate()
                .map(|(group, &c)| {
                    (index as usize + group * DFA_GR64_SIZE + DFA_GR64_SIZE - 1)
                        .checked_sub(c as usize)
                        .filter(|_| c as usize <= group * DFA_GR64_SIZE)
                })
                .try_fold(0usize, |max, addr| addr.map(|a| max.max(a))),
            Self::Range { index, bounds, .. } => {
                let reachable = bounds.iter().filter(|&&b| b < i8::MAX).count();
                Some(index as usize + reachable)
            }
            Self::Match { .. } => None,
        }
    }
}

// =============================================================================
// Match results
// =============================================================================

/// Per-category outcome of reaching one match node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(C)]
pub struct MatchResults {
    /// Rule result per category, [`NO_MATCH`] when no rule applies.
    pub results: [u32; MAX_CATEGORIES],
    /// Priority of each result; higher wins.
    pub priority: [i32; MAX_CATEGORIES],
}

impl MatchResults {
    /// Entry that matches nothing in any category.
    pub const fn no_match() -> Self {
        Self {
            results: [NO_MATCH; MAX_CATEGORIES],
            priority: [i32::MIN; MAX_CATEGORIES],
        }
    }

    /// Set one category's result and priority.
    pub fn with(mut self, category: usize, result: u32, priority: i32) -> Self {
        self.results[category] = result;
        self.priority[category] = priority;
        self
    }
}

impl Default for MatchResults {
    fn default() -> Self {
        Self::no_match()
    }
}

// =============================================================================
// Transition table
// =============================================================================

/// Immutable array of packed transition words.
///
/// The table is never written during a search and can be shared by any
/// number of concurrent searches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionTable {
    words: Vec<u64>,
}

impl TransitionTable {
    /// Wrap words produced by a table compiler.
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    /// Encode a sequence of decoded transitions.
    pub fn from_transitions(transitions: &[Transition]) -> Result<Self, TableError> {
        let words = transitions
            .iter()
            .map(|t| t.encode())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { words })
    }

    /// Load a native-endian byte image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        if bytes.len() % 8 != 0 {
            return Err(TableError::ImageLength { len: bytes.len() });
        }
        // The image may be unaligned, so copy rather than cast in place.
        Ok(Self {
            words: bytemuck::pod_collect_to_vec(bytes),
        })
    }

    /// Native-endian byte view of the words.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    /// The packed words.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of words.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when the table holds no words.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub(crate) fn push(&mut self, word: u64) {
        self.words.push(word);
    }
}
