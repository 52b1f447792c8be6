//! Batch classification of packets against a [`RuleSet`].
//!
//! A search walks every trie of the rule set over every packet, several
//! walks at a time in SIMD lanes, and writes one result per packet per
//! category:
//!
//! ```text
//! results[packet * categories + category]
//! ```
//!
//! Each entry is the result of the highest-priority rule matching that
//! packet in that category, or [`NO_MATCH`](crate::table::NO_MATCH).
//!
//! ## Example
//!
//! ```
//! use acl_run::rules::{RuleSet, TrieLayout};
//! use acl_run::table::{MatchResults, Transition, TransitionTable};
//! use acl_run::search::{search_with, SearchConfig};
//!
//! // One trie: a single range node splitting on the first byte.
//! // Bytes > 0x10 (as i8) go to word 1 (rule 7); the rest to word 0 (no match).
//! let table = TransitionTable::from_transitions(&[
//!     Transition::Match { result: 0 },
//!     Transition::Match { result: 1 },
//! ])
//! .unwrap();
//! let root = Transition::Range {
//!     kind: acl_run::table::RangeKind::Quad,
//!     index: 0,
//!     bounds: [0x10, 127, 127, 127],
//! }
//! .encode()
//! .unwrap();
//! let rules = RuleSet::new(
//!     table,
//!     vec![MatchResults::no_match(), MatchResults::no_match().with(0, 7, 1)],
//!     vec![TrieLayout { root, data_index: vec![0] }],
//!     1,
//! )
//! .unwrap();
//!
//! let data: [&[u8]; 3] = [b"\x20", b"\x05", b"\x7f"];
//! let mut results = [0u32; 3];
//! search_with(&rules, &data, &mut results, 1, &SearchConfig::x4()).unwrap();
//! assert_eq!(results, [7, 0, 7]);
//! ```

mod config;
mod driver;
pub(crate) mod flow;
pub(crate) mod resolve;

use core::fmt;

pub use config::{Isa, SearchConfig, Width};

use crate::rules::RuleSet;
use crate::simd::portable::Portable;
use crate::table::{MAX_CATEGORIES, RESULTS_MULTIPLIER};
use flow::Flow;

#[cfg(target_arch = "x86_64")]
use crate::simd::x86::Sse41;

/// Error returned when search arguments are inconsistent.
///
/// The walk itself cannot fail; these are checked once on entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// Category count is zero, above [`MAX_CATEGORIES`], or neither 1 nor a
    /// multiple of [`RESULTS_MULTIPLIER`].
    InvalidCategories {
        /// The requested category count.
        categories: usize,
    },
    /// More categories requested than the rule set was compiled for.
    CategoriesExceedRuleSet {
        /// The requested category count.
        categories: usize,
        /// The rule set's category count.
        configured: usize,
    },
    /// The result buffer cannot hold one row per packet.
    ResultsTooShort {
        /// Entries required (`packets * categories`).
        needed: usize,
        /// Entries provided.
        len: usize,
    },
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCategories { categories } => write!(
                f,
                "invalid category count {} (expected 1 or a multiple of {} up to {})",
                categories, RESULTS_MULTIPLIER, MAX_CATEGORIES
            ),
            Self::CategoriesExceedRuleSet {
                categories,
                configured,
            } => write!(
                f,
                "{} categories requested, rule set has {}",
                categories, configured
            ),
            Self::ResultsTooShort { needed, len } => write!(
                f,
                "result buffer holds {} entries, {} needed",
                len, needed
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SearchError {}

/// Backend chosen for one call.
#[derive(Clone, Copy, Debug)]
enum Backend {
    Portable(Portable),
    #[cfg(target_arch = "x86_64")]
    Sse41(Sse41),
}

impl Backend {
    fn select(isa: Isa) -> Self {
        match isa {
            Isa::Portable => Self::Portable(Portable),
            Isa::Auto | Isa::Sse41 => Self::detect().unwrap_or_else(|| {
                if isa == Isa::Sse41 {
                    log::debug!("SSE4.1 unavailable, using portable lanes");
                }
                Self::Portable(Portable)
            }),
        }
    }

    #[cfg(target_arch = "x86_64")]
    fn detect() -> Option<Self> {
        Sse41::detect().map(Self::Sse41)
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn detect() -> Option<Self> {
        None
    }
}

/// Classify `data` with the default configuration.
///
/// `results` receives `data.len() * categories` entries, row-major by
/// packet. See [`search_with`].
pub fn search(
    rules: &RuleSet,
    data: &[&[u8]],
    results: &mut [u32],
    categories: usize,
) -> Result<(), SearchError> {
    search_with(rules, data, results, categories, &SearchConfig::default())
}

/// Classify `data` with an explicit configuration.
///
/// `categories` must be 1 or a multiple of 4, at most the rule set's
/// category count. Packet `p`'s result for category `c` is written to
/// `results[p * categories + c]`.
pub fn search_with(
    rules: &RuleSet,
    data: &[&[u8]],
    results: &mut [u32],
    categories: usize,
    config: &SearchConfig,
) -> Result<(), SearchError> {
    check_categories(rules, categories)?;
    let needed = data.len() * categories;
    if results.len() < needed {
        return Err(SearchError::ResultsTooShort {
            needed,
            len: results.len(),
        });
    }

    let backend = Backend::select(config.isa);
    log::debug!(
        "search: {} packets, {} categories, {} tries, {} lanes, {:?}",
        data.len(),
        categories,
        rules.num_tries(),
        config.width.lanes(),
        backend
    );

    let results = &mut results[..needed];
    match config.width {
        Width::X4 => {
            let mut flow = Flow::<4>::new(rules, data, results, categories);
            match backend {
                Backend::Portable(ops) => driver::search_x4(ops, &mut flow),
                #[cfg(target_arch = "x86_64")]
                // SAFETY: the token was produced by runtime detection.
                Backend::Sse41(ops) => unsafe { search_x4_sse41(ops, &mut flow) },
            }
        }
        Width::X8 => {
            let mut flow = Flow::<8>::new(rules, data, results, categories);
            match backend {
                Backend::Portable(ops) => driver::search_x8(ops, &mut flow),
                #[cfg(target_arch = "x86_64")]
                // SAFETY: the token was produced by runtime detection.
                Backend::Sse41(ops) => unsafe { search_x8_sse41(ops, &mut flow) },
            }
        }
    }

    Ok(())
}

fn check_categories(rules: &RuleSet, categories: usize) -> Result<(), SearchError> {
    if categories == 0
        || categories > MAX_CATEGORIES
        || (categories != 1 && categories % RESULTS_MULTIPLIER != 0)
    {
        return Err(SearchError::InvalidCategories { categories });
    }
    if categories > rules.categories() {
        return Err(SearchError::CategoriesExceedRuleSet {
            categories,
            configured: rules.categories(),
        });
    }
    Ok(())
}

// The drivers are `#[inline(always)]`, so these wrappers compile the whole
// walk with SSSE3/SSE4.1 enabled.

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "ssse3", enable = "sse4.1")]
unsafe fn search_x4_sse41(ops: Sse41, flow: &mut Flow<'_, 4>) {
    driver::search_x4(ops, flow)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "ssse3", enable = "sse4.1")]
unsafe fn search_x8_sse41(ops: Sse41, flow: &mut Flow<'_, 8>) {
    driver::search_x8(ops, flow)
}
