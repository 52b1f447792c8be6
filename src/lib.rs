//! # acl-run
//!
//! Vectorized trie-walk classification of packets against compiled ACL rule
//! sets.
//!
//! A rule set compiler (not part of this crate) turns an access control list
//! into one or more tries over the packet's bytes and flattens them into a
//! table of packed 64-bit transition words. This crate runs those tables:
//! many (packet, trie) walks proceed at once in SIMD lanes, one input byte
//! per lane per step, and the results of all tries are merged per category
//! by rule priority.
//!
//! ## Module Organization
//!
//! - [`table`] - Packed transition words, match results and the transition table
//! - [`rules`] - Validated rule sets and their serializable image
//! - [`search`] - Batch classification and its configuration
//!
//! ## Quick Start
//!
//! ```
//! use acl_run::{search, MatchResults, RuleSet, TransitionTable, TrieLayout, NODE_MATCH};
//!
//! // A trie whose root is already a match: every packet gets rule 3.
//! let root = u64::from(NODE_MATCH | 1);
//! let rules = RuleSet::new(
//!     TransitionTable::from_words(vec![root]),
//!     vec![MatchResults::no_match(), MatchResults::no_match().with(0, 3, 10)],
//!     vec![TrieLayout { root, data_index: vec![] }],
//!     1,
//! )?;
//!
//! let packets: [&[u8]; 2] = [b"first", b"second"];
//! let mut results = [0u32; 2];
//! search(&rules, &packets, &mut results, 1)?;
//! assert_eq!(results, [3, 3]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Features
//!
//! - `std` (default) - Runtime CPU feature detection and `std::error::Error` impls
//! - `serde` - Serialization of rule set images and configuration
//! - `cli` - The `acl-run` command-line tool

// Use no_std unless std feature is enabled or we're in test mode
#![cfg_attr(not(any(test, feature = "std")), no_std)]

// When using no_std, we need to explicitly link the alloc crate
#[cfg(not(any(test, feature = "std")))]
extern crate alloc;

// When using std, re-export alloc types from std for compatibility
#[cfg(any(test, feature = "std"))]
extern crate std as alloc;

// =============================================================================
// Core modules
// =============================================================================

/// Packed transition words and the transition table.
pub mod table;

/// Compiled rule sets.
pub mod rules;

/// Batch classification.
pub mod search;

/// SIMD lane-group backends (not part of public API).
pub(crate) mod simd;

// =============================================================================
// Public re-exports
// =============================================================================

pub use rules::{NodeCounts, RuleSet, RuleSetImage, TrieLayout};
pub use search::{search, search_with, Isa, SearchConfig, SearchError, Width};
pub use table::{
    MatchResults, RangeKind, TableError, Transition, TransitionTable, MAX_CATEGORIES, NODE_MATCH,
    NO_MATCH,
};
