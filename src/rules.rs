//! Compiled rule sets.
//!
//! A [`RuleSet`] bundles what an external compiler produces for one ACL:
//! the transition table, the match results table, and one entry point per
//! trie. Every trie is walked once per packet; the per-category winners of
//! all tries are merged by priority.
//!
//! The rule set is immutable once built and is `Send + Sync`, so any number
//! of threads may search it at the same time.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::search::{SearchConfig, SearchError};
use crate::table::{
    MatchResults, RangeKind, TableError, Transition, TransitionTable, DFA_GR64_SIZE,
    MAX_CATEGORIES,
};

/// Entry point and input layout of one trie.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrieLayout {
    /// First transition of a walk. No input is consumed to obtain it, so a
    /// match word here describes a trie that matches every packet.
    pub root: u64,
    /// Stream offsets of the 4-byte chunks the walk consumes, in order.
    pub data_index: Vec<u32>,
}

/// Serializable form of a rule set, as written by a table compiler.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuleSetImage {
    /// Number of categories the match results are populated for.
    pub categories: usize,
    /// Packed transition words.
    pub words: Vec<u64>,
    /// Match results, indexed by the result identifier of match words.
    pub matches: Vec<MatchResults>,
    /// One entry per trie.
    pub tries: Vec<TrieLayout>,
}

/// Number of reachable nodes of each kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeCounts {
    /// DFA nodes.
    pub dfa: usize,
    /// Range nodes with boundaries.
    pub quad: usize,
    /// Range nodes with one successor.
    pub single: usize,
    /// Distinct match words.
    pub matches: usize,
}

/// A validated, searchable rule set.
#[derive(Clone, Debug)]
pub struct RuleSet {
    table: TransitionTable,
    matches: Vec<MatchResults>,
    tries: Vec<TrieLayout>,
    categories: usize,
    idle: u64,
    counts: NodeCounts,
}

impl RuleSet {
    /// Validate compiler output and append the idle node.
    ///
    /// Every node reachable from a trie root is decoded once; successor
    /// addresses and result identifiers are checked against the tables so
    /// that the search loop never needs to. Tries must be acyclic: a node
    /// that can reach itself is rejected with [`TableError::Cycle`].
    pub fn new(
        table: TransitionTable,
        matches: Vec<MatchResults>,
        tries: Vec<TrieLayout>,
        categories: usize,
    ) -> Result<Self, TableError> {
        if tries.is_empty() {
            return Err(TableError::NoTries);
        }
        if categories == 0 || categories > MAX_CATEGORIES {
            return Err(TableError::InvalidCategories { categories });
        }

        let counts = validate(table.words(), matches.len(), &tries)?;

        let mut table = table;
        let idle_index = u32::try_from(table.len()).unwrap_or(u32::MAX);
        let idle = Transition::idle(idle_index).encode()?;
        table.push(idle);

        log::debug!(
            "rule set: {} words, {} match entries, {} tries, {} categories, {:?}",
            table.len(),
            matches.len(),
            tries.len(),
            categories,
            counts
        );

        Ok(Self {
            table,
            matches,
            tries,
            categories,
            idle,
            counts,
        })
    }

    /// Build from a compiler image.
    pub fn from_image(image: RuleSetImage) -> Result<Self, TableError> {
        Self::new(
            TransitionTable::from_words(image.words),
            image.matches,
            image.tries,
            image.categories,
        )
    }

    /// Recover the compiler image (without the idle node).
    pub fn to_image(&self) -> RuleSetImage {
        let words = self.table.words();
        RuleSetImage {
            categories: self.categories,
            words: words[..words.len() - 1].to_vec(),
            matches: self.matches.clone(),
            tries: self.tries.clone(),
        }
    }

    /// Classify `data` with the default [`SearchConfig`].
    ///
    /// See [`crate::search::search`].
    pub fn search(
        &self,
        data: &[&[u8]],
        results: &mut [u32],
        categories: usize,
    ) -> Result<(), SearchError> {
        crate::search::search(self, data, results, categories)
    }

    /// Classify `data` with an explicit configuration.
    pub fn search_with(
        &self,
        data: &[&[u8]],
        results: &mut [u32],
        categories: usize,
        config: &SearchConfig,
    ) -> Result<(), SearchError> {
        crate::search::search_with(self, data, results, categories, config)
    }

    /// The transition table, including the trailing idle node.
    #[inline]
    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Number of tries walked per packet.
    #[inline]
    pub fn num_tries(&self) -> usize {
        self.tries.len()
    }

    /// Number of categories the rule set was compiled for.
    #[inline]
    pub fn categories(&self) -> usize {
        self.categories
    }

    /// Word parked in lanes that have no work.
    #[inline]
    pub fn idle(&self) -> u64 {
        self.idle
    }

    /// Reachable node statistics gathered during validation.
    #[inline]
    pub fn node_counts(&self) -> NodeCounts {
        self.counts
    }

    #[inline]
    pub(crate) fn trie(&self, n: usize) -> &TrieLayout {
        &self.tries[n]
    }

    #[inline]
    pub(crate) fn match_results(&self, result: usize) -> &MatchResults {
        &self.matches[result]
    }
}

/// Depth-first walk state of a node.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current path.
    Open,
    /// Fully explored.
    Closed,
}

/// A node on the current path and the successors still to visit.
struct Frame {
    word: u64,
    successors: Vec<u64>,
    next: usize,
}

/// Walk every node reachable from the trie roots.
///
/// A successor that is still on the current path closes a cycle, and a
/// lane walking that cycle would never reach a match word.
fn validate(
    words: &[u64],
    matches: usize,
    tries: &[TrieLayout],
) -> Result<NodeCounts, TableError> {
    let mut counts = NodeCounts::default();
    let mut marks: BTreeMap<u64, Mark> = BTreeMap::new();
    let mut stack: Vec<Frame> = Vec::new();

    for trie in tries {
        if marks.contains_key(&trie.root) {
            continue;
        }
        marks.insert(trie.root, Mark::Open);
        stack.push(enter(trie.root, words, matches, &mut counts)?);

        while let Some(frame) = stack.last_mut() {
            let Some(&next) = frame.successors.get(frame.next) else {
                marks.insert(frame.word, Mark::Closed);
                stack.pop();
                continue;
            };
            frame.next += 1;
            match marks.get(&next) {
                Some(Mark::Open) => return Err(TableError::Cycle { word: next }),
                Some(Mark::Closed) => {}
                None => {
                    marks.insert(next, Mark::Open);
                    stack.push(enter(next, words, matches, &mut counts)?);
                }
            }
        }
    }

    Ok(counts)
}

/// Decode and count one node, checking its successors against the table.
fn enter(
    word: u64,
    words: &[u64],
    matches: usize,
    counts: &mut NodeCounts,
) -> Result<Frame, TableError> {
    let transition = Transition::decode(word)?;
    match transition {
        Transition::Match { result } => {
            if result as usize >= matches {
                return Err(TableError::ResultOutOfRange { result, matches });
            }
            counts.matches += 1;
            return Ok(Frame {
                word,
                successors: Vec::new(),
                next: 0,
            });
        }
        Transition::Dfa { .. } => counts.dfa += 1,
        Transition::Range {
            kind: RangeKind::Quad,
            ..
        } => counts.quad += 1,
        Transition::Range {
            kind: RangeKind::Single,
            ..
        } => counts.single += 1,
    }

    let max = transition
        .max_successor()
        .ok_or(TableError::InvalidCorrection { word })?;
    if max >= words.len() {
        return Err(TableError::SuccessorOutOfRange {
            word,
            address: max,
            len: words.len(),
        });
    }

    let mut successors = Vec::new();
    match transition {
        Transition::Dfa { index, corrections } => {
            for (group, &c) in corrections.iter().enumerate() {
                let base = index as usize + group * DFA_GR64_SIZE - c as usize;
                successors.extend_from_slice(&words[base..base + DFA_GR64_SIZE]);
            }
        }
        Transition::Range { index, .. } => {
            successors.extend_from_slice(&words[index as usize..=max]);
        }
        Transition::Match { .. } => {}
    }
    successors.sort_unstable();
    successors.dedup();

    Ok(Frame {
        word,
        successors,
        next: 0,
    })
}
