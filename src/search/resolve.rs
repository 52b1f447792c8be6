//! Match detection and cross-trie priority resolution.
//!
//! Each completed trie walk yields one [`MatchResults`] entry. The packet's
//! running best is merged with it one group of [`RESULTS_MULTIPLIER`]
//! categories at a time: the first completed trie of a packet overwrites the
//! record (it still holds the previous packet's values), later ones replace a
//! category only with a strictly higher priority, so ties keep the result of
//! the trie that completed first.

use crate::simd::{LaneOps, ResultGroup};
use crate::table::{MatchResults, RESULTS_MULTIPLIER};

use super::flow::Flow;

/// Merge `matched` into a packet's running best for all categories in
/// `best`. `best.len()` must be a multiple of [`RESULTS_MULTIPLIER`].
pub(crate) fn resolve_priority<B: LaneOps>(
    ops: B,
    first: bool,
    best: &mut [u32],
    best_priority: &mut [i32],
    matched: &MatchResults,
) {
    for x in (0..best.len()).step_by(RESULTS_MULTIPLIER) {
        let group = x..x + RESULTS_MULTIPLIER;

        let mut merged = ResultGroup::default();
        merged.results.copy_from_slice(&matched.results[group.clone()]);
        merged.priority.copy_from_slice(&matched.priority[group.clone()]);

        if !first {
            let mut running = ResultGroup::default();
            running.results.copy_from_slice(&best[group.clone()]);
            running.priority.copy_from_slice(&best_priority[group.clone()]);
            merged = ops.merge4(running, merged);
        }

        best[group.clone()].copy_from_slice(&merged.results);
        best_priority[group].copy_from_slice(&merged.priority);
    }
}

/// Single-category form of [`resolve_priority`].
#[inline]
pub(crate) fn resolve_single_priority(
    first: bool,
    best: &mut u32,
    best_priority: &mut i32,
    matched: &MatchResults,
) {
    if first || matched.priority[0] > *best_priority {
        *best = matched.results[0];
        *best_priority = matched.priority[0];
    }
}

/// Resolve every lane of the group at `slot` that sits on a match.
///
/// Retired lanes are refilled immediately and the new words can themselves
/// be matches (zero-length tries), so this repeats until no lane in the
/// group is on a match node.
#[inline(always)]
pub(crate) fn match_check_x4<B: LaneOps, const K: usize>(
    ops: B,
    flow: &mut Flow<'_, K>,
    slot: usize,
    indices: &mut B::Pair,
) {
    while ops.match_lanes(*indices) != 0 {
        let mut words = ops.unpack(*indices);
        for (lane, word) in words.iter_mut().enumerate() {
            *word = flow.match_check(ops, *word, slot + lane);
        }
        *indices = ops.pack(words);
    }
}
