//! Search drivers for 4 and 8 concurrent trie walks.
//!
//! Every outer iteration pulls 4 input bytes per lane, advances each lane
//! group by those 4 bytes, then resolves matches. Lanes that reach a match
//! part way through the 4 bytes stay frozen until the resolve step, which
//! trades a little wasted work for one match check per 4 bytes.

use crate::simd::LaneOps;

use super::flow::Flow;
use super::resolve::match_check_x4;

/// Walk every (packet, trie) pair with one group of four lanes.
#[inline(always)]
pub(crate) fn search_x4<B: LaneOps>(ops: B, flow: &mut Flow<'_, 4>) {
    let table = flow.table();

    let mut index_array = [0u64; 4];
    for (n, word) in index_array.iter_mut().enumerate() {
        *word = flow.start_next_trie(n);
    }
    let mut indices = ops.pack(index_array);

    // Check for any matches (zero-length tries).
    match_check_x4(ops, flow, 0, &mut indices);

    while flow.active_count() > 0 {
        let mut input = ops.input(flow.next_input4(0));

        input = ops.transition4(input, table, &mut indices);
        input = ops.transition4(input, table, &mut indices);
        input = ops.transition4(input, table, &mut indices);
        ops.transition4(input, table, &mut indices);

        match_check_x4(ops, flow, 0, &mut indices);
    }
}

/// Walk every (packet, trie) pair with two interleaved groups of four lanes.
#[inline(always)]
pub(crate) fn search_x8<B: LaneOps>(ops: B, flow: &mut Flow<'_, 8>) {
    let table = flow.table();

    let mut index_array = [0u64; 8];
    for (n, word) in index_array.iter_mut().enumerate() {
        *word = flow.start_next_trie(n);
    }

    // indices1 holds lanes 0..4, indices2 lanes 4..8.
    let mut indices1 = ops.pack([index_array[0], index_array[1], index_array[2], index_array[3]]);
    let mut indices2 = ops.pack([index_array[4], index_array[5], index_array[6], index_array[7]]);

    match_check_x4(ops, flow, 0, &mut indices1);
    match_check_x4(ops, flow, 4, &mut indices2);

    while flow.active_count() > 0 {
        let mut input0 = ops.input(flow.next_input4(0));
        let mut input1 = ops.input(flow.next_input4(4));

        input0 = ops.transition4(input0, table, &mut indices1);
        input1 = ops.transition4(input1, table, &mut indices2);

        input0 = ops.transition4(input0, table, &mut indices1);
        input1 = ops.transition4(input1, table, &mut indices2);

        input0 = ops.transition4(input0, table, &mut indices1);
        input1 = ops.transition4(input1, table, &mut indices2);

        ops.transition4(input0, table, &mut indices1);
        ops.transition4(input1, table, &mut indices2);

        match_check_x4(ops, flow, 0, &mut indices1);
        match_check_x4(ops, flow, 4, &mut indices2);
    }
}
