//! Per-call flow control: lane slots, packet completions and input fetch.
//!
//! A search keeps `K` lanes busy. Whenever a lane finishes a trie walk the
//! next (packet, trie) pair is assigned to it, packets in order and tries in
//! order within a packet. A packet's completion record lives from its first
//! trie assignment until its last trie reaches a match.
//!
//! All state is fixed size and lives on the caller's stack.

use crate::rules::RuleSet;
use crate::simd::LaneOps;
use crate::table::{MAX_CATEGORIES, NODE_INDEX, NODE_MATCH};

use super::resolve::{resolve_priority, resolve_single_priority};

/// Input fed to lanes with no walk, and to walks past their last field.
pub(crate) const IDLE_INPUT: u32 = 0;

/// One trie walk occupying a lane.
#[derive(Clone, Copy, Debug)]
struct Walk<'a> {
    data: &'a [u8],
    data_index: &'a [u32],
    cursor: usize,
    cmplt: usize,
}

impl Walk<'_> {
    /// Next 4 bytes at the next field offset, zero padded past the end of
    /// the stream.
    #[inline]
    fn next_4bytes(&mut self) -> u32 {
        let Some(&offset) = self.data_index.get(self.cursor) else {
            return IDLE_INPUT;
        };
        self.cursor += 1;

        let start = (offset as usize).min(self.data.len());
        let avail = &self.data[start..];
        let n = avail.len().min(4);
        let mut chunk = [0u8; 4];
        chunk[..n].copy_from_slice(&avail[..n]);
        u32::from_le_bytes(chunk)
    }
}

/// Running result of one packet.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Completion {
    /// Tries not yet completed; 0 marks a free record.
    pub count: usize,
    pub packet: usize,
    pub priority: [i32; MAX_CATEGORIES],
}

impl Completion {
    const FREE: Self = Self {
        count: 0,
        packet: 0,
        priority: [i32::MIN; MAX_CATEGORIES],
    };
}

/// Flow state of one search call with `K` lanes.
pub(crate) struct Flow<'a, const K: usize> {
    rules: &'a RuleSet,
    data: &'a [&'a [u8]],
    results: &'a mut [u32],
    categories: usize,
    /// Packets whose tries have all been assigned.
    num_packets: usize,
    /// Next trie of the current packet.
    trie: usize,
    /// Lanes running a walk.
    started: usize,
    last_cmplt: usize,
    lanes: [Option<Walk<'a>>; K],
    cmplt: [Completion; K],
}

impl<'a, const K: usize> Flow<'a, K> {
    pub(crate) fn new(
        rules: &'a RuleSet,
        data: &'a [&'a [u8]],
        results: &'a mut [u32],
        categories: usize,
    ) -> Self {
        Self {
            rules,
            data,
            results,
            categories,
            num_packets: 0,
            trie: 0,
            started: 0,
            last_cmplt: 0,
            lanes: [None; K],
            cmplt: [Completion::FREE; K],
        }
    }

    /// Words of the transition table.
    #[inline]
    pub(crate) fn table(&self) -> &'a [u64] {
        self.rules.table().words()
    }

    /// Number of lanes running a walk.
    #[inline]
    pub(crate) fn active_count(&self) -> usize {
        self.started
    }

    /// Assign the next trie walk to `slot` and return its first word, or
    /// park the slot on the idle node when every walk has been assigned.
    pub(crate) fn start_next_trie(&mut self, slot: usize) -> u64 {
        if self.num_packets >= self.data.len() {
            self.lanes[slot] = None;
            return self.rules.idle();
        }

        let rules = self.rules;
        let trie = rules.trie(self.trie);

        if self.trie == 0 {
            self.last_cmplt = self.alloc_completion(self.num_packets);
        }

        self.lanes[slot] = Some(Walk {
            data: self.data[self.num_packets],
            data_index: &trie.data_index,
            cursor: 0,
            cmplt: self.last_cmplt,
        });

        self.trie += 1;
        if self.trie >= rules.num_tries() {
            self.trie = 0;
            self.num_packets += 1;
        }

        self.started += 1;
        trie.root
    }

    /// Take a free completion record for `packet`.
    ///
    /// A record is live only while one of its walks occupies a lane, and the
    /// lane being assigned is not occupied, so a free record always exists.
    fn alloc_completion(&mut self, packet: usize) -> usize {
        let tries = self.rules.num_tries();
        let n = self
            .cmplt
            .iter()
            .position(|c| c.count == 0)
            .unwrap_or_else(|| unreachable!("more packets in flight than lanes"));
        self.cmplt[n] = Completion {
            count: tries,
            packet,
            priority: [i32::MIN; MAX_CATEGORIES],
        };
        n
    }

    /// Next 4 input bytes of the walk in `slot`.
    #[inline]
    pub(crate) fn next_4bytes(&mut self, slot: usize) -> u32 {
        match &mut self.lanes[slot] {
            Some(walk) => walk.next_4bytes(),
            None => IDLE_INPUT,
        }
    }

    /// Next 4 input bytes of the four lanes starting at `base`.
    #[inline]
    pub(crate) fn next_input4(&mut self, base: usize) -> [u32; 4] {
        [
            self.next_4bytes(base),
            self.next_4bytes(base + 1),
            self.next_4bytes(base + 2),
            self.next_4bytes(base + 3),
        ]
    }

    /// If `transition` is a match, merge its results into the owning
    /// packet, retire the walk and return the slot's next word. Otherwise
    /// return `transition` unchanged.
    pub(crate) fn match_check<B: LaneOps>(&mut self, ops: B, transition: u64, slot: usize) -> u64 {
        if transition & u64::from(NODE_MATCH) == 0 {
            return transition;
        }
        let Some(walk) = self.lanes[slot] else {
            return transition;
        };

        let rules = self.rules;
        let matched = rules.match_results((transition as u32 & NODE_INDEX) as usize);
        let cmplt = &mut self.cmplt[walk.cmplt];
        let first = cmplt.count == rules.num_tries();
        let row = cmplt.packet * self.categories;
        let best = &mut self.results[row..row + self.categories];

        if self.categories == 1 {
            resolve_single_priority(first, &mut best[0], &mut cmplt.priority[0], matched);
        } else {
            resolve_priority(ops, first, best, &mut cmplt.priority, matched);
        }

        cmplt.count -= 1;
        self.started -= 1;
        self.start_next_trie(slot)
    }
}
