//! Test-only rule compiler and reference classifier.
//!
//! Rules are per-byte ranges over the first bytes of a packet. They are
//! spread over one or more tries and compiled into transition words with the
//! same node kinds a production compiler emits: range nodes where a byte
//! position splits into at most five intervals, group-compacted DFA nodes
//! otherwise, and match nodes at the leaves.

#![allow(dead_code)]

use std::collections::HashMap;

use acl_run::{
    MatchResults, RangeKind, RuleSet, RuleSetImage, Transition, TrieLayout, MAX_CATEGORIES,
    NO_MATCH,
};
use acl_run::table::QUAD_MAX;
use rand::Rng;

/// One classification rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    /// Inclusive byte range per packet position.
    pub fields: Vec<(u8, u8)>,
    pub priority: i32,
    /// Bit `c` set when the rule applies to category `c`.
    pub category_mask: u16,
    /// Result reported on a match. Must not be [`NO_MATCH`].
    pub userdata: u32,
}

impl Rule {
    /// Rule matching the exact bytes of `key` in every category.
    pub fn exact(key: &[u8], priority: i32, userdata: u32) -> Self {
        Self {
            fields: key.iter().map(|&b| (b, b)).collect(),
            priority,
            category_mask: u16::MAX,
            userdata,
        }
    }

    /// Rule matching any packet in every category.
    pub fn wildcard(len: usize, priority: i32, userdata: u32) -> Self {
        Self {
            fields: vec![(0, 255); len],
            priority,
            category_mask: u16::MAX,
            userdata,
        }
    }

    pub fn in_categories(mut self, mask: u16) -> Self {
        self.category_mask = mask;
        self
    }

    /// Whether `packet` (zero padded) falls in every field range.
    pub fn matches(&self, packet: &[u8]) -> bool {
        self.fields.iter().enumerate().all(|(pos, &(lo, hi))| {
            let b = packet.get(pos).copied().unwrap_or(0);
            lo <= b && b <= hi
        })
    }

    fn applies_to(&self, category: usize) -> bool {
        self.category_mask & (1 << category) != 0
    }
}

/// Compile `rules` into a rule set image; rule `i` goes to trie
/// `i % num_tries`.
pub fn compile(rules: &[Rule], num_tries: usize, categories: usize) -> RuleSetImage {
    let mut out = Compiler {
        words: Vec::new(),
        matches: vec![MatchResults::no_match()],
        categories,
    };

    let tries = (0..num_tries)
        .map(|t| {
            let members: Vec<&Rule> = rules.iter().skip(t).step_by(num_tries).collect();
            let depth = members.iter().map(|r| r.fields.len()).max().unwrap_or(0);
            let mut trie = TrieCompiler {
                rules: members,
                depth,
                memo: HashMap::new(),
            };
            let alive: Vec<usize> = (0..trie.rules.len()).collect();
            let root = trie.node(&mut out, 0, alive);
            TrieLayout {
                root,
                data_index: (0..depth.div_ceil(4) as u32).map(|i| i * 4).collect(),
            }
        })
        .collect();

    RuleSetImage {
        categories,
        words: out.words,
        matches: out.matches,
        tries,
    }
}

/// [`compile`] and validate.
pub fn build(rules: &[Rule], num_tries: usize, categories: usize) -> RuleSet {
    RuleSet::from_image(compile(rules, num_tries, categories)).expect("compiled rule set is valid")
}

/// Best rule per category by priority, lowest rule index on ties.
pub fn classify(rules: &[Rule], packet: &[u8], categories: usize) -> Vec<u32> {
    (0..categories)
        .map(|c| {
            rules
                .iter()
                .enumerate()
                .filter(|(_, r)| r.applies_to(c) && r.matches(packet))
                .max_by_key(|&(i, r)| (r.priority, std::cmp::Reverse(i)))
                .map_or(NO_MATCH, |(_, r)| r.userdata)
        })
        .collect()
}

/// [`classify`] for a whole batch, laid out like the search output.
pub fn classify_all(rules: &[Rule], packets: &[Vec<u8>], categories: usize) -> Vec<u32> {
    packets
        .iter()
        .flat_map(|p| classify(rules, p, categories))
        .collect()
}

/// Random rules with unique priorities over `len`-byte keys.
///
/// Fields mix wildcards, exact bytes and short ranges so that compiled tries
/// contain every node kind.
pub fn random_rules<R: Rng>(rng: &mut R, count: usize, len: usize, categories: usize) -> Vec<Rule> {
    let mut priorities: Vec<i32> = (0..count as i32).map(|p| p * 3 - 10).collect();
    for i in (1..priorities.len()).rev() {
        priorities.swap(i, rng.gen_range(0..=i));
    }
    let all = if categories >= 16 {
        u16::MAX
    } else {
        (1u16 << categories) - 1
    };

    (0..count)
        .map(|i| {
            let fields = (0..len)
                .map(|_| match rng.gen_range(0..4) {
                    0 => (0, 255),
                    1 => {
                        let b = rng.gen();
                        (b, b)
                    }
                    _ => {
                        let a: u8 = rng.gen();
                        let b: u8 = rng.gen();
                        (a.min(b), a.max(b))
                    }
                })
                .collect();
            let mask = match rng.gen_range(0..3) {
                0 => all,
                _ => rng.gen::<u16>() & all,
            };
            Rule {
                fields,
                priority: priorities[i],
                category_mask: mask,
                userdata: i as u32 + 1,
            }
        })
        .collect()
}

/// Random packets, about half of them drawn from inside a rule's ranges.
pub fn random_packets<R: Rng>(rng: &mut R, rules: &[Rule], count: usize, len: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|_| {
            let n = rng.gen_range(0..=len + 2);
            if rules.is_empty() || rng.gen_bool(0.5) {
                return (0..n).map(|_| rng.gen()).collect();
            }
            let rule = &rules[rng.gen_range(0..rules.len())];
            (0..n.max(rule.fields.len()))
                .map(|pos| match rule.fields.get(pos) {
                    Some(&(lo, hi)) => rng.gen_range(lo..=hi),
                    None => rng.gen(),
                })
                .collect()
        })
        .collect()
}

/// Borrow a batch as the search input.
pub fn as_slices(packets: &[Vec<u8>]) -> Vec<&[u8]> {
    packets.iter().map(Vec::as_slice).collect()
}

// =============================================================================
// Compiler
// =============================================================================

struct Compiler {
    words: Vec<u64>,
    matches: Vec<MatchResults>,
    categories: usize,
}

impl Compiler {
    /// Append successor words and return the base index.
    fn emit(&mut self, successors: &[u64]) -> u32 {
        let index = self.words.len() as u32;
        self.words.extend_from_slice(successors);
        index
    }
}

struct TrieCompiler<'r> {
    rules: Vec<&'r Rule>,
    depth: usize,
    memo: HashMap<(usize, Vec<usize>), u64>,
}

impl TrieCompiler<'_> {
    /// Word for the node reached at `pos` with `alive` rules still matching.
    fn node(&mut self, out: &mut Compiler, pos: usize, alive: Vec<usize>) -> u64 {
        let key = (pos, alive);
        if let Some(&word) = self.memo.get(&key) {
            return word;
        }
        let (pos, alive) = key;

        let word = if alive.is_empty() {
            Transition::Match { result: 0 }.encode().unwrap()
        } else if pos == self.depth {
            self.leaf(out, &alive)
        } else {
            let children: Vec<u64> = (0..=255u8)
                .map(|b| {
                    let next: Vec<usize> = alive
                        .iter()
                        .copied()
                        .filter(|&r| match self.rules[r].fields.get(pos) {
                            Some(&(lo, hi)) => lo <= b && b <= hi,
                            None => true,
                        })
                        .collect();
                    self.node(out, pos + 1, next)
                })
                .collect();
            interior(out, &children)
        };

        self.memo.insert((pos, alive), word);
        word
    }

    fn leaf(&self, out: &mut Compiler, alive: &[usize]) -> u64 {
        let mut entry = MatchResults::no_match();
        for c in 0..out.categories.min(MAX_CATEGORIES) {
            let best = alive
                .iter()
                .map(|&r| (r, self.rules[r]))
                .filter(|(_, rule)| rule.applies_to(c))
                .max_by_key(|&(r, rule)| (rule.priority, std::cmp::Reverse(r)));
            if let Some((_, rule)) = best {
                entry = entry.with(c, rule.userdata, rule.priority);
            }
        }
        let result = out.matches.len() as u32;
        out.matches.push(entry);
        Transition::Match { result }.encode().unwrap()
    }
}

/// Byte values in signed order, -128 to 127.
fn signed_order() -> impl Iterator<Item = u8> {
    (0x80..=0xffu8).chain(0x00..=0x7fu8)
}

/// Encode an interior node given the successor word of each input byte.
fn interior(out: &mut Compiler, children: &[u64]) -> u64 {
    // Runs of equal successors in signed byte order.
    let mut runs: Vec<(u8, u64)> = Vec::new();
    for b in signed_order() {
        let child = children[b as usize];
        if let Some(last) = runs.last_mut().filter(|last| last.1 == child) {
            last.0 = b;
        } else {
            runs.push((b, child));
        }
    }

    if runs.len() <= QUAD_MAX {
        let mut bounds = [i8::MAX; 4];
        for (slot, &(end, _)) in bounds.iter_mut().zip(&runs[..runs.len() - 1]) {
            *slot = end as i8;
        }
        let successors: Vec<u64> = runs.iter().map(|&(_, w)| w).collect();
        let index = out.emit(&successors);
        let kind = if runs.len() == 1 {
            RangeKind::Single
        } else {
            RangeKind::Quad
        };
        return Transition::Range {
            kind,
            index,
            bounds,
        }
        .encode()
        .unwrap();
    }

    // DFA: store each distinct 64-entry group once.
    let mut slots: Vec<&[u64]> = Vec::new();
    let mut corrections = [0u8; 4];
    for (g, group) in children.chunks(64).enumerate() {
        let slot = match slots.iter().position(|s| *s == group) {
            Some(s) => s,
            None => {
                slots.push(group);
                slots.len() - 1
            }
        };
        corrections[g] = (64 * (g - slot)) as u8;
    }
    let successors: Vec<u64> = slots.concat();
    let index = out.emit(&successors);
    Transition::Dfa { index, corrections }.encode().unwrap()
}
