//! Randomized equivalence of every search configuration with the reference
//! classifier.

mod common;

use acl_run::{search_with, Isa, SearchConfig, Width};
use common::{as_slices, build, classify_all, random_packets, random_rules};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const PROPTEST_CASES: u32 = 48;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn matches_reference(
        seed in any::<u64>(),
        num_rules in 0usize..24,
        key_len in 0usize..10,
        num_tries in 1usize..5,
        num_packets in 0usize..40,
        categories in prop::sample::select(vec![1usize, 4, 8, 16]),
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let rule_list = random_rules(&mut rng, num_rules, key_len, categories);
        let rules = build(&rule_list, num_tries, categories);
        let packets = random_packets(&mut rng, &rule_list, num_packets, key_len);
        let data = as_slices(&packets);
        let expected = classify_all(&rule_list, &packets, categories);

        for width in [Width::X4, Width::X8] {
            for isa in [Isa::Portable, Isa::Sse41] {
                let config = SearchConfig::default().with_width(width).with_isa(isa);
                let mut results = vec![u32::MAX; packets.len() * categories];
                search_with(&rules, &data, &mut results, categories, &config).unwrap();
                prop_assert_eq!(&results, &expected, "config {:?}", config);
            }
        }
    }

    #[test]
    fn rule_length_varies_per_trie(
        seed in any::<u64>(),
        lens in prop::collection::vec(0usize..12, 1..6),
        num_packets in 1usize..24,
    ) {
        // One rule set per length, each landing in its own trie.
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut rule_list = Vec::new();
        for (t, &len) in lens.iter().enumerate() {
            for mut rule in random_rules(&mut rng, 3, len, 4) {
                rule.priority = rule.priority * 8 + t as i32;
                rule.userdata += 100 * t as u32;
                rule_list.push(rule);
            }
        }
        // Rule i lands in trie i % tries; reorder so trie t holds length lens[t].
        let tries = lens.len();
        let mut ordered = Vec::with_capacity(rule_list.len());
        for k in 0..3 {
            for t in 0..tries {
                ordered.push(rule_list[t * 3 + k].clone());
            }
        }

        let rules = build(&ordered, tries, 4);
        let max_len = lens.iter().copied().max().unwrap_or(0);
        let packets = random_packets(&mut rng, &ordered, num_packets, max_len);
        let expected = classify_all(&ordered, &packets, 4);

        let data = as_slices(&packets);
        for width in [Width::X4, Width::X8] {
            let config = SearchConfig::default().with_width(width);
            let mut results = vec![0u32; packets.len() * 4];
            search_with(&rules, &data, &mut results, 4, &config).unwrap();
            prop_assert_eq!(&results, &expected, "config {:?}", config);
        }
    }
}
