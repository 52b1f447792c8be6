//! x86_64 SSSE3/SSE4.1 lane-group backend.
//!
//! The trie walk needs byte shuffles (`pshufb`), signed byte compares and
//! the multiply-add reductions (`pmaddubsw`, `pmaddwd`) for range ranks, and
//! `pblendvb` / `pextrd` for the blend and the gather. All are available from
//! SSE4.1 (Intel Penryn, AMD Bulldozer) onwards.

use core::arch::x86_64::*;

use super::{LaneOps, ResultGroup, LANES};
use crate::table::NODE_INDEX;

/// Capability token for the SSE4.1 backend.
///
/// Only [`Sse41::detect`] creates one, so holding a value proves the CPU
/// supports every instruction the backend issues.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Sse41 {
    _private: (),
}

impl Sse41 {
    /// Returns the token when the running CPU supports SSSE3 and SSE4.1.
    pub(crate) fn detect() -> Option<Self> {
        #[cfg(any(test, feature = "std"))]
        let supported = is_x86_feature_detected!("ssse3") && is_x86_feature_detected!("sse4.1");
        #[cfg(not(any(test, feature = "std")))]
        let supported = cfg!(all(target_feature = "ssse3", target_feature = "sse4.1"));

        supported.then_some(Self { _private: () })
    }
}

/// Low 32 bits of each of the four lane words.
#[inline(always)]
unsafe fn low_halves(pair: [__m128i; 2]) -> __m128i {
    unsafe {
        _mm_castps_si128(_mm_shuffle_ps::<0x88>(
            _mm_castsi128_ps(pair[0]),
            _mm_castsi128_ps(pair[1]),
        ))
    }
}

/// High 32 bits of each of the four lane words.
#[inline(always)]
unsafe fn high_halves(pair: [__m128i; 2]) -> __m128i {
    unsafe {
        _mm_castps_si128(_mm_shuffle_ps::<0xdd>(
            _mm_castsi128_ps(pair[0]),
            _mm_castsi128_ps(pair[1]),
        ))
    }
}

/// Successor address of every lane.
///
/// # Safety
///
/// CPU must support SSSE3 and SSE4.1.
#[inline(always)]
unsafe fn calc_addr(next_input: __m128i, tr_lo: __m128i, tr_hi: __m128i) -> __m128i {
    unsafe {
        let index_mask = _mm_set1_epi32(NODE_INDEX as i32);
        let shuffle_input = _mm_set_epi32(0x0c0c_0c0c, 0x0808_0808, 0x0404_0404, 0x0000_0000);
        let range_base = _mm_set_epi32(
            0xffff_ff0c_u32 as i32,
            0xffff_ff08_u32 as i32,
            0xffff_ff04_u32 as i32,
            0xffff_ff00_u32 as i32,
        );
        let ones_16 = _mm_set1_epi16(1);

        // Broadcast each lane's input byte to the whole lane.
        let input = _mm_shuffle_epi8(next_input, shuffle_input);

        let node_types = _mm_andnot_si128(index_mask, tr_lo);
        let addr = _mm_and_si128(index_mask, tr_lo);

        // DFA: byte - correction[byte >> 6]
        let dfa_msk = _mm_cmpeq_epi32(node_types, _mm_setzero_si128());
        let group = _mm_add_epi8(_mm_srli_epi32::<30>(input), range_base);
        let byte = _mm_srli_epi32::<24>(input);
        let correction = _mm_shuffle_epi8(tr_hi, group);
        let dfa_ofs = _mm_sub_epi32(byte, correction);

        // QRANGE/SINGLE: count boundaries below the input byte.
        // -1 for every boundary the input exceeds, turned into +1,
        // then summed pairwise into words and again into dwords.
        let gt = _mm_cmpgt_epi8(input, tr_hi);
        let gt = _mm_sign_epi8(gt, gt);
        let pairs = _mm_maddubs_epi16(gt, gt);
        let quad_ofs = _mm_madd_epi16(pairs, ones_16);

        _mm_add_epi32(addr, _mm_blendv_epi8(quad_ofs, dfa_ofs, dfa_msk))
    }
}

impl LaneOps for Sse41 {
    type Pair = [__m128i; 2];
    type Input = __m128i;

    #[inline(always)]
    fn pack(self, words: [u64; LANES]) -> Self::Pair {
        // SAFETY: SSE2 is part of the x86_64 baseline.
        unsafe {
            [
                _mm_set_epi64x(words[1] as i64, words[0] as i64),
                _mm_set_epi64x(words[3] as i64, words[2] as i64),
            ]
        }
    }

    #[inline(always)]
    fn unpack(self, pair: Self::Pair) -> [u64; LANES] {
        // SAFETY: the token proves SSE4.1 support.
        unsafe {
            [
                _mm_cvtsi128_si64(pair[0]) as u64,
                _mm_extract_epi64::<1>(pair[0]) as u64,
                _mm_cvtsi128_si64(pair[1]) as u64,
                _mm_extract_epi64::<1>(pair[1]) as u64,
            ]
        }
    }

    #[inline(always)]
    fn input(self, chunks: [u32; LANES]) -> Self::Input {
        // SAFETY: SSE2 is part of the x86_64 baseline.
        unsafe {
            _mm_set_epi32(
                chunks[3] as i32,
                chunks[2] as i32,
                chunks[1] as i32,
                chunks[0] as i32,
            )
        }
    }

    #[inline(always)]
    fn match_lanes(self, pair: Self::Pair) -> u32 {
        // The match tag is bit 31 of the low half, i.e. the float sign bit.
        // SAFETY: SSE2 is part of the x86_64 baseline.
        unsafe { _mm_movemask_ps(_mm_castsi128_ps(low_halves(pair))) as u32 }
    }

    #[inline(always)]
    fn transition4(self, input: __m128i, table: &[u64], pair: &mut Self::Pair) -> __m128i {
        // SAFETY: the token proves SSSE3 and SSE4.1 support.
        unsafe {
            let tr_lo = low_halves(*pair);
            let tr_hi = high_halves(*pair);

            let addr = calc_addr(input, tr_lo, tr_hi);

            // Match lanes load address 0 and then keep their own word.
            let matched = _mm_srai_epi32::<31>(tr_lo);
            let addr = _mm_andnot_si128(matched, addr);

            let a0 = _mm_cvtsi128_si32(addr) as u32 as usize;
            let a1 = _mm_extract_epi32::<1>(addr) as u32 as usize;
            let a2 = _mm_extract_epi32::<2>(addr) as u32 as usize;
            let a3 = _mm_extract_epi32::<3>(addr) as u32 as usize;

            let next1 = _mm_set_epi64x(table[a1] as i64, table[a0] as i64);
            let next2 = _mm_set_epi64x(table[a3] as i64, table[a2] as i64);

            pair[0] = _mm_blendv_epi8(next1, pair[0], _mm_unpacklo_epi32(matched, matched));
            pair[1] = _mm_blendv_epi8(next2, pair[1], _mm_unpackhi_epi32(matched, matched));

            _mm_srli_epi32::<8>(input)
        }
    }

    #[inline(always)]
    fn merge4(self, best: ResultGroup, candidate: ResultGroup) -> ResultGroup {
        let mut out = ResultGroup::default();
        // SAFETY: the token proves SSE4.1 support; all pointers are to
        // 16-byte arrays and the loads/stores are unaligned.
        unsafe {
            let results = _mm_loadu_si128(candidate.results.as_ptr().cast());
            let priority = _mm_loadu_si128(candidate.priority.as_ptr().cast());
            let results1 = _mm_loadu_si128(best.results.as_ptr().cast());
            let priority1 = _mm_loadu_si128(best.priority.as_ptr().cast());

            let selector = _mm_cmpgt_epi32(priority, priority1);
            _mm_storeu_si128(
                out.results.as_mut_ptr().cast(),
                _mm_blendv_epi8(results1, results, selector),
            );
            _mm_storeu_si128(
                out.priority.as_mut_ptr().cast(),
                _mm_blendv_epi8(priority1, priority, selector),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::portable::Portable;
    use crate::table::{RangeKind, Transition};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_transition(rng: &mut ChaCha8Rng, table_len: u32) -> Transition {
        match rng.gen_range(0..4) {
            0 => {
                // Corrections that keep every group inside [index, index + 256).
                let corrections: [u32; 4] = [
                    0,
                    64 * rng.gen_range(0..=1),
                    64 * rng.gen_range(0..=2),
                    64 * rng.gen_range(0..=3),
                ];
                Transition::Dfa {
                    index: rng.gen_range(0..table_len - 256),
                    corrections: corrections.map(|c| c as u8),
                }
            }
            1 => {
                let mut bounds: [i8; 4] = core::array::from_fn(|_| rng.gen());
                bounds.sort_unstable();
                Transition::Range {
                    kind: RangeKind::Quad,
                    index: rng.gen_range(0..table_len - 5),
                    bounds,
                }
            }
            2 => Transition::idle(rng.gen_range(0..table_len)),
            _ => Transition::Match {
                result: rng.gen_range(0..table_len),
            },
        }
    }

    #[test]
    fn test_sse41_matches_portable_transition4() {
        let Some(sse) = Sse41::detect() else {
            return;
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0xAC1);
        let table_len = 1024u32;
        let table: Vec<u64> = (0..table_len)
            .map(|_| random_transition(&mut rng, table_len).encode().unwrap())
            .collect();

        for _ in 0..2000 {
            let words: [u64; 4] =
                core::array::from_fn(|_| random_transition(&mut rng, table_len).encode().unwrap());
            let chunks: [u32; 4] = core::array::from_fn(|_| rng.gen());

            let mut sse_pair = sse.pack(words);
            let mut sse_input = sse.input(chunks);
            let mut portable_pair = Portable.pack(words);
            let mut portable_input = Portable.input(chunks);

            for _ in 0..4 {
                sse_input = sse.transition4(sse_input, &table, &mut sse_pair);
                portable_input = Portable.transition4(portable_input, &table, &mut portable_pair);
                assert_eq!(sse.unpack(sse_pair), Portable.unpack(portable_pair));
                assert_eq!(sse.match_lanes(sse_pair), Portable.match_lanes(portable_pair));
            }
        }
    }

    #[test]
    fn test_sse41_pack_unpack() {
        let Some(sse) = Sse41::detect() else {
            return;
        };
        let words = [0x8000_0001, u64::MAX, 0, 0x7f7f_7f7f_2000_0100];
        assert_eq!(sse.unpack(sse.pack(words)), words);
        assert_eq!(sse.match_lanes(sse.pack(words)), 0b0011);
    }

    #[test]
    fn test_sse41_merge4_matches_portable() {
        let Some(sse) = Sse41::detect() else {
            return;
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1000 {
            let best = ResultGroup {
                results: rng.gen(),
                priority: core::array::from_fn(|_| rng.gen_range(-3..3)),
            };
            let candidate = ResultGroup {
                results: rng.gen(),
                priority: core::array::from_fn(|_| rng.gen_range(-3..3)),
            };
            assert_eq!(sse.merge4(best, candidate), Portable.merge4(best, candidate));
        }
    }
}
