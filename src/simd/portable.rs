//! Portable lane-group backend.
//!
//! Emulates the 128-bit vector operations of the x86 backend on plain byte
//! arrays, one operation per function, so both backends compute the same
//! values in the same order. All selection is done with masks; no step
//! branches on lane contents.

use super::{LaneOps, ResultGroup, LANES};
use crate::table::NODE_INDEX;

/// A 128-bit register, little-endian lane order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct V128([u8; 16]);

/// Byte shuffle that copies byte 0 of each 32-bit lane to all four bytes.
const SHUFFLE_INPUT: V128 = V128::from_u32x4([0x0000_0000, 0x0404_0404, 0x0808_0808, 0x0c0c_0c0c]);

/// Per-lane base for picking a DFA correction byte out of the payload
/// register; the 0xff bytes zero the upper bytes of each lane.
const RANGE_BASE: V128 = V128::from_u32x4([0xffff_ff00, 0xffff_ff04, 0xffff_ff08, 0xffff_ff0c]);

const INDEX_MASK: V128 = V128::from_u32x4([NODE_INDEX; 4]);

impl V128 {
    pub(crate) const fn from_u32x4(v: [u32; 4]) -> Self {
        let mut bytes = [0u8; 16];
        let mut lane = 0;
        while lane < 4 {
            let b = v[lane].to_le_bytes();
            bytes[lane * 4] = b[0];
            bytes[lane * 4 + 1] = b[1];
            bytes[lane * 4 + 2] = b[2];
            bytes[lane * 4 + 3] = b[3];
            lane += 1;
        }
        Self(bytes)
    }

    pub(crate) fn to_u32x4(self) -> [u32; 4] {
        core::array::from_fn(|lane| {
            u32::from_le_bytes([
                self.0[lane * 4],
                self.0[lane * 4 + 1],
                self.0[lane * 4 + 2],
                self.0[lane * 4 + 3],
            ])
        })
    }

    fn map_u32(self, f: impl Fn(u32) -> u32) -> Self {
        Self::from_u32x4(self.to_u32x4().map(f))
    }

    fn zip_u32(self, other: Self, f: impl Fn(u32, u32) -> u32) -> Self {
        let a = self.to_u32x4();
        let b = other.to_u32x4();
        Self::from_u32x4(core::array::from_fn(|i| f(a[i], b[i])))
    }

    fn and(self, other: Self) -> Self {
        self.zip_u32(other, |a, b| a & b)
    }

    /// `!self & other`
    fn andnot(self, other: Self) -> Self {
        self.zip_u32(other, |a, b| !a & b)
    }

    fn add_epi8(self, other: Self) -> Self {
        Self(core::array::from_fn(|i| self.0[i].wrapping_add(other.0[i])))
    }

    fn add_epi32(self, other: Self) -> Self {
        self.zip_u32(other, u32::wrapping_add)
    }

    fn sub_epi32(self, other: Self) -> Self {
        self.zip_u32(other, u32::wrapping_sub)
    }

    fn srli_epi32(self, shift: u32) -> Self {
        self.map_u32(|a| a >> shift)
    }

    /// Arithmetic shift right of each 32-bit lane.
    fn srai_epi32(self, shift: u32) -> Self {
        self.map_u32(|a| ((a as i32) >> shift) as u32)
    }

    fn cmpeq_epi32(self, other: Self) -> Self {
        self.zip_u32(other, |a, b| u32::from(a == b).wrapping_neg())
    }

    /// `out[i] = self[idx[i] & 15]`, or 0 when bit 7 of `idx[i]` is set.
    fn shuffle_epi8(self, idx: Self) -> Self {
        Self(core::array::from_fn(|i| {
            let keep = !(((idx.0[i] as i8) >> 7) as u8);
            self.0[(idx.0[i] & 0x0f) as usize] & keep
        }))
    }

    /// Pick bytes of `b` where the mask byte's top bit is set, else `a`.
    fn blendv_epi8(a: Self, b: Self, mask: Self) -> Self {
        Self(core::array::from_fn(|i| {
            let m = ((mask.0[i] as i8) >> 7) as u8;
            (a.0[i] & !m) | (b.0[i] & m)
        }))
    }

    /// 32-bit lanes `{a0, a2, b0, b2}` (`shufps` with mask `0x88`).
    fn shuffle_ps_even(a: Self, b: Self) -> Self {
        let a = a.to_u32x4();
        let b = b.to_u32x4();
        Self::from_u32x4([a[0], a[2], b[0], b[2]])
    }

    /// 32-bit lanes `{a1, a3, b1, b3}` (`shufps` with mask `0xdd`).
    fn shuffle_ps_odd(a: Self, b: Self) -> Self {
        let a = a.to_u32x4();
        let b = b.to_u32x4();
        Self::from_u32x4([a[1], a[3], b[1], b[3]])
    }

    fn from_u64x2(lo: u64, hi: u64) -> Self {
        Self::from_u32x4([lo as u32, (lo >> 32) as u32, hi as u32, (hi >> 32) as u32])
    }

    fn to_u64x2(self) -> [u64; 2] {
        let v = self.to_u32x4();
        [
            u64::from(v[0]) | (u64::from(v[1]) << 32),
            u64::from(v[2]) | (u64::from(v[3]) << 32),
        ]
    }
}

/// Count, per 32-bit lane, the boundary bytes strictly below the input byte.
///
/// Both operands are compared as signed bytes. `input` carries each lane's
/// byte in all four positions of the lane.
pub(crate) fn range_rank(input: V128, bounds: V128) -> V128 {
    // Byte-wise `input > bound` as 0/1 over all 16 boundaries.
    let gt: [u8; 16] = core::array::from_fn(|i| u8::from((input.0[i] as i8) > (bounds.0[i] as i8)));

    // Pairwise sums into 8 words.
    let words: [u16; 8] = core::array::from_fn(|i| u16::from(gt[2 * i]) + u16::from(gt[2 * i + 1]));

    // Pairwise sums into 4 dwords.
    V128::from_u32x4(core::array::from_fn(|i| {
        u32::from(words[2 * i]) + u32::from(words[2 * i + 1])
    }))
}

/// Successor address of every lane.
///
/// Match lanes compute a meaningless address here; the caller masks them.
pub(crate) fn calc_addr(next_input: V128, tr_lo: V128, tr_hi: V128) -> V128 {
    // Broadcast each lane's input byte to the whole lane.
    let input = next_input.shuffle_epi8(SHUFFLE_INPUT);

    let node_types = INDEX_MASK.andnot(tr_lo);
    let addr = INDEX_MASK.and(tr_lo);

    // DFA: byte - correction[byte >> 6]
    let dfa_msk = node_types.cmpeq_epi32(V128::default());
    let group = input.srli_epi32(30).add_epi8(RANGE_BASE);
    let byte = input.srli_epi32(24);
    let correction = tr_hi.shuffle_epi8(group);
    let dfa_ofs = byte.sub_epi32(correction);

    // QRANGE/SINGLE: rank among the boundaries
    let quad_ofs = range_rank(input, tr_hi);

    addr.add_epi32(V128::blendv_epi8(quad_ofs, dfa_ofs, dfa_msk))
}

/// Emulated 128-bit backend, available on every target.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Portable;

impl LaneOps for Portable {
    type Pair = [V128; 2];
    type Input = V128;

    #[inline]
    fn pack(self, words: [u64; LANES]) -> Self::Pair {
        [
            V128::from_u64x2(words[0], words[1]),
            V128::from_u64x2(words[2], words[3]),
        ]
    }

    #[inline]
    fn unpack(self, pair: Self::Pair) -> [u64; LANES] {
        let [w0, w1] = pair[0].to_u64x2();
        let [w2, w3] = pair[1].to_u64x2();
        [w0, w1, w2, w3]
    }

    #[inline]
    fn input(self, chunks: [u32; LANES]) -> Self::Input {
        V128::from_u32x4(chunks)
    }

    #[inline]
    fn match_lanes(self, pair: Self::Pair) -> u32 {
        let tr_lo = V128::shuffle_ps_even(pair[0], pair[1]).to_u32x4();
        tr_lo
            .iter()
            .enumerate()
            .fold(0, |mask, (lane, &lo)| mask | ((lo >> 31) << lane))
    }

    fn transition4(self, input: V128, table: &[u64], pair: &mut Self::Pair) -> V128 {
        let tr_lo = V128::shuffle_ps_even(pair[0], pair[1]);
        let tr_hi = V128::shuffle_ps_odd(pair[0], pair[1]);

        let addr = calc_addr(input, tr_lo, tr_hi);

        // Match lanes load address 0 and then keep their own word.
        let matched = tr_lo.srai_epi32(31);
        let addr = matched.andnot(addr).to_u32x4();

        let next = [
            V128::from_u64x2(table[addr[0] as usize], table[addr[1] as usize]),
            V128::from_u64x2(table[addr[2] as usize], table[addr[3] as usize]),
        ];

        let m = matched.to_u32x4();
        let keep = [
            V128::from_u32x4([m[0], m[0], m[1], m[1]]),
            V128::from_u32x4([m[2], m[2], m[3], m[3]]),
        ];
        pair[0] = V128::blendv_epi8(next[0], pair[0], keep[0]);
        pair[1] = V128::blendv_epi8(next[1], pair[1], keep[1]);

        input.srli_epi32(8)
    }

    #[inline]
    fn merge4(self, best: ResultGroup, candidate: ResultGroup) -> ResultGroup {
        let mut out = best;
        for i in 0..4 {
            let take = u32::from(candidate.priority[i] > best.priority[i]).wrapping_neg();
            out.results[i] = (candidate.results[i] & take) | (best.results[i] & !take);
            out.priority[i] =
                ((candidate.priority[i] as u32 & take) | (best.priority[i] as u32 & !take)) as i32;
        }
        out
    }
}
