//! Lane-group backends for the trie walk.
//!
//! A lane group is four concurrent trie walks. Their transition words are
//! held two per 128-bit register across a register pair, and their input
//! bytes one 32-bit lane each in a single input register. Backends provide
//! the branchless per-group operations the drivers are written against:
//!
//! - [`LaneOps::transition4`] - consume one byte in every lane
//! - [`LaneOps::match_lanes`] - which lanes sit on a match node
//! - [`LaneOps::merge4`] - priority-merge four categories of results
//!
//! Two backends exist: [`portable::Portable`], which emulates the vector
//! operations on byte arrays and runs everywhere, and `x86::Sse41`, which
//! uses SSSE3/SSE4.1 intrinsics and is selected at runtime.

pub(crate) mod portable;

#[cfg(target_arch = "x86_64")]
pub(crate) mod x86;

/// Lanes per group.
pub(crate) const LANES: usize = 4;

/// Four categories of a running best result, or of a candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ResultGroup {
    pub results: [u32; 4],
    pub priority: [i32; 4],
}

/// Branchless operations on one lane group.
///
/// Implementations must agree bit for bit; the drivers are generic over
/// this trait and the property tests run every backend.
pub(crate) trait LaneOps: Copy {
    /// Two registers holding the four lanes' transition words.
    type Pair: Copy;
    /// One register holding four lanes' pending input bytes.
    type Input: Copy;

    /// Pack lane words `[w0, w1, w2, w3]` as `{w0, w1}, {w2, w3}`.
    fn pack(self, words: [u64; LANES]) -> Self::Pair;

    /// Inverse of [`pack`](Self::pack).
    fn unpack(self, pair: Self::Pair) -> [u64; LANES];

    /// Load four lanes' next 4 input bytes (first byte in the low bits).
    fn input(self, chunks: [u32; LANES]) -> Self::Input;

    /// Bit `i` is set when lane `i` sits on a match node.
    fn match_lanes(self, pair: Self::Pair) -> u32;

    /// Advance every lane by its next input byte and return the remaining
    /// input, shifted down one byte.
    ///
    /// Lanes on a match node keep their word. `table` must hold every
    /// address the lanes can reach.
    fn transition4(self, input: Self::Input, table: &[u64], pair: &mut Self::Pair)
        -> Self::Input;

    /// Per category, keep `best` unless `candidate` has strictly higher
    /// priority.
    fn merge4(self, best: ResultGroup, candidate: ResultGroup) -> ResultGroup;
}
