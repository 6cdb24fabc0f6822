//! Jenkins96 path hashing
//!
//! Bob Jenkins' lookup3 `hashlittle`/`hashlittle2`, plus the path hash CASC
//! root files are keyed by. Path hashes run `hashlittle2` over the normalized
//! path with both lanes seeded at zero and combine the lanes as `(c << 32) | b`.

use std::fmt;

/// Both lanes of a `hashlittle2` run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Jenkins96 {
    /// `(c << 32) | b`
    pub hash64: u64,
    /// The primary lane `c`, equal to `hashlittle` with the same seed
    pub hash32: u32,
}

impl Jenkins96 {
    /// Hash raw bytes with both lanes seeded at zero
    pub fn hash(data: &[u8]) -> Self {
        let (mut pc, mut pb) = (0u32, 0u32);
        hashlittle2(data, &mut pc, &mut pb);
        Self {
            hash64: (u64::from(pc) << 32) | u64::from(pb),
            hash32: pc,
        }
    }
}

impl fmt::Display for Jenkins96 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.hash64)
    }
}

/// Normalize a path for hashing: `/` becomes `\` and letters are upper-cased.
pub fn normalize_path(path: &str) -> String {
    path.chars()
        .map(|c| if c == '/' { '\\' } else { c.to_ascii_uppercase() })
        .collect()
}

/// 64-bit hash of a file or folder path
///
/// Case and separator style do not matter; `a/b.txt` and `A\B.TXT` hash the
/// same. The empty string is valid input.
pub fn path_hash(path: &str) -> u64 {
    Jenkins96::hash(normalize_path(path).as_bytes()).hash64
}

/// lookup3 `hashlittle`
pub fn hashlittle(data: &[u8], initval: u32) -> u32 {
    let (mut pc, mut pb) = (initval, 0u32);
    hashlittle2(data, &mut pc, &mut pb);
    pc
}

/// lookup3 `hashlittle2`
///
/// `pc` and `pb` seed the state on entry and receive the two result lanes.
pub fn hashlittle2(data: &[u8], pc: &mut u32, pb: &mut u32) {
    let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
    let a = 0xdead_beef_u32.wrapping_add(len).wrapping_add(*pc);
    let mut state = [a, a, a.wrapping_add(*pb)];

    let mut rest = data;
    while rest.len() > 12 {
        for (lane, word) in state.iter_mut().zip(rest.chunks_exact(4)) {
            *lane = lane.wrapping_add(u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        }
        mix(&mut state);
        rest = &rest[12..];
    }

    // An empty tail skips the final mix
    if !rest.is_empty() {
        for (i, &byte) in rest.iter().enumerate() {
            state[i / 4] = state[i / 4].wrapping_add(u32::from(byte) << (8 * (i % 4)));
        }
        final_mix(&mut state);
    }

    *pc = state[2];
    *pb = state[1];
}

fn mix([a, b, c]: &mut [u32; 3]) {
    *a = a.wrapping_sub(*c) ^ c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a) ^ a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b) ^ b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c) ^ c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a) ^ a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b) ^ b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

fn final_mix([a, b, c]: &mut [u32; 3]) {
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(14));
    *a = (*a ^ *c).wrapping_sub(c.rotate_left(11));
    *b = (*b ^ *a).wrapping_sub(a.rotate_left(25));
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(16));
    *a = (*a ^ *c).wrapping_sub(c.rotate_left(4));
    *b = (*b ^ *a).wrapping_sub(a.rotate_left(14));
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(24));
}
