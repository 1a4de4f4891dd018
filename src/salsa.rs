//! Bit-exact Salsa round machinery.
//!
//! The state is sixteen 32-bit words viewed as a 4x4 matrix. Odd rounds
//! walk the four column quartets, even rounds the four row quartets, and
//! every quartet passes through four ARX micro-steps with rotation
//! amounts 7, 9, 13 and 18. The micro-step used throughout is the
//! additive form:
//!
//! ```text
//! b ^= rotl32(a + d,  7)
//! c ^= rotl32(b + a,  9)
//! d ^= rotl32(c + b, 13)
//! a ^= rotl32(d + c, 18)
//! ```
//!
//! Each assignment is self-inverse while its operands are untouched, so
//! the backward machinery replays the same micro-steps in reverse order
//! (18, 13, 9, 7) rather than being an independent primitive.

use rand::Rng;

use crate::bits::{rotl32, toggle_bit};
use crate::config::KeySize;

pub const STATE_WORDS: usize = 16;
pub const KEY_WORDS: usize = 8;
pub const WORD_BITS: usize = 32;

/// Sixteen 32-bit words; all arithmetic wraps mod 2^32.
pub type State = [u32; STATE_WORDS];

/// Diagonal constants at state words 0, 5, 10 and 15.
const SIGMA: [u32; 4] = [0x6170_7865, 0x3120_646e, 0x7962_2d36, 0x6b20_6574];

/// Column quartets, in (a, b, c, d) order.
const COLUMNS: [[usize; 4]; 4] = [
    [0, 4, 8, 12],
    [5, 9, 13, 1],
    [10, 14, 2, 6],
    [15, 3, 7, 11],
];

/// Row quartets, in (a, b, c, d) order.
const ROWS: [[usize; 4]; 4] = [
    [0, 1, 2, 3],
    [5, 6, 7, 4],
    [10, 11, 8, 9],
    [15, 12, 13, 14],
];

/// Quartet ordering tag: odd rounds use columns, even rounds rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    Odd,
    Even,
}

impl Parity {
    /// Ordering used by round `round_index` (1-based).
    #[inline]
    pub fn of_round(round_index: u32) -> Self {
        if round_index & 1 == 1 {
            Parity::Odd
        } else {
            Parity::Even
        }
    }

    /// Ordering of the half-round that follows `full` completed rounds.
    #[inline]
    pub fn after(full: u32) -> Self {
        Parity::of_round(full + 1)
    }

    #[inline]
    fn quartets(self) -> &'static [[usize; 4]; 4] {
        match self {
            Parity::Odd => &COLUMNS,
            Parity::Even => &ROWS,
        }
    }
}

/// Rotation amount selecting one of the four ARX micro-steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArxRotation {
    R7,
    R9,
    R13,
    R18,
}

/// One ARX micro-step applied to every quartet of the chosen ordering.
#[inline]
pub fn arx_step(x: &mut State, rot: ArxRotation, parity: Parity) {
    for &[a, b, c, d] in parity.quartets() {
        match rot {
            ArxRotation::R7 => x[b] ^= rotl32(x[a].wrapping_add(x[d]), 7),
            ArxRotation::R9 => x[c] ^= rotl32(x[b].wrapping_add(x[a]), 9),
            ArxRotation::R13 => x[d] ^= rotl32(x[c].wrapping_add(x[b]), 13),
            ArxRotation::R18 => x[a] ^= rotl32(x[d].wrapping_add(x[c]), 18),
        }
    }
}

/// Behavior of the distinguished 18-step closing the modified last round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Uarx18Mode {
    /// Leave the state untouched.
    Skip,
    /// Assign the rotation instead of XORing it, so the step discards the
    /// previous value of `a` and does not invert.
    NonInverting,
}

/// The distinguished 18-step of the modified last round. The schedule
/// applies it identically on the forward and the backward side.
#[inline]
pub fn uarx_step_18(x: &mut State, parity: Parity, mode: Uarx18Mode) {
    match mode {
        Uarx18Mode::Skip => {}
        Uarx18Mode::NonInverting => {
            for &[a, _, c, d] in parity.quartets() {
                x[a] = rotl32(x[d].wrapping_add(x[c]), 18);
            }
        }
    }
}

/// First half of a round: the 7- and 9-steps.
#[inline]
pub fn half_round_1(x: &mut State, parity: Parity) {
    arx_step(x, ArxRotation::R7, parity);
    arx_step(x, ArxRotation::R9, parity);
}

/// Second half of a round: the 13- and 18-steps.
#[inline]
pub fn half_round_2(x: &mut State, parity: Parity) {
    arx_step(x, ArxRotation::R13, parity);
    arx_step(x, ArxRotation::R18, parity);
}

/// One full round; `round_index` is 1-based and selects the ordering.
#[inline]
pub fn full_round(x: &mut State, round_index: u32) {
    let parity = Parity::of_round(round_index);
    half_round_1(x, parity);
    half_round_2(x, parity);
}

/// Undo `half_round_1` by replaying its micro-steps in reverse order.
#[inline]
pub fn invert_half_round_1(x: &mut State, parity: Parity) {
    arx_step(x, ArxRotation::R9, parity);
    arx_step(x, ArxRotation::R7, parity);
}

/// Undo `half_round_2` by replaying its micro-steps in reverse order.
#[inline]
pub fn invert_half_round_2(x: &mut State, parity: Parity) {
    arx_step(x, ArxRotation::R18, parity);
    arx_step(x, ArxRotation::R13, parity);
}

/// Undo `full_round` for the same `round_index`.
#[inline]
pub fn backward_full_round(x: &mut State, round_index: u32) {
    let parity = Parity::of_round(round_index);
    invert_half_round_2(x, parity);
    invert_half_round_1(x, parity);
}

/// `z[i] = a[i] + b[i] mod 2^32`.
#[inline]
pub fn add_states(a: &State, b: &State) -> State {
    core::array::from_fn(|i| a[i].wrapping_add(b[i]))
}

/// `z[i] = a[i] - b[i] mod 2^32`.
#[inline]
pub fn sub_states(a: &State, b: &State) -> State {
    core::array::from_fn(|i| a[i].wrapping_sub(b[i]))
}

/// `z[i] = a[i] ^ b[i]`.
#[inline]
pub fn xor_states(a: &State, b: &State) -> State {
    core::array::from_fn(|i| a[i] ^ b[i])
}

/// Write the diagonal constants and the IV words 6..=9.
#[inline]
pub fn init_iv_const(x: &mut State, iv: [u32; 4]) {
    x[0] = SIGMA[0];
    x[5] = SIGMA[1];
    x[10] = SIGMA[2];
    x[15] = SIGMA[3];
    x[6..=9].copy_from_slice(&iv);
}

/// Eight key words. 128-bit keys carry words 0..4 replicated into 4..8.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Key(pub [u32; KEY_WORDS]);

impl Key {
    /// Draw a fresh uniform key of the given size.
    pub fn random(size: KeySize, rng: &mut impl Rng) -> Self {
        match size {
            KeySize::Bits256 => Key(rng.gen()),
            KeySize::Bits128 => {
                let half: [u32; 4] = rng.gen();
                Key([
                    half[0], half[1], half[2], half[3], half[0], half[1], half[2], half[3],
                ])
            }
        }
    }

    /// Flip one key bit. In 128-bit mode both replicas flip, so word
    /// indices `w` and `w + 4` address the same experiment.
    pub fn toggle(&mut self, size: KeySize, word: usize, bit: u32) {
        match size {
            KeySize::Bits256 => toggle_bit(&mut self.0[word], bit),
            KeySize::Bits128 => {
                let w = word % 4;
                toggle_bit(&mut self.0[w], bit);
                toggle_bit(&mut self.0[w + 4], bit);
            }
        }
    }
}

/// Write the key into state words 1..=4 and 11..=14, leaving the
/// constants and the IV untouched.
#[inline]
pub fn insert_key(x: &mut State, key: &Key) {
    x[1..=4].copy_from_slice(&key.0[0..4]);
    x[11..=14].copy_from_slice(&key.0[4..8]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_state(rng: &mut impl Rng) -> State {
        rng.gen()
    }

    // The RFC 7914 test vector is byte-oriented little-endian; swapping
    // each word puts it in the word order the round machinery uses.
    fn swap(x: u32) -> u32 {
        x.swap_bytes()
    }

    #[test]
    fn salsa20_8_core_vector() {
        let input: State = [
            0x7e879a21, 0x4f3ec986, 0x7ca940e6, 0x41718f26, 0xbaee555b, 0x8c61c1b5, 0x0df84611,
            0x6dcd3b1d, 0xee24f319, 0xdf9b3d85, 0x14121e4b, 0x5ac5aa32, 0x76021d29, 0x09c74829,
            0xedebc68d, 0xb8b8c25e,
        ]
        .map(swap);
        let expected: State = [
            0xa41f859c, 0x6608cc99, 0x3b81cacb, 0x020cef05, 0x044b2181, 0xa2fd337d, 0xfd7b1c63,
            0x96682f29, 0xb4393168, 0xe3c9e6bc, 0xfe6bc5b7, 0xa06d96ba, 0xe424cc10, 0x2c91745c,
            0x24ad673d, 0xc7618f81,
        ]
        .map(swap);

        let mut x = input;
        for i in 1..=8 {
            full_round(&mut x, i);
        }
        assert_eq!(add_states(&x, &input), expected);
    }

    #[test]
    fn halves_compose_to_a_full_round() {
        let mut rng = StdRng::seed_from_u64(7);
        for round in 1..=4 {
            let start = random_state(&mut rng);
            let mut whole = start;
            full_round(&mut whole, round);

            let mut pieces = start;
            let parity = Parity::of_round(round);
            half_round_1(&mut pieces, parity);
            half_round_2(&mut pieces, parity);
            assert_eq!(whole, pieces);
        }
    }

    #[test]
    fn backward_round_inverts_forward_round() {
        let mut rng = StdRng::seed_from_u64(11);
        for round in 1..=8 {
            let start = random_state(&mut rng);
            let mut x = start;
            full_round(&mut x, round);
            backward_full_round(&mut x, round);
            assert_eq!(x, start);
        }
    }

    #[test]
    fn inverted_halves_undo_their_halves() {
        let mut rng = StdRng::seed_from_u64(13);
        for parity in [Parity::Odd, Parity::Even] {
            let start = random_state(&mut rng);

            let mut x = start;
            half_round_1(&mut x, parity);
            invert_half_round_1(&mut x, parity);
            assert_eq!(x, start);

            let mut y = start;
            half_round_2(&mut y, parity);
            invert_half_round_2(&mut y, parity);
            assert_eq!(y, start);
        }
    }

    #[test]
    fn add_sub_round_trip() {
        let mut rng = StdRng::seed_from_u64(17);
        let a = random_state(&mut rng);
        let b = random_state(&mut rng);
        assert_eq!(sub_states(&add_states(&a, &b), &b), a);
        assert_eq!(xor_states(&xor_states(&a, &b), &b), a);
    }

    #[test]
    fn uarx_18_skip_is_a_no_op() {
        let mut rng = StdRng::seed_from_u64(19);
        let start = random_state(&mut rng);
        let mut x = start;
        uarx_step_18(&mut x, Parity::Even, Uarx18Mode::Skip);
        assert_eq!(x, start);
    }

    #[test]
    fn uarx_18_non_inverting_touches_only_a_slots() {
        let mut rng = StdRng::seed_from_u64(23);
        let start = random_state(&mut rng);
        let mut x = start;
        uarx_step_18(&mut x, Parity::Even, Uarx18Mode::NonInverting);
        for (i, (&now, &before)) in x.iter().zip(start.iter()).enumerate() {
            if matches!(i, 0 | 5 | 10 | 15) {
                let quartet = [[0, 1, 2, 3], [5, 6, 7, 4], [10, 11, 8, 9], [15, 12, 13, 14]]
                    .into_iter()
                    .find(|q| q[0] == i)
                    .unwrap();
                let want = rotl32(start[quartet[3]].wrapping_add(start[quartet[2]]), 18);
                assert_eq!(now, want);
            } else {
                assert_eq!(now, before);
            }
        }
    }

    #[test]
    fn init_and_key_layout() {
        let mut rng = StdRng::seed_from_u64(29);
        let mut x = [0u32; STATE_WORDS];
        let iv: [u32; 4] = rng.gen();
        init_iv_const(&mut x, iv);
        assert_eq!(x[0], 0x6170_7865);
        assert_eq!(x[5], 0x3120_646e);
        assert_eq!(x[10], 0x7962_2d36);
        assert_eq!(x[15], 0x6b20_6574);
        assert_eq!(&x[6..=9], &iv);

        let key = Key::random(KeySize::Bits256, &mut rng);
        insert_key(&mut x, &key);
        assert_eq!(&x[1..=4], &key.0[0..4]);
        assert_eq!(&x[11..=14], &key.0[4..8]);
        assert_eq!(x[0], 0x6170_7865);
        assert_eq!(&x[6..=9], &iv);
    }

    #[test]
    fn key_128_replicates_and_toggles_both_halves() {
        let mut rng = StdRng::seed_from_u64(31);
        let mut key = Key::random(KeySize::Bits128, &mut rng);
        assert_eq!(&key.0[0..4], &key.0[4..8]);

        key.toggle(KeySize::Bits128, 6, 3);
        assert_eq!(key.0[2] ^ key.0[6], 0);
        let mut twin = key;
        twin.toggle(KeySize::Bits128, 2, 3);
        twin.toggle(KeySize::Bits128, 6, 3);
        assert_eq!(twin, key);
    }
}
