//! One Monte-Carlo neutrality trial.
//!
//! A trial runs a differential state pair forward, samples the
//! output-mask parity at the distinguishing depth, then reconstructs the
//! upper rounds under a single flipped key bit through the
//! `X + X^R - K` identity and a partial backward pass, and reports
//! whether the two parities agree. The keyed reference copy `X^R` of the
//! initial state is what makes the backward pass possible without
//! knowing the full key: adding it to the forward output and subtracting
//! the re-keyed initial state leaves a state that differs from the
//! forward output only through the flipped key bit.

use rand::Rng;

use crate::bits::{get_bit, toggle_bit};
use crate::config::{BitPos, SearchConfig, TailMode};
use crate::salsa::{
    add_states, arx_step, backward_full_round, full_round, half_round_1, half_round_2,
    init_iv_const, insert_key, invert_half_round_1, invert_half_round_2, sub_states, uarx_step_18,
    xor_states, ArxRotation, Key, Parity, State, STATE_WORDS, WORD_BITS,
};

/// Key bit under evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetBit {
    pub word: usize,
    pub bit: u32,
}

impl TargetBit {
    pub fn from_index(index: u16) -> Self {
        Self {
            word: index as usize / WORD_BITS,
            bit: index as u32 % WORD_BITS as u32,
        }
    }

    pub fn index(self) -> u16 {
        (self.word * WORD_BITS) as u16 + self.bit as u16
    }
}

/// XOR-parity of `mask` over a state difference.
#[inline]
pub fn mask_parity(d: &State, mask: &[BitPos]) -> u8 {
    mask.iter()
        .fold(0, |acc, m| acc ^ get_bit(d[m.word], m.bit) as u8)
}

/// Rounds up to and including the distinguishing point.
fn forward_lower(cfg: &SearchConfig, s: &mut State) {
    let fwd = cfg.distinguisher.fwd_rounds;
    for i in 1..=fwd.full() {
        full_round(s, i);
    }
    if fwd.is_fractional() {
        half_round_1(s, Parity::after(fwd.full()));
    }
}

/// Everything between the distinguishing point and the final state: the
/// completion of a fractional distinguishing round, the remaining full
/// rounds, a fractional final half-round, and the modified-last-round
/// tail.
fn forward_upper(cfg: &SearchConfig, s: &mut State) {
    let fwd = cfg.distinguisher.fwd_rounds;
    let total = cfg.cipher.total_rounds;
    let fwd_post = if fwd.is_fractional() {
        fwd.full() + 2
    } else {
        fwd.full() + 1
    };

    if fwd.is_fractional() {
        half_round_2(s, Parity::after(fwd.full()));
    }
    for i in fwd_post..=total.full() {
        full_round(s, i);
    }
    if total.is_fractional() {
        half_round_1(s, Parity::after(total.full()));
    }
    if let TailMode::LastRoundModified(u18) = cfg.cipher.tail {
        half_round_1(s, Parity::Even);
        arx_step(s, ArxRotation::R13, Parity::Even);
        uarx_step_18(s, Parity::Even, u18);
    }
}

/// Inverse of [`forward_upper`], replayed in reverse order. Exact for
/// `Uarx18Mode::Skip`; the non-inverting 18-step is deliberately not
/// invertible and is replayed as-is on both sides of the schedule.
fn backward_upper(cfg: &SearchConfig, s: &mut State) {
    let fwd = cfg.distinguisher.fwd_rounds;
    let total = cfg.cipher.total_rounds;
    let bwd_floor = if fwd.is_fractional() {
        fwd.full() + 1
    } else {
        fwd.full()
    };

    if let TailMode::LastRoundModified(u18) = cfg.cipher.tail {
        uarx_step_18(s, Parity::Even, u18);
        arx_step(s, ArxRotation::R13, Parity::Even);
        invert_half_round_1(s, Parity::Even);
    }
    if total.is_fractional() {
        invert_half_round_1(s, Parity::after(total.full()));
    }
    for i in (bwd_floor + 1..=total.full()).rev() {
        backward_full_round(s, i);
    }
    if fwd.is_fractional() {
        invert_half_round_2(s, Parity::after(fwd.full()));
    }
}

/// Run one trial; `true` means the forward and backward parities matched.
pub fn run_trial(cfg: &SearchConfig, target: TargetBit, rng: &mut impl Rng) -> bool {
    let mask = &cfg.distinguisher.output_mask;

    // Fresh state: constants, random IV, random key.
    let mut x: State = [0; STATE_WORDS];
    init_iv_const(&mut x, rng.gen());
    let mut key = Key::random(cfg.cipher.key_size, rng);
    insert_key(&mut x, &key);

    let x_ref = x;
    let mut dx = x;
    for p in &cfg.distinguisher.input_diff {
        toggle_bit(&mut dx[p.word], p.bit);
    }
    let dx_ref = dx;

    forward_lower(cfg, &mut x);
    forward_lower(cfg, &mut dx);

    let fwd_parity = mask_parity(&xor_states(&x, &dx), mask);

    forward_upper(cfg, &mut x);
    forward_upper(cfg, &mut dx);

    // SUM := X + X^R, then re-key the reference copies with the flipped
    // bit; SUM - X^R_flipped carries the forward output shifted by the
    // key-row difference of the two keys.
    let sum = add_states(&x, &x_ref);
    let dsum = add_states(&dx, &dx_ref);

    key.toggle(cfg.cipher.key_size, target.word, target.bit);
    let mut x_flip = x_ref;
    let mut dx_flip = dx_ref;
    insert_key(&mut x_flip, &key);
    insert_key(&mut dx_flip, &key);

    let mut m = sub_states(&sum, &x_flip);
    let mut dm = sub_states(&dsum, &dx_flip);

    backward_upper(cfg, &mut m);
    backward_upper(cfg, &mut dm);

    let bwd_parity = mask_parity(&xor_states(&m, &dm), mask);

    fwd_parity == bwd_parity
}
