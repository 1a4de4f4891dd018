//! Immutable run configuration.
//!
//! A single [`SearchConfig`] value is built once, validated, and
//! threaded by shared reference through the coordinator and the
//! experiment kernel; nothing is mutated during a run.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};
use crate::salsa::{Uarx18Mode, STATE_WORDS, WORD_BITS};

/// Threshold used when the caller supplies none or an invalid one.
pub const DEFAULT_THRESHOLD: f64 = 0.35;

/// Salsa key size. 128-bit keys are replicated into the 8-word array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySize {
    Bits128,
    Bits256,
}

impl KeySize {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            128 => Ok(KeySize::Bits128),
            256 => Ok(KeySize::Bits256),
            other => Err(Error::UnsupportedKeySize(other)),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            KeySize::Bits128 => 128,
            KeySize::Bits256 => 256,
        }
    }

    /// Distinct key words the search iterates over.
    pub fn search_words(self) -> usize {
        match self {
            KeySize::Bits128 => 4,
            KeySize::Bits256 => 8,
        }
    }

    /// Distinct key bits, i.e. the length of the bias vector.
    pub fn search_bits(self) -> usize {
        self.search_words() * WORD_BITS
    }
}

/// A round count restricted to multiples of one half.
///
/// Stored as the number of half-rounds so the hot path never touches
/// floating point: [`Self::full`] is the completed-round count and
/// [`Self::is_fractional`] tells whether a trailing half-round follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct HalfRounds(u32);

impl HalfRounds {
    pub fn new(rounds: f64) -> Result<Self> {
        let scaled = rounds * 2.0;
        if !(rounds >= 0.0) || scaled.fract() != 0.0 || scaled > u32::MAX as f64 {
            return Err(Error::InvalidRoundCount(rounds));
        }
        Ok(HalfRounds(scaled as u32))
    }

    /// Completed full rounds.
    pub fn full(self) -> u32 {
        self.0 / 2
    }

    /// Whether a trailing half-round follows the full rounds.
    pub fn is_fractional(self) -> bool {
        self.0 % 2 == 1
    }

    pub fn as_rounds(self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

/// A (state word, bit) coordinate, used for differences and masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitPos {
    pub word: usize,
    pub bit: u32,
}

impl BitPos {
    pub const fn new(word: usize, bit: u32) -> Self {
        Self { word, bit }
    }
}

/// Schedule of the extra half-round tail after the integral rounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailMode {
    /// Run exactly the configured rounds.
    None,
    /// The "last round modified" schedule: an extra even half-round-1,
    /// the even 13-step, and the distinguished 18-step in the given
    /// mode.
    LastRoundModified(Uarx18Mode),
}

/// Cipher-level parameters and banner metadata.
#[derive(Clone, Debug)]
pub struct CipherParams {
    pub name: String,
    pub mode_tag: String,
    pub comment: String,
    pub key_size: KeySize,
    pub total_rounds: HalfRounds,
    pub tail: TailMode,
}

/// The fixed differential-linear characteristic under evaluation.
#[derive(Clone, Debug)]
pub struct Distinguisher {
    /// Depth at which the forward parity is sampled.
    pub fwd_rounds: HalfRounds,
    /// Input difference injected into the initial state.
    pub input_diff: Vec<BitPos>,
    /// Linear mask whose XOR forms the one-bit parity.
    pub output_mask: Vec<BitPos>,
}

/// Worker RNG seeding policy.
#[derive(Clone, Copy, Debug)]
pub enum Seeding {
    /// Each worker seeds from OS entropy on first use.
    Entropy,
    /// Per-worker seeds derived from a fixed root, for reproducible runs.
    Deterministic(u64),
}

impl Seeding {
    /// Build the RNG for worker `task` of key bit `index`. Deterministic
    /// seeds mix in the coordinates so the measured bias does not depend
    /// on task scheduling.
    pub fn worker_rng(self, index: u16, task: usize) -> Result<ChaCha8Rng> {
        match self {
            Seeding::Entropy => Ok(ChaCha8Rng::from_rng(rand::thread_rng())?),
            Seeding::Deterministic(root) => {
                let lane = (u64::from(index) << 32) | task as u64;
                Ok(ChaCha8Rng::seed_from_u64(root ^ splitmix64(lane)))
            }
        }
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Monte-Carlo volume per evaluated key bit.
#[derive(Clone, Copy, Debug)]
pub struct Sampling {
    /// Parallel worker tasks per key bit.
    pub workers: usize,
    /// Independent trials each worker runs.
    pub trials_per_worker: u64,
    pub seeding: Seeding,
}

impl Sampling {
    /// Total trials behind one bias estimate.
    pub fn trials_per_bit(&self) -> u64 {
        self.workers as u64 * self.trials_per_worker
    }

    /// Hardware parallelism minus one, leaving a core free.
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}

/// Classification parameters.
#[derive(Clone, Debug)]
pub struct PnbParams {
    /// Neutrality threshold in [0, 1].
    pub threshold: f64,
    /// Sorted global bit indices excluded from the search.
    pub skip: Vec<u16>,
}

impl PnbParams {
    pub fn new(threshold: f64, mut skip: Vec<u16>) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::ThresholdOutOfRange(threshold));
        }
        skip.sort_unstable();
        skip.dedup();
        Ok(Self { threshold, skip })
    }

    pub fn is_skipped(&self, index: u16) -> bool {
        self.skip.binary_search(&index).is_ok()
    }

    /// Parse a whitespace/comma-separated index list, as accepted for
    /// skip files. Values at or beyond `key_bits` are rejected.
    pub fn parse_skip_list(text: &str, key_bits: usize) -> Result<Vec<u16>> {
        let mut out = Vec::new();
        for token in text.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let index: u32 = token
                .parse()
                .map_err(|_| Error::MalformedSkipIndex(token.to_owned()))?;
            if index as usize >= key_bits {
                return Err(Error::SkipIndexOutOfRange { index, key_bits });
            }
            out.push(index as u16);
        }
        Ok(out)
    }
}

/// Everything a run needs, validated once and then read-only.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub cipher: CipherParams,
    pub distinguisher: Distinguisher,
    pub sampling: Sampling,
    pub pnb: PnbParams,
}

impl SearchConfig {
    /// Cross-field validation; run before any sampling starts.
    pub fn validate(&self) -> Result<()> {
        if self.distinguisher.fwd_rounds > self.cipher.total_rounds {
            return Err(Error::FwdRoundsExceedTotal {
                fwd: self.distinguisher.fwd_rounds.as_rounds(),
                total: self.cipher.total_rounds.as_rounds(),
            });
        }
        for pos in self
            .distinguisher
            .input_diff
            .iter()
            .chain(&self.distinguisher.output_mask)
        {
            if pos.word >= STATE_WORDS || pos.bit >= WORD_BITS as u32 {
                return Err(Error::BitPosOutOfRange {
                    word: pos.word,
                    bit: pos.bit,
                });
            }
        }
        if self.sampling.workers == 0 || self.sampling.trials_per_worker == 0 {
            return Err(Error::EmptySampling {
                workers: self.sampling.workers,
                trials: self.sampling.trials_per_worker,
            });
        }
        let key_bits = self.cipher.key_size.search_bits();
        if let Some(&index) = self.pnb.skip.iter().find(|&&i| i as usize >= key_bits) {
            return Err(Error::SkipIndexOutOfRange {
                index: u32::from(index),
                key_bits,
            });
        }
        Ok(())
    }

    /// Number of key bits the search will actually evaluate.
    pub fn total_work(&self) -> u64 {
        let key_bits = self.cipher.key_size.search_bits();
        let skipped = self
            .pnb
            .skip
            .iter()
            .filter(|&&i| (i as usize) < key_bits)
            .count();
        (key_bits - skipped) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_rounds_accepts_multiples_of_one_half() {
        assert_eq!(HalfRounds::new(7.0).unwrap().full(), 7);
        assert!(!HalfRounds::new(7.0).unwrap().is_fractional());
        let r = HalfRounds::new(7.5).unwrap();
        assert_eq!(r.full(), 7);
        assert!(r.is_fractional());
        assert_eq!(r.as_rounds(), 7.5);
        assert_eq!(HalfRounds::new(0.0).unwrap().full(), 0);

        assert!(HalfRounds::new(7.25).is_err());
        assert!(HalfRounds::new(-1.0).is_err());
        assert!(HalfRounds::new(f64::NAN).is_err());
    }

    #[test]
    fn key_size_gatekeeping() {
        assert_eq!(KeySize::from_bits(256).unwrap().search_words(), 8);
        assert_eq!(KeySize::from_bits(128).unwrap().search_bits(), 128);
        assert!(KeySize::from_bits(192).is_err());
    }

    #[test]
    fn skip_list_parsing() {
        let skip = PnbParams::parse_skip_list("1, 2 3\n250", 256).unwrap();
        assert_eq!(skip, vec![1, 2, 3, 250]);
        assert!(PnbParams::parse_skip_list("256", 256).is_err());
        assert!(PnbParams::parse_skip_list("12 x", 256).is_err());
        assert!(PnbParams::parse_skip_list("", 256).unwrap().is_empty());
    }

    #[test]
    fn threshold_bounds() {
        assert!(PnbParams::new(0.0, vec![]).is_ok());
        assert!(PnbParams::new(1.0, vec![]).is_ok());
        assert!(PnbParams::new(1.5, vec![]).is_err());
        assert!(PnbParams::new(-0.1, vec![]).is_err());
    }

    #[test]
    fn skip_sorted_and_deduplicated() {
        let pnb = PnbParams::new(0.5, vec![9, 3, 3, 200]).unwrap();
        assert_eq!(pnb.skip, vec![3, 9, 200]);
        assert!(pnb.is_skipped(9));
        assert!(!pnb.is_skipped(10));
    }

    #[test]
    fn deterministic_worker_rngs_differ_per_lane() {
        use rand::RngCore;
        let seeding = Seeding::Deterministic(42);
        let mut a = seeding.worker_rng(0, 0).unwrap();
        let mut b = seeding.worker_rng(0, 1).unwrap();
        let mut c = seeding.worker_rng(1, 0).unwrap();
        let mut a2 = seeding.worker_rng(0, 0).unwrap();
        let x = a.next_u64();
        assert_ne!(x, b.next_u64());
        assert_ne!(x, c.next_u64());
        assert_eq!(x, a2.next_u64());
    }
}
