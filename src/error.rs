//! Engine error type.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("neutrality threshold {0} outside [0, 1]")]
    ThresholdOutOfRange(f64),
    #[error("round count {0} is not a non-negative multiple of 0.5")]
    InvalidRoundCount(f64),
    #[error("distinguishing round {fwd} exceeds total rounds {total}")]
    FwdRoundsExceedTotal { fwd: f64, total: f64 },
    #[error("unsupported key size {0} (expected 128 or 256)")]
    UnsupportedKeySize(u32),
    #[error("difference/mask position ({word}, {bit}) outside the 16x32 state")]
    BitPosOutOfRange { word: usize, bit: u32 },
    #[error("sampling volume is zero ({workers} workers x {trials} trials)")]
    EmptySampling { workers: usize, trials: u64 },
    #[error("skip index {index} outside the {key_bits} key bits")]
    SkipIndexOutOfRange { index: u32, key_bits: usize },
    #[error("unreadable skip index {0:?}")]
    MalformedSkipIndex(String),
    #[error("worker RNG unavailable: {0}")]
    Rng(#[from] rand::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
