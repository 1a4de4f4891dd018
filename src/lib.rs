//! Probabilistic neutral bit search for reduced-round Salsa
//!
//! This crate estimates, by Monte-Carlo sampling, how neutral each
//! secret key bit is with respect to a fixed differential-linear
//! distinguisher, and classifies the key bits into probabilistic neutral
//! bits (PNBs) and non-PNBs against a caller-supplied threshold.
//!
//! Moving parts:
//! - Bit-exact Salsa ARX machinery with odd/even quartet orderings and
//!   half-round granularity (`salsa`)
//! - The `X + X^R - K` trick: a keyed reference copy of the initial
//!   state lets a partial backward pass reconstruct the upper rounds
//!   after a single key-bit flip, without knowing the full key
//!   (`experiment`)
//! - A sequential (key word, key bit) coordinator fanning W worker
//!   tasks of S trials each out over rayon (`search`)
//! - Aggregation into sorted PNB/non-PNB sets, per-keyword views and a
//!   plain-text report (`report`)
//!
//! The crate is a search engine, not a cipher: there is no
//! nonce/counter keystream API, and the key-recovery phase that
//! consumes the PNB set lives elsewhere.

pub mod bits;
pub mod config;
pub mod error;
pub mod experiment;
pub mod report;
pub mod salsa;
pub mod search;

// Re-exports - public API
pub use config::{
    BitPos, CipherParams, Distinguisher, HalfRounds, KeySize, PnbParams, Sampling, SearchConfig,
    Seeding, TailMode, DEFAULT_THRESHOLD,
};
pub use error::{Error, Result};
pub use experiment::{mask_parity, run_trial, TargetBit};
pub use report::PnbReport;
pub use salsa::{Key, Parity, State, Uarx18Mode};
pub use search::{measure_bit, search, BitBias, SearchResults};
