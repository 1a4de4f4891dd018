//! Parallel sampling coordinator.
//!
//! The outer (key word, key bit) loop is sequential; each iteration fans
//! W worker tasks out over the rayon pool, every task running S
//! independent trials with its own RNG. The only shared mutable state is
//! the caller's progress counter, bumped once per evaluated bit with
//! relaxed ordering.

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use rayon::prelude::*;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::experiment::{run_trial, TargetBit};
use crate::salsa::WORD_BITS;

/// Bias measured for one key bit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BitBias {
    pub index: u16,
    pub bias: f64,
}

/// Classification outcome of a full search. Both lists are sorted
/// ascending by global index and are disjoint; together with the skip
/// set they cover every key bit.
#[derive(Clone, Debug, Default)]
pub struct SearchResults {
    pub pnbs: Vec<BitBias>,
    pub non_pnbs: Vec<BitBias>,
}

/// Match count contributed by one worker task.
fn worker_matches(cfg: &SearchConfig, target: TargetBit, task: usize) -> Result<u64> {
    let mut rng = cfg.sampling.seeding.worker_rng(target.index(), task)?;
    let mut matches = 0u64;
    for _ in 0..cfg.sampling.trials_per_worker {
        matches += u64::from(run_trial(cfg, target, &mut rng));
    }
    Ok(matches)
}

/// Measure the bias of a single key bit with W parallel workers.
///
/// A failed worker is logged and contributes zero matches; the
/// denominator stays W * S, so the estimate loses precision but the run
/// continues.
pub fn measure_bit(cfg: &SearchConfig, target: TargetBit) -> f64 {
    let matches: u64 = (0..cfg.sampling.workers)
        .into_par_iter()
        .map(|task| match worker_matches(cfg, target, task) {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    "worker {task} for key bit {} failed: {err}; counting zero matches",
                    target.index()
                );
                0
            }
        })
        .sum();
    2.0 * matches as f64 / cfg.sampling.trials_per_bit() as f64 - 1.0
}

/// Evaluate every non-skipped key bit and classify against the
/// threshold.
///
/// `progress` is monotone non-decreasing and reaches
/// [`SearchConfig::total_work`] on return.
pub fn search(cfg: &SearchConfig, progress: &AtomicU64) -> Result<SearchResults> {
    cfg.validate()?;

    let key_bits = cfg.cipher.key_size.search_bits();
    let mut pnbs = Vec::with_capacity(key_bits);
    let mut non_pnbs = Vec::with_capacity(key_bits);

    for word in 0..cfg.cipher.key_size.search_words() {
        for bit in 0..WORD_BITS as u32 {
            let index = (word * WORD_BITS) as u16 + bit as u16;
            if cfg.pnb.is_skipped(index) {
                continue;
            }

            let bias = measure_bit(cfg, TargetBit { word, bit });
            debug!("key bit {index}: bias {bias:+.6}");

            if bias.abs() >= cfg.pnb.threshold && bias.abs() > 0.0 {
                pnbs.push(BitBias { index, bias });
            } else {
                non_pnbs.push(BitBias { index, bias });
            }
            progress.fetch_add(1, Ordering::Relaxed);
        }
    }

    sort_dedup_by_index(&mut pnbs);
    sort_dedup_by_index(&mut non_pnbs);
    Ok(SearchResults { pnbs, non_pnbs })
}

fn sort_dedup_by_index(entries: &mut Vec<BitBias>) {
    entries.sort_by_key(|e| e.index);
    let before = entries.len();
    entries.dedup_by_key(|e| e.index);
    assert_eq!(before, entries.len(), "per-bit result produced twice");
}
