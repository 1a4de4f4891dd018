//! PNB search command line.
//!
//! Drives one full search: build and validate the configuration, print
//! the banner, run the coordinator with a progress ticker, print the
//! console summary and optionally write the report file. Classification
//! completing makes the run a success; a failed report write is logged
//! but does not change the exit status.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::{info, warn};

use salsa_pnb::{
    report, search, BitPos, CipherParams, Distinguisher, HalfRounds, KeySize, PnbParams, PnbReport,
    Sampling, SearchConfig, Seeding, TailMode, Uarx18Mode, DEFAULT_THRESHOLD,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Probabilistic neutral bit search for reduced-round Salsa"
)]
struct Cli {
    /// Neutrality threshold in [0, 1]. Out-of-range or unparseable
    /// values warn and fall back to 0.35.
    threshold: Option<String>,

    /// Extra word flags: `log` (or `1`) writes the report file, `seg`
    /// prints per-keyword segments on the console.
    #[arg(value_name = "FLAG")]
    flags: Vec<String>,

    /// Total Salsa rounds (a multiple of 0.5).
    #[arg(long, default_value_t = 7.0)]
    rounds: f64,

    /// Rounds after which the forward parity is sampled.
    #[arg(long, default_value_t = 5.0)]
    dist_rounds: f64,

    /// Key size in bits (128 or 256).
    #[arg(long, default_value_t = 256)]
    key_size: u32,

    /// Worker tasks per key bit. Defaults to the hardware parallelism
    /// minus one.
    #[arg(long)]
    threads: Option<usize>,

    /// log2 of the trial count per worker.
    #[arg(long, default_value_t = 18)]
    samples_log2: u32,

    /// Deterministic root seed; omit to seed every worker from OS
    /// entropy.
    #[arg(long)]
    seed: Option<u64>,

    /// File of whitespace/comma-separated key-bit indices to skip.
    #[arg(long)]
    skip_file: Option<PathBuf>,

    /// Directory the report file is written into.
    #[arg(long, default_value = "pnb-logs")]
    out_dir: PathBuf,

    /// Drop the modified-last-round tail and run the plain schedule.
    #[arg(long)]
    plain_tail: bool,

    /// Use the non-inverting final 18-step instead of skipping it.
    #[arg(long)]
    noninverting_18: bool,
}

fn parse_threshold(arg: Option<&str>) -> f64 {
    match arg.map(str::parse::<f64>) {
        None => DEFAULT_THRESHOLD,
        Some(Ok(t)) if (0.0..=1.0).contains(&t) => t,
        Some(Ok(t)) => {
            warn!("neutrality threshold {t} outside [0, 1]; using default {DEFAULT_THRESHOLD}");
            DEFAULT_THRESHOLD
        }
        Some(Err(_)) => {
            warn!("invalid neutrality threshold; using default {DEFAULT_THRESHOLD}");
            DEFAULT_THRESHOLD
        }
    }
}

fn parse_word_flags(flags: &[String]) -> (bool, bool) {
    let mut want_log = false;
    let mut want_seg = false;
    for flag in flags {
        match flag.to_ascii_lowercase().as_str() {
            "log" | "1" => want_log = true,
            "seg" | "segment" | "segments" => want_seg = true,
            other => warn!("ignoring unknown flag {other:?}"),
        }
    }
    (want_log, want_seg)
}

fn build_config(cli: &Cli) -> Result<SearchConfig> {
    let key_size = KeySize::from_bits(cli.key_size)?;
    let skip = match &cli.skip_file {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading skip file {}", path.display()))?;
            PnbParams::parse_skip_list(&text, key_size.search_bits())?
        }
        None => Vec::new(),
    };

    let tail = if cli.plain_tail {
        TailMode::None
    } else if cli.noninverting_18 {
        TailMode::LastRoundModified(Uarx18Mode::NonInverting)
    } else {
        TailMode::LastRoundModified(Uarx18Mode::Skip)
    };
    let comment = match tail {
        TailMode::None => "plain schedule",
        TailMode::LastRoundModified(_) => "last round modified",
    };

    let cfg = SearchConfig {
        cipher: CipherParams {
            name: "salsa".to_owned(),
            mode_tag: "PNBsearch".to_owned(),
            comment: comment.to_owned(),
            key_size,
            total_rounds: HalfRounds::new(cli.rounds)?,
            tail,
        },
        distinguisher: Distinguisher {
            fwd_rounds: HalfRounds::new(cli.dist_rounds)?,
            input_diff: vec![BitPos::new(7, 31)],
            output_mask: vec![BitPos::new(4, 7)],
        },
        sampling: Sampling {
            workers: cli.threads.unwrap_or_else(Sampling::default_workers),
            trials_per_worker: 1u64 << cli.samples_log2,
            seeding: cli.seed.map_or(Seeding::Entropy, Seeding::Deterministic),
        },
        pnb: PnbParams::new(parse_threshold(cli.threshold.as_deref()), skip)?,
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Progress ticker fulfilling the progress-sink contract: the counter is
/// monotone and reaches `total` when the search succeeds.
fn spawn_progress_ticker(progress: Arc<AtomicU64>, total: u64) {
    if total == 0 {
        return;
    }
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(10));
        let done = progress.load(Ordering::Relaxed);
        info!("searched {done}/{total} key bits");
        if done >= total {
            break;
        }
    });
}

fn write_report(dir: &Path, cfg: &SearchConfig, text: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report::report_filename(cfg, Local::now()));
    fs::write(&path, text)?;
    Ok(path)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let (want_log, want_seg) = parse_word_flags(&cli.flags);

    let cfg = build_config(&cli)?;
    let started = Local::now();
    let clock = Instant::now();
    print!("{}", report::render_banner(&cfg, started));

    let progress = Arc::new(AtomicU64::new(0));
    spawn_progress_ticker(Arc::clone(&progress), cfg.total_work());

    let results = search::search(&cfg, &progress)?;
    let elapsed = clock.elapsed();
    let summary = PnbReport::build(&cfg, &results);

    println!(
        "\n{} PNBs (sorted by index):\n{}",
        summary.pnbs_by_index.len(),
        report::braced_list(&summary.pnbs_by_index)
    );
    if want_seg {
        print!(
            "{}",
            report::per_keyword_segments(
                &summary.pnbs_by_index,
                cfg.cipher.key_size,
                "Per-keyword PNB segments"
            )
        );
        print!(
            "{}",
            report::per_keyword_segments(
                &summary.non_pnbs_by_index,
                cfg.cipher.key_size,
                "Per-keyword non-PNB segments"
            )
        );
    }

    if want_log {
        let text = report::render_report(&cfg, &summary, started, elapsed);
        match write_report(&cli.out_dir, &cfg, &text) {
            Ok(path) => println!("Log saved to: {}", path.display()),
            Err(err) => warn!("could not write report: {err:#}"),
        }
    }

    info!("finished in {elapsed:.2?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_falls_back_to_default() {
        assert_eq!(parse_threshold(None), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold(Some("0.5")), 0.5);
        assert_eq!(parse_threshold(Some("0")), 0.0);
        assert_eq!(parse_threshold(Some("1")), 1.0);
        assert_eq!(parse_threshold(Some("1.5")), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold(Some("-0.2")), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold(Some("abc")), DEFAULT_THRESHOLD);
    }

    #[test]
    fn word_flags_accept_known_spellings() {
        let flags = |words: &[&str]| {
            parse_word_flags(&words.iter().map(|w| (*w).to_owned()).collect::<Vec<_>>())
        };
        assert_eq!(flags(&[]), (false, false));
        assert_eq!(flags(&["log"]), (true, false));
        assert_eq!(flags(&["1"]), (true, false));
        assert_eq!(flags(&["SEG"]), (false, true));
        assert_eq!(flags(&["segments", "log"]), (true, true));
        assert_eq!(flags(&["bogus"]), (false, false));
    }
}
