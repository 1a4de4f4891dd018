//! Result aggregation and report rendering.
//!
//! Everything here is derived from the classified per-bit biases: the
//! sorted index lists, the |bias|-ranked PNB ordering, the per-keyword
//! bias table, `[hi:lo]` segment runs, the P/S map, and the
//! `-log2(|bias|)` view consumed by the recovery-phase planning. The
//! renderer builds one plain-text buffer; writing it anywhere is the
//! caller's business.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::config::{BitPos, KeySize, SearchConfig};
use crate::salsa::WORD_BITS;
use crate::search::SearchResults;

const RULE: &str =
    "------------------------------------------------------------------------------\n";

/// Aggregated per-bit view of a finished search.
#[derive(Clone, Debug)]
pub struct PnbReport {
    /// PNB indices, ascending.
    pub pnbs_by_index: Vec<u16>,
    /// PNB indices ranked by decreasing |bias|; ties keep the by-index
    /// insertion order.
    pub pnbs_by_bias: Vec<u16>,
    /// Non-PNB indices, ascending.
    pub non_pnbs_by_index: Vec<u16>,
    /// Bias per global key bit; skipped indices stay at 0.0.
    pub bias_per_bit: Vec<f64>,
    /// Consecutive-run split of the PNB set: runs of length >= 2 minus
    /// their final element, the final elements, and isolated bits.
    pub pnbs_in_pattern: Vec<u16>,
    pub pnbs_in_border: Vec<u16>,
    pub rest_pnbs: Vec<u16>,
}

impl PnbReport {
    pub fn build(cfg: &SearchConfig, results: &SearchResults) -> Self {
        let key_bits = cfg.cipher.key_size.search_bits();
        let mut bias_per_bit = vec![0.0; key_bits];
        for e in results.pnbs.iter().chain(&results.non_pnbs) {
            bias_per_bit[e.index as usize] = e.bias;
        }

        let pnbs_by_index: Vec<u16> = results.pnbs.iter().map(|e| e.index).collect();
        let non_pnbs_by_index: Vec<u16> = results.non_pnbs.iter().map(|e| e.index).collect();

        let mut ranked = results.pnbs.clone();
        ranked.sort_by(|a, b| b.bias.abs().total_cmp(&a.bias.abs()));
        let pnbs_by_bias = ranked.into_iter().map(|e| e.index).collect();

        let (pnbs_in_pattern, pnbs_in_border, rest_pnbs) = split_consecutive(&pnbs_by_index);

        Self {
            pnbs_by_index,
            pnbs_by_bias,
            non_pnbs_by_index,
            bias_per_bit,
            pnbs_in_pattern,
            pnbs_in_border,
            rest_pnbs,
        }
    }

    /// `-log2(|bias|)` for every key bit: infinite at zero bias, 0 at
    /// |bias| = 1.
    pub fn neg_log2_biases(&self) -> Vec<f64> {
        self.bias_per_bit.iter().map(|&b| neg_log2(b)).collect()
    }
}

pub fn neg_log2(bias: f64) -> f64 {
    let magnitude = bias.abs();
    if magnitude == 0.0 {
        f64::INFINITY
    } else {
        -magnitude.log2()
    }
}

/// Split a sorted index list into (runs minus their last element, run
/// last elements, isolated bits) by the consecutive-run rule.
pub fn split_consecutive(elems: &[u16]) -> (Vec<u16>, Vec<u16>, Vec<u16>) {
    let mut pattern = Vec::new();
    let mut border = Vec::new();
    let mut rest = Vec::new();
    let mut run: Vec<u16> = Vec::new();

    fn flush(run: &[u16], pattern: &mut Vec<u16>, border: &mut Vec<u16>, rest: &mut Vec<u16>) {
        match run {
            [] => {}
            [lone] => rest.push(*lone),
            [body @ .., last] => {
                pattern.extend_from_slice(body);
                border.push(*last);
            }
        }
    }

    for &e in elems {
        if run.last().is_some_and(|&last| e != last + 1) {
            flush(&run, &mut pattern, &mut border, &mut rest);
            run.clear();
        }
        run.push(e);
    }
    flush(&run, &mut pattern, &mut border, &mut rest);
    (pattern, border, rest)
}

/// `{a, b, c}` rendering used for every index list in the report.
pub fn braced_list<T: std::fmt::Display>(items: &[T]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{item}");
    }
    out.push('}');
    out
}

fn positions(list: &[BitPos]) -> String {
    let mut out = String::new();
    for (i, p) in list.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "({}, {})", p.word, p.bit);
    }
    out
}

/// Collapse a descending bit list into `[hi:lo]` / `[b]` segments.
fn compress_segments_desc(bits_desc: &[u32]) -> String {
    let mut out = String::new();
    let Some((&first, tail)) = bits_desc.split_first() else {
        return out;
    };

    let mut seg_start = first;
    let mut seg_end = first;
    let mut flush = |out: &mut String, start: u32, end: u32| {
        if !out.is_empty() {
            out.push_str(", ");
        }
        if start == end {
            let _ = write!(out, "[{start}]");
        } else {
            let _ = write!(out, "[{start}:{end}]");
        }
    };

    for &b in tail {
        if b + 1 == seg_end {
            seg_end = b;
        } else {
            flush(&mut out, seg_start, seg_end);
            seg_start = b;
            seg_end = b;
        }
    }
    flush(&mut out, seg_start, seg_end);
    out
}

/// Per-keyword `[hi:lo]` segment lines for a sorted index list.
pub fn per_keyword_segments(indices: &[u16], key_size: KeySize, title: &str) -> String {
    let mut out = String::from(RULE);
    if indices.is_empty() {
        let _ = writeln!(out, "{title}\n(none)");
        return out;
    }
    let _ = writeln!(out, "{title}:");

    for word in 0..key_size.search_words() {
        let mut bits_desc: Vec<u32> = indices
            .iter()
            .filter(|&&i| i as usize / WORD_BITS == word)
            .map(|&i| i as u32 % WORD_BITS as u32)
            .collect();
        if bits_desc.is_empty() {
            continue;
        }
        bits_desc.sort_unstable_by(|a, b| b.cmp(a));

        let label = format!(
            "Keyword {word} ({}-{})",
            word * WORD_BITS,
            (word + 1) * WORD_BITS - 1
        );
        let _ = writeln!(out, "{label:<22} : {}", compress_segments_desc(&bits_desc));
    }
    out
}

/// Per-keyword map with `p` at PNB bits, `s` at non-PNB bits, `.` at
/// skipped bits; bit 31 leftmost.
pub fn per_keyword_ps_map(pnbs: &[u16], non_pnbs: &[u16], key_size: KeySize) -> String {
    let key_bits = key_size.search_bits();
    let mut flags = vec!['.'; key_bits];
    for &i in non_pnbs.iter().filter(|&&i| (i as usize) < key_bits) {
        flags[i as usize] = 's';
    }
    for &i in pnbs.iter().filter(|&&i| (i as usize) < key_bits) {
        flags[i as usize] = 'p';
    }

    let mut out = String::from(RULE);
    let _ = writeln!(out, "Per-keyword P/S map (bit {} .. 0):", WORD_BITS - 1);
    for word in 0..key_size.search_words() {
        let start = word * WORD_BITS;
        let end = start + WORD_BITS - 1;
        let line: String = (start..=end).rev().map(|b| flags[b]).collect();
        let label = format!("Keyword {word} ({start}-{end})");
        let _ = writeln!(out, "{label:<22} : {line}");
    }
    out
}

/// Bias of every key bit, grouped by keyword and flagged P or N.
pub fn bias_table_by_word(bias_per_bit: &[f64], pnbs: &[u16], key_size: KeySize) -> String {
    let mut out = String::from(RULE);
    let _ = writeln!(
        out,
        "Bias list of all {} key-bits\nFormat: bit_index  bias_value  flag\n(P = PNB, N = non-PNB)",
        key_size.bits()
    );

    for word in 0..key_size.search_words() {
        let start = word * WORD_BITS;
        let end = start + WORD_BITS - 1;
        let _ = writeln!(out, "--- Keyword {word} ({start}-{end}) ---");
        for index in start..=end {
            let flag = if pnbs.binary_search(&(index as u16)).is_ok() {
                'P'
            } else {
                'N'
            };
            let _ = writeln!(out, "{index:>6}  {:>12.3}  {flag}", bias_per_bit[index]);
        }
    }
    out
}

/// Human banner for the console and the head of the report file.
pub fn render_banner(cfg: &SearchConfig, started: DateTime<Local>) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: String| {
        let _ = writeln!(out, "{label:<35} : {value}");
    };

    line("Cipher name", cfg.cipher.name.clone());
    line("Mode", cfg.cipher.mode_tag.clone());
    line("Comment", cfg.cipher.comment.clone());
    line("Key size (bits)", cfg.cipher.key_size.bits().to_string());
    line("Word size (bits)", WORD_BITS.to_string());
    line(
        "Total rounds",
        cfg.cipher.total_rounds.as_rounds().to_string(),
    );
    line(
        "Distinguishing round",
        cfg.distinguisher.fwd_rounds.as_rounds().to_string(),
    );
    line("Input difference", positions(&cfg.distinguisher.input_diff));
    line("Output mask", positions(&cfg.distinguisher.output_mask));
    line("Threads", cfg.sampling.workers.to_string());
    line(
        "Trials per thread",
        cfg.sampling.trials_per_worker.to_string(),
    );
    line("Trials per batch", cfg.sampling.trials_per_bit().to_string());
    line("Threshold", cfg.pnb.threshold.to_string());
    if !cfg.pnb.skip.is_empty() {
        line("Skipped indices", cfg.pnb.skip.len().to_string());
    }
    line("Started", started.format("%Y-%m-%d %H:%M:%S").to_string());
    out
}

/// The full report file: banner, counts, orderings, per-keyword views
/// and the -log2 list.
pub fn render_report(
    cfg: &SearchConfig,
    report: &PnbReport,
    started: DateTime<Local>,
    elapsed: Duration,
) -> String {
    let mut out = render_banner(cfg, started);
    let key_size = cfg.cipher.key_size;

    out.push_str(RULE);
    let _ = writeln!(out, "{:<35} : {}", "PNB count", report.pnbs_by_index.len());
    let _ = writeln!(
        out,
        "{:<35} : {}",
        "non-PNB count",
        report.non_pnbs_by_index.len()
    );
    out.push_str(RULE);

    let _ = writeln!(
        out,
        "\n{} PNBs in set (sorted by index)\n{}\n",
        report.pnbs_by_index.len(),
        braced_list(&report.pnbs_by_index)
    );
    let _ = writeln!(
        out,
        "{} PNBs in set (sorted by decreasing |bias|)\n{}\n",
        report.pnbs_by_bias.len(),
        braced_list(&report.pnbs_by_bias)
    );
    let _ = writeln!(
        out,
        "{} non-PNBs in set (sorted by index)\n{}\n",
        report.non_pnbs_by_index.len(),
        braced_list(&report.non_pnbs_by_index)
    );

    if !report.pnbs_by_index.is_empty() {
        let _ = writeln!(
            out,
            "PNB consecutive-run split\n{:<35} : {}\n{:<35} : {}\n{:<35} : {}",
            "in pattern",
            braced_list(&report.pnbs_in_pattern),
            "on border",
            braced_list(&report.pnbs_in_border),
            "isolated",
            braced_list(&report.rest_pnbs)
        );
    }

    out.push_str(&bias_table_by_word(
        &report.bias_per_bit,
        &report.pnbs_by_index,
        key_size,
    ));
    out.push_str(&per_keyword_segments(
        &report.pnbs_by_index,
        key_size,
        "Per-keyword PNB segments",
    ));
    out.push_str(&per_keyword_segments(
        &report.non_pnbs_by_index,
        key_size,
        "Per-keyword non-PNB segments",
    ));
    out.push_str(&per_keyword_ps_map(
        &report.pnbs_by_index,
        &report.non_pnbs_by_index,
        key_size,
    ));

    out.push_str(RULE);
    let _ = writeln!(
        out,
        "Biases as -log2(|bias|) for all key bits (larger = weaker)"
    );
    let formatted: Vec<String> = report
        .neg_log2_biases()
        .iter()
        .map(|v| format!("{v:.2}"))
        .collect();
    let _ = writeln!(out, "{}", braced_list(&formatted));

    out.push_str(RULE);
    let _ = writeln!(out, "{:<35} : {:.2?}", "Elapsed", elapsed);
    out
}

/// Report filename: cipher, mode, rounds, leading mask position,
/// timestamp and threshold.
pub fn report_filename(cfg: &SearchConfig, now: DateTime<Local>) -> String {
    let mask = cfg
        .distinguisher
        .output_mask
        .first()
        .map(|m| format!("{}_{}", m.word, m.bit))
        .unwrap_or_else(|| "nomask".to_owned());
    format!(
        "{}_{}{}_mask_{}_{}_nm_{}.txt",
        cfg.cipher.name,
        cfg.cipher.mode_tag,
        cfg.cipher.total_rounds.as_rounds(),
        mask,
        now.format("%H_%M_%d_%m_%Y"),
        cfg.pnb.threshold
    )
}
