//! # Result Writers
//!
//! Formats the estimator's output vectors for downstream consumers: a
//! claim-by-claim truth table, a report of claims ranked by credibility, and
//! a per-source reliability table. Ids are 1-based in all outputs. Scores are
//! formatted with `ryu` to keep full round-trip precision without the cost of
//! `format!` float handling.

use ndarray::Array1;
use std::cmp::Ordering;
use std::io::{self, Write};

/// Scores below this are treated as having converged to zero in the ranked
/// report.
const SCORE_FLOOR: f64 = 1e-16;

/// Writes `claim_id,score` lines, one per claim.
pub fn write_truth_table<W: Write>(out: &mut W, claim_scores: &Array1<f64>) -> io::Result<()> {
    let mut buffer = ryu::Buffer::new();
    for (claim, &score) in claim_scores.iter().enumerate() {
        writeln!(out, "{},{}", claim + 1, buffer.format(score))?;
    }
    Ok(())
}

/// Writes claims ordered by descending credibility score. Ties keep claim-id
/// order. Scores below the floor are reported as exactly zero.
pub fn write_ranked_report<W: Write>(out: &mut W, claim_scores: &Array1<f64>) -> io::Result<()> {
    let mut order: Vec<usize> = (0..claim_scores.len()).collect();
    order.sort_by(|&x, &y| {
        claim_scores[y]
            .partial_cmp(&claim_scores[x])
            .unwrap_or(Ordering::Equal)
    });

    writeln!(out, "Claims Ranked by Credibility Score")?;
    writeln!(out, "Claim ID: Credibility Score")?;
    writeln!(out)?;

    let mut buffer = ryu::Buffer::new();
    for claim in order {
        let score = claim_scores[claim];
        let floored = if score < SCORE_FLOOR { 0.0 } else { score };
        writeln!(out, "{}: {}", claim + 1, buffer.format(floored))?;
    }
    Ok(())
}

/// Writes `source_id,reliability` lines, one per source.
pub fn write_reliability_table<W: Write>(out: &mut W, reliability: &Array1<f64>) -> io::Result<()> {
    let mut buffer = ryu::Buffer::new();
    for (source, &score) in reliability.iter().enumerate() {
        writeln!(out, "{},{}", source + 1, buffer.format(score))?;
    }
    Ok(())
}
