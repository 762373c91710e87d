//! # Result Projection
//!
//! Turns a converged estimate into the two externally visible vectors: a
//! per-claim credibility score (either the raw posterior or its hard
//! threshold) and a per-source reliability. Reliability solves the generative
//! model's Bayes relation for P(claim true | source asserted it):
//! `e[i] = a[i]·d / s[i]`, using the final hit rate and prior together with
//! the initial, fixed observed rate.

use crate::estimate::{ParameterSnapshot, TruthEstimate};
use ndarray::Array1;

#[derive(Debug)]
pub enum ProjectionError {
    SilentSource { source: usize },
}

impl std::fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectionError::SilentSource { source } => write!(
                f,
                "source {source} asserted no claims, so its reliability (hit rate x prior / observed rate) is undefined"
            ),
        }
    }
}

impl std::error::Error for ProjectionError {}

/// How claim scores are reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TruthDecision {
    /// Report the posterior probabilities unchanged.
    Probabilities,
    /// Report 1 for claims whose posterior is at least `threshold`, else 0.
    Binary { threshold: f64 },
}

/// The externally visible result pair: claim scores `h` and source
/// reliabilities `e`. Produced once, after the EM loop terminates.
#[derive(Debug, Clone)]
pub struct CredibilityEstimate {
    pub claim_scores: Array1<f64>,
    pub source_reliability: Array1<f64>,
}

/// Projects a converged estimate into its output form.
pub fn project_results(
    estimate: &TruthEstimate,
    decision: TruthDecision,
) -> Result<CredibilityEstimate, ProjectionError> {
    let claim_scores = match decision {
        TruthDecision::Probabilities => estimate.posterior.clone(),
        TruthDecision::Binary { threshold } => threshold_posterior(&estimate.posterior, threshold),
    };
    let source_reliability = source_reliability(&estimate.snapshot)?;
    Ok(CredibilityEstimate {
        claim_scores,
        source_reliability,
    })
}

/// Hard-thresholds a posterior vector: 1 where `z[j] >= threshold`, else 0.
pub fn threshold_posterior(posterior: &Array1<f64>, threshold: f64) -> Array1<f64> {
    posterior.mapv(|z| if z >= threshold { 1.0 } else { 0.0 })
}

/// Derives the per-source reliability `e[i] = a[i]·d / s[i]` from a final
/// snapshot. A source that asserted nothing has `s[i] = 0` and no defined
/// reliability; that is reported as an error rather than an infinity.
pub fn source_reliability(snapshot: &ParameterSnapshot) -> Result<Array1<f64>, ProjectionError> {
    let mut reliability = Vec::with_capacity(snapshot.hit_rate.len());
    for (source, (&hit, &observed)) in snapshot
        .hit_rate
        .iter()
        .zip(snapshot.observed_rate.iter())
        .enumerate()
    {
        if observed == 0.0 {
            return Err(ProjectionError::SilentSource { source });
        }
        reliability.push(hit * snapshot.prior / observed);
    }
    Ok(Array1::from_vec(reliability))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn snapshot() -> ParameterSnapshot {
        ParameterSnapshot {
            hit_rate: array![0.9, 0.4],
            false_alarm_rate: array![0.1, 0.3],
            observed_rate: array![0.5, 0.25],
            prior: 0.6,
        }
    }

    #[test]
    fn thresholding_is_inclusive_at_the_cutoff() {
        let z = array![0.1, 0.5, 0.9];
        let h = threshold_posterior(&z, 0.5);
        assert_eq!(h.to_vec(), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn threshold_above_one_rejects_everything() {
        let z = array![0.0, 0.3, 1.0];
        assert_eq!(threshold_posterior(&z, 1.0 + 1e-9).to_vec(), vec![0.0; 3]);
    }

    #[test]
    fn nonpositive_threshold_accepts_everything() {
        let z = array![0.0, 0.3, 1.0];
        assert_eq!(threshold_posterior(&z, 0.0).to_vec(), vec![1.0; 3]);
        assert_eq!(threshold_posterior(&z, -0.1).to_vec(), vec![1.0; 3]);
    }

    #[test]
    fn reliability_follows_the_bayes_relation_exactly() {
        let e = source_reliability(&snapshot()).unwrap();
        assert_abs_diff_eq!(e[0], 0.9 * 0.6 / 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(e[1], 0.4 * 0.6 / 0.25, epsilon = 1e-15);
    }

    #[test]
    fn silent_source_is_a_typed_error_not_an_infinity() {
        let mut theta = snapshot();
        theta.observed_rate[1] = 0.0;
        let err = source_reliability(&theta).unwrap_err();
        assert!(matches!(err, ProjectionError::SilentSource { source: 1 }));
    }
}
