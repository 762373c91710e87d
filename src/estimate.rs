//! # Truth Estimation via Expectation-Maximization
//!
//! This module orchestrates the core estimation procedure. Each source is
//! modeled by two parameters: a hit rate `a` (probability of asserting a claim
//! given the claim is true) and a false-alarm rate `b` (probability of
//! asserting a claim given it is false), with a single global prior `d` on
//! claim truth. The estimator alternates:
//!
//! 1.  **E-step:** compute the posterior truth probability `z[j]` of every
//!     claim by a Bayes-rule combination of the per-source likelihoods of the
//!     observed assertion pattern, assuming independence across sources.
//!
//! 2.  **M-step:** re-estimate `a`, `b`, and `d` from the posterior: each
//!     source's hit rate is the share of total posterior truth mass it
//!     asserted, its false-alarm rate the share of falsehood mass, and the
//!     prior is the mean posterior.
//!
//! The loop runs to a fixed point under an elementwise absolute-tolerance
//! predicate, with a hard iteration cap so a pathological matrix cannot hang
//! the caller. The model and update equations follow the social-sensing
//! truth-discovery scheme of Wang et al. (2012). The per-source likelihood
//! products are accumulated in log-space, which keeps large source counts
//! from underflowing the naive product form; the resulting posteriors match
//! the direct formulation within the convergence tolerance.

use crate::matrix::SensingMatrix;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

/// A comprehensive error type for the estimation process.
///
/// Degenerate divisions are detected at the point of computation and surfaced
/// here; letting them produce NaN would silently corrupt the convergence
/// predicate into spurious termination or non-termination.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("initial prior must lie strictly between 0 and 1, got {0}")]
    InvalidInitialPrior(f64),

    #[error(
        "the likelihood of claim {claim} underflowed to zero under both hypotheses; its posterior is undefined"
    )]
    VanishedLikelihood { claim: usize },

    #[error("the posterior collapsed to zero for every claim; the hit-rate update would divide by zero")]
    ZeroTruthMass,

    #[error(
        "the posterior saturated at one for every claim; the false-alarm-rate update would divide by zero"
    )]
    ZeroFalsehoodMass,

    #[error(
        "EM did not converge within {max_iterations} iterations; last parameter change was {last_change:.3e}"
    )]
    DidNotConverge {
        max_iterations: usize,
        last_change: f64,
        /// The iterate at the cap, so the caller can choose to accept the
        /// best-so-far estimate instead of failing outright.
        best_so_far: Box<TruthEstimate>,
    },
}

/// How the estimator chooses the initial global prior `d`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitialPrior {
    /// Draw uniformly at random from (0, 1) on every run, as the published
    /// algorithm specifies.
    Random,
    /// Draw from (0, 1) with a fixed seed, for reproducible runs.
    Seeded(u64),
    /// Use the given value, which must lie strictly inside (0, 1).
    Fixed(f64),
}

pub const DEFAULT_TOLERANCE: f64 = 1e-8;
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Tuning knobs for the EM loop.
#[derive(Debug, Clone, Copy)]
pub struct EmConfig {
    /// Elementwise absolute tolerance of the convergence predicate.
    pub tolerance: f64,
    /// Hard cap on EM iterations. The published algorithm iterates without
    /// bound; exceeding this cap is reported as [`EstimationError::DidNotConverge`].
    pub max_iterations: usize,
    pub initial_prior: InitialPrior,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            initial_prior: InitialPrior::Random,
        }
    }
}

/// One immutable iterate of the EM parameters. Successive snapshots are
/// compared by the convergence predicate, never mutated in place.
#[derive(Debug, Clone)]
pub struct ParameterSnapshot {
    /// `a`: per-source probability of asserting a claim that is true.
    pub hit_rate: Array1<f64>,
    /// `b`: per-source probability of asserting a claim that is false.
    pub false_alarm_rate: Array1<f64>,
    /// `s`: per-source observed assertion rate. Seeded from the matrix once
    /// and carried unchanged through every snapshot.
    pub observed_rate: Array1<f64>,
    /// `d`: global prior probability that an arbitrary claim is true.
    pub prior: f64,
}

/// The state the EM loop ended on: the fixed point when it converged, or the
/// iterate at the cap when it did not (carried inside
/// [`EstimationError::DidNotConverge`]).
#[derive(Debug, Clone)]
pub struct TruthEstimate {
    pub snapshot: ParameterSnapshot,
    /// `z`: per-claim posterior truth probability; the E-step output that
    /// produced the final snapshot.
    pub posterior: Array1<f64>,
    pub iterations: usize,
}

/// The main entry point for estimation. Runs the EM recurrence on a validated
/// sensing matrix until two successive parameter snapshots agree within the
/// configured tolerance.
pub fn estimate_truth(
    matrix: &SensingMatrix,
    config: &EmConfig,
) -> Result<TruthEstimate, EstimationError> {
    let observed_rate = matrix.observed_rates();
    let prior = initial_prior(config.initial_prior)?;

    log::info!(
        "Starting EM truth estimation: {} sources x {} claims, initial prior {:.4}",
        matrix.n_sources(),
        matrix.n_claims(),
        prior
    );

    let mut previous = ParameterSnapshot {
        hit_rate: observed_rate.clone(),
        false_alarm_rate: observed_rate.mapv(|s| 0.5 * s),
        observed_rate: observed_rate.clone(),
        prior,
    };

    // One full E/M pass runs before the first convergence check.
    let mut posterior = expectation_step(matrix, &previous)?;
    let mut current = maximization_step(matrix, &posterior, &observed_rate)?;
    let mut iterations = 1;

    while !within_tolerance(&previous, &current, config.tolerance) {
        if iterations >= config.max_iterations {
            return Err(EstimationError::DidNotConverge {
                max_iterations: config.max_iterations,
                last_change: largest_change(&previous, &current),
                best_so_far: Box::new(TruthEstimate {
                    snapshot: current,
                    posterior,
                    iterations,
                }),
            });
        }
        posterior = expectation_step(matrix, &current)?;
        previous = current;
        current = maximization_step(matrix, &posterior, &previous.observed_rate)?;
        iterations += 1;
        log::debug!(
            "iteration {}: largest parameter change {:.3e}",
            iterations,
            largest_change(&previous, &current)
        );
    }

    log::info!(
        "EM converged after {} iterations; estimated prior {:.6}",
        iterations,
        current.prior
    );

    Ok(TruthEstimate {
        snapshot: current,
        posterior,
        iterations,
    })
}

/// The convergence predicate: true iff every corresponding parameter in the
/// two snapshots differs by at most `tolerance` in absolute value. The
/// observed rate is invariant across iterations, so comparing it is harmless
/// and kept for symmetry with the other snapshot components.
pub fn within_tolerance(
    old: &ParameterSnapshot,
    new: &ParameterSnapshot,
    tolerance: f64,
) -> bool {
    let close = |lhs: &Array1<f64>, rhs: &Array1<f64>| {
        lhs.iter()
            .zip(rhs.iter())
            .all(|(&x, &y)| (x - y).abs() <= tolerance)
    };
    close(&old.hit_rate, &new.hit_rate)
        && close(&old.false_alarm_rate, &new.false_alarm_rate)
        && close(&old.observed_rate, &new.observed_rate)
        && (old.prior - new.prior).abs() <= tolerance
}

/// The largest elementwise parameter delta between two snapshots, for
/// progress logging and non-convergence reporting.
fn largest_change(old: &ParameterSnapshot, new: &ParameterSnapshot) -> f64 {
    let widest = |lhs: &Array1<f64>, rhs: &Array1<f64>| {
        lhs.iter()
            .zip(rhs.iter())
            .fold(0.0_f64, |acc, (&x, &y)| acc.max((x - y).abs()))
    };
    widest(&old.hit_rate, &new.hit_rate)
        .max(widest(&old.false_alarm_rate, &new.false_alarm_rate))
        .max((old.prior - new.prior).abs())
}

fn initial_prior(choice: InitialPrior) -> Result<f64, EstimationError> {
    match choice {
        InitialPrior::Fixed(value) => {
            if value > 0.0 && value < 1.0 {
                Ok(value)
            } else {
                Err(EstimationError::InvalidInitialPrior(value))
            }
        }
        InitialPrior::Seeded(seed) => Ok(draw_open_unit(&mut StdRng::seed_from_u64(seed))),
        InitialPrior::Random => Ok(draw_open_unit(&mut rand::thread_rng())),
    }
}

/// Uniform draw from the open interval (0, 1). `gen` covers [0, 1); an exact
/// zero would pin every posterior at zero, so it is redrawn.
fn draw_open_unit<R: Rng>(rng: &mut R) -> f64 {
    loop {
        let value: f64 = rng.gen();
        if value > 0.0 {
            return value;
        }
    }
}

/// E-step: the posterior truth probability of every claim under `theta`.
///
/// For claim `j`, `A(j)` is the likelihood of the observed assertion column
/// if the claim is true and `B(j)` the likelihood if it is false; the
/// posterior is `A·d / (A·d + B·(1-d))`. Both products are accumulated in
/// log-space and combined with a max-shift. Claims are independent given the
/// parameters, so the loop fans out across claims.
fn expectation_step(
    matrix: &SensingMatrix,
    theta: &ParameterSnapshot,
) -> Result<Array1<f64>, EstimationError> {
    let log_hit = theta.hit_rate.mapv(f64::ln);
    let log_miss = theta.hit_rate.mapv(|a| (1.0 - a).ln());
    let log_false_alarm = theta.false_alarm_rate.mapv(f64::ln);
    let log_silence = theta.false_alarm_rate.mapv(|b| (1.0 - b).ln());
    let log_prior = theta.prior.ln();
    let log_prior_complement = (1.0 - theta.prior).ln();

    let posterior: Vec<f64> = (0..matrix.n_claims())
        .into_par_iter()
        .map(|claim| {
            let mut log_true = log_prior;
            let mut log_false = log_prior_complement;
            for source in 0..matrix.n_sources() {
                if matrix.asserted(source, claim) {
                    log_true += log_hit[source];
                    log_false += log_false_alarm[source];
                } else {
                    log_true += log_miss[source];
                    log_false += log_silence[source];
                }
            }

            let shift = log_true.max(log_false);
            if shift == f64::NEG_INFINITY {
                // Both likelihoods underflowed to exactly zero; 0/0 has no
                // defined posterior.
                return Err(EstimationError::VanishedLikelihood { claim });
            }
            let weight_true = (log_true - shift).exp();
            let weight_false = (log_false - shift).exp();
            Ok(weight_true / (weight_true + weight_false))
        })
        .collect::<Result<_, _>>()?;

    Ok(Array1::from_vec(posterior))
}

/// M-step: re-estimate the per-source rates and the global prior from the
/// posterior. Sources are independent given the posterior, so the loop fans
/// out across rows.
fn maximization_step(
    matrix: &SensingMatrix,
    posterior: &Array1<f64>,
    observed_rate: &Array1<f64>,
) -> Result<ParameterSnapshot, EstimationError> {
    let n_claims = matrix.n_claims() as f64;
    let truth_mass = posterior.sum();
    let falsehood_mass = n_claims - truth_mass;
    if truth_mass == 0.0 {
        return Err(EstimationError::ZeroTruthMass);
    }
    if falsehood_mass == 0.0 {
        return Err(EstimationError::ZeroFalsehoodMass);
    }

    let rates: Vec<(f64, f64)> = (0..matrix.n_sources())
        .into_par_iter()
        .map(|source| {
            let mut asserted_mass = 0.0;
            let mut asserted_count = 0usize;
            for (claim, &cell) in matrix.row(source).iter().enumerate() {
                if cell == 1 {
                    asserted_mass += posterior[claim];
                    asserted_count += 1;
                }
            }
            let hit = asserted_mass / truth_mass;
            let false_alarm = (asserted_count as f64 - asserted_mass) / falsehood_mass;
            (hit, false_alarm)
        })
        .collect();

    let (hit_rate, false_alarm_rate): (Vec<f64>, Vec<f64>) = rates.into_iter().unzip();

    Ok(ParameterSnapshot {
        hit_rate: Array1::from_vec(hit_rate),
        false_alarm_rate: Array1::from_vec(false_alarm_rate),
        observed_rate: observed_rate.clone(),
        prior: truth_mass / n_claims,
    })
}
