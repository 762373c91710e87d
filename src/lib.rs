//! Truth discovery from unreliable reports.
//!
//! Given a binary matrix of which sources asserted which claims, `credence`
//! estimates the probability that each claim is true and the reliability of
//! each source, by expectation-maximization over a two-parameter source
//! model. See [`estimate`] for the algorithm, [`matrix`] for input
//! validation, [`project`] for output shaping, and [`ingest`]/[`report`] for
//! the file-facing collaborators.

#![deny(dead_code)]
#![deny(unused_imports)]

pub mod estimate;
pub mod ingest;
pub mod matrix;
pub mod project;
pub mod report;
