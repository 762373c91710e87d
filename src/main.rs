use credence::estimate::{self, EmConfig, InitialPrior};
use credence::ingest;
use credence::project::{self, TruthDecision};
use credence::report;

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "credence",
    about = "Estimate claim credibility and source reliability from unreliable reports",
    long_about = "Runs expectation-maximization over a binary source-by-claim assertion matrix \
                  to estimate the probability that each claim is true and the reliability of \
                  each reporting source."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a pair-list sensing matrix and write a truth table
    #[command(about = "Solve a pair-list sensing matrix (outputs: claim_id,score lines)")]
    Solve {
        /// Path to the sensing matrix file, one 'source_id,claim_id' assertion per line
        matrix: PathBuf,

        /// Output path for the truth table
        #[arg(long, default_value = "truth.csv")]
        output: PathBuf,

        /// Report posterior probabilities instead of thresholded 0/1 decisions
        #[arg(long)]
        probabilities: bool,

        /// Posterior cutoff for the 0/1 decision
        #[arg(long, default_value_t = 0.5)]
        threshold: f64,

        /// Fixed initial prior in (0,1); replaces the random draw
        #[arg(long, conflicts_with = "seed")]
        prior: Option<f64>,

        /// Seed for the random initial prior, for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Convergence tolerance for the EM loop
        #[arg(long, default_value_t = estimate::DEFAULT_TOLERANCE)]
        tolerance: f64,

        /// Maximum number of EM iterations
        #[arg(long, default_value_t = estimate::DEFAULT_MAX_ITERATIONS)]
        max_iterations: usize,

        /// Optional output path for a 'source_id,reliability' table
        #[arg(long)]
        reliability: Option<PathBuf>,
    },

    /// Rank post clusters by credibility
    #[command(about = "Rank clustered posts by credibility (outputs: ranked claim report)")]
    Rank {
        /// Path to the JSON-lines post file
        posts: PathBuf,

        /// Path to the cluster file, one '<cluster id>: <post id>,...' line per cluster
        clusters: PathBuf,

        /// Output path for the ranked credibility report
        #[arg(long, default_value = "credibility.txt")]
        output: PathBuf,

        /// Fixed initial prior in (0,1); replaces the random draw
        #[arg(long, conflicts_with = "seed")]
        prior: Option<f64>,

        /// Seed for the random initial prior, for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Convergence tolerance for the EM loop
        #[arg(long, default_value_t = estimate::DEFAULT_TOLERANCE)]
        tolerance: f64,

        /// Maximum number of EM iterations
        #[arg(long, default_value_t = estimate::DEFAULT_MAX_ITERATIONS)]
        max_iterations: usize,

        /// Optional output path for a 'source_id,reliability' table
        #[arg(long)]
        reliability: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Solve {
            matrix,
            output,
            probabilities,
            threshold,
            prior,
            seed,
            tolerance,
            max_iterations,
            reliability,
        } => solve_command(
            &matrix,
            &output,
            probabilities,
            threshold,
            em_config(prior, seed, tolerance, max_iterations),
            reliability.as_deref(),
        ),
        Commands::Rank {
            posts,
            clusters,
            output,
            prior,
            seed,
            tolerance,
            max_iterations,
            reliability,
        } => rank_command(
            &posts,
            &clusters,
            &output,
            em_config(prior, seed, tolerance, max_iterations),
            reliability.as_deref(),
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn em_config(
    prior: Option<f64>,
    seed: Option<u64>,
    tolerance: f64,
    max_iterations: usize,
) -> EmConfig {
    let initial_prior = match (prior, seed) {
        (Some(value), _) => InitialPrior::Fixed(value),
        (None, Some(seed)) => InitialPrior::Seeded(seed),
        (None, None) => InitialPrior::Random,
    };
    EmConfig {
        tolerance,
        max_iterations,
        initial_prior,
    }
}

fn solve_command(
    matrix_path: &Path,
    output: &Path,
    probabilities: bool,
    threshold: f64,
    config: EmConfig,
    reliability_out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading sensing matrix from: {}", matrix_path.display());
    let matrix = ingest::read_assertion_pairs(matrix_path)?;
    println!(
        "Loaded {} sources x {} claims",
        matrix.n_sources(),
        matrix.n_claims()
    );

    let estimate = estimate::estimate_truth(&matrix, &config)?;
    println!(
        "Converged after {} iterations (estimated prior {:.6})",
        estimate.iterations, estimate.snapshot.prior
    );

    let decision = if probabilities {
        TruthDecision::Probabilities
    } else {
        TruthDecision::Binary { threshold }
    };
    let results = project::project_results(&estimate, decision)?;

    let mut out = BufWriter::new(File::create(output)?);
    report::write_truth_table(&mut out, &results.claim_scores)?;
    out.flush()?;
    println!("Truth table written to: {}", output.display());

    write_reliability(reliability_out, &results.source_reliability)
}

fn rank_command(
    posts_path: &Path,
    clusters_path: &Path,
    output: &Path,
    config: EmConfig,
    reliability_out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading posts from: {}", posts_path.display());
    let posts = ingest::read_posts(posts_path)?;
    println!("Loading clusters from: {}", clusters_path.display());
    let clusters = ingest::read_clusters(clusters_path)?;

    let matrix = ingest::sensing_matrix_from_posts(&posts, &clusters)?;
    println!(
        "Built sensing matrix: {} sources x {} claims from {} posts",
        matrix.n_sources(),
        matrix.n_claims(),
        posts.len()
    );

    let estimate = estimate::estimate_truth(&matrix, &config)?;
    println!(
        "Converged after {} iterations (estimated prior {:.6})",
        estimate.iterations, estimate.snapshot.prior
    );

    let results = project::project_results(&estimate, TruthDecision::Probabilities)?;

    let mut out = BufWriter::new(File::create(output)?);
    report::write_ranked_report(&mut out, &results.claim_scores)?;
    out.flush()?;
    println!("Credibility report written to: {}", output.display());

    write_reliability(reliability_out, &results.source_reliability)
}

fn write_reliability(
    path: Option<&Path>,
    reliability: &ndarray::Array1<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = path {
        let mut out = BufWriter::new(File::create(path)?);
        report::write_reliability_table(&mut out, reliability)?;
        out.flush()?;
        println!("Reliability table written to: {}", path.display());
    }
    Ok(())
}
