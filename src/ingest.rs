//! # Raw Report Ingestion
//!
//! Shapes raw report data into a validated [`SensingMatrix`]. Two input forms
//! are supported:
//!
//! - a flat pair list, one `source_id,claim_id` assertion per line with
//!   1-based ids, and
//! - a stream of JSON-lines posts plus a clustering of post ids, where every
//!   cluster becomes one claim and every distinct posting account one source.
//!
//! Matrix dimensions are derived from the maxima over all pairs, so the pair
//! list may arrive in any order. Cluster entries that name a post id absent
//! from the post stream are skipped with a warning.

use crate::matrix::{MatrixError, SensingMatrix};
use ahash::AHashMap;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// A single post record from the JSON-lines input. Only the fields the
/// sensing matrix needs are deserialized.
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: u64,
    #[serde(rename = "from_user_id")]
    pub author: u64,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: expected 'source_id,claim_id' with positive integer ids, got '{content}'")]
    MalformedPair { line: usize, content: String },

    #[error("line {line}: expected '<cluster id>: <post id>,<post id>,...', got '{content}'")]
    MalformedCluster { line: usize, content: String },

    #[error("line {line}: post record is not valid JSON: {source}")]
    MalformedPost {
        line: usize,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Reads a pair-list file into a sensing matrix. Ids are 1-based; the matrix
/// is sized by the largest source and claim id seen anywhere in the file.
pub fn read_assertion_pairs(path: &Path) -> Result<SensingMatrix, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    let mut assertions = Vec::new();
    let mut n_sources = 0usize;
    let mut n_claims = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (source, claim) = parse_pair(trimmed).ok_or_else(|| IngestError::MalformedPair {
            line: index + 1,
            content: trimmed.to_string(),
        })?;
        n_sources = n_sources.max(source);
        n_claims = n_claims.max(claim);
        assertions.push((source - 1, claim - 1));
    }

    log::info!(
        "Read {} assertions spanning {} sources and {} claims",
        assertions.len(),
        n_sources,
        n_claims
    );
    Ok(SensingMatrix::from_assertions(
        n_sources, n_claims, &assertions,
    )?)
}

fn parse_pair(text: &str) -> Option<(usize, usize)> {
    let (left, right) = text.split_once(',')?;
    let source = left.trim().parse::<usize>().ok()?;
    let claim = right.trim().parse::<usize>().ok()?;
    (source >= 1 && claim >= 1).then_some((source, claim))
}

/// Reads a JSON-lines post file. Blank lines are ignored.
pub fn read_posts(path: &Path) -> Result<Vec<Post>, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    let mut posts = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let post = serde_json::from_str(trimmed).map_err(|source| IngestError::MalformedPost {
            line: index + 1,
            source,
        })?;
        posts.push(post);
    }
    log::info!("Read {} posts", posts.len());
    Ok(posts)
}

/// Reads a cluster file: one cluster per line, a cluster id before the colon
/// and the member post ids after it, comma-separated. The cluster id itself
/// is positional and ignored; line order defines claim order.
pub fn read_clusters(path: &Path) -> Result<Vec<Vec<u64>>, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    let mut clusters = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let members = parse_cluster(trimmed).ok_or_else(|| IngestError::MalformedCluster {
            line: index + 1,
            content: trimmed.to_string(),
        })?;
        clusters.push(members);
    }
    log::info!("Read {} clusters", clusters.len());
    Ok(clusters)
}

fn parse_cluster(text: &str) -> Option<Vec<u64>> {
    let (_, members) = text.split_once(':')?;
    members
        .split(',')
        .map(|id| id.trim().parse::<u64>().ok())
        .collect()
}

/// Builds the sensing matrix for a clustered post collection: rows are
/// posting accounts in order of first appearance, columns are clusters in
/// file order, and cell `(i, j)` is 1 iff account `i` authored a post in
/// cluster `j`.
pub fn sensing_matrix_from_posts(
    posts: &[Post],
    clusters: &[Vec<u64>],
) -> Result<SensingMatrix, IngestError> {
    let mut author_rows: AHashMap<u64, usize> = AHashMap::new();
    let mut post_authors: AHashMap<u64, u64> = AHashMap::with_capacity(posts.len());
    for post in posts {
        let next_row = author_rows.len();
        author_rows.entry(post.author).or_insert(next_row);
        post_authors.insert(post.id, post.author);
    }

    let mut assertions = Vec::new();
    let mut unknown = 0usize;
    for (claim, members) in clusters.iter().enumerate() {
        for post_id in members {
            match post_authors.get(post_id) {
                Some(author) => assertions.push((author_rows[author], claim)),
                None => unknown += 1,
            }
        }
    }
    if unknown > 0 {
        log::warn!(
            "{} cluster entries referenced post ids absent from the post stream and were skipped",
            unknown
        );
    }

    Ok(SensingMatrix::from_assertions(
        author_rows.len(),
        clusters.len(),
        &assertions,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn pair_list_builds_the_expected_matrix() {
        let file = write_temp("1,1\n1,3\n2,2\n");
        let matrix = read_assertion_pairs(file.path()).unwrap();
        assert_eq!(matrix.n_sources(), 2);
        assert_eq!(matrix.n_claims(), 3);
        assert!(matrix.asserted(0, 0));
        assert!(matrix.asserted(0, 2));
        assert!(matrix.asserted(1, 1));
        assert!(!matrix.asserted(1, 0));
    }

    #[test]
    fn pair_list_order_does_not_affect_dimensions() {
        let sorted = read_assertion_pairs(write_temp("1,2\n2,1\n3,1\n").path()).unwrap();
        let shuffled = read_assertion_pairs(write_temp("3,1\n1,2\n2,1\n").path()).unwrap();
        assert_eq!(sorted.n_sources(), shuffled.n_sources());
        assert_eq!(sorted.n_claims(), shuffled.n_claims());
    }

    #[test]
    fn malformed_pair_names_the_line() {
        let file = write_temp("1,1\nnot-a-pair\n");
        let err = read_assertion_pairs(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedPair { line: 2, .. }));
    }

    #[test]
    fn zero_based_ids_are_rejected() {
        let err = read_assertion_pairs(write_temp("0,1\n").path()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedPair { line: 1, .. }));
    }

    #[test]
    fn posts_and_clusters_round_trip_into_a_matrix() {
        let posts_file = write_temp(concat!(
            "{\"id\": 10, \"from_user_id\": 100, \"text\": \"fire on 5th street\"}\n",
            "{\"id\": 11, \"from_user_id\": 101, \"text\": \"confirmed, big fire\"}\n",
            "{\"id\": 12, \"from_user_id\": 100, \"text\": \"bridge closed\"}\n",
        ));
        let clusters_file = write_temp("1: 10,11\n2: 12\n");

        let posts = read_posts(posts_file.path()).unwrap();
        let clusters = read_clusters(clusters_file.path()).unwrap();
        let matrix = sensing_matrix_from_posts(&posts, &clusters).unwrap();

        // Account 100 appears first, so it is row 0.
        assert_eq!(matrix.n_sources(), 2);
        assert_eq!(matrix.n_claims(), 2);
        assert!(matrix.asserted(0, 0));
        assert!(matrix.asserted(0, 1));
        assert!(matrix.asserted(1, 0));
        assert!(!matrix.asserted(1, 1));
    }

    #[test]
    fn unknown_post_ids_in_clusters_are_skipped() {
        let posts = vec![Post { id: 1, author: 7 }];
        let clusters = vec![vec![1, 999]];
        let matrix = sensing_matrix_from_posts(&posts, &clusters).unwrap();
        assert_eq!(matrix.n_sources(), 1);
        assert!(matrix.asserted(0, 0));
    }

    #[test]
    fn invalid_post_json_names_the_line() {
        let file = write_temp("{\"id\": 1, \"from_user_id\": 2}\n{broken\n");
        let err = read_posts(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedPost { line: 2, .. }));
    }

    #[test]
    fn cluster_without_colon_is_rejected() {
        let err = read_clusters(write_temp("10,11\n").path()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedCluster { line: 1, .. }));
    }
}
