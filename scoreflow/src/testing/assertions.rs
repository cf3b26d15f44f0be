//! Test assertions for score collections.

use crate::core::{Score, ScoreCollection};
use std::ops::Range;

/// Asserts that every row scored and the collection has `rows` entries.
pub fn assert_all_scored(collection: &ScoreCollection, rows: usize) {
    assert_eq!(
        collection.scores.len(),
        rows,
        "Expected {rows} scores, got {}",
        collection.scores.len()
    );
    let failed: Vec<usize> = failed_rows(&collection.scores);
    assert!(failed.is_empty(), "Expected no failed rows, got {} (first {:?})", failed.len(), failed.first());
}

/// Asserts that exactly the rows in `failed` are marked as failed.
pub fn assert_failed_rows(collection: &ScoreCollection, failed: Range<usize>) {
    let actual = failed_rows(&collection.scores);
    let expected: Vec<usize> = failed.collect();
    assert_eq!(actual, expected, "Failed rows differ");
}

/// Asserts that each scored row's value equals its dataset row index, as
/// produced by an `id`-echoing predictor.
pub fn assert_scores_follow_row_order(scores: &[Score]) {
    for (row, score) in scores.iter().enumerate() {
        if let Score::Value(v) = score {
            assert!(
                (v - row as f64).abs() < f64::EPSILON,
                "Row {row} holds the score of row {v}"
            );
        }
    }
}

fn failed_rows(scores: &[Score]) -> Vec<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_failed())
        .map(|(i, _)| i)
        .collect()
}
