//! Top-K aggregation
//!
//! Features are ranked by mean absolute contribution over the batch. The K
//! most important are kept individually and the remainder is folded into a
//! single "Other" contributor holding their signed sum, so
//! `baseline + Σ top + other` still equals the model score.

use ndarray::{ArrayView2, Axis};

use super::types::{AggregatedExplanation, BatchExplanation, Contribution, Explanation};

/// Column indices ordered by descending mean |value|.
/// Stable sort: equal importance keeps schema order.
pub fn rank_by_mean_abs(values: ArrayView2<'_, f64>) -> Vec<usize> {
    let importance: Vec<f64> = if values.nrows() == 0 {
        vec![0.0; values.ncols()]
    } else {
        values
            .mapv(f64::abs)
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; values.ncols()])
    };

    let mut order: Vec<usize> = (0..importance.len()).collect();
    order.sort_by(|&a, &b| importance[b].total_cmp(&importance[a]));
    order
}

/// Fold one explanation down to `k` named contributors plus "Other"
pub fn aggregate_top_k(explanation: &Explanation, k: usize) -> AggregatedExplanation {
    let magnitudes: Vec<f64> = explanation.contributions.iter().map(|c| c.value).collect();
    let view = ArrayView2::from_shape((1, magnitudes.len()), &magnitudes);
    let order = match view {
        Ok(view) => rank_by_mean_abs(view),
        Err(_) => Vec::new(),
    };
    fold(explanation.baseline, &explanation.contributions, &order, k)
}

/// Aggregate every row of a batch with one ranking shared across rows
pub fn aggregate_batch(batch: &BatchExplanation, k: usize) -> Vec<AggregatedExplanation> {
    let order = rank_by_mean_abs(batch.values.view());
    (0..batch.values.nrows())
        .filter_map(|r| batch.row(r))
        .map(|row| fold(row.baseline, &row.contributions, &order, k))
        .collect()
}

fn fold(
    baseline: f64,
    contributions: &[Contribution],
    order: &[usize],
    k: usize,
) -> AggregatedExplanation {
    let keep = k.min(order.len());

    let top_contributions = order[..keep]
        .iter()
        .map(|&i| contributions[i].clone())
        .collect();

    // Empty remainder sums to 0.0
    let rest: f64 = order[keep..].iter().map(|&i| contributions[i].value).sum();

    AggregatedExplanation {
        baseline,
        top_contributions,
        other: Contribution::other(rest),
    }
}
