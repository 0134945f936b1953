//! Distance functions and exact nearest-neighbour search.

use crate::config::Metric;
use ndarray::{ArrayView1, ArrayView2};
use std::cmp::Ordering;

pub(crate) fn distance(metric: Metric, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    match metric {
        Metric::Euclidean => squared_euclidean(a, b).sqrt(),
        Metric::Cosine => {
            let norm_a = a.dot(&a).sqrt();
            let norm_b = b.dot(&b).sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                // Zero vectors have no direction; treat them as maximally distant.
                return 1.0;
            }
            (1.0 - a.dot(&b) / (norm_a * norm_b)).max(0.0)
        }
    }
}

pub(crate) fn squared_euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Ties are broken by index so the neighbour set is unique.
fn by_distance_then_index(a: &(f64, usize), b: &(f64, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// k nearest neighbours of every row, excluding the row itself, nearest first.
pub(crate) struct Neighbors {
    pub indices: Vec<Vec<usize>>,
    pub distances: Vec<Vec<f64>>,
}

pub(crate) fn nearest_neighbors(data: ArrayView2<'_, f64>, k: usize, metric: Metric) -> Neighbors {
    let n = data.nrows();
    let k = k.min(n.saturating_sub(1));
    let mut indices = Vec::with_capacity(n);
    let mut distances = Vec::with_capacity(n);

    let mut candidates: Vec<(f64, usize)> = Vec::with_capacity(n);
    for i in 0..n {
        candidates.clear();
        candidates.extend(
            (0..n)
                .filter(|&j| j != i)
                .map(|j| (distance(metric, data.row(i), data.row(j)), j)),
        );
        if k > 0 && k < candidates.len() {
            candidates.select_nth_unstable_by(k - 1, by_distance_then_index);
        }
        candidates.truncate(k);
        candidates.sort_by(by_distance_then_index);

        indices.push(candidates.iter().map(|&(_, j)| j).collect());
        distances.push(candidates.iter().map(|&(d, _)| d).collect());
    }

    Neighbors { indices, distances }
}
