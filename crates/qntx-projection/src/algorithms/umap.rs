//! Uniform Manifold Approximation and Projection.
//!
//! Exact kNN graph, smooth-kNN bandwidths, fuzzy union, random initialisation and
//! epoch-sampled SGD with negative sampling. Single-threaded so output depends only on
//! the input and the seed.

use super::distance::{nearest_neighbors, squared_euclidean, Neighbors};
use crate::config::{AlgorithmConfig, Hyperparameters};
use crate::error::CapabilityError;
use crate::registry::Capability;
use ndarray::{Array2, ArrayView2};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::debug;

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const BANDWIDTH_ITERATIONS: usize = 64;
const NEGATIVE_SAMPLE_RATE: f64 = 5.0;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;

/// UMAP capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Umap;

impl Capability for Umap {
    fn description(&self) -> &str {
        "UMAP: neighbourhood-graph embedding optimised by stochastic gradient descent"
    }

    fn default_hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            learning_rate: 1.0,
            ..Hyperparameters::default()
        }
    }

    fn project(
        &self,
        data: ArrayView2<'_, f64>,
        config: &AlgorithmConfig,
    ) -> Result<Array2<f64>, CapabilityError> {
        let params = config.params();
        let n = data.nrows();
        let dim = config.n_components();
        let mut rng = config.rng();

        let n_epochs = match params.n_epochs {
            0 if n <= 10_000 => 500,
            0 => 200,
            e => e,
        };
        let k = params.n_neighbors.min(n.saturating_sub(1));

        let neighbors = nearest_neighbors(data, k, params.metric);
        let edges = fuzzy_simplicial_set(&neighbors, k);
        let (a, b) = find_ab_params(params.spread, params.min_dist)?;

        debug!(
            n_points = n,
            n_neighbors = k,
            n_edges = edges.len(),
            n_epochs,
            a,
            b,
            "umap graph built"
        );

        let mut embedding =
            Array2::from_shape_fn((n, dim), |_| rng.gen_range(-INIT_RANGE..INIT_RANGE));

        optimize_layout(
            &mut embedding,
            &edges,
            n_epochs,
            a,
            b,
            params.learning_rate,
            &mut rng,
        );

        Ok(embedding)
    }
}

/// Per-point `(sigma, rho)` so that each row's memberships sum to log2(k).
fn smooth_knn_dist(distances: &[Vec<f64>], k: usize) -> Vec<(f64, f64)> {
    let target = (k as f64).log2();
    let count: usize = distances.iter().map(Vec::len).sum();
    let mean_all = if count > 0 {
        distances.iter().flatten().sum::<f64>() / count as f64
    } else {
        0.0
    };

    distances
        .iter()
        .map(|row| {
            let rho = row.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);
            let mut lo: f64 = 0.0;
            let mut hi = f64::INFINITY;
            let mut mid: f64 = 1.0;

            for _ in 0..BANDWIDTH_ITERATIONS {
                let psum: f64 = row
                    .iter()
                    .map(|&d| {
                        let gap = d - rho;
                        if gap > 0.0 {
                            (-gap / mid).exp()
                        } else {
                            1.0
                        }
                    })
                    .sum();

                if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                    break;
                }
                if psum > target {
                    hi = mid;
                    mid = (lo + hi) / 2.0;
                } else {
                    lo = mid;
                    mid = if hi.is_infinite() {
                        mid * 2.0
                    } else {
                        (lo + hi) / 2.0
                    };
                }
            }

            let floor = if rho > 0.0 {
                let mean_row = row.iter().sum::<f64>() / row.len().max(1) as f64;
                MIN_K_DIST_SCALE * mean_row
            } else {
                MIN_K_DIST_SCALE * mean_all
            };
            (mid.max(floor), rho)
        })
        .collect()
}

/// Symmetric fuzzy graph as a sorted `(head, tail, weight)` edge list.
fn fuzzy_simplicial_set(neighbors: &Neighbors, k: usize) -> Vec<(usize, usize, f64)> {
    let bandwidths = smooth_knn_dist(&neighbors.distances, k);

    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, (row, dists)) in neighbors
        .indices
        .iter()
        .zip(&neighbors.distances)
        .enumerate()
    {
        let (sigma, rho) = bandwidths[i];
        for (&j, &d) in row.iter().zip(dists) {
            let gap = d - rho;
            let weight = if gap <= 0.0 || sigma == 0.0 {
                1.0
            } else {
                (-gap / sigma).exp()
            };
            directed.insert((i, j), weight);
        }
    }

    // Fuzzy union: w = a + b - a*b over both directions.
    let mut edges = Vec::with_capacity(directed.len() * 2);
    for (&(i, j), &w) in &directed {
        match directed.get(&(j, i)) {
            Some(&wt) => edges.push((i, j, w + wt - w * wt)),
            None => {
                edges.push((i, j, w));
                edges.push((j, i, w));
            }
        }
    }
    edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
    edges.retain(|e| e.2 > 0.0);
    edges
}

/// Fit `1 / (1 + a * x^(2b))` to the offset-exponential target curve by
/// Levenberg-Marquardt least squares.
fn find_ab_params(spread: f64, min_dist: f64) -> Result<(f64, f64), CapabilityError> {
    const SAMPLES: usize = 300;
    let xs: Vec<f64> = (0..SAMPLES)
        .map(|i| 3.0 * spread * i as f64 / (SAMPLES - 1) as f64)
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let cost = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let r = 1.0 / (1.0 + a * x.powf(2.0 * b)) - y;
                r * r
            })
            .sum()
    };

    let (mut a, mut b): (f64, f64) = (1.0, 1.0);
    let mut lambda: f64 = 1e-3;
    let mut current = cost(a, b);

    for _ in 0..500 {
        // Normal equations J^T J and J^T r.
        let (mut jaa, mut jab, mut jbb, mut ga, mut gb) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (&x, &y) in xs.iter().zip(&ys) {
            if x <= 0.0 {
                continue;
            }
            let u = x.powf(2.0 * b);
            let f = 1.0 / (1.0 + a * u);
            let r = f - y;
            let da = -u * f * f;
            let db = -2.0 * a * u * x.ln() * f * f;
            jaa += da * da;
            jab += da * db;
            jbb += db * db;
            ga += da * r;
            gb += db * r;
        }

        let m00 = jaa * (1.0 + lambda);
        let m11 = jbb * (1.0 + lambda);
        let det = m00 * m11 - jab * jab;
        if det.abs() < f64::MIN_POSITIVE {
            break;
        }
        let step_a = -(m11 * ga - jab * gb) / det;
        let step_b = -(m00 * gb - jab * ga) / det;

        let (next_a, next_b) = (a + step_a, b + step_b);
        if next_a > 0.0 && next_b > 0.0 {
            let next = cost(next_a, next_b);
            if next < current {
                a = next_a;
                b = next_b;
                current = next;
                lambda = (lambda / 10.0).max(1e-12);
                if step_a.abs() < 1e-12 && step_b.abs() < 1e-12 {
                    break;
                }
                continue;
            }
        }
        lambda *= 10.0;
        if lambda > 1e12 {
            break;
        }
    }

    if !(a.is_finite() && b.is_finite()) {
        return Err(CapabilityError::NonConvergence(format!(
            "curve fit for spread={} min_dist={} diverged",
            spread, min_dist
        )));
    }
    Ok((a, b))
}

fn clip(value: f64) -> f64 {
    value.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

fn optimize_layout<R: Rng>(
    embedding: &mut Array2<f64>,
    edges: &[(usize, usize, f64)],
    n_epochs: usize,
    a: f64,
    b: f64,
    initial_alpha: f64,
    rng: &mut R,
) {
    let (n, dim) = embedding.dim();
    let max_weight = edges.iter().map(|e| e.2).fold(0.0, f64::max);
    if max_weight <= 0.0 {
        return;
    }

    // Edges too weak to be sampled even once are dropped.
    let threshold = max_weight / n_epochs as f64;
    let edges: Vec<&(usize, usize, f64)> = edges.iter().filter(|e| e.2 >= threshold).collect();

    let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.2).collect();
    let epochs_per_negative: Vec<f64> = epochs_per_sample
        .iter()
        .map(|eps| eps / NEGATIVE_SAMPLE_RATE)
        .collect();
    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    let mut alpha = initial_alpha;
    for epoch in 0..n_epochs {
        let now = epoch as f64;
        for (e, &&(j, k, _)) in edges.iter().enumerate() {
            if next_sample[e] > now {
                continue;
            }

            let dist2 = squared_euclidean(embedding.row(j), embedding.row(k));
            let coeff = if dist2 > 0.0 {
                -2.0 * a * b * dist2.powf(b - 1.0) / (a * dist2.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..dim {
                let grad = clip(coeff * (embedding[[j, d]] - embedding[[k, d]]));
                embedding[[j, d]] += grad * alpha;
                embedding[[k, d]] -= grad * alpha;
            }
            next_sample[e] += epochs_per_sample[e];

            let n_negative = ((now - next_negative[e]) / epochs_per_negative[e]).floor();
            let n_negative = if n_negative > 0.0 { n_negative as usize } else { 0 };
            for _ in 0..n_negative {
                let other = rng.gen_range(0..n);
                if other == j {
                    continue;
                }
                let dist2 = squared_euclidean(embedding.row(j), embedding.row(other));
                let coeff = if dist2 > 0.0 {
                    2.0 * b / ((0.001 + dist2) * (a * dist2.powf(b) + 1.0))
                } else {
                    0.0
                };
                for d in 0..dim {
                    let grad = if coeff > 0.0 {
                        clip(coeff * (embedding[[j, d]] - embedding[[other, d]]))
                    } else {
                        GRADIENT_CLIP
                    };
                    embedding[[j, d]] += grad * alpha;
                }
            }
            next_negative[e] += n_negative as f64 * epochs_per_negative[e];
        }
        alpha = initial_alpha * (1.0 - (epoch + 1) as f64 / n_epochs as f64);
    }
}
