//! Exact t-distributed Stochastic Neighbour Embedding.

use super::distance::{distance, squared_euclidean};
use crate::config::{AlgorithmConfig, Hyperparameters, Metric};
use crate::error::CapabilityError;
use crate::registry::Capability;
use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

/// Pairwise affinities are dense, so batch size is bounded.
const MAX_EXACT_POINTS: usize = 4_000;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const MIN_GAIN: f64 = 0.01;
const INIT_SCALE: f64 = 1e-4;
const MIN_PROBABILITY: f64 = 1e-12;

/// t-SNE capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tsne;

impl Capability for Tsne {
    fn description(&self) -> &str {
        "t-SNE: exact pairwise-affinity embedding optimised by gradient descent"
    }

    fn default_hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            perplexity: 40.0,
            iterations: 600,
            learning_rate: 100.0,
            early_exaggeration: 4.0,
            ..Hyperparameters::default()
        }
    }

    fn max_points(&self) -> Option<usize> {
        Some(MAX_EXACT_POINTS)
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

        // Small batches cannot support the requested perplexity.
        let perplexity = params
            .perplexity
            .min((n.saturating_sub(1)) as f64 / 3.0)
            .max(1.0);
        let p = joint_probabilities(data, perplexity, params.metric)?;

        debug!(
            n_points = n,
            perplexity,
            iterations = params.iterations,
            "tsne affinities computed"
        );

        let mut y = Array2::from_shape_fn((n, dim), |_| {
            let z: f64 = rng.sample(StandardNormal);
            z * INIT_SCALE
        });
        if n < 2 {
            return Ok(y);
        }

        let exaggeration_phase = (params.iterations / 4).min(250);
        let mut update = Array2::<f64>::zeros((n, dim));
        let mut gains = Array2::<f64>::ones((n, dim));
        let mut grad = Array2::<f64>::zeros((n, dim));

        for iteration in 0..params.iterations {
            let (exaggeration, momentum) = if iteration < exaggeration_phase {
                (params.early_exaggeration, 0.5)
            } else {
                (1.0, 0.8)
            };

            gradient(&p, &y, exaggeration, &mut grad);

            for ((u, gain), &dy) in update.iter_mut().zip(gains.iter_mut()).zip(grad.iter()) {
                *gain = if *u * dy < 0.0 {
                    *gain + 0.2
                } else {
                    (*gain * 0.8).max(MIN_GAIN)
                };
                *u = momentum * *u - params.learning_rate * *gain * dy;
            }
            y += &update;

            let mean = y.mean_axis(ndarray::Axis(0)).ok_or_else(|| {
                CapabilityError::Numerical("empty embedding".to_string())
            })?;
            y -= &mean;

            if y.iter().any(|v| !v.is_finite()) {
                return Err(CapabilityError::NonConvergence(format!(
                    "embedding diverged at iteration {}",
                    iteration
                )));
            }
        }

        Ok(y)
    }
}

/// Symmetrised joint probabilities `P = (P_cond + P_cond^T) / 2n` as a dense row-major matrix.
fn joint_probabilities(
    data: ArrayView2<'_, f64>,
    perplexity: f64,
    metric: Metric,
) -> Result<Vec<f64>, CapabilityError> {
    let n = data.nrows();
    let target_entropy = perplexity.ln();
    let mut conditional = vec![0.0f64; n * n];
    let mut row_dist = vec![0.0f64; n];

    for i in 0..n {
        for j in 0..n {
            row_dist[j] = if i == j {
                0.0
            } else {
                match metric {
                    Metric::Euclidean => squared_euclidean(data.row(i), data.row(j)),
                    Metric::Cosine => distance(metric, data.row(i), data.row(j)),
                }
            };
        }
        // Shift by the smallest distance so exp() cannot underflow the whole row.
        let min_dist = (0..n)
            .filter(|&j| j != i)
            .map(|j| row_dist[j])
            .fold(f64::INFINITY, f64::min);
        if !min_dist.is_finite() {
            continue;
        }

        let mut beta: f64 = 1.0;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;
        let row = &mut conditional[i * n..(i + 1) * n];

        for _ in 0..PERPLEXITY_STEPS {
            let mut sum_p: f64 = 0.0;
            let mut weighted: f64 = 0.0;
            for j in 0..n {
                if j == i {
                    row[j] = 0.0;
                    continue;
                }
                let shifted = row_dist[j] - min_dist;
                let pj = (-shifted * beta).exp();
                row[j] = pj;
                sum_p += pj;
                weighted += shifted * pj;
            }
            let entropy = sum_p.ln() + beta * weighted / sum_p;
            let diff = entropy - target_entropy;
            if diff.abs() < PERPLEXITY_TOLERANCE {
                break;
            }
            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max.is_infinite() {
                    beta * 2.0
                } else {
                    (beta + beta_max) / 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_infinite() {
                    beta / 2.0
                } else {
                    (beta + beta_min) / 2.0
                };
            }
        }

        let sum: f64 = row.iter().sum();
        if sum <= 0.0 || !sum.is_finite() {
            return Err(CapabilityError::Numerical(format!(
                "affinities for row {} do not normalise",
                i
            )));
        }
        row.iter_mut().for_each(|v| *v /= sum);
    }

    let scale = 2.0 * n as f64;
    let mut joint = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                joint[i * n + j] =
                    ((conditional[i * n + j] + conditional[j * n + i]) / scale).max(MIN_PROBABILITY);
            }
        }
    }
    Ok(joint)
}

/// KL-divergence gradient: `4 * sum_j (exag * p_ij - q_ij) * num_ij * (y_i - y_j)`.
fn gradient(p: &[f64], y: &Array2<f64>, exaggeration: f64, grad: &mut Array2<f64>) {
    let (n, dim) = y.dim();

    let mut sum_num: f64 = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            sum_num += 2.0 / (1.0 + squared_euclidean(y.row(i), y.row(j)));
        }
    }
    let sum_num = sum_num.max(MIN_PROBABILITY);

    grad.fill(0.0);
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let num = 1.0 / (1.0 + squared_euclidean(y.row(i), y.row(j)));
            let q = (num / sum_num).max(MIN_PROBABILITY);
            let coeff = 4.0 * (exaggeration * p[i * n + j] - q) * num;
            for d in 0..dim {
                grad[[i, d]] += coeff * (y[[i, d]] - y[[j, d]]);
            }
        }
    }
}
