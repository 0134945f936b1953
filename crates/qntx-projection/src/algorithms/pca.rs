//! Principal component analysis by power iteration with deflation.

use crate::config::AlgorithmConfig;
use crate::error::CapabilityError;
use crate::registry::Capability;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;

const MAX_POWER_ITERATIONS: usize = 500;
const CONVERGENCE: f64 = 1e-12;
const MIN_NORM: f64 = 1e-12;

/// PCA capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pca;

impl Capability for Pca {
    fn description(&self) -> &str {
        "PCA: linear projection onto the directions of greatest variance"
    }

    fn project(
        &self,
        data: ArrayView2<'_, f64>,
        config: &AlgorithmConfig,
    ) -> Result<Array2<f64>, CapabilityError> {
        let k = config.n_components();
        let d = data.ncols();
        let mut rng = config.rng();

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| CapabilityError::Numerical("empty input".to_string()))?;
        let centered = &data - &mean;

        let mut components: Vec<Array1<f64>> = Vec::with_capacity(k);
        for _ in 0..k {
            let mut v: Array1<f64> = Array1::from_shape_fn(d, |_| rng.sample(StandardNormal));
            orthogonalize(&mut v, &components);
            normalize(&mut v).ok_or_else(|| {
                CapabilityError::Numerical("degenerate start vector".to_string())
            })?;

            for _ in 0..MAX_POWER_ITERATIONS {
                // X^T (X v) avoids materialising the D x D covariance.
                let mut w = centered.t().dot(&centered.dot(&v));
                orthogonalize(&mut w, &components);
                if normalize(&mut w).is_none() {
                    // No variance left in the remaining subspace; keep v.
                    break;
                }
                let delta = 1.0 - w.dot(&v).abs();
                v = w;
                if delta < CONVERGENCE {
                    break;
                }
            }

            // Fix the sign so the largest-magnitude loading is positive.
            let pivot = v
                .iter()
                .copied()
                .enumerate()
                .fold((0, 0.0f64), |best, (i, x)| {
                    if x.abs() > best.1.abs() {
                        (i, x)
                    } else {
                        best
                    }
                });
            if pivot.1 < 0.0 {
                v.mapv_inplace(|x| -x);
            }
            components.push(v);
        }

        let mut basis = Array2::<f64>::zeros((d, k));
        for (c, component) in components.iter().enumerate() {
            basis.column_mut(c).assign(component);
        }
        Ok(centered.dot(&basis))
    }
}

fn orthogonalize(v: &mut Array1<f64>, basis: &[Array1<f64>]) {
    for u in basis {
        let projection = v.dot(u);
        v.scaled_add(-projection, u);
    }
}

fn normalize(v: &mut Array1<f64>) -> Option<()> {
    let norm = v.dot(v).sqrt();
    if !norm.is_finite() || norm < MIN_NORM {
        return None;
    }
    *v /= norm;
    Some(())
}
