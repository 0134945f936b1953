//! `umap-learn` capability backed by the Python `umap` package via PyO3.

use ndarray::{Array2, ArrayView2};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use qntx_projection::{AlgorithmConfig, Capability, CapabilityError};
use tracing::debug;

/// Registry identifier for this capability.
pub const UMAP_LEARN: &str = "umap-learn";

/// Delegates to `umap.UMAP(...).fit_transform`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UmapLearn;

impl Capability for UmapLearn {
    fn description(&self) -> &str {
        "UMAP via the Python umap-learn package"
    }

    fn project(
        &self,
        data: ArrayView2<'_, f64>,
        config: &AlgorithmConfig,
    ) -> Result<Array2<f64>, CapabilityError> {
        let params = config.params();
        let n_points = data.nrows();
        let k = config.n_components();
        // numpy's legacy RandomState only takes 32-bit seeds
        let random_state = config.seed() & u64::from(u32::MAX);

        let rows = Python::with_gil(|py| -> PyResult<Vec<Vec<f64>>> {
            let np = py.import("numpy")?;
            let umap_mod = py.import("umap")?;

            let inner_lists: Vec<Bound<'_, PyList>> = data
                .outer_iter()
                .map(|row| PyList::new(py, row.iter()))
                .collect::<PyResult<Vec<_>>>()?;
            let py_list = PyList::new(py, inner_lists.iter())?;
            let np_array = np.call_method1("array", (py_list, "float64"))?;

            let kwargs = PyDict::new(py);
            kwargs.set_item(
                "n_neighbors",
                params.n_neighbors.min(n_points.saturating_sub(1)).max(2),
            )?;
            kwargs.set_item("min_dist", params.min_dist)?;
            kwargs.set_item("spread", params.spread)?;
            kwargs.set_item("metric", params.metric.as_str())?;
            kwargs.set_item("n_components", k)?;
            kwargs.set_item("random_state", random_state)?;
            if params.n_epochs > 0 {
                kwargs.set_item("n_epochs", params.n_epochs)?;
            }

            let reducer = umap_mod.getattr("UMAP")?.call((), Some(&kwargs))?;
            let result = reducer.call_method1("fit_transform", (np_array,))?;
            result.call_method0("tolist")?.extract()
        })
        .map_err(|e| CapabilityError::Backend(format!("umap-learn failed: {}", e)))?;

        debug!(n_points, n_components = k, "umap-learn projection returned");

        // Shape is checked by the executor; only raggedness is a backend fault here.
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return Err(CapabilityError::Backend(
                "umap-learn returned ragged rows".to_string(),
            ));
        }
        let n_rows = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((n_rows, cols), flat)
            .map_err(|e| CapabilityError::Backend(format!("umap-learn result: {}", e)))
    }
}
