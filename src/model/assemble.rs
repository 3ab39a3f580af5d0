//! Predictive distribution assembly.
//!
//! Purpose
//! -------
//! Map each response's raw intercept + delta sums into native distribution
//! parameters: apply the family's bound transforms, then undo training
//! standardization at the output boundary so densities, predictions, and
//! samples live on the response's natural scale.
//!
//! De-standardization per family (with training mean `m`, sd `s`):
//! - `Normal`:      `mu·s + m`, `sigma·s`
//! - `SkewNormal`:  `xi·s + m`, `omega·s`, `alpha` unchanged
//! - `ExpModGauss`: `mu·s + m`, `sigma·s`, `beta/s`
//! - `Exponential`: `rate/s`; the mean shift is not applied, since a
//!   location shift would leave the family's support
//! - `Bernoulli`, `Categorical`: no de-standardization
use crate::data::response::Standardization;
use crate::model::distributions::ResponseDistribution;
use ndarray::{Array1, Array2, ArrayView1};

/// One response's output configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSpec {
    /// Response name, matching a target column in the events.
    pub name: String,
    /// Output-distribution family.
    pub distribution: ResponseDistribution,
    /// Present when the response was standardized at training time.
    pub standardization: Option<Standardization>,
}

impl ResponseSpec {
    pub fn new(name: impl Into<String>, distribution: ResponseDistribution) -> Self {
        ResponseSpec { name: name.into(), distribution, standardization: None }
    }

    pub fn standardized(mut self, standardization: Standardization) -> Self {
        self.standardization = Some(standardization);
        self
    }
}

/// Assemble final native parameters for one event:
/// `constrain(intercept_raw + delta)`, then de-standardize.
pub fn assemble_row(
    spec: &ResponseSpec, intercept_raw: ArrayView1<'_, f64>, delta: ArrayView1<'_, f64>,
) -> Array1<f64> {
    let bounds = spec.distribution.bounds();
    let mut params = Array1::zeros(intercept_raw.len());
    for (p, value) in params.iter_mut().enumerate() {
        *value = bounds[p].constrain(intercept_raw[p] + delta[p]);
    }
    if let Some(std) = &spec.standardization {
        destandardize(&spec.distribution, &mut params, std);
    }
    params
}

/// Assemble final native parameters for a whole batch.
pub fn assemble(
    spec: &ResponseSpec, intercept_raw: &Array2<f64>, deltas: &Array2<f64>,
) -> Array2<f64> {
    let (n_events, n_params) = deltas.dim();
    let mut out = Array2::zeros((n_events, n_params));
    for b in 0..n_events {
        let row = assemble_row(spec, intercept_raw.row(b), deltas.row(b));
        out.row_mut(b).assign(&row);
    }
    out
}

fn destandardize(
    distribution: &ResponseDistribution, params: &mut Array1<f64>, std: &Standardization,
) {
    match distribution {
        ResponseDistribution::Normal => {
            params[0] = params[0] * std.sd + std.mean;
            params[1] *= std.sd;
        }
        ResponseDistribution::SkewNormal => {
            params[0] = params[0] * std.sd + std.mean;
            params[1] *= std.sd;
        }
        ResponseDistribution::ExpModGauss => {
            params[0] = params[0] * std.sd + std.mean;
            params[1] *= std.sd;
            params[2] /= std.sd;
        }
        ResponseDistribution::Exponential => {
            params[0] /= std.sd;
        }
        ResponseDistribution::Bernoulli | ResponseDistribution::Categorical { .. } => {}
    }
}
