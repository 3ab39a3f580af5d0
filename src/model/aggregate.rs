//! Convolution/aggregation engine.
//!
//! Purpose
//! -------
//! Combine aligned impulse values, effective kernel weights, and resolved
//! coefficients into per-response delta matrices. Per terminal, the
//! contribution is `value × mask × weight × coefficient`; reductions over
//! the time and terminal axes are both on by default, and either can be
//! disabled for time- or impulse-resolved diagnostics. Interaction terms
//! multiply the *convolved* contributions of their member terminals before
//! scaling by the interaction's own weight.
//!
//! The whole stage is pure: identical inputs against an unchanged
//! parameter snapshot produce numerically identical deltas.
use crate::data::align::AlignedBatch;
use ndarray::{Array2, Array3, Array4, Axis};

/// Axis-reduction switches for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationOptions {
    /// Sum contributions over the window (time) axis.
    pub sum_time: bool,
    /// Sum contributions over the terminal axis.
    pub sum_terminals: bool,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        AggregationOptions { sum_time: true, sum_terminals: true }
    }
}

/// Per-terminal convolved impulses, before coefficients:
/// `conv[b, k] = Σ_t value[b, t, impulse(k)] · mask · weight[b, t, k]`.
///
/// `terminal_impulse[k]` maps each terminal to its impulse's column in the
/// aligned batch.
pub fn convolve_impulses(
    batch: &AlignedBatch, weights: &Array3<f64>, terminal_impulse: &[usize],
) -> Array2<f64> {
    let (n_events, window, _) = batch.values.dim();
    let n_terminals = terminal_impulse.len();
    let mut conv = Array2::<f64>::zeros((n_events, n_terminals));
    for b in 0..n_events {
        for (k, &imp) in terminal_impulse.iter().enumerate() {
            let mut acc = 0.0;
            for t in 0..window {
                acc += batch.values[(b, t, imp)]
                    * batch.mask[(b, t, imp)]
                    * weights[(b, t, k)];
            }
            conv[(b, k)] = acc;
        }
    }
    conv
}

/// Full contribution tensor for diagnostics:
/// `contrib[b, t, k, p] = value · mask · weight · coef[b, k, p]`.
pub fn contributions(
    batch: &AlignedBatch, weights: &Array3<f64>, terminal_impulse: &[usize],
    coefs: &Array3<f64>,
) -> Array4<f64> {
    let (n_events, window, _) = batch.values.dim();
    let n_terminals = terminal_impulse.len();
    let n_params = coefs.dim().2;
    let mut out = Array4::<f64>::zeros((n_events, window, n_terminals, n_params));
    for b in 0..n_events {
        for t in 0..window {
            for (k, &imp) in terminal_impulse.iter().enumerate() {
                let base =
                    batch.values[(b, t, imp)] * batch.mask[(b, t, imp)] * weights[(b, t, k)];
                for p in 0..n_params {
                    out[(b, t, k, p)] = base * coefs[(b, k, p)];
                }
            }
        }
    }
    out
}

/// Reduce a contribution tensor over the requested axes.
///
/// With both reductions on (the default) the result collapses to the
/// `(batch × distribution-parameter)` delta matrix; disabling an axis
/// keeps it for diagnostics. The time axis is reduced first when both are
/// requested, which is associative with the sum either way.
pub fn reduce(contrib: &Array4<f64>, options: &AggregationOptions) -> ndarray::ArrayD<f64> {
    match (options.sum_time, options.sum_terminals) {
        (true, true) => contrib.sum_axis(Axis(1)).sum_axis(Axis(1)).into_dyn(),
        (true, false) => contrib.sum_axis(Axis(1)).into_dyn(),
        (false, true) => contrib.sum_axis(Axis(2)).into_dyn(),
        (false, false) => contrib.clone().into_dyn(),
    }
}

/// One resolved interaction: member terminal indices and the per-event
/// interaction weight `(batch × distribution-parameter)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInteraction {
    pub members: Vec<usize>,
    pub weights: Array2<f64>,
}

/// Aggregate convolved impulses into the per-response delta matrix:
///
/// `delta[b, p] = Σ_k coef[b, k, p]·conv[b, k]
///              + Σ_i w_i[b, p]·Π_{k ∈ members(i)} conv[b, k]`.
pub fn aggregate_deltas(
    conv: &Array2<f64>, coefs: &Array3<f64>, interactions: &[ResolvedInteraction],
) -> Array2<f64> {
    let (n_events, n_terminals) = conv.dim();
    let n_params = coefs.dim().2;
    let mut delta = Array2::<f64>::zeros((n_events, n_params));
    for b in 0..n_events {
        for p in 0..n_params {
            let mut acc = 0.0;
            for k in 0..n_terminals {
                acc += coefs[(b, k, p)] * conv[(b, k)];
            }
            for interaction in interactions {
                let product: f64 =
                    interaction.members.iter().map(|&k| conv[(b, k)]).product();
                acc += interaction.weights[(b, p)] * product;
            }
            delta[(b, p)] = acc;
        }
    }
    delta
}
