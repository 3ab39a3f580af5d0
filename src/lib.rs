//! ctdr — continuous-time deconvolutional regression.
//!
//! Purpose
//! -------
//! Fit and evaluate continuous-time deconvolutional regression models: a
//! response observed at irregular timestamps is explained as a
//! coefficient-weighted sum of impulses convolved with impulse response
//! functions (IRFs), optionally composed in chains, with hierarchical
//! (fixed + random) effects and a configurable output-distribution family
//! per response.
//!
//! Key behaviors
//! -------------
//! - Extract per-event impulse history windows with validity masks
//!   (`data`), merging impulse tables with heterogeneous sampling rates.
//! - Evaluate a closed set of parametric and learned kernel families at
//!   arbitrary time offsets (`kernels`), and compose chained kernels via
//!   discretized FFT convolution (`tree`).
//! - Decompose every learned quantity into a fixed value plus
//!   mean-centered per-level random offsets (`params`), under a point or
//!   distributional estimation regime.
//! - Aggregate weighted impulses into predictive-distribution parameters
//!   and expose log density, point predictions, and sampling (`model`).
//! - Maximize the penalized log-likelihood through an Argmin-backed
//!   L-BFGS stack with finite-difference fallbacks (`optimization`).
//!
//! Invariants & assumptions
//! ------------------------
//! - The forward pass is a pure dataflow graph: one evaluation per
//!   minibatch, no shared-state mutation mid-pass, parameters mutated
//!   only by the optimizer between passes.
//! - Kernel parameters, coefficients, and tree structure are frozen at
//!   model construction (closed parameter set); grouping-factor level
//!   maps never grow.
//! - Causal kernel families are exactly 0 for negative offsets; kernel
//!   weights stay finite for any finite offset.
//!
//! Downstream usage
//! ----------------
//! - Build validated containers from `data`, declare an IRF tree from
//!   `tree`, pick response families from `model`, and drive everything
//!   through [`model::CdrModel`].
//! - Each area module re-exports its main surface and offers a `prelude`
//!   for single-line imports.

pub mod data;
pub mod kernels;
pub mod model;
pub mod optimization;
pub mod params;
pub mod tree;
