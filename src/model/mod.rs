//! model — aggregation, distribution assembly, and the CdrModel facade.
//!
//! Purpose
//! -------
//! Provide the top half of the pipeline: the convolution/aggregation
//! engine ([`aggregate`]), the response distribution families
//! ([`distributions`]), the predictive-distribution assembler
//! ([`assemble`]), and the [`CdrModel`] facade that runs
//! align → compose → decompose → aggregate → assemble as one pure pass
//! and exposes fit/predict/sample on top.
//!
//! Key behaviors
//! -------------
//! - Per terminal, contributions are `value × mask × weight ×
//!   coefficient`; interactions multiply convolved member contributions.
//! - Distribution parameters are assembled from intercept + delta through
//!   the family's bound transforms, then de-standardized.
//! - Numeric-instability checks are post-step diagnostics carried in
//!   [`ForwardOutput::warnings`]; the caller decides whether to abort.
//!
//! Downstream usage
//! ----------------
//! - Construct a [`CdrModel`] from a validated tree, response specs,
//!   frozen grouping factors, and a [`CdrConfig`]; feed it [`CdrData`]
//!   batches.
//! - Fit through [`CdrModel::fit`]; persist state via
//!   [`CdrModel::export_state`] / [`CdrModel::import_state`].

pub mod aggregate;
pub mod assemble;
pub mod cdr;
pub mod distributions;
pub mod errors;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::aggregate::{
    AggregationOptions, ResolvedInteraction, aggregate_deltas, contributions, convolve_impulses,
    reduce,
};
pub use self::assemble::{ResponseSpec, assemble, assemble_row};
pub use self::cdr::{
    CdrConfig, CdrData, CdrModel, CdrObjective, ForwardOutput, ModelState, NumericWarning,
};
pub use self::distributions::{CATEGORICAL_MAX_LEVELS, ResponseDistribution};
pub use self::errors::{ModelError, ModelResult};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::assemble::ResponseSpec;
    pub use super::cdr::{CdrConfig, CdrData, CdrModel, ForwardOutput};
    pub use super::distributions::ResponseDistribution;
    pub use super::errors::{ModelError, ModelResult};
}
