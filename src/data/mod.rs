//! data — impulse/response containers, grouping factors, and alignment.
//!
//! Purpose
//! -------
//! Collect the data-side building blocks of the deconvolutional regression
//! pipeline: validated impulse tables, response events with observation
//! windows, frozen grouping-factor level maps, and the history aligner
//! that turns all of it into fixed-shape arrays for the convolution
//! engine.
//!
//! Key behaviors
//! -------------
//! - Validate raw inputs once at the boundary ([`ImpulseTable::new`],
//!   [`ResponseEvents::new`]) so downstream code can assume clean data.
//! - Freeze grouping-factor level maps at construction
//!   ([`GroupingFactor::from_labels`]); unseen labels resolve to the
//!   implicit overall level.
//! - Extract per-event windows ([`align_batch`]) with zero-padding,
//!   heterogeneous-table merging, and the causal Δt tie clamp.
//!
//! Conventions
//! -----------
//! - Indexing is 0-based; observation windows are half-open `[first, last)`.
//! - Δt = response_time − impulse_time, positive for past impulses.
//! - Errors are surfaced as [`AlignmentError`] with the offending
//!   identifier; this module never panics on invalid input.
//!
//! Downstream usage
//! ----------------
//! - The model facade calls [`align_batch`] once per forward pass and
//!   hands the resulting [`AlignedBatch`] to the aggregation engine.
//! - The parameter layer sizes random-effect tensors from
//!   [`GroupingFactor::n_levels`] and resolves batch assignments via
//!   [`GroupingFactor::resolve`].

pub mod align;
pub mod errors;
pub mod groups;
pub mod response;
pub mod stream;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::align::{AlignedBatch, AlignmentConfig, TIME_TIE_TOL, align_batch};
pub use self::errors::{AlignResult, AlignmentError};
pub use self::groups::GroupingFactor;
pub use self::response::{FactorAssignment, ResponseColumn, ResponseEvents, Standardization};
pub use self::stream::{ImpulseColumn, ImpulseTable};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::align::{AlignedBatch, AlignmentConfig, align_batch};
    pub use super::groups::GroupingFactor;
    pub use super::response::{FactorAssignment, ResponseColumn, ResponseEvents, Standardization};
    pub use super::stream::ImpulseTable;
}
