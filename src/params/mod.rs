//! params — fixed + random parameter decomposition and the keyed store.
//!
//! Purpose
//! -------
//! Implement the hierarchical-effects half of the model: every learned
//! quantity (intercept, coefficient, kernel parameter, interaction weight)
//! is one fixed tensor plus zero or more per-factor random-offset tensors,
//! invariantly mean-centered across levels before gathering. Quantities
//! live in a [`ParamStore`] keyed by explicit composite [`ParamKey`]s over
//! an ordered map.
//!
//! Key behaviors
//! -------------
//! - Two estimation regimes per model ([`Regime::Point`],
//!   [`Regime::Distributional`]), orthogonal to the composition logic;
//!   the distributional regime supports posterior sampling and a
//!   closed-form KL penalty.
//! - Mean-centering is an explicit, independently testable step
//!   ([`decomp::centered_offsets`]): subtract the level mean, then gather.
//! - θ packing/unpacking and flat-entry persistence are deterministic in
//!   key order.
//! - An optional EMA side-channel ([`EmaTracker`]) smooths θ iterates for
//!   reporting; it never feeds back into the forward pass.
//!
//! Downstream usage
//! ----------------
//! - The model facade builds the store by walking its IRF tree, realizes
//!   it once per forward pass, and gathers per-observation values by
//!   resolved group level.
//! - The optimizer sees only the packed θ vector.

pub mod decomp;
pub mod ema;
pub mod errors;
pub mod key;
pub mod store;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::decomp::{
    ParamQuantity, ParamTensor, RandomTerm, Realize, RealizedQuantity, Regime, centered_offsets,
};
pub use self::ema::EmaTracker;
pub use self::errors::{ParamError, ParamResult};
pub use self::key::{ParamKey, QuantityKind, QuantityTarget};
pub use self::store::{ParamEntry, ParamStore};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::decomp::{ParamQuantity, Realize, Regime};
    pub use super::ema::EmaTracker;
    pub use super::key::{ParamKey, QuantityKind, QuantityTarget};
    pub use super::store::{ParamEntry, ParamStore};
}
