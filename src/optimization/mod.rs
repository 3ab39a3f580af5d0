//! optimization — fitting stack, numerical helpers, and error surface.
//!
//! Purpose
//! -------
//! Provide the fitting layer for this crate: an Argmin-backed maximizer for
//! user objectives, guarded nonlinear transforms shared by every bound
//! mapping, finite-difference gradient fallbacks, and a single error/result
//! surface. Callers implement [`Objective`], choose tolerances, and obtain
//! fitted parameters and diagnostics without touching backend solver
//! details.
//!
//! Key behaviors
//! -------------
//! - Expose a high-level API for **maximizing objectives** `ℓ(θ)`
//!   ([`fit::maximize`]), including solver and stopping configuration.
//! - Supply shared numerical primitives ([`numerics`]) for mapping
//!   unconstrained parameters into bounded model space.
//! - Normalize configuration issues, numerical failures, and backend
//!   solver errors into a single enum ([`errors::FitError`]) with a common
//!   result alias (`FitResult<T>`).
//!
//! Conventions
//! -----------
//! - All solvers conceptually maximize `ℓ(θ)` by minimizing an internal
//!   cost `c(θ) = -ℓ(θ)`; user-facing APIs and outcomes are expressed in
//!   terms of `ℓ`.
//! - Parameters and gradients are `ndarray` vectors over `f64`
//!   ([`fit::Theta`], [`fit::Grad`]); mapping between unconstrained θ-space
//!   and structured model parameters is the parameter layer's concern.
//! - Public entrypoints that can fail return `FitResult<T>`; callers never
//!   see raw Argmin errors.
//!
//! Downstream usage
//! ----------------
//! - The model layer implements [`Objective`] for its penalized
//!   log-likelihood and calls [`maximize`] with a θ snapshot from the
//!   parameter store.
//! - Kernel and distribution bound transforms use [`numerics`] for the
//!   softplus/logistic pairs.

pub mod errors;
pub mod finite_diff;
pub mod fit;
pub mod numerics;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::errors::{FitError, FitResult};
pub use self::fit::{
    DEFAULT_LBFGS_MEM, FitOptions, FitOutcome, Grad, LineSearch, Objective, Theta, Tolerances,
    maximize,
};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::errors::{FitError, FitResult};
    pub use super::fit::{FitOptions, FitOutcome, LineSearch, Objective, Theta, Tolerances, maximize};
}
