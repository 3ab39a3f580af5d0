//! Errors for the fitting layer (configuration checks, finite-difference
//! failures, and backend solver errors).
//!
//! This module defines [`FitError`], used across the optimizer surface. All
//! backend (`argmin`) errors are normalized into
//! [`FitError::Backend`] with a human-readable status so callers never see
//! raw solver types.
//!
//! ## Conventions
//! - The optimizer *maximizes* an objective `ℓ(θ)` by minimizing the cost
//!   `c(θ) = -ℓ(θ)`; errors are reported in terms of `ℓ`.
//! - Non-finite objective or gradient values are hard errors at the
//!   optimizer boundary: the model layer is expected to reject invalid θ
//!   itself, so a NaN reaching this layer indicates a modeling bug.

/// Result alias for fitting paths that may produce [`FitError`].
pub type FitResult<T> = Result<T, FitError>;

/// Unified error type for the fitting layer.
#[derive(Debug)]
pub enum FitError {
    // ---- Configuration ----
    /// A tolerance was non-finite or non-positive.
    InvalidTolerance { name: &'static str, value: f64 },

    /// Unrecognized line-search name.
    InvalidLineSearch { given: String },

    // ---- Objective evaluation ----
    /// The objective did not provide an analytic gradient; callers fall
    /// back to finite differences.
    GradientNotImplemented,

    /// The objective produced a non-finite value at θ.
    NonFiniteObjective { value: f64 },

    /// A gradient entry was NaN/±inf.
    NonFiniteGradient { index: usize, value: f64 },

    /// Gradient length does not match θ length.
    GradientDimMismatch { expected: usize, actual: usize },

    /// Initial θ contained a non-finite entry.
    NonFiniteTheta { index: usize, value: f64 },

    /// The solver returned no best parameter.
    MissingSolution,

    // ---- Model / backend ----
    /// Error propagated from the model's objective implementation.
    Model { message: String },

    /// Backend solver failure; includes a human-readable status.
    Backend { status: String },
}

impl std::error::Error for FitError {}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::InvalidTolerance { name, value } => {
                write!(f, "Tolerance `{name}` must be finite and > 0; got: {value}")
            }
            FitError::InvalidLineSearch { given } => {
                write!(
                    f,
                    "Unrecognized line search `{given}`; expected \"MoreThuente\" or \"HagerZhang\""
                )
            }
            FitError::GradientNotImplemented => {
                write!(f, "Objective does not implement an analytic gradient.")
            }
            FitError::NonFiniteObjective { value } => {
                write!(f, "Objective evaluated to a non-finite value: {value}")
            }
            FitError::NonFiniteGradient { index, value } => {
                write!(f, "Gradient entry at index {index} is non-finite: {value}")
            }
            FitError::GradientDimMismatch { expected, actual } => {
                write!(f, "Gradient length mismatch: expected {expected}, got {actual}")
            }
            FitError::NonFiniteTheta { index, value } => {
                write!(f, "Initial theta entry at index {index} is non-finite: {value}")
            }
            FitError::MissingSolution => {
                write!(f, "Solver terminated without a best parameter vector.")
            }
            FitError::Model { message } => {
                write!(f, "Objective evaluation failed: {message}")
            }
            FitError::Backend { status } => {
                write!(f, "Solver failed with status: {status}")
            }
        }
    }
}

/// Normalize backend solver errors into [`FitError::Backend`].
impl From<argmin::core::Error> for FitError {
    fn from(err: argmin::core::Error) -> FitError {
        FitError::Backend { status: err.to_string() }
    }
}
