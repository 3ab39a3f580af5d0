//! Errors for the IRF kernel library (parameter checks, bound specs, and
//! knot grids).
//!
//! This module defines [`KernelError`], covering configuration-time
//! failures in the kernel layer. Family selection itself cannot fail — the
//! family set is a closed enum — so every variant here concerns parameters
//! or metadata attached to a family. All variants name the offending
//! family or parameter.

/// Result alias for kernel operations that may produce [`KernelError`].
pub type KernelResult<T> = Result<T, KernelError>;

/// Unified error type for the kernel library.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Parameter vector length differs from the family's arity.
    ParamCountMismatch { family: &'static str, expected: usize, actual: usize },

    /// A constrained parameter is outside its domain (non-finite, or
    /// violating its bound).
    InvalidParam { family: &'static str, name: String, value: f64 },

    /// Interval bound with `min >= max`, or a non-finite endpoint.
    MalformedBound { min: f64, max: f64 },

    /// A value handed to `unconstrain` lies outside the bound's image.
    ValueOutsideBound { value: f64, reason: &'static str },

    /// Piecewise-linear knot grid is invalid.
    InvalidKnots { reason: &'static str, index: usize, value: f64 },

    /// A kernel evaluation produced a non-finite weight.
    NonFiniteWeight { family: &'static str, dt: f64, value: f64 },
}

impl std::error::Error for KernelError {}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::ParamCountMismatch { family, expected, actual } => {
                write!(
                    f,
                    "Kernel family `{family}` takes {expected} parameter(s); got {actual}"
                )
            }
            KernelError::InvalidParam { family, name, value } => {
                write!(
                    f,
                    "Parameter `{name}` of kernel family `{family}` is out of domain: {value}"
                )
            }
            KernelError::MalformedBound { min, max } => {
                write!(f, "Interval bound requires finite min < max; got [{min}, {max}]")
            }
            KernelError::ValueOutsideBound { value, reason } => {
                write!(f, "Value {value} is outside the bound's image: {reason}")
            }
            KernelError::InvalidKnots { reason, index, value } => {
                write!(f, "Invalid knot grid at index {index} (value {value}): {reason}")
            }
            KernelError::NonFiniteWeight { family, dt, value } => {
                write!(
                    f,
                    "Kernel family `{family}` produced a non-finite weight {value} at dt = {dt}"
                )
            }
        }
    }
}
