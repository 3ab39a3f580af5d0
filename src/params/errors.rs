//! Errors for the parameter layer (store construction, θ mapping, and
//! random-effect bookkeeping).
//!
//! This module defines [`ParamError`]. Keys are reported through their
//! `Display` form (e.g. `coefficient/rt/coef_x`) so failures name the
//! exact quantity involved.
use crate::kernels::errors::KernelError;

/// Result alias for parameter operations that may produce [`ParamError`].
pub type ParamResult<T> = Result<T, ParamError>;

/// Unified error type for the parameter layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    /// A quantity was inserted twice under the same key.
    DuplicateKey { key: String },

    /// A quantity the model expects is absent from the store.
    MissingQuantity { key: String },

    /// A value vector has the wrong length for its quantity.
    LengthMismatch { key: String, expected: usize, actual: usize },

    /// θ length differs from the store's packed length.
    ThetaLengthMismatch { expected: usize, actual: usize },

    /// A loaded or assigned value is NaN/±inf.
    NonFiniteValue { key: String, index: usize, value: f64 },

    /// A loaded entry references a grouping factor the quantity does not
    /// carry.
    UnknownFactor { key: String, factor: String },

    /// A gathered level index is outside the factor's level set.
    LevelOutOfRange { factor: String, level: usize, n_levels: usize },

    /// EMA decay outside (0, 1).
    InvalidDecay { value: f64 },

    /// Kernel-layer error surfaced while unconstraining defaults.
    Kernel(KernelError),
}

impl std::error::Error for ParamError {}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamError::DuplicateKey { key } => {
                write!(f, "Quantity `{key}` is already present in the store.")
            }
            ParamError::MissingQuantity { key } => {
                write!(f, "Quantity `{key}` is absent from the store.")
            }
            ParamError::LengthMismatch { key, expected, actual } => {
                write!(f, "Quantity `{key}` expects {expected} value(s); got {actual}")
            }
            ParamError::ThetaLengthMismatch { expected, actual } => {
                write!(f, "Theta length mismatch: expected {expected}, got {actual}")
            }
            ParamError::NonFiniteValue { key, index, value } => {
                write!(f, "Value for `{key}` at index {index} is non-finite: {value}")
            }
            ParamError::UnknownFactor { key, factor } => {
                write!(f, "Quantity `{key}` carries no random term for factor `{factor}`")
            }
            ParamError::LevelOutOfRange { factor, level, n_levels } => {
                write!(
                    f,
                    "Level index {level} is outside factor `{factor}`'s {n_levels} level(s)"
                )
            }
            ParamError::InvalidDecay { value } => {
                write!(f, "EMA decay must lie strictly inside (0, 1); got {value}")
            }
            ParamError::Kernel(err) => {
                write!(f, "{err}")
            }
        }
    }
}

impl From<KernelError> for ParamError {
    fn from(err: KernelError) -> ParamError {
        ParamError::Kernel(err)
    }
}
