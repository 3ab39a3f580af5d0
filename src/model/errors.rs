//! Errors for the model layer (forward-pass wiring, distribution
//! assembly, and numeric diagnostics).
//!
//! This module defines [`ModelError`], the error surface of the model
//! facade. Lower-layer errors convert in via `From`; numeric-instability
//! findings are *reported* through `ForwardOutput::warnings` and only
//! become a [`ModelError::NonFiniteOutput`] when the caller asks for a
//! hard check.
use crate::data::errors::AlignmentError;
use crate::kernels::errors::KernelError;
use crate::params::errors::ParamError;
use crate::tree::errors::TreeError;

/// Result alias for model operations that may produce [`ModelError`].
pub type ModelResult<T> = Result<T, ModelError>;

/// Unified error type for the model facade.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Data-layer failure (container validation or window extraction).
    Alignment(AlignmentError),

    /// Configuration failure in the IRF tree or composition grid.
    Tree(TreeError),

    /// Kernel parameter/bound failure.
    Kernel(KernelError),

    /// Parameter-store failure.
    Param(ParamError),

    /// A response named by the model is absent from the supplied events.
    UnknownResponse { response: String },

    /// A configured random factor is absent from the model's factor list.
    UnknownRandomFactor { factor: String },

    /// A target value is outside its distribution's support (e.g. a
    /// categorical code past the class count).
    InvalidTarget { response: String, index: usize, value: f64 },

    /// A distribution rejected its assembled parameters.
    InvalidDistributionParam { response: String, message: String },

    /// A non-finite value was detected at an explicit post-step check.
    NonFiniteOutput { response: String, stage: &'static str, value: f64 },
}

impl std::error::Error for ModelError {}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Alignment(err) => write!(f, "{err}"),
            ModelError::Tree(err) => write!(f, "{err}"),
            ModelError::Kernel(err) => write!(f, "{err}"),
            ModelError::Param(err) => write!(f, "{err}"),
            ModelError::UnknownResponse { response } => {
                write!(f, "Response `{response}` is absent from the supplied events.")
            }
            ModelError::UnknownRandomFactor { factor } => {
                write!(
                    f,
                    "Random factor `{factor}` is not among the model's grouping factors."
                )
            }
            ModelError::InvalidTarget { response, index, value } => {
                write!(
                    f,
                    "Target for response `{response}` at event {index} is outside the distribution's support: {value}"
                )
            }
            ModelError::InvalidDistributionParam { response, message } => {
                write!(f, "Distribution for response `{response}` rejected its parameters: {message}")
            }
            ModelError::NonFiniteOutput { response, stage, value } => {
                write!(
                    f,
                    "Non-finite value {value} detected for response `{response}` at stage `{stage}`"
                )
            }
        }
    }
}

impl From<AlignmentError> for ModelError {
    fn from(err: AlignmentError) -> ModelError {
        ModelError::Alignment(err)
    }
}

impl From<TreeError> for ModelError {
    fn from(err: TreeError) -> ModelError {
        ModelError::Tree(err)
    }
}

impl From<KernelError> for ModelError {
    fn from(err: KernelError) -> ModelError {
        ModelError::Kernel(err)
    }
}

impl From<ParamError> for ModelError {
    fn from(err: ParamError) -> ModelError {
        ModelError::Param(err)
    }
}
