//! Errors for IRF tree construction and kernel composition.
//!
//! This module defines [`TreeError`], the configuration-error surface of
//! the tree layer: structural problems in the declared IRF tree, window
//! configurations incompatible with the declared kernel families, and
//! invalid composition grids. Kernel-level parameter errors convert in via
//! `From<KernelError>`.
use crate::kernels::errors::KernelError;

/// Result alias for tree operations that may produce [`TreeError`].
pub type TreeResult<T> = Result<T, TreeError>;

/// Unified error type for IRF tree configuration and composition.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeError {
    /// The tree declares no terminals.
    EmptyTree,

    /// Two terminals share an id.
    DuplicateTerminal { id: String },

    /// An interaction references a terminal the tree does not declare.
    UnknownTerminal { interaction: String, terminal: String },

    /// An interaction must multiply at least two terminals.
    InteractionArity { id: String, arity: usize },

    /// `future_length > 0` while every declared kernel family is
    /// causal-only: the lookahead rows could never receive weight.
    FutureWithCausalOnly { future_length: usize },

    /// Composition grid configuration is invalid.
    InvalidGrid { what: &'static str, value: f64 },

    /// Kernel-layer error (parameter counts, domains, knot grids).
    Kernel(KernelError),
}

impl std::error::Error for TreeError {}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::EmptyTree => {
                write!(f, "IRF tree declares no terminals.")
            }
            TreeError::DuplicateTerminal { id } => {
                write!(f, "Terminal id `{id}` is declared more than once.")
            }
            TreeError::UnknownTerminal { interaction, terminal } => {
                write!(
                    f,
                    "Interaction `{interaction}` references undeclared terminal `{terminal}`"
                )
            }
            TreeError::InteractionArity { id, arity } => {
                write!(f, "Interaction `{id}` must reference >= 2 terminals; got {arity}")
            }
            TreeError::FutureWithCausalOnly { future_length } => {
                write!(
                    f,
                    "future_length = {future_length} but every kernel family is causal-only; lookahead rows can never receive weight"
                )
            }
            TreeError::InvalidGrid { what, value } => {
                write!(f, "Composition grid {what} is invalid: {value}")
            }
            TreeError::Kernel(err) => {
                write!(f, "{err}")
            }
        }
    }
}

impl From<KernelError> for TreeError {
    fn from(err: KernelError) -> TreeError {
        TreeError::Kernel(err)
    }
}
