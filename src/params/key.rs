//! Composite parameter keys.
//!
//! Every learned quantity is addressed by an explicit composite key —
//! quantity kind, response, and an optional typed target — over an ordered
//! map. Identity never rides on formatted strings; `Display` exists only
//! for error messages and logs.
use serde::{Deserialize, Serialize};

/// Kind of learned quantity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum QuantityKind {
    Intercept,
    Coefficient,
    KernelParam,
    InteractionWeight,
}

impl QuantityKind {
    fn as_str(&self) -> &'static str {
        match self {
            QuantityKind::Intercept => "intercept",
            QuantityKind::Coefficient => "coefficient",
            QuantityKind::KernelParam => "kernel",
            QuantityKind::InteractionWeight => "interaction",
        }
    }
}

/// Typed target of a quantity within the IRF tree.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum QuantityTarget {
    /// A coefficient id shared by one or more terminals.
    Coefficient { id: String },
    /// One kernel instance: a terminal and its chain position.
    Kernel { terminal: String, position: usize },
    /// An interaction id.
    Interaction { id: String },
}

/// Composite key addressing one quantity:
/// (kind, response, [target]).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParamKey {
    pub kind: QuantityKind,
    pub response: String,
    pub target: Option<QuantityTarget>,
}

impl ParamKey {
    /// Intercept of one response.
    pub fn intercept(response: impl Into<String>) -> Self {
        ParamKey { kind: QuantityKind::Intercept, response: response.into(), target: None }
    }

    /// Coefficient of one response.
    pub fn coefficient(response: impl Into<String>, id: impl Into<String>) -> Self {
        ParamKey {
            kind: QuantityKind::Coefficient,
            response: response.into(),
            target: Some(QuantityTarget::Coefficient { id: id.into() }),
        }
    }

    /// Kernel parameters of one chain element of one terminal.
    pub fn kernel(
        response: impl Into<String>, terminal: impl Into<String>, position: usize,
    ) -> Self {
        ParamKey {
            kind: QuantityKind::KernelParam,
            response: response.into(),
            target: Some(QuantityTarget::Kernel { terminal: terminal.into(), position }),
        }
    }

    /// Interaction weight of one response.
    pub fn interaction(response: impl Into<String>, id: impl Into<String>) -> Self {
        ParamKey {
            kind: QuantityKind::InteractionWeight,
            response: response.into(),
            target: Some(QuantityTarget::Interaction { id: id.into() }),
        }
    }
}

impl std::fmt::Display for ParamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.response)?;
        match &self.target {
            None => Ok(()),
            Some(QuantityTarget::Coefficient { id }) => write!(f, "/{id}"),
            Some(QuantityTarget::Kernel { terminal, position }) => {
                write!(f, "/{terminal}[{position}]")
            }
            Some(QuantityTarget::Interaction { id }) => write!(f, "/{id}"),
        }
    }
}
