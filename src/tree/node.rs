//! IRF tree — typed, pure-data model topology.
//!
//! Purpose
//! -------
//! Represent the model's convolutional structure as explicit data before
//! anything is instantiated: terminals tying one impulse to a kernel chain
//! and a coefficient, plus interactions multiplying designated terminal
//! contributions. The tree is built and validated once, then walked by the
//! model facade to size the parameter store — specification and evaluation
//! never mix.
//!
//! Key behaviors
//! -------------
//! - [`IrfTree::new`] validates structural invariants (unique terminal
//!   ids, resolvable interaction references, interaction arity ≥ 2).
//! - [`IrfTree::validate_window`] checks the declared kernel families
//!   against the alignment window: a lookahead window combined with
//!   exclusively causal families is a configuration error.
//!
//! Conventions
//! -----------
//! - A chain of length 0 denotes the Dirac delta (no smoothing).
//! - Chain order is the declared root→leaf order; composition follows it
//!   exactly (never reversed).
use crate::data::align::AlignmentConfig;
use crate::kernels::family::KernelFamily;
use crate::tree::errors::{TreeError, TreeResult};
use std::collections::HashSet;

/// Leaf node of the IRF tree: one impulse, one kernel chain, one
/// coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    /// Unique terminal id.
    pub id: String,
    /// Name of the impulse this terminal convolves.
    pub impulse: String,
    /// Kernel chain in declared (root→leaf) order; empty = Dirac delta.
    pub chain: Vec<KernelFamily>,
    /// Coefficient id; distinct terminals may share a coefficient.
    pub coef_id: String,
}

impl Terminal {
    pub fn new(
        id: impl Into<String>, impulse: impl Into<String>, chain: Vec<KernelFamily>,
        coef_id: impl Into<String>,
    ) -> Self {
        Terminal { id: id.into(), impulse: impulse.into(), chain, coef_id: coef_id.into() }
    }

    /// Whether every family in the chain (or the implicit Dirac) is
    /// causal.
    pub fn is_causal(&self) -> bool {
        self.chain.iter().all(KernelFamily::is_causal)
    }
}

/// Multiplicative interaction over a set of terminals.
///
/// The designated terminals' convolved contributions are multiplied, then
/// scaled by the interaction's own coefficient and added to the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    /// Unique interaction id.
    pub id: String,
    /// Ids of the terminals whose contributions are multiplied; ≥ 2.
    pub terminals: Vec<String>,
}

/// The full IRF tree: validated pure data.
#[derive(Debug, Clone, PartialEq)]
pub struct IrfTree {
    pub terminals: Vec<Terminal>,
    pub interactions: Vec<Interaction>,
}

impl IrfTree {
    /// Construct a validated tree.
    ///
    /// # Errors
    /// - [`TreeError::EmptyTree`] when no terminals are declared.
    /// - [`TreeError::DuplicateTerminal`] on a repeated terminal id.
    /// - [`TreeError::UnknownTerminal`] / [`TreeError::InteractionArity`]
    ///   for malformed interactions.
    pub fn new(terminals: Vec<Terminal>, interactions: Vec<Interaction>) -> TreeResult<Self> {
        if terminals.is_empty() {
            return Err(TreeError::EmptyTree);
        }
        let mut seen = HashSet::new();
        for terminal in &terminals {
            if !seen.insert(terminal.id.as_str()) {
                return Err(TreeError::DuplicateTerminal { id: terminal.id.clone() });
            }
        }
        for interaction in &interactions {
            if interaction.terminals.len() < 2 {
                return Err(TreeError::InteractionArity {
                    id: interaction.id.clone(),
                    arity: interaction.terminals.len(),
                });
            }
            for terminal in &interaction.terminals {
                if !seen.contains(terminal.as_str()) {
                    return Err(TreeError::UnknownTerminal {
                        interaction: interaction.id.clone(),
                        terminal: terminal.clone(),
                    });
                }
            }
        }
        Ok(IrfTree { terminals, interactions })
    }

    /// Check the declared families against the alignment window.
    ///
    /// # Errors
    /// [`TreeError::FutureWithCausalOnly`] when `future_length > 0` but
    /// every chain is causal-only, so lookahead rows could never be
    /// weighted.
    pub fn validate_window(&self, config: &AlignmentConfig) -> TreeResult<()> {
        if config.future_length > 0 && self.terminals.iter().all(Terminal::is_causal) {
            return Err(TreeError::FutureWithCausalOnly {
                future_length: config.future_length,
            });
        }
        Ok(())
    }

    /// Distinct impulses referenced by the tree, preserving first
    /// occurrence.
    pub fn impulses(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for terminal in &self.terminals {
            if !out.iter().any(|i| *i == terminal.impulse) {
                out.push(terminal.impulse.clone());
            }
        }
        out
    }

    /// Look up a terminal by id.
    pub fn terminal(&self, id: &str) -> Option<&Terminal> {
        self.terminals.iter().find(|t| t.id == id)
    }

    /// Position of a terminal on the aggregation engine's terminal axis.
    pub fn terminal_index(&self, id: &str) -> Option<usize> {
        self.terminals.iter().position(|t| t.id == id)
    }
}
