//! kernels — IRF kernel families, bound transforms, and knot grids.
//!
//! Purpose
//! -------
//! Provide the impulse-response kernel library: a closed enum of
//! parametric and learned kernel families ([`KernelFamily`]), the bound
//! types their parameters are trained under ([`BoundType`]), and the fixed
//! knot grids backing the nonparametric family ([`KnotGrid`]).
//!
//! Key behaviors
//! -------------
//! - Family selection is an exhaustive match over [`KernelFamily`]; the
//!   "unrecognized family" failure mode does not exist.
//! - Each family declares parameter names, defaults, bounds, and
//!   causality as metadata; causal families are exactly 0 for Δt < 0.
//! - Kernel weights stay finite for any finite Δt; density-shaped
//!   families evaluate in log space.
//!
//! Downstream usage
//! ----------------
//! - The composition engine samples families on its grid and convolves
//!   the sampled curves; single-kernel chains evaluate exactly.
//! - The parameter layer reads `defaults()` and `bounds()` when building
//!   the store, and `check_params` guards configuration boundaries.

pub mod bounds;
pub mod errors;
pub mod family;
pub mod piecewise;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::bounds::BoundType;
pub use self::errors::{KernelError, KernelResult};
pub use self::family::{DIRAC_EPS, KernelFamily};
pub use self::piecewise::KnotGrid;

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::bounds::BoundType;
    pub use super::family::{DIRAC_EPS, KernelFamily};
    pub use super::piecewise::KnotGrid;
}
