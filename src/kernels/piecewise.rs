//! Knot grids for the learned piecewise-linear kernel family.
//!
//! A [`KnotGrid`] fixes the abscissae of a nonparametric IRF once at model
//! construction; the ordinates are the learned parameters. Evaluation is
//! linear interpolation between adjacent knots, zero for negative Δt
//! (the family is causal), and zero past the last knot.
use crate::kernels::errors::{KernelError, KernelResult};

/// Fixed, validated knot abscissae for one piecewise-linear kernel.
///
/// Invariants enforced at construction:
/// - at least two knots,
/// - first knot exactly at 0,
/// - strictly ascending, finite positions.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotGrid {
    positions: Vec<f64>,
}

impl KnotGrid {
    /// Construct a validated knot grid.
    ///
    /// # Errors
    /// [`KernelError::InvalidKnots`] naming the first offending knot when
    /// the grid is too short, does not start at 0, or is not strictly
    /// ascending and finite.
    pub fn new(positions: Vec<f64>) -> KernelResult<Self> {
        if positions.len() < 2 {
            return Err(KernelError::InvalidKnots {
                reason: "at least two knots required",
                index: 0,
                value: positions.first().copied().unwrap_or(f64::NAN),
            });
        }
        if positions[0] != 0.0 {
            return Err(KernelError::InvalidKnots {
                reason: "first knot must sit at 0",
                index: 0,
                value: positions[0],
            });
        }
        for (index, window) in positions.windows(2).enumerate() {
            if !window[1].is_finite() || window[1] <= window[0] {
                return Err(KernelError::InvalidKnots {
                    reason: "knots must be strictly ascending and finite",
                    index: index + 1,
                    value: window[1],
                });
            }
        }
        Ok(KnotGrid { positions })
    }

    /// Evenly spaced grid over `[0, support]` with `n` knots.
    pub fn uniform(support: f64, n: usize) -> KernelResult<Self> {
        if !(support.is_finite() && support > 0.0) {
            return Err(KernelError::InvalidKnots {
                reason: "support must be finite and > 0",
                index: 0,
                value: support,
            });
        }
        let step = support / (n.max(2) - 1) as f64;
        KnotGrid::new((0..n.max(2)).map(|i| i as f64 * step).collect())
    }

    /// Number of knots, equal to the family's learned-parameter arity.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always false: construction requires at least two knots.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Knot abscissae.
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// Interpolate the curve defined by `values` (one ordinate per knot)
    /// at offset `dt`.
    ///
    /// Returns 0 for `dt < 0` and for `dt` past the last knot. Knot
    /// abscissae reproduce their ordinates exactly.
    pub fn interpolate(&self, dt: f64, values: &[f64]) -> f64 {
        debug_assert_eq!(values.len(), self.positions.len());
        if dt < 0.0 || dt > *self.positions.last().expect("grid has >= 2 knots") {
            return 0.0;
        }
        // Index of the right edge of the bracketing segment.
        let hi = match self.positions.iter().position(|&p| p >= dt) {
            Some(0) => return values[0],
            Some(hi) => hi,
            None => return 0.0,
        };
        let lo = hi - 1;
        let span = self.positions[hi] - self.positions[lo];
        let frac = (dt - self.positions[lo]) / span;
        values[lo] + frac * (values[hi] - values[lo])
    }
}
