//! Fixed + random decomposition of learned quantities.
//!
//! Purpose
//! -------
//! Implement the hierarchical-effects contract: for any quantity,
//!
//! ```text
//! final_value = fixed_value + Σ_g random_offset[g][level(obs, g)]
//! ```
//!
//! where each grouping factor's per-level offsets are **mean-centered
//! across levels before being gathered**, so the expected contribution of
//! a level is zero and an unseen ("overall") level contributes exactly
//! zero. Mean-centering is an explicit step ([`centered_offsets`]), not
//! fused into kernel evaluation.
//!
//! Key behaviors
//! -------------
//! - Two estimation regimes, selectable per model and orthogonal to the
//!   composition logic:
//!   - **Point**: tensors are trained directly; realization is the
//!     identity.
//!   - **Distributional**: each tensor is a location + raw-scale pair;
//!     realization either takes the posterior mean or draws
//!     `loc + softplus(raw_scale)·ε` with a caller-seeded RNG, and the
//!     quantity contributes a closed-form Gaussian KL penalty to the
//!     objective.
//! - Bound transforms apply uniformly *after* the raw sum, so random
//!   offsets live in unconstrained space and the constrained result always
//!   lands in its domain.
//!
//! Conventions
//! -----------
//! - Tensors are `(rows × width)`: the fixed part has one row, a random
//!   term has one row per level of its factor.
//! - Realization happens once per forward pass; gathering per observation
//!   works on the realized snapshot ([`RealizedQuantity`]).
use crate::kernels::bounds::BoundType;
use crate::optimization::numerics::safe_softplus;
use crate::params::errors::{ParamError, ParamResult};
use ndarray::{Array1, Array2, Axis};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use statrs::distribution::Normal;

/// Estimation regime for every quantity in a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regime {
    /// Tensors are trained directly; no penalty, no sampling.
    Point,
    /// Tensors are Gaussian posteriors with a learned scale and a
    /// zero-mean Gaussian prior of the given standard deviation.
    Distributional { prior_sd: f64 },
}

/// How to realize tensors for one forward pass.
pub enum Realize<'a> {
    /// Posterior mean (or the point value).
    Mean,
    /// One posterior draw per tensor, using the caller's seeded RNG.
    Sample(&'a mut StdRng),
}

/// One learned tensor: a location and, under the distributional regime, a
/// raw (unconstrained) scale mapped through softplus.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    pub loc: Array2<f64>,
    pub raw_scale: Option<Array2<f64>>,
}

/// Initial raw scale, chosen so the initial posterior sd
/// `softplus(-3) ≈ 0.049` starts narrow.
const INIT_RAW_SCALE: f64 = -3.0;

impl ParamTensor {
    /// Point-regime tensor holding `loc`.
    pub fn point(loc: Array2<f64>) -> Self {
        ParamTensor { loc, raw_scale: None }
    }

    /// Distributional-regime tensor centered at `loc` with a narrow
    /// initial scale.
    pub fn distributional(loc: Array2<f64>) -> Self {
        let raw_scale = Array2::from_elem(loc.raw_dim(), INIT_RAW_SCALE);
        ParamTensor { loc, raw_scale: Some(raw_scale) }
    }

    /// Realize this tensor: the location itself, or one Gaussian draw per
    /// element under [`Realize::Sample`].
    pub fn realize(&self, mode: &mut Realize<'_>) -> Array2<f64> {
        match (mode, &self.raw_scale) {
            (Realize::Sample(rng), Some(raw_scale)) => {
                let std_normal =
                    Normal::new(0.0, 1.0).expect("unit normal parameters are valid");
                let mut draw = self.loc.clone();
                for (value, &raw) in draw.iter_mut().zip(raw_scale.iter()) {
                    *value += safe_softplus(raw) * std_normal.sample(rng);
                }
                draw
            }
            _ => self.loc.clone(),
        }
    }

    /// Closed-form KL divergence from the posterior `N(loc, sd²)` to the
    /// prior `N(0, prior_sd²)`, summed over elements. Zero for point
    /// tensors.
    pub fn kl_penalty(&self, prior_sd: f64) -> f64 {
        let raw_scale = match &self.raw_scale {
            Some(s) => s,
            None => return 0.0,
        };
        let prior_var = prior_sd * prior_sd;
        self.loc
            .iter()
            .zip(raw_scale.iter())
            .map(|(&mu, &raw)| {
                let sd = safe_softplus(raw);
                let var = sd * sd;
                0.5 * ((prior_var / var).ln() + (var + mu * mu) / prior_var - 1.0)
            })
            .sum()
    }

    /// Total packed element count (loc plus raw scale when present).
    pub fn n_packed(&self) -> usize {
        self.loc.len() + self.raw_scale.as_ref().map_or(0, |s| s.len())
    }
}

/// Subtract each column's mean across levels (axis 0).
///
/// This is the explicit mean-centering step of the hierarchical contract:
/// applied to realized offsets immediately before gathering, it guarantees
/// `Σ_levels offset ≈ 0` per column under both regimes.
pub fn centered_offsets(offsets: &Array2<f64>) -> Array2<f64> {
    match offsets.mean_axis(Axis(0)) {
        Some(means) => offsets - &means.insert_axis(Axis(0)),
        None => offsets.clone(),
    }
}

/// Random term of one quantity: per-level offsets for one grouping factor.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomTerm {
    /// Grouping-factor name.
    pub factor: String,
    /// `(n_levels × width)` offsets in unconstrained space.
    pub tensor: ParamTensor,
}

/// One learned quantity: fixed part, random terms, and per-column bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamQuantity {
    /// `(1 × width)` fixed part, unconstrained.
    pub fixed: ParamTensor,
    /// Random terms, one per grouping factor this quantity varies by.
    pub random: Vec<RandomTerm>,
    /// Bound per column, applied after the raw sum.
    pub bounds: Vec<BoundType>,
}

impl ParamQuantity {
    /// Build a quantity from *constrained* initial values, storing the
    /// unconstrained pre-image.
    ///
    /// # Errors
    /// - [`ParamError::LengthMismatch`] when `init.len() != bounds.len()`.
    /// - [`ParamError::Kernel`] when an initial value is outside its bound.
    pub fn from_constrained(
        key_display: &str, init: &[f64], bounds: Vec<BoundType>, regime: Regime,
    ) -> ParamResult<Self> {
        if init.len() != bounds.len() {
            return Err(ParamError::LengthMismatch {
                key: key_display.to_string(),
                expected: bounds.len(),
                actual: init.len(),
            });
        }
        let mut raw = Array2::zeros((1, init.len()));
        for (i, (&value, bound)) in init.iter().zip(&bounds).enumerate() {
            raw[(0, i)] = bound.unconstrain(value)?;
        }
        let fixed = match regime {
            Regime::Point => ParamTensor::point(raw),
            Regime::Distributional { .. } => ParamTensor::distributional(raw),
        };
        Ok(ParamQuantity { fixed, random: Vec::new(), bounds })
    }

    /// Attach a zero-initialized random term for one grouping factor.
    pub fn with_random(mut self, factor: impl Into<String>, n_levels: usize, regime: Regime) -> Self {
        let zeros = Array2::zeros((n_levels, self.width()));
        let tensor = match regime {
            Regime::Point => ParamTensor::point(zeros),
            Regime::Distributional { .. } => ParamTensor::distributional(zeros),
        };
        self.random.push(RandomTerm { factor: factor.into(), tensor });
        self
    }

    /// Number of scalar columns in this quantity.
    pub fn width(&self) -> usize {
        self.bounds.len()
    }

    /// Packed element count across fixed and random tensors.
    pub fn n_packed(&self) -> usize {
        self.fixed.n_packed() + self.random.iter().map(|r| r.tensor.n_packed()).sum::<usize>()
    }

    /// KL penalty of every tensor in this quantity under the given prior.
    pub fn kl_penalty(&self, prior_sd: f64) -> f64 {
        self.fixed.kl_penalty(prior_sd)
            + self.random.iter().map(|r| r.tensor.kl_penalty(prior_sd)).sum::<f64>()
    }

    /// Realize all tensors for one forward pass, centering each random
    /// term's offsets across levels.
    pub fn realize(&self, mode: &mut Realize<'_>) -> RealizedQuantity {
        let fixed = self.fixed.realize(mode).row(0).to_owned();
        let random = self
            .random
            .iter()
            .map(|term| (term.factor.clone(), centered_offsets(&term.tensor.realize(mode))))
            .collect();
        RealizedQuantity { fixed, random, bounds: self.bounds.clone() }
    }
}

/// Per-pass snapshot of one quantity: realized fixed row and centered
/// random offsets, ready for per-observation gathering.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedQuantity {
    fixed: Array1<f64>,
    random: Vec<(String, Array2<f64>)>,
    bounds: Vec<BoundType>,
}

impl RealizedQuantity {
    /// Raw (unconstrained) value for one observation, given its resolved
    /// level per factor. A factor missing from `levels`, or an overall
    /// (`None`) level, contributes zero.
    ///
    /// # Errors
    /// [`ParamError::LevelOutOfRange`] when a resolved index exceeds the
    /// term's level count.
    pub fn raw_for(&self, levels: &[(&str, Option<usize>)]) -> ParamResult<Array1<f64>> {
        let mut value = self.fixed.clone();
        for (factor, offsets) in &self.random {
            let resolved = levels.iter().find(|(name, _)| name == factor);
            if let Some((_, Some(level))) = resolved {
                if *level >= offsets.nrows() {
                    return Err(ParamError::LevelOutOfRange {
                        factor: factor.clone(),
                        level: *level,
                        n_levels: offsets.nrows(),
                    });
                }
                value = value + offsets.row(*level);
            }
        }
        Ok(value)
    }

    /// Constrained value for one observation: the raw sum mapped through
    /// each column's bound.
    pub fn value_for(&self, levels: &[(&str, Option<usize>)]) -> ParamResult<Array1<f64>> {
        let mut raw = self.raw_for(levels)?;
        for (value, bound) in raw.iter_mut().zip(&self.bounds) {
            *value = bound.constrain(*value);
        }
        Ok(raw)
    }

    /// Centered offsets for one factor, if this quantity varies by it.
    pub fn offsets(&self, factor: &str) -> Option<&Array2<f64>> {
        self.random.iter().find(|(name, _)| name == factor).map(|(_, o)| o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    fn quantity_with_random(regime: Regime) -> ParamQuantity {
        let mut q = ParamQuantity::from_constrained(
            "coefficient/rt/c",
            &[0.5],
            vec![BoundType::Free],
            regime,
        )
        .unwrap()
        .with_random("subject", 4, regime);
        // Give the offsets some structure so centering has work to do.
        q.random[0].tensor.loc = array![[1.0], [2.0], [3.0], [4.0]];
        q
    }

    #[test]
    // Purpose
    // -------
    // Centered offsets sum to ≈ 0 per column under both regimes.
    fn centered_offsets_sum_to_zero_in_both_regimes() {
        for regime in [Regime::Point, Regime::Distributional { prior_sd: 1.0 }] {
            let quantity = quantity_with_random(regime);

            let mean_pass = quantity.realize(&mut Realize::Mean);
            let offsets = mean_pass.offsets("subject").unwrap();
            assert_relative_eq!(offsets.sum(), 0.0, epsilon = 1e-12);

            let mut rng = StdRng::seed_from_u64(7);
            let sample_pass = quantity.realize(&mut Realize::Sample(&mut rng));
            let offsets = sample_pass.offsets("subject").unwrap();
            assert_relative_eq!(offsets.sum(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    // Purpose
    // -------
    // An unresolved (overall) level gathers a zero offset, reducing to
    // the fixed effect alone.
    fn overall_level_reduces_to_fixed_effect() {
        let quantity = quantity_with_random(Regime::Point);
        let realized = quantity.realize(&mut Realize::Mean);

        let fixed_only = realized.raw_for(&[("subject", None)]).unwrap();
        assert_relative_eq!(fixed_only[0], 0.5, epsilon = 1e-12);

        let with_level = realized.raw_for(&[("subject", Some(3))]).unwrap();
        assert_relative_eq!(with_level[0], 0.5 + 1.5, epsilon = 1e-12);
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        let quantity = quantity_with_random(Regime::Point);
        let realized = quantity.realize(&mut Realize::Mean);
        assert!(matches!(
            realized.raw_for(&[("subject", Some(9))]),
            Err(ParamError::LevelOutOfRange { level: 9, n_levels: 4, .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Bounded quantities round-trip their constrained defaults and stay
    // in-domain after random offsets push the raw value around.
    fn bounds_apply_after_raw_sum() {
        let quantity = ParamQuantity::from_constrained(
            "kernel/rt/t1[0]",
            &[1.0],
            vec![BoundType::Lower { min: 0.0 }],
            Regime::Point,
        )
        .unwrap()
        .with_random("subject", 2, Regime::Point);
        let realized = quantity.realize(&mut Realize::Mean);

        let value = realized.value_for(&[("subject", None)]).unwrap();
        assert_relative_eq!(value[0], 1.0, max_relative = 1e-9);

        let mut shifted = quantity.clone();
        shifted.random[0].tensor.loc = array![[-50.0], [50.0]];
        let realized = shifted.realize(&mut Realize::Mean);
        let value = realized.value_for(&[("subject", Some(0))]).unwrap();
        assert!(value[0] > 0.0, "lower bound must hold after offsets");
    }

    #[test]
    // Purpose
    // -------
    // The KL penalty is zero for point tensors, positive for a
    // distributional tensor displaced from the prior, and shrinks as the
    // posterior approaches it.
    fn kl_penalty_behaves() {
        let point = ParamTensor::point(array![[2.0]]);
        assert_eq!(point.kl_penalty(1.0), 0.0);

        let displaced = ParamTensor::distributional(array![[2.0]]);
        let near = ParamTensor::distributional(array![[0.1]]);
        assert!(displaced.kl_penalty(1.0) > near.kl_penalty(1.0));
        assert!(near.kl_penalty(1.0) > 0.0);
    }
}
