//! IRF kernel families — closed enum over parametric and learned kernels.
//!
//! Purpose
//! -------
//! Define the closed set of impulse-response kernel families and their
//! evaluation. Each family is a pure mapping `params → (Δt → weight)` and
//! declares its own metadata: parameter names, defaults, bound types, and
//! causality. Family selection is an exhaustive match — an unrecognized
//! family is unrepresentable.
//!
//! Key behaviors
//! -------------
//! - Causal families ([`Exp`](KernelFamily::Exp),
//!   [`Gamma`](KernelFamily::Gamma),
//!   [`ShiftedGamma`](KernelFamily::ShiftedGamma),
//!   [`PiecewiseLinear`](KernelFamily::PiecewiseLinear)) are exactly 0 for
//!   Δt < 0.
//! - The Dirac delta returns 1 for |Δt| < [`DIRAC_EPS`], else 0; it is the
//!   degenerate "no smoothing" kernel of a zero-length chain.
//! - Density-shaped families evaluate in log space and exponentiate at the
//!   end, so weights stay finite for any finite Δt.
//!
//! Conventions
//! -----------
//! - `evaluate` assumes *constrained* parameters of the correct arity;
//!   [`KernelFamily::check_params`] is the validating entry point used at
//!   configuration boundaries.
//! - Gamma-shaped kernels are evaluated at `Δt + ε` (ε = 1e-8) so shapes
//!   with α < 1 stay finite at Δt = 0.
use crate::kernels::{
    bounds::BoundType,
    errors::{KernelError, KernelResult},
    piecewise::KnotGrid,
};
use crate::optimization::numerics::ln_normal_cdf;
use ndarray::{ArrayView1, ArrayViewMut1, Zip};
use statrs::function::gamma::ln_gamma;

/// Half-width of the Dirac delta's unit window.
pub const DIRAC_EPS: f64 = 1e-8;

/// Offset added to Δt inside gamma-shaped kernels to keep α < 1 finite at
/// zero.
const GAMMA_DT_EPS: f64 = 1e-8;

const LN_SQRT_2PI: f64 = 0.9189385332046727;

/// Closed set of IRF kernel families.
///
/// Chain semantics: a terminal's chain of length 0 is the Dirac delta; a
/// chain of length ≥ 1 is evaluated (and, for length ≥ 2, composed) from
/// these families in declared order.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelFamily {
    /// Degenerate identity kernel: 1 for |Δt| < ε, else 0.
    DiracDelta,
    /// `β·exp(−β·Δt)` for Δt ≥ 0. Parameter: `beta > 0`.
    Exp,
    /// Gamma(α, β) density in Δt. Parameters: `alpha, beta > 0`.
    Gamma,
    /// Gamma(α, β) density in Δt − δ with δ < 0, allowing support to start
    /// before the impulse. Parameters: `alpha, beta > 0`, `delta < 0`.
    ShiftedGamma,
    /// Gaussian density in Δt. Parameters: `mu` free, `sigma > 0`.
    Normal,
    /// Skew-normal density in Δt. Parameters: `mu` free, `sigma > 0`,
    /// `alpha` free.
    SkewNormal,
    /// Exponentially-modified-Gaussian density in Δt. Parameters: `mu`
    /// free, `sigma > 0`, `beta > 0` (rate of the exponential stage).
    ExpModGauss,
    /// Learned piecewise-linear curve over a fixed knot grid; one learned
    /// ordinate per knot. Causal, zero past the last knot.
    PiecewiseLinear { grid: KnotGrid },
}

impl KernelFamily {
    /// Stable family name used in errors and parameter keys.
    pub fn name(&self) -> &'static str {
        match self {
            KernelFamily::DiracDelta => "dirac",
            KernelFamily::Exp => "exp",
            KernelFamily::Gamma => "gamma",
            KernelFamily::ShiftedGamma => "shifted_gamma",
            KernelFamily::Normal => "normal",
            KernelFamily::SkewNormal => "skew_normal",
            KernelFamily::ExpModGauss => "exp_mod_gauss",
            KernelFamily::PiecewiseLinear { .. } => "piecewise_linear",
        }
    }

    /// Number of learned parameters.
    pub fn param_count(&self) -> usize {
        match self {
            KernelFamily::DiracDelta => 0,
            KernelFamily::Exp => 1,
            KernelFamily::Gamma => 2,
            KernelFamily::ShiftedGamma => 3,
            KernelFamily::Normal => 2,
            KernelFamily::SkewNormal | KernelFamily::ExpModGauss => 3,
            KernelFamily::PiecewiseLinear { grid } => grid.len(),
        }
    }

    /// Parameter names, in vector order.
    pub fn param_names(&self) -> Vec<String> {
        match self {
            KernelFamily::DiracDelta => vec![],
            KernelFamily::Exp => vec!["beta".to_string()],
            KernelFamily::Gamma => vec!["alpha".to_string(), "beta".to_string()],
            KernelFamily::ShiftedGamma => {
                vec!["alpha".to_string(), "beta".to_string(), "delta".to_string()]
            }
            KernelFamily::Normal => vec!["mu".to_string(), "sigma".to_string()],
            KernelFamily::SkewNormal => {
                vec!["mu".to_string(), "sigma".to_string(), "alpha".to_string()]
            }
            KernelFamily::ExpModGauss => {
                vec!["mu".to_string(), "sigma".to_string(), "beta".to_string()]
            }
            KernelFamily::PiecewiseLinear { grid } => {
                (0..grid.len()).map(|i| format!("y{i}")).collect()
            }
        }
    }

    /// Default constrained parameter values.
    pub fn defaults(&self) -> Vec<f64> {
        match self {
            KernelFamily::DiracDelta => vec![],
            KernelFamily::Exp => vec![1.0],
            KernelFamily::Gamma => vec![2.0, 1.0],
            KernelFamily::ShiftedGamma => vec![2.0, 1.0, -0.5],
            KernelFamily::Normal => vec![0.0, 1.0],
            KernelFamily::SkewNormal => vec![0.0, 1.0, 0.0],
            KernelFamily::ExpModGauss => vec![0.0, 1.0, 1.0],
            KernelFamily::PiecewiseLinear { grid } => vec![1.0; grid.len()],
        }
    }

    /// Bound type per parameter (family metadata, not per-instance
    /// configuration).
    pub fn bounds(&self) -> Vec<BoundType> {
        match self {
            KernelFamily::DiracDelta => vec![],
            KernelFamily::Exp => vec![BoundType::Lower { min: 0.0 }],
            KernelFamily::Gamma => {
                vec![BoundType::Lower { min: 0.0 }, BoundType::Lower { min: 0.0 }]
            }
            KernelFamily::ShiftedGamma => vec![
                BoundType::Lower { min: 0.0 },
                BoundType::Lower { min: 0.0 },
                BoundType::Upper { max: 0.0 },
            ],
            KernelFamily::Normal => vec![BoundType::Free, BoundType::Lower { min: 0.0 }],
            KernelFamily::SkewNormal => {
                vec![BoundType::Free, BoundType::Lower { min: 0.0 }, BoundType::Free]
            }
            KernelFamily::ExpModGauss => vec![
                BoundType::Free,
                BoundType::Lower { min: 0.0 },
                BoundType::Lower { min: 0.0 },
            ],
            KernelFamily::PiecewiseLinear { grid } => vec![BoundType::Free; grid.len()],
        }
    }

    /// Whether the family is exactly 0 for Δt < 0.
    ///
    /// The Dirac delta counts as causal for configuration purposes: its
    /// support extends only [`DIRAC_EPS`] before zero.
    pub fn is_causal(&self) -> bool {
        matches!(
            self,
            KernelFamily::DiracDelta
                | KernelFamily::Exp
                | KernelFamily::Gamma
                | KernelFamily::ShiftedGamma
                | KernelFamily::PiecewiseLinear { .. }
        )
    }

    /// Validate a constrained parameter vector against this family's arity
    /// and bounds.
    ///
    /// # Errors
    /// - [`KernelError::ParamCountMismatch`] on wrong arity.
    /// - [`KernelError::InvalidParam`] naming the first parameter outside
    ///   its bound (or non-finite).
    pub fn check_params(&self, params: &[f64]) -> KernelResult<()> {
        let expected = self.param_count();
        if params.len() != expected {
            return Err(KernelError::ParamCountMismatch {
                family: self.name(),
                expected,
                actual: params.len(),
            });
        }
        let names = self.param_names();
        for ((bound, &value), name) in self.bounds().iter().zip(params).zip(names) {
            if !bound.contains(value) {
                return Err(KernelError::InvalidParam { family: self.name(), name, value });
            }
        }
        Ok(())
    }

    /// Evaluate the kernel at one offset.
    ///
    /// Assumes `params` is constrained and of the correct arity (validated
    /// upstream via [`check_params`](KernelFamily::check_params)); the
    /// output is finite for any finite `dt`.
    pub fn evaluate(&self, dt: f64, params: &[f64]) -> f64 {
        match self {
            KernelFamily::DiracDelta => {
                if dt.abs() < DIRAC_EPS { 1.0 } else { 0.0 }
            }
            KernelFamily::Exp => {
                let beta = params[0];
                if dt < 0.0 { 0.0 } else { beta * (-beta * dt).exp() }
            }
            KernelFamily::Gamma => {
                if dt < 0.0 {
                    0.0
                } else {
                    gamma_ln_pdf(dt + GAMMA_DT_EPS, params[0], params[1]).exp()
                }
            }
            KernelFamily::ShiftedGamma => {
                let (alpha, beta, delta) = (params[0], params[1], params[2]);
                let x = dt - delta;
                if dt < 0.0 || x <= 0.0 {
                    0.0
                } else {
                    gamma_ln_pdf(x + GAMMA_DT_EPS, alpha, beta).exp()
                }
            }
            KernelFamily::Normal => {
                let (mu, sigma) = (params[0], params[1]);
                let z = (dt - mu) / sigma;
                (-0.5 * z * z - sigma.ln() - LN_SQRT_2PI).exp()
            }
            KernelFamily::SkewNormal => {
                let (mu, sigma, alpha) = (params[0], params[1], params[2]);
                let z = (dt - mu) / sigma;
                let ln_phi = -0.5 * z * z - sigma.ln() - LN_SQRT_2PI;
                (std::f64::consts::LN_2 + ln_phi + ln_normal_cdf(alpha * z)).exp()
            }
            KernelFamily::ExpModGauss => emg_pdf(dt, params[0], params[1], params[2]),
            KernelFamily::PiecewiseLinear { grid } => grid.interpolate(dt, params),
        }
    }

    /// Vectorized evaluation into a preallocated output view.
    pub fn evaluate_into(
        &self, dts: ArrayView1<'_, f64>, params: &[f64], mut out: ArrayViewMut1<'_, f64>,
    ) {
        Zip::from(&mut out).and(&dts).for_each(|w, &dt| *w = self.evaluate(dt, params));
    }
}

/// Log-density of Gamma(α, β) at `x > 0`, via log-gamma for stability.
fn gamma_ln_pdf(x: f64, alpha: f64, beta: f64) -> f64 {
    alpha * beta.ln() + (alpha - 1.0) * x.ln() - beta * x - ln_gamma(alpha)
}

/// Exponentially-modified-Gaussian density, evaluated in log space.
///
/// `f(t) = (β/2)·exp((β/2)(2μ + βσ² − 2t))·erfc((μ + βσ² − t)/(√2 σ))`,
/// computed as `exp(ln(β/2) + (β/2)(…) + ln_erfc(…))` so the
/// erfc-underflow tail cancels against the exponential overflow instead of
/// producing `0 × ∞`.
pub(crate) fn emg_pdf(t: f64, mu: f64, sigma: f64, beta: f64) -> f64 {
    emg_ln_pdf(t, mu, sigma, beta).exp()
}

pub(crate) fn emg_ln_pdf(t: f64, mu: f64, sigma: f64, beta: f64) -> f64 {
    use crate::optimization::numerics::ln_erfc;
    let half_beta = 0.5 * beta;
    let z = (mu + beta * sigma * sigma - t) / (std::f64::consts::SQRT_2 * sigma);
    half_beta.ln() + half_beta * (2.0 * mu + beta * sigma * sigma - 2.0 * t) + ln_erfc(z)
}
