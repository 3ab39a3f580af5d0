//! Numerical stability utilities.
//!
//! Provides safe implementations of common nonlinear transforms
//! that are prone to overflow/underflow in naïve form.
//! The functions here follow guarded strategies similar to those
//! in major ML libraries, using explicit cutoffs (`x > 20.0`) to keep
//! `f64` arithmetic in a well-conditioned regime.
//!
//! # Provided items
//! - [`GENERAL_TOL`]: generic tolerance for "numerically zero" checks.
//! - [`LOGIT_EPS`]: clamp floor applied before taking logs of probabilities.
//! - [`safe_softplus(x)`] / [`safe_softplus_inv(x)`]: stable
//!   `ln(1 + exp(x))` and its inverse, mapping ℝ ↔ (0, ∞).
//! - [`safe_logistic(x)`] / [`safe_logit(p)`]: stable sigmoid and its
//!   inverse, mapping ℝ ↔ (0, 1).
//! - [`ln_erfc(z)`] / [`ln_normal_cdf(z)`]: log-space tail functions that
//!   stay finite where the plain `erfc`/Φ underflow to 0.
//!
//! # Rationale
//! These transforms are the building blocks of every bound transform in the
//! kernel and distribution layers: one-sided bounds ride on the softplus
//! pair, interval bounds on the logistic pair. The log-tail functions back
//! the skew-normal and exponentially-modified-Gaussian densities, whose
//! naïve forms vanish many standard deviations into a tail.
use statrs::function::erf::erfc;

/// Generic tolerance for treating a magnitude as numerically zero.
pub const GENERAL_TOL: f64 = 1e-12;

/// Floor applied to probabilities before logs to avoid `ln(0)`.
pub const LOGIT_EPS: f64 = 1e-12;

/// Numerically stable softplus: `softplus(x) = ln(1 + exp(x))`.
///
/// Computes softplus without overflow for large positive `x` and
/// with good precision for large negative `x`:
///
/// - For sufficiently large `x`, `softplus(x) ≈ x`.
/// - Otherwise, it falls back to `ln1p(exp(x))`.
///
/// The cutoff (`x > 20.0`) keeps the calculation in a well-conditioned
/// regime for `f64`.
pub fn safe_softplus(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

/// Stable inverse of softplus on `(0, ∞)`: solves for `t` in
/// `softplus(t) = x`, returning `t = ln(exp(x) - 1)`.
///
/// Mirrors the guarded strategy of [`safe_softplus`]:
///
/// - For sufficiently large `x`, `ln(exp(x) - 1) ≈ x`.
/// - Otherwise, it uses `ln(expm1(x))`.
///
/// The input must be finite and `> 0`.
pub fn safe_softplus_inv(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp_m1().ln() }
}

/// Numerically stable logistic sigmoid `σ(x) = 1 / (1 + exp(-x))`.
///
/// Splits on the sign of `x` so that `exp` is only ever called on a
/// non-positive argument, avoiding overflow in either tail.
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Stable inverse of the logistic sigmoid on `(0, 1)`:
/// `logit(p) = ln(p / (1 - p))`.
///
/// Clamps `p` into `[LOGIT_EPS, 1 - LOGIT_EPS]` before taking logs so
/// boundary values produce large finite outputs instead of ±∞.
pub fn safe_logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS);
    (p / (1.0 - p)).ln()
}

/// Cutoff above which `erfc(z)` underflows and the asymptotic expansion
/// takes over.
const ERFC_ASYMPTOTIC_CUTOFF: f64 = 25.0;

/// Log of the complementary error function, finite for all finite `z`.
///
/// For `z ≤ 25` delegates to `statrs`' `erfc` and takes the log directly.
/// Beyond that, `erfc(z)` underflows, so the first-order asymptotic
/// expansion `erfc(z) ≈ exp(-z²) / (z√π)` is used in log space.
pub fn ln_erfc(z: f64) -> f64 {
    if z <= ERFC_ASYMPTOTIC_CUTOFF {
        erfc(z).ln()
    } else {
        -z * z - z.ln() - 0.5 * std::f64::consts::PI.ln()
    }
}

/// Log of the standard normal CDF, finite for all finite `z`.
///
/// Uses `Φ(z) = erfc(-z/√2) / 2`, routed through [`ln_erfc`] so the deep
/// left tail stays finite.
pub fn ln_normal_cdf(z: f64) -> f64 {
    ln_erfc(-z / std::f64::consts::SQRT_2) - std::f64::consts::LN_2
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    // Purpose
    // -------
    // Softplus and its inverse round-trip on a grid spanning both the
    // guarded (large-x) and naïve regimes.
    fn softplus_round_trips() {
        for &x in &[-30.0, -5.0, -0.5, 0.0, 0.5, 5.0, 25.0, 100.0] {
            let y = safe_softplus(x);
            assert!(y > 0.0);
            assert_relative_eq!(safe_softplus_inv(y), x, max_relative = 1e-9);
        }
    }

    #[test]
    // Purpose
    // -------
    // Logistic and logit round-trip in the open interval and stay finite
    // at extreme inputs.
    fn logistic_round_trips_and_stays_finite() {
        for &x in &[-40.0, -3.0, 0.0, 3.0, 40.0] {
            let p = safe_logistic(x);
            assert!(p.is_finite() && p > 0.0 && p < 1.0);
        }
        for &p in &[0.01, 0.25, 0.5, 0.75, 0.99] {
            assert_relative_eq!(safe_logistic(safe_logit(p)), p, max_relative = 1e-12);
        }
    }

    #[test]
    // Purpose
    // -------
    // The logit clamp keeps boundary probabilities finite.
    fn logit_clamps_boundaries() {
        assert!(safe_logit(0.0).is_finite());
        assert!(safe_logit(1.0).is_finite());
    }

    #[test]
    // Purpose
    // -------
    // `ln_erfc` agrees with the direct computation where `erfc` is
    // representable and stays finite deep into the tail.
    fn ln_erfc_matches_direct_and_stays_finite() {
        use statrs::function::erf::erfc;
        for &z in &[-2.0, 0.0, 1.0, 5.0, 20.0] {
            assert_relative_eq!(ln_erfc(z), erfc(z).ln(), max_relative = 1e-10);
        }
        assert!(ln_erfc(40.0).is_finite());
        assert!(ln_erfc(40.0) < ln_erfc(30.0));
    }

    #[test]
    // Purpose
    // -------
    // `ln_normal_cdf` matches ln(Φ) in the bulk and is finite far left.
    fn ln_normal_cdf_matches_bulk() {
        assert_relative_eq!(ln_normal_cdf(0.0), 0.5f64.ln(), max_relative = 1e-12);
        assert_relative_eq!(ln_normal_cdf(1.0), 0.8413447460685429f64.ln(), max_relative = 1e-9);
        assert!(ln_normal_cdf(-45.0).is_finite());
    }
}
