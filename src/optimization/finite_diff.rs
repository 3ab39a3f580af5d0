//! Finite-difference gradient helpers with error capture and validation.
//!
//! The `finitediff` closures must return `f64`, so objective errors cannot
//! propagate with `?` from inside them. The helpers here route the first
//! error raised during differencing into a shared cell, return `NaN` from
//! the closure, and convert the captured error back into a real
//! [`FitError`] afterwards. Central differences are tried first; forward
//! differences are the fallback when the central pass fails validation.
use crate::optimization::errors::{FitError, FitResult};
use finitediff::FiniteDiff;
use ndarray::Array1;
use std::cell::RefCell;

/// Validate a gradient's shape and finiteness.
///
/// # Errors
/// - [`FitError::GradientDimMismatch`] when `grad.len() != dim`.
/// - [`FitError::NonFiniteGradient`] at the first NaN/±inf entry.
pub fn validate_grad(grad: &Array1<f64>, dim: usize) -> FitResult<()> {
    if grad.len() != dim {
        return Err(FitError::GradientDimMismatch { expected: dim, actual: grad.len() });
    }
    for (index, &value) in grad.iter().enumerate() {
        if !value.is_finite() {
            return Err(FitError::NonFiniteGradient { index, value });
        }
    }
    Ok(())
}

/// Finite-difference gradient of a scalar function at `theta`.
///
/// Tries a central difference first; if any evaluation inside the closure
/// failed or the result fails [`validate_grad`], retries once with forward
/// differences before giving up.
///
/// `func` is the *cost* closure (already sign-flipped by the caller); it
/// must record its first failure in `captured` and return `NaN`.
pub fn fd_gradient<G>(
    theta: &Array1<f64>, func: &G, captured: &RefCell<Option<FitError>>,
) -> FitResult<Array1<f64>>
where
    G: Fn(&Array1<f64>) -> f64,
{
    let dim = theta.len();

    captured.borrow_mut().take();
    let grad = theta.central_diff(func);
    if captured.borrow().is_none() && validate_grad(&grad, dim).is_ok() {
        return Ok(grad);
    }

    // Central pass failed somewhere near the evaluation point; a one-sided
    // stencil may stay inside the feasible region.
    captured.borrow_mut().take();
    let grad = theta.forward_diff(func);
    if let Some(err) = captured.borrow_mut().take() {
        return Err(err);
    }
    validate_grad(&grad, dim)?;
    Ok(grad)
}
