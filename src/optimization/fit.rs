//! Argmin-backed maximization of a user-provided objective.
//!
//! Purpose
//! -------
//! Provide the high-level fitting surface for this crate: callers implement
//! [`Objective`] for their model and invoke [`maximize`] to run L-BFGS with
//! a configurable line search, tolerances, and a finite-difference gradient
//! fallback.
//!
//! Key behaviors
//! -------------
//! - Convert a *maximization* of `ℓ(θ)` into a *minimization* of the cost
//!   `c(θ) = -ℓ(θ)` via [`ArgminProblem`]; analytic gradients, when
//!   provided, are negated accordingly.
//! - Validate tolerances and the initial θ before touching the backend.
//! - Normalize solver results into a [`FitOutcome`] so callers never see
//!   raw `argmin` state types.
//!
//! Conventions
//! -----------
//! - Parameters live in an unconstrained optimizer space as [`Theta`]
//!   (`Array1<f64>`); any constrained → unconstrained mapping happens in
//!   the model layer.
//! - `FitOutcome::value` is reported in log-likelihood space (`ℓ(θ̂)`),
//!   not cost space.
use crate::optimization::{
    errors::{FitError, FitResult},
    finite_diff::{fd_gradient, validate_grad},
};
use argmin::{
    core::{CostFunction, Error, Executor, Gradient, State, TerminationStatus},
    solver::{
        linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch},
        quasinewton::LBFGS,
    },
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::str::FromStr;

/// Parameter vector `θ` in unconstrained optimizer space.
pub type Theta = ndarray::Array1<f64>;

/// Gradient vector matching the shape of [`Theta`].
pub type Grad = ndarray::Array1<f64>;

/// Default history size (`m`) for L-BFGS runs.
pub const DEFAULT_LBFGS_MEM: usize = 7;

type HagerZhangLS = HagerZhangLineSearch<Theta, Grad, f64>;
type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, f64>;

/// User-implemented objective interface.
///
/// You maximize `ℓ(θ)`; internally the backend minimizes `c(θ) = -ℓ(θ)`.
/// If you provide an analytic gradient, return the gradient of the
/// *objective* (`∇ℓ(θ)`); the adapter flips the sign.
///
/// - `type Data`: per-model payload carried into `value`/`grad`/`check`.
///
/// Required:
/// - `value(&Theta, &Data) -> FitResult<f64>`: evaluate `ℓ(θ)`.
/// - `check(&Theta, &Data) -> FitResult<()>`: validation hook run once
///   before optimization to reject obviously invalid `θ`/data pairs.
///
/// Optional:
/// - `grad(&Theta, &Data) -> FitResult<Grad>`: analytic gradient. If not
///   implemented, robust finite differences are used automatically.
pub trait Objective {
    type Data;

    fn value(&self, theta: &Theta, data: &Self::Data) -> FitResult<f64>;
    fn check(&self, theta: &Theta, data: &Self::Data) -> FitResult<()>;

    fn grad(&self, _theta: &Theta, _data: &Self::Data) -> FitResult<Grad> {
        Err(FitError::GradientNotImplemented)
    }
}

/// Choice of line search used inside the L-BFGS solver.
///
/// Parses case-insensitively from `"MoreThuente"` / `"HagerZhang"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearch {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearch {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morethuente" => Ok(LineSearch::MoreThuente),
            "hagerzhang" => Ok(LineSearch::HagerZhang),
            _ => Err(FitError::InvalidLineSearch { given: s.to_string() }),
        }
    }
}

/// Stopping criteria for a fit.
///
/// Each tolerance is optional; `None` leaves the backend default in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Gradient-norm tolerance.
    pub tol_grad: Option<f64>,
    /// Cost-change tolerance.
    pub tol_cost: Option<f64>,
    /// Iteration cap.
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// Validated constructor: any provided tolerance must be finite and > 0.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> FitResult<Self> {
        if let Some(t) = tol_grad {
            if !t.is_finite() || t <= 0.0 {
                return Err(FitError::InvalidTolerance { name: "tol_grad", value: t });
            }
        }
        if let Some(t) = tol_cost {
            if !t.is_finite() || t <= 0.0 {
                return Err(FitError::InvalidTolerance { name: "tol_cost", value: t });
            }
        }
        Ok(Tolerances { tol_grad, tol_cost, max_iter })
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances { tol_grad: Some(1e-6), tol_cost: None, max_iter: Some(500) }
    }
}

/// Options for a single [`maximize`] run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Stopping criteria.
    pub tols: Tolerances,
    /// Line search used inside L-BFGS.
    pub line_search: LineSearch,
    /// L-BFGS history size; `None` uses [`DEFAULT_LBFGS_MEM`].
    pub lbfgs_mem: Option<usize>,
    /// Emit per-iteration progress (requires the `obs_slog` feature).
    pub verbose: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            tols: Tolerances::default(),
            line_search: LineSearch::MoreThuente,
            lbfgs_mem: None,
            verbose: false,
        }
    }
}

/// Normalized result of a [`maximize`] run.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Best parameter vector found.
    pub theta_hat: Theta,
    /// Objective value at `theta_hat`, in `ℓ` space.
    pub value: f64,
    /// Backend termination status.
    pub status: TerminationStatus,
    /// Number of solver iterations performed.
    pub iterations: u64,
    /// Backend function-evaluation counters.
    pub func_counts: HashMap<String, u64>,
}

/// Bridges an [`Objective`] to `argmin`'s `CostFunction` and `Gradient`.
///
/// - `cost` returns `-ℓ(θ)`.
/// - `gradient` returns `-∇ℓ(θ)` when analytic, or a finite-difference
///   gradient of the cost (no sign flip needed) otherwise.
pub struct ArgminProblem<'a, F: Objective> {
    f: &'a F,
    data: &'a F::Data,
}

impl<'a, F: Objective> ArgminProblem<'a, F> {
    pub fn new(f: &'a F, data: &'a F::Data) -> Self {
        ArgminProblem { f, data }
    }
}

impl<F: Objective> CostFunction for ArgminProblem<'_, F> {
    type Param = Theta;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let value = self.f.value(theta, self.data)?;
        if !value.is_finite() {
            return Err(FitError::NonFiniteObjective { value }.into());
        }
        Ok(-value)
    }
}

impl<F: Objective> Gradient for ArgminProblem<'_, F> {
    type Param = Theta;
    type Gradient = Grad;

    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let dim = theta.len();
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                validate_grad(&g, dim)?;
                Ok(-g)
            }
            Err(FitError::GradientNotImplemented) => {
                // Differencing the cost directly keeps the sign convention:
                // no flip is needed on the FD result.
                let captured: RefCell<Option<FitError>> = RefCell::new(None);
                let cost_fn = |t: &Theta| match self.f.value(t, self.data) {
                    Ok(v) if v.is_finite() => -v,
                    Ok(v) => {
                        captured
                            .borrow_mut()
                            .get_or_insert(FitError::NonFiniteObjective { value: v });
                        f64::NAN
                    }
                    Err(e) => {
                        captured.borrow_mut().get_or_insert(e);
                        f64::NAN
                    }
                };
                Ok(fd_gradient(theta, &cost_fn, &captured)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Maximize an objective `ℓ(θ)` using L-BFGS with the chosen line search.
///
/// # Behavior
/// - Validates `theta0` (finiteness) and calls `f.check(theta0, data)`.
/// - Wraps `(f, data)` in an [`ArgminProblem`] exposing `c(θ) = -ℓ(θ)`.
/// - Builds an L-BFGS solver with the configured line search, applies
///   tolerances, runs the executor, and normalizes the result.
///
/// # Errors
/// - Propagates `f.check` failures and tolerance misconfiguration.
/// - Propagates backend failures as [`FitError::Backend`].
/// - Returns [`FitError::MissingSolution`] if the solver terminated
///   without producing a parameter vector.
pub fn maximize<F: Objective>(
    f: &F, theta0: Theta, data: &F::Data, opts: &FitOptions,
) -> FitResult<FitOutcome> {
    for (index, &value) in theta0.iter().enumerate() {
        if !value.is_finite() {
            return Err(FitError::NonFiniteTheta { index, value });
        }
    }
    f.check(&theta0, data)?;

    let problem = ArgminProblem::new(f, data);
    match opts.line_search {
        LineSearch::MoreThuente => {
            let solver = configure(LBFGS::new(MoreThuenteLS::new(), mem(opts)), &opts.tols)?;
            run(theta0, opts, problem, solver)
        }
        LineSearch::HagerZhang => {
            let solver = configure(LBFGS::new(HagerZhangLS::new(), mem(opts)), &opts.tols)?;
            run(theta0, opts, problem, solver)
        }
    }
}

fn mem(opts: &FitOptions) -> usize {
    opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM)
}

fn configure<LS>(
    mut solver: LBFGS<LS, Theta, Grad, f64>, tols: &Tolerances,
) -> FitResult<LBFGS<LS, Theta, Grad, f64>> {
    if let Some(tol) = tols.tol_grad {
        solver = solver.with_tolerance_grad(tol)?;
    }
    if let Some(tol) = tols.tol_cost {
        solver = solver.with_tolerance_cost(tol)?;
    }
    Ok(solver)
}

fn run<'a, F, S>(
    theta0: Theta, opts: &FitOptions, problem: ArgminProblem<'a, F>, solver: S,
) -> FitResult<FitOutcome>
where
    F: Objective,
    S: argmin::core::Solver<
            ArgminProblem<'a, F>,
            argmin::core::IterState<Theta, Grad, (), (), (), f64>,
        > + Send
        + 'static,
{
    let mut executor = Executor::new(problem, solver);
    executor = executor.configure(|state| state.param(theta0));
    if let Some(max_iter) = opts.tols.max_iter {
        executor = executor.configure(|state| state.max_iters(max_iter as u64));
    }
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        executor = executor.add_observer(observer, argmin::core::observers::ObserverMode::Always);
    }

    let mut result = executor.run()?.state().clone();
    let iterations = result.get_iter();
    let func_counts = result.get_func_counts().clone();
    let status = result.get_termination_status().clone();
    let value = -result.get_best_cost();
    let theta_hat = result.take_best_param().ok_or(FitError::MissingSolution)?;

    tracing::debug!(
        iterations,
        value,
        status = ?status,
        "fit finished"
    );

    Ok(FitOutcome { theta_hat, value, status, iterations, func_counts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Concave toy objective `ℓ(θ) = -(θ - c)·(θ - c)` with a known maximum.
    struct Shifted {
        center: Theta,
    }

    impl Objective for Shifted {
        type Data = ();

        fn value(&self, theta: &Theta, _data: &()) -> FitResult<f64> {
            let d = theta - &self.center;
            Ok(-d.dot(&d))
        }

        fn check(&self, _theta: &Theta, _data: &()) -> FitResult<()> {
            Ok(())
        }
    }

    #[test]
    // Purpose
    // -------
    // The finite-difference path recovers the maximizer of a concave
    // quadratic from a cold start.
    fn maximize_recovers_quadratic_optimum() {
        let f = Shifted { center: array![1.5, -0.75] };
        let theta0 = array![0.0, 0.0];

        let out = maximize(&f, theta0, &(), &FitOptions::default()).unwrap();

        assert_relative_eq!(out.theta_hat[0], 1.5, epsilon = 1e-4);
        assert_relative_eq!(out.theta_hat[1], -0.75, epsilon = 1e-4);
        assert!(out.value > -1e-6);
    }

    #[test]
    // Purpose
    // -------
    // Non-finite entries in the initial guess are rejected before the
    // backend is touched.
    fn maximize_rejects_non_finite_theta0() {
        let f = Shifted { center: array![0.0] };
        let theta0 = array![f64::NAN];

        let result = maximize(&f, theta0, &(), &FitOptions::default());

        assert!(matches!(result, Err(FitError::NonFiniteTheta { index: 0, .. })));
    }

    #[test]
    // Purpose
    // -------
    // Tolerance validation rejects non-positive values with the offending
    // name and value.
    fn tolerances_reject_non_positive() {
        let result = Tolerances::new(Some(-1.0), None, None);
        assert!(matches!(
            result,
            Err(FitError::InvalidTolerance { name: "tol_grad", value: -1.0 })
        ));
    }

    #[test]
    fn line_search_parses_case_insensitively() {
        assert_eq!(LineSearch::from_str("morethuente").unwrap(), LineSearch::MoreThuente);
        assert_eq!(LineSearch::from_str("HAGERZHANG").unwrap(), LineSearch::HagerZhang);
        assert!(LineSearch::from_str("newton").is_err());
    }
}
