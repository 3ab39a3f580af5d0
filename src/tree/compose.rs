//! Kernel composition — discretized convolution of chained IRFs.
//!
//! Purpose
//! -------
//! Compose a terminal's ordered kernel chain into one effective kernel:
//! the impulse response of cascaded linear filters. Each kernel is sampled
//! on a shared fine grid over `[0, t_max]`, successive curves are
//! convolved by forward FFT → pointwise multiply → inverse FFT scaled by
//! the grid spacing, and the resulting composite curve is cached per
//! (terminal, parameter) signature for the duration of a forward pass.
//!
//! Key behaviors
//! -------------
//! - Chains of length 0 are the Dirac delta; chains of length 1 skip
//!   composition entirely and evaluate the kernel exactly.
//! - Discrete convolution uses the trapezoidal end-point correction, so a
//!   chain of two unit-rate exponentials reproduces the analytic
//!   Gamma(2, 1) kernel to grid accuracy.
//! - Arbitrary-Δt evaluation is nearest-grid-index lookup into the cached
//!   curve; offsets below 0 or past `t_max` evaluate to 0.
//! - Composition follows the declared chain order (never reversed).
//!
//! Resource model
//! --------------
//! The FFT length is fixed at construction, so per-pass cost is bounded by
//! the static grid resolution, independent of input size. The cache is
//! interior-mutable and cleared by the model at the start of each pass;
//! the engine itself is otherwise stateless.
use crate::kernels::family::KernelFamily;
use crate::tree::{
    errors::{TreeError, TreeResult},
    node::Terminal,
};
use ndarray::Array1;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Grid configuration for the composition engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionConfig {
    /// Number of grid points over `[0, t_max]`.
    pub n_points: usize,
    /// Grid span; should cover the maximum observed Δt.
    pub t_max: f64,
}

impl CompositionConfig {
    /// Validated constructor.
    ///
    /// # Errors
    /// [`TreeError::InvalidGrid`] when `n_points < 8` or `t_max` is not
    /// finite and positive.
    pub fn new(n_points: usize, t_max: f64) -> TreeResult<Self> {
        if n_points < 8 {
            return Err(TreeError::InvalidGrid { what: "n_points", value: n_points as f64 });
        }
        if !t_max.is_finite() || t_max <= 0.0 {
            return Err(TreeError::InvalidGrid { what: "t_max", value: t_max });
        }
        Ok(CompositionConfig { n_points, t_max })
    }

    /// Grid spacing `t_max / (n_points − 1)`.
    pub fn spacing(&self) -> f64 {
        self.t_max / (self.n_points - 1) as f64
    }
}

impl Default for CompositionConfig {
    fn default() -> Self {
        CompositionConfig { n_points: 1024, t_max: 10.0 }
    }
}

/// Cache key: terminal id plus the exact bit patterns of every chain
/// parameter, so any parameter change invalidates the entry.
type CompositeKey = (String, Vec<u64>);

/// FFT-backed composition engine with a per-pass composite-curve cache.
pub struct CompositionEngine {
    config: CompositionConfig,
    fft_len: usize,
    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
    cache: RefCell<HashMap<CompositeKey, Arc<Array1<f64>>>>,
}

impl std::fmt::Debug for CompositionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionEngine")
            .field("config", &self.config)
            .field("fft_len", &self.fft_len)
            .field("cached_curves", &self.cache.borrow().len())
            .finish()
    }
}

impl CompositionEngine {
    /// Build an engine for the given grid, planning the FFTs once.
    pub fn new(config: CompositionConfig) -> TreeResult<Self> {
        CompositionConfig::new(config.n_points, config.t_max)?;
        let fft_len = (2 * config.n_points).next_power_of_two();
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_len);
        let c2r = planner.plan_fft_inverse(fft_len);
        Ok(CompositionEngine { config, fft_len, r2c, c2r, cache: RefCell::new(HashMap::new()) })
    }

    /// Grid configuration in force.
    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// Drop all cached composite curves. Called by the model at the start
    /// of each forward pass, before parameters may have changed.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Evaluate a terminal's effective kernel at each offset in `dts`,
    /// writing into `out`.
    ///
    /// `chain_params` holds one constrained parameter vector per chain
    /// element, in declared order. Chains of length ≤ 1 evaluate exactly;
    /// longer chains go through the cached composite curve.
    pub fn weights_into(
        &self, terminal: &Terminal, chain_params: &[Vec<f64>],
        dts: ndarray::ArrayView1<'_, f64>, mut out: ndarray::ArrayViewMut1<'_, f64>,
    ) -> TreeResult<()> {
        match terminal.chain.len() {
            0 => {
                let dirac = KernelFamily::DiracDelta;
                for (w, &dt) in out.iter_mut().zip(dts.iter()) {
                    *w = dirac.evaluate(dt, &[]);
                }
            }
            1 => {
                let family = &terminal.chain[0];
                family.check_params(&chain_params[0])?;
                for (w, &dt) in out.iter_mut().zip(dts.iter()) {
                    *w = family.evaluate(dt, &chain_params[0]);
                }
            }
            _ => {
                let curve = self.composite(terminal, chain_params)?;
                let spacing = self.config.spacing();
                for (w, &dt) in out.iter_mut().zip(dts.iter()) {
                    *w = lookup_nearest(&curve, spacing, dt);
                }
            }
        }
        Ok(())
    }

    /// Composite curve for a chain of length ≥ 2, cached per
    /// (terminal, parameter) signature.
    fn composite(
        &self, terminal: &Terminal, chain_params: &[Vec<f64>],
    ) -> TreeResult<Arc<Array1<f64>>> {
        let key = (
            terminal.id.clone(),
            chain_params.iter().flatten().map(|p| p.to_bits()).collect::<Vec<u64>>(),
        );
        if let Some(curve) = self.cache.borrow().get(&key) {
            return Ok(Arc::clone(curve));
        }

        let mut curve = self.sample(&terminal.chain[0], &chain_params[0])?;
        for (family, params) in terminal.chain.iter().zip(chain_params).skip(1) {
            let next = self.sample(family, params)?;
            curve = self.convolve(&curve, &next);
        }
        tracing::debug!(
            terminal = terminal.id.as_str(),
            chain_len = terminal.chain.len(),
            "composed kernel chain"
        );

        let curve = Arc::new(curve);
        self.cache.borrow_mut().insert(key, Arc::clone(&curve));
        Ok(curve)
    }

    /// Sample one kernel on the grid after validating its parameters.
    fn sample(&self, family: &KernelFamily, params: &[f64]) -> TreeResult<Array1<f64>> {
        family.check_params(params)?;
        let spacing = self.config.spacing();
        Ok(Array1::from_iter(
            (0..self.config.n_points).map(|i| family.evaluate(i as f64 * spacing, params)),
        ))
    }

    /// Discrete convolution of two sampled curves via FFT, scaled by the
    /// grid spacing, with the trapezoidal end-point correction.
    fn convolve(&self, a: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
        let n = self.config.n_points;
        let spacing = self.config.spacing();

        let mut ia = self.r2c.make_input_vec();
        let mut ib = self.r2c.make_input_vec();
        for (dst, &src) in ia.iter_mut().zip(a.iter()) {
            *dst = src;
        }
        for (dst, &src) in ib.iter_mut().zip(b.iter()) {
            *dst = src;
        }

        let mut sa = self.r2c.make_output_vec();
        let mut sb = self.r2c.make_output_vec();
        self.r2c.process(&mut ia, &mut sa).expect("FFT buffer lengths match the plan");
        self.r2c.process(&mut ib, &mut sb).expect("FFT buffer lengths match the plan");
        for (x, y) in sa.iter_mut().zip(sb.iter()) {
            *x *= *y;
        }
        // Real-input spectra are purely real at DC and Nyquist; clear the
        // rounding residue the inverse transform validates against.
        sa[0].im = 0.0;
        if let Some(last) = sa.last_mut() {
            last.im = 0.0;
        }

        let mut raw = self.c2r.make_output_vec();
        self.c2r.process(&mut sa, &mut raw).expect("FFT buffer lengths match the plan");

        // Rectangle-rule convolution from the FFT, refined to the
        // trapezoidal rule by removing half of each end-point term.
        let scale = spacing / self.fft_len as f64;
        Array1::from_iter((0..n).map(|k| {
            let rect = raw[k] * scale;
            rect - 0.5 * spacing * (a[0] * b[k] + a[k] * b[0])
        }))
    }
}

/// Nearest-grid-index lookup into a composite curve; 0 outside `[0, t_max]`.
fn lookup_nearest(curve: &Array1<f64>, spacing: f64, dt: f64) -> f64 {
    if dt < 0.0 {
        return 0.0;
    }
    let index = (dt / spacing).round() as usize;
    if index >= curve.len() { 0.0 } else { curve[index] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Terminal;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn engine(n_points: usize, t_max: f64) -> CompositionEngine {
        CompositionEngine::new(CompositionConfig { n_points, t_max }).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // A chain of length 1 evaluates identically to direct single-kernel
    // evaluation: no grid error at all on this path.
    fn single_kernel_chain_is_exact() {
        let engine = engine(64, 5.0);
        let terminal = Terminal::new("t1", "x", vec![KernelFamily::Exp], "c1");
        let dts = Array1::from(vec![0.0, 0.3, 1.7, 4.9]);
        let mut out = Array1::zeros(4);

        engine
            .weights_into(&terminal, &[vec![1.3]], dts.view(), out.view_mut())
            .unwrap();

        for (w, &dt) in out.iter().zip(dts.iter()) {
            assert_eq!(*w, KernelFamily::Exp.evaluate(dt, &[1.3]));
        }
    }

    #[test]
    // Purpose
    // -------
    // Two chained unit-rate exponentials compose to the analytic
    // Gamma(shape = 2) kernel `t·exp(−t)` within grid tolerance.
    fn chained_exponentials_approximate_gamma_two() {
        let engine = engine(2048, 20.0);
        let terminal =
            Terminal::new("t1", "x", vec![KernelFamily::Exp, KernelFamily::Exp], "c1");
        let params = vec![vec![1.0], vec![1.0]];
        let dts = Array1::from(vec![0.5, 1.0, 2.0, 3.5, 5.0]);
        let mut out = Array1::zeros(dts.len());

        engine.weights_into(&terminal, &params, dts.view(), out.view_mut()).unwrap();

        for (w, &t) in out.iter().zip(dts.iter()) {
            let analytic = t * (-t).exp();
            assert_relative_eq!(*w, analytic, max_relative = 1e-2);
        }
    }

    #[test]
    // Purpose
    // -------
    // The Dirac (empty) chain gives a unit window and nothing else.
    fn empty_chain_is_dirac() {
        let engine = engine(64, 5.0);
        let terminal = Terminal::new("t1", "x", vec![], "c1");
        let dts = Array1::from(vec![0.0, 0.5]);
        let mut out = Array1::zeros(2);

        engine.weights_into(&terminal, &[], dts.view(), out.view_mut()).unwrap();

        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Composite curves are cached per parameter signature and dropped by
    // `clear_cache`.
    fn composite_curves_are_cached_per_signature() {
        let engine = engine(128, 10.0);
        let terminal =
            Terminal::new("t1", "x", vec![KernelFamily::Exp, KernelFamily::Exp], "c1");
        let params = vec![vec![1.0], vec![1.0]];

        let first = engine.composite(&terminal, &params).unwrap();
        let second = engine.composite(&terminal, &params).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = engine.composite(&terminal, &[vec![2.0], vec![1.0]]).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));

        engine.clear_cache();
        let third = engine.composite(&terminal, &params).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn lookup_outside_grid_is_zero() {
        let curve = Array1::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(lookup_nearest(&curve, 0.5, -0.1), 0.0);
        assert_eq!(lookup_nearest(&curve, 0.5, 10.0), 0.0);
        assert_eq!(lookup_nearest(&curve, 0.5, 0.6), 2.0);
    }

    #[test]
    fn grid_config_rejects_degenerate_values() {
        assert!(CompositionConfig::new(4, 10.0).is_err());
        assert!(CompositionConfig::new(64, 0.0).is_err());
        assert!(CompositionConfig::new(64, f64::NAN).is_err());
    }
}
