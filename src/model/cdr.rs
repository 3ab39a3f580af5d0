//! CdrModel — the continuous-time deconvolutional regression facade.
//!
//! Purpose
//! -------
//! Tie the pipeline together: align → evaluate kernels → compose →
//! decompose parameters → aggregate → assemble distributions. Construction
//! freezes the IRF tree, grouping-factor level maps, and the parameter
//! store (closed parameter set, no structural growth); thereafter the
//! model is a pure function of its parameter snapshot and the supplied
//! data, mutated only through [`CdrModel::fit`] or explicit state loads.
//!
//! Key behaviors
//! -------------
//! - [`CdrModel::new`] walks the validated tree once to instantiate every
//!   learned quantity: one intercept per response, one coefficient per
//!   distinct coefficient id, one kernel-parameter vector per chain
//!   element, one weight per interaction — each optionally carrying
//!   random terms for the configured factors.
//! - [`CdrModel::forward`] runs one side-effect-free pass per batch; the
//!   composite-kernel cache is cleared at entry so stale curves can never
//!   outlive a parameter change.
//! - Numeric-instability checks run post-step: non-finite deltas or
//!   distribution parameters are *reported* in
//!   [`ForwardOutput::warnings`]; the caller decides whether to abort via
//!   [`ForwardOutput::ensure_finite`].
//! - [`CdrModel::fit`] maximizes the penalized log-likelihood through the
//!   crate's optimizer, then writes θ̂ back and feeds the optional EMA
//!   side-channel.
//!
//! Concurrency
//! -----------
//! A forward pass reads the frozen store and mutates nothing but the
//! engine's interior cache; no two passes are expected to run concurrently
//! against the same snapshot.
use crate::data::{
    align::{AlignedBatch, AlignmentConfig, align_batch},
    errors::AlignmentError,
    groups::GroupingFactor,
    response::ResponseEvents,
    stream::ImpulseTable,
};
use crate::kernels::bounds::BoundType;
use crate::model::{
    aggregate::{
        AggregationOptions, ResolvedInteraction, aggregate_deltas, contributions,
        convolve_impulses, reduce,
    },
    assemble::{ResponseSpec, assemble},
    errors::{ModelError, ModelResult},
};
use crate::optimization::{
    errors::{FitError, FitResult},
    fit::{FitOptions, FitOutcome, Objective, Theta, maximize},
};
use crate::params::{
    decomp::{ParamQuantity, Realize, RealizedQuantity, Regime},
    ema::EmaTracker,
    key::ParamKey,
    store::{ParamEntry, ParamStore},
};
use crate::tree::{
    compose::{CompositionConfig, CompositionEngine},
    node::IrfTree,
};
use ndarray::{Array1, Array2, Array3, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;

/// Model-level configuration consumed (not owned) by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct CdrConfig {
    /// History/future window lengths for the aligner.
    pub alignment: AlignmentConfig,
    /// Composition grid resolution and span.
    pub composition: CompositionConfig,
    /// Estimation regime shared by every quantity.
    pub regime: Regime,
    /// Grouping factors whose random offsets attach to every quantity.
    pub random_factors: Vec<String>,
    /// Optional EMA decay for the θ side-channel.
    pub ema_decay: Option<f64>,
}

impl Default for CdrConfig {
    fn default() -> Self {
        CdrConfig {
            alignment: AlignmentConfig::new(16, 0),
            composition: CompositionConfig::default(),
            regime: Regime::Point,
            random_factors: Vec::new(),
            ema_decay: None,
        }
    }
}

/// One batch of model inputs: impulse tables plus response events.
#[derive(Debug, Clone, PartialEq)]
pub struct CdrData {
    pub tables: Vec<ImpulseTable>,
    pub events: ResponseEvents,
}

/// One finding from the post-step numeric diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericWarning {
    pub response: String,
    pub stage: &'static str,
    pub value: f64,
}

/// Output of one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOutput {
    /// Aggregated deltas per response, `(batch × distribution-parameter)`.
    pub deltas: BTreeMap<String, Array2<f64>>,
    /// Final native distribution parameters per response.
    pub params: BTreeMap<String, Array2<f64>>,
    /// Non-finite findings from the post-step checks.
    pub warnings: Vec<NumericWarning>,
}

impl ForwardOutput {
    /// Turn the first recorded warning into a hard error.
    pub fn ensure_finite(&self) -> ModelResult<()> {
        match self.warnings.first() {
            None => Ok(()),
            Some(w) => Err(ModelError::NonFiniteOutput {
                response: w.response.clone(),
                stage: w.stage,
                value: w.value,
            }),
        }
    }
}

/// Serializable model state: parameter entries plus frozen level maps.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelState {
    pub params: Vec<ParamEntry>,
    pub factors: Vec<GroupingFactor>,
}

/// The assembled model.
#[derive(Debug)]
pub struct CdrModel {
    tree: IrfTree,
    responses: Vec<ResponseSpec>,
    factors: Vec<GroupingFactor>,
    config: CdrConfig,
    store: ParamStore,
    engine: CompositionEngine,
    ema: Option<EmaTracker>,
}

impl CdrModel {
    /// Build a model: validate the tree against the window configuration,
    /// then walk it to instantiate the closed parameter set.
    pub fn new(
        tree: IrfTree, responses: Vec<ResponseSpec>, factors: Vec<GroupingFactor>,
        config: CdrConfig,
    ) -> ModelResult<Self> {
        tree.validate_window(&config.alignment)?;
        for factor in &config.random_factors {
            if !factors.iter().any(|f| f.name == *factor) {
                return Err(ModelError::UnknownRandomFactor { factor: factor.clone() });
            }
        }
        let engine = CompositionEngine::new(config.composition)?;
        let regime = config.regime;

        let mut store = ParamStore::new(regime);
        for spec in &responses {
            let width = spec.distribution.n_params();

            let key = ParamKey::intercept(&spec.name);
            let quantity = ParamQuantity::from_constrained(
                &key.to_string(),
                &spec.distribution.default_params(),
                spec.distribution.bounds(),
                regime,
            )?;
            store.insert(key, attach_randoms(quantity, &config, &factors, regime))?;

            let mut seen_coefs: Vec<&str> = Vec::new();
            for terminal in &tree.terminals {
                if !seen_coefs.contains(&terminal.coef_id.as_str()) {
                    seen_coefs.push(&terminal.coef_id);
                    let key = ParamKey::coefficient(&spec.name, &terminal.coef_id);
                    let quantity = ParamQuantity::from_constrained(
                        &key.to_string(),
                        &vec![0.0; width],
                        vec![BoundType::Free; width],
                        regime,
                    )?;
                    store.insert(key, attach_randoms(quantity, &config, &factors, regime))?;
                }
                for (position, family) in terminal.chain.iter().enumerate() {
                    let key = ParamKey::kernel(&spec.name, &terminal.id, position);
                    let quantity = ParamQuantity::from_constrained(
                        &key.to_string(),
                        &family.defaults(),
                        family.bounds(),
                        regime,
                    )?;
                    store.insert(key, attach_randoms(quantity, &config, &factors, regime))?;
                }
            }

            for interaction in &tree.interactions {
                let key = ParamKey::interaction(&spec.name, &interaction.id);
                let quantity = ParamQuantity::from_constrained(
                    &key.to_string(),
                    &vec![0.0; width],
                    vec![BoundType::Free; width],
                    regime,
                )?;
                store.insert(key, attach_randoms(quantity, &config, &factors, regime))?;
            }
        }

        let ema = match config.ema_decay {
            Some(decay) => Some(EmaTracker::new(decay)?),
            None => None,
        };
        tracing::info!(
            quantities = store.len(),
            theta_len = store.theta_len(),
            "model constructed"
        );
        Ok(CdrModel { tree, responses, factors, config, store, engine, ema })
    }

    pub fn tree(&self) -> &IrfTree {
        &self.tree
    }

    pub fn responses(&self) -> &[ResponseSpec] {
        &self.responses
    }

    pub fn factors(&self) -> &[GroupingFactor] {
        &self.factors
    }

    pub fn config(&self) -> &CdrConfig {
        &self.config
    }

    pub fn store(&self) -> &ParamStore {
        &self.store
    }

    /// Mutable access to the parameter store, for state loads and tests.
    pub fn store_mut(&mut self) -> &mut ParamStore {
        &mut self.store
    }

    /// Smoothed θ snapshot, when an EMA decay was configured and at least
    /// one fit step has run.
    pub fn ema_shadow(&self) -> Option<&Array1<f64>> {
        self.ema.as_ref().and_then(EmaTracker::shadow)
    }

    /// One forward pass at the posterior mean (or point values).
    pub fn forward(&self, data: &CdrData) -> ModelResult<ForwardOutput> {
        self.forward_with(&self.store, data, &mut Realize::Mean)
    }

    /// One forward pass with a seeded posterior draw (distributional
    /// regime; identical to [`forward`](CdrModel::forward) under the point
    /// regime).
    pub fn forward_sampled(&self, data: &CdrData, seed: u64) -> ModelResult<ForwardOutput> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.forward_with(&self.store, data, &mut Realize::Sample(&mut rng))
    }

    /// Total log density of the supplied targets under the current
    /// parameter snapshot.
    pub fn log_density(&self, data: &CdrData) -> ModelResult<f64> {
        self.log_density_with(&self.store, data)
    }

    /// Point predictions per response: location for continuous families,
    /// discrete modes for binary/categorical ones.
    pub fn predict(&self, data: &CdrData) -> ModelResult<BTreeMap<String, Array1<f64>>> {
        let output = self.forward(data)?;
        let mut out = BTreeMap::new();
        for spec in &self.responses {
            let params = &output.params[&spec.name];
            let predictions = Array1::from_iter((0..params.nrows()).map(|b| {
                spec.distribution.point_prediction(row_slice(params, b))
            }));
            out.insert(spec.name.clone(), predictions);
        }
        Ok(out)
    }

    /// One predictive sample per event per response, seeded.
    pub fn sample(&self, data: &CdrData, seed: u64) -> ModelResult<BTreeMap<String, Array1<f64>>> {
        let output = self.forward(data)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = BTreeMap::new();
        for spec in &self.responses {
            let params = &output.params[&spec.name];
            let mut draws = Array1::zeros(params.nrows());
            for b in 0..params.nrows() {
                draws[b] = spec.distribution.sample(row_slice(params, b), &mut rng)?;
            }
            out.insert(spec.name.clone(), draws);
        }
        Ok(out)
    }

    /// Maximize the penalized log-likelihood and write θ̂ back.
    pub fn fit(&mut self, data: &CdrData, opts: &FitOptions) -> FitResult<FitOutcome> {
        let theta0 = self.store.to_theta();
        let outcome = {
            let objective = CdrObjective { model: &*self };
            maximize(&objective, theta0, data, opts)?
        };
        self.store
            .assign_theta(outcome.theta_hat.view())
            .map_err(|e| FitError::Model { message: e.to_string() })?;
        if let Some(ema) = &mut self.ema {
            ema.update(outcome.theta_hat.view());
        }
        tracing::info!(
            value = outcome.value,
            iterations = outcome.iterations,
            "fit applied to parameter store"
        );
        Ok(outcome)
    }

    /// Persistable state: flat parameter entries plus frozen level maps.
    pub fn export_state(&self) -> ModelState {
        ModelState { params: self.store.entries(), factors: self.factors.clone() }
    }

    /// Load previously exported state into a structurally matching model.
    pub fn import_state(&mut self, mut state: ModelState) -> ModelResult<()> {
        for factor in &mut state.factors {
            factor.rebuild_index();
        }
        for factor in &state.factors {
            if !self.factors.iter().any(|f| f.name == factor.name) {
                return Err(ModelError::UnknownRandomFactor { factor: factor.name.clone() });
            }
        }
        self.factors = state.factors;
        self.store.load_entries(&state.params)?;
        Ok(())
    }

    // ---- Internal pipeline --------------------------------------------

    fn log_density_with(&self, store: &ParamStore, data: &CdrData) -> ModelResult<f64> {
        let output = self.forward_with(store, data, &mut Realize::Mean)?;
        let mut total = 0.0;
        for spec in &self.responses {
            let target = data
                .events
                .target(&spec.name)
                .ok_or_else(|| ModelError::UnknownResponse { response: spec.name.clone() })?;
            let params = &output.params[&spec.name];
            for b in 0..params.nrows() {
                let lp = spec
                    .distribution
                    .ln_pdf(row_slice(params, b), target.values[b])
                    .map_err(|err| match err {
                        ModelError::InvalidTarget { value, .. } => ModelError::InvalidTarget {
                            response: spec.name.clone(),
                            index: b,
                            value,
                        },
                        other => other,
                    })?;
                total += lp;
            }
        }
        Ok(total)
    }

    /// Align the batch and map each terminal to its impulse column; the
    /// shared front half of every pass.
    fn prepare(&self, data: &CdrData) -> ModelResult<(AlignedBatch, Vec<usize>)> {
        let impulses = self.tree.impulses();
        let batch = align_batch(
            &data.tables,
            &data.events.times,
            &data.events.first_obs,
            &data.events.last_obs,
            &impulses,
            &self.config.alignment,
        )?;

        let max_dt = batch.dt.iter().fold(0.0f64, |acc, &d| acc.max(d));
        if max_dt > self.config.composition.t_max {
            tracing::warn!(
                max_dt,
                t_max = self.config.composition.t_max,
                "observed delta exceeds the composition grid span; composed chains truncate"
            );
        }

        let terminal_impulse = self
            .tree
            .terminals
            .iter()
            .map(|t| {
                batch.impulse_index(&t.impulse).ok_or_else(|| {
                    ModelError::Alignment(AlignmentError::UnknownImpulse {
                        impulse: t.impulse.clone(),
                    })
                })
            })
            .collect::<ModelResult<Vec<usize>>>()?;
        Ok((batch, terminal_impulse))
    }

    /// Effective kernel weights per (event, window row, terminal) for one
    /// response.
    fn kernel_weights(
        &self, spec: &ResponseSpec, batch: &AlignedBatch,
        realized: &BTreeMap<ParamKey, RealizedQuantity>,
        resolved: &[(String, Vec<Option<usize>>)], terminal_impulse: &[usize],
    ) -> ModelResult<Array3<f64>> {
        let n_events = batch.values.dim().0;
        let window = batch.window_len();
        let n_terminals = self.tree.terminals.len();
        let mut weights = Array3::<f64>::zeros((n_events, window, n_terminals));
        for (k, terminal) in self.tree.terminals.iter().enumerate() {
            for b in 0..n_events {
                let levels = level_row(resolved, b);
                let chain_params = terminal
                    .chain
                    .iter()
                    .enumerate()
                    .map(|(position, _)| {
                        let key = ParamKey::kernel(&spec.name, &terminal.id, position);
                        Ok(expect_realized(realized, &key)?.value_for(&levels)?.to_vec())
                    })
                    .collect::<ModelResult<Vec<Vec<f64>>>>()?;
                let dts = batch.dt.slice(s![b, .., terminal_impulse[k]]);
                let out = weights.slice_mut(s![b, .., k]);
                self.engine.weights_into(terminal, &chain_params, dts, out)?;
            }
        }
        Ok(weights)
    }

    /// Resolved coefficients per (event, terminal, distribution-parameter)
    /// for one response.
    fn coefficient_tensor(
        &self, spec: &ResponseSpec, realized: &BTreeMap<ParamKey, RealizedQuantity>,
        resolved: &[(String, Vec<Option<usize>>)], n_events: usize, width: usize,
    ) -> ModelResult<Array3<f64>> {
        let n_terminals = self.tree.terminals.len();
        let mut coefs = Array3::<f64>::zeros((n_events, n_terminals, width));
        for (k, terminal) in self.tree.terminals.iter().enumerate() {
            let key = ParamKey::coefficient(&spec.name, &terminal.coef_id);
            let quantity = expect_realized(realized, &key)?;
            for b in 0..n_events {
                let value = quantity.raw_for(&level_row(resolved, b))?;
                coefs.slice_mut(s![b, k, ..]).assign(&value);
            }
        }
        Ok(coefs)
    }

    /// Time-/terminal-resolved contribution diagnostics per response:
    /// the full `value × mask × weight × coefficient` tensor, reduced
    /// over the axes the options leave enabled. The default options
    /// reproduce [`forward`](CdrModel::forward)'s delta matrices (up to
    /// interaction terms, which have no time-resolved decomposition).
    pub fn contributions(
        &self, data: &CdrData, options: &AggregationOptions,
    ) -> ModelResult<BTreeMap<String, ndarray::ArrayD<f64>>> {
        let (batch, terminal_impulse) = self.prepare(data)?;
        self.engine.clear_cache();
        let realized = self.store.realize(&mut Realize::Mean);
        let resolved = self.resolve_levels(&data.events);
        let n_events = data.events.len();

        let mut out = BTreeMap::new();
        for spec in &self.responses {
            let width = spec.distribution.n_params();
            let weights =
                self.kernel_weights(spec, &batch, &realized, &resolved, &terminal_impulse)?;
            let coefs = self.coefficient_tensor(spec, &realized, &resolved, n_events, width)?;
            let full = contributions(&batch, &weights, &terminal_impulse, &coefs);
            out.insert(spec.name.clone(), reduce(&full, options));
        }
        Ok(out)
    }

    fn forward_with(
        &self, store: &ParamStore, data: &CdrData, mode: &mut Realize<'_>,
    ) -> ModelResult<ForwardOutput> {
        let (batch, terminal_impulse) = self.prepare(data)?;
        self.engine.clear_cache();
        let realized = store.realize(mode);
        let resolved = self.resolve_levels(&data.events);
        let n_events = data.events.len();

        let mut deltas_map = BTreeMap::new();
        let mut params_map = BTreeMap::new();
        let mut warnings = Vec::new();

        for spec in &self.responses {
            let width = spec.distribution.n_params();

            let weights =
                self.kernel_weights(spec, &batch, &realized, &resolved, &terminal_impulse)?;
            let conv = convolve_impulses(&batch, &weights, &terminal_impulse);
            let coefs = self.coefficient_tensor(spec, &realized, &resolved, n_events, width)?;

            let interactions = self
                .tree
                .interactions
                .iter()
                .map(|interaction| {
                    let members = interaction
                        .terminals
                        .iter()
                        .map(|id| {
                            self.tree.terminal_index(id).expect("validated at construction")
                        })
                        .collect();
                    let key = ParamKey::interaction(&spec.name, &interaction.id);
                    let quantity = expect_realized(&realized, &key)?;
                    let mut w = Array2::<f64>::zeros((n_events, width));
                    for b in 0..n_events {
                        let value = quantity.raw_for(&level_row(&resolved, b))?;
                        w.row_mut(b).assign(&value);
                    }
                    Ok(ResolvedInteraction { members, weights: w })
                })
                .collect::<ModelResult<Vec<ResolvedInteraction>>>()?;

            let delta = aggregate_deltas(&conv, &coefs, &interactions);

            let intercept_key = ParamKey::intercept(&spec.name);
            let intercept_quantity = expect_realized(&realized, &intercept_key)?;
            let mut intercept = Array2::<f64>::zeros((n_events, width));
            for b in 0..n_events {
                let value = intercept_quantity.raw_for(&level_row(&resolved, b))?;
                intercept.row_mut(b).assign(&value);
            }

            let final_params = assemble(spec, &intercept, &delta);

            // Post-step numeric diagnostics: report, do not abort.
            for (&value, stage) in delta
                .iter()
                .map(|v| (v, "delta"))
                .chain(final_params.iter().map(|v| (v, "distribution_params")))
            {
                if !value.is_finite() {
                    warnings.push(NumericWarning {
                        response: spec.name.clone(),
                        stage,
                        value,
                    });
                    tracing::debug!(
                        response = spec.name.as_str(),
                        stage,
                        "non-finite value in forward pass"
                    );
                    break;
                }
            }

            deltas_map.insert(spec.name.clone(), delta);
            params_map.insert(spec.name.clone(), final_params);
        }

        Ok(ForwardOutput { deltas: deltas_map, params: params_map, warnings })
    }

    /// Resolve each factor's per-event level indices; factors without an
    /// assignment column resolve to the overall level throughout.
    fn resolve_levels(&self, events: &ResponseEvents) -> Vec<(String, Vec<Option<usize>>)> {
        self.factors
            .iter()
            .map(|factor| {
                let levels = match events.assignment(&factor.name) {
                    Some(assignment) => {
                        factor.resolve(assignment.levels.iter().map(String::as_str))
                    }
                    None => vec![None; events.len()],
                };
                (factor.name.clone(), levels)
            })
            .collect()
    }
}

/// Objective adapter: penalized log-likelihood of a [`CdrModel`] as a
/// function of the packed θ vector.
pub struct CdrObjective<'a> {
    pub model: &'a CdrModel,
}

impl Objective for CdrObjective<'_> {
    type Data = CdrData;

    fn value(&self, theta: &Theta, data: &CdrData) -> FitResult<f64> {
        let mut store = self.model.store.clone();
        store
            .assign_theta(theta.view())
            .map_err(|e| FitError::Model { message: e.to_string() })?;
        let ll = self
            .model
            .log_density_with(&store, data)
            .map_err(|e| FitError::Model { message: e.to_string() })?;
        Ok(ll - store.penalty())
    }

    fn check(&self, theta: &Theta, data: &CdrData) -> FitResult<()> {
        let expected = self.model.store.theta_len();
        if theta.len() != expected {
            return Err(FitError::Model {
                message: format!(
                    "theta length {} does not match the store's packed length {expected}",
                    theta.len()
                ),
            });
        }
        for spec in &self.model.responses {
            if data.events.target(&spec.name).is_none() {
                return Err(FitError::Model {
                    message: format!("response `{}` is absent from the supplied events", spec.name),
                });
            }
        }
        Ok(())
    }
}

fn attach_randoms(
    mut quantity: ParamQuantity, config: &CdrConfig, factors: &[GroupingFactor], regime: Regime,
) -> ParamQuantity {
    for name in &config.random_factors {
        if let Some(factor) = factors.iter().find(|f| f.name == *name) {
            quantity = quantity.with_random(&factor.name, factor.n_levels(), regime);
        }
    }
    quantity
}

fn expect_realized<'a>(
    realized: &'a BTreeMap<ParamKey, RealizedQuantity>, key: &ParamKey,
) -> ModelResult<&'a RealizedQuantity> {
    realized.get(key).ok_or_else(|| {
        ModelError::Param(crate::params::errors::ParamError::MissingQuantity {
            key: key.to_string(),
        })
    })
}

fn level_row<'a>(
    resolved: &'a [(String, Vec<Option<usize>>)], b: usize,
) -> Vec<(&'a str, Option<usize>)> {
    resolved.iter().map(|(name, levels)| (name.as_str(), levels[b])).collect()
}

fn row_slice(params: &Array2<f64>, b: usize) -> &[f64] {
    params
        .row(b)
        .to_slice()
        .expect("rows of standard-layout arrays are contiguous")
}
