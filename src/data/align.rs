//! Impulse history alignment — fixed-length windows per response event.
//!
//! Purpose
//! -------
//! Extract, for every response event, a fixed-length window of impulse
//! values, time deltas, and validity masks from the impulse tables its
//! observation indices reference. This is the entry stage of the
//! convolution pipeline: everything downstream consumes the rank-3 arrays
//! produced here.
//!
//! Key behaviors
//! -------------
//! - Windows hold `history_length` causal rows (right-aligned, newest
//!   last) followed by `future_length` lookahead rows; missing rows are
//!   zero-padded with mask 0.
//! - When requested impulses live in tables with different native
//!   timestamps, the per-table windows are concatenated and re-sorted by
//!   ascending timestamp per event, padding rows first.
//! - With `future_length == 0`, Δt is clamped to ≥ 0 within
//!   [`TIME_TIE_TOL`] to absorb floating-point ties; a Δt below
//!   −[`TIME_TIE_TOL`] is a genuine ordering violation and errors.
//!
//! Conventions
//! -----------
//! - Δt = response_time − impulse_time; positive for past impulses.
//! - Observation-index windows are half-open `[first, last)`, `last`
//!   pointing one past the newest causal row.
//! - Output arrays are `(batch × window × impulse)`; the impulse axis
//!   follows the order of the requested impulse list.
use crate::data::{
    errors::{AlignResult, AlignmentError},
    stream::ImpulseTable,
};
use ndarray::{Array2, Array3};

/// Tie tolerance separating floating-point timestamp noise from true
/// ordering violations when clamping negative Δt in causal-only
/// configurations.
pub const TIME_TIE_TOL: f64 = 1e-8;

/// Window configuration for the aligner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentConfig {
    /// Number of causal lookback rows per table.
    pub history_length: usize,
    /// Number of lookahead rows per table.
    pub future_length: usize,
}

impl AlignmentConfig {
    pub fn new(history_length: usize, future_length: usize) -> Self {
        AlignmentConfig { history_length, future_length }
    }

    /// Rows contributed by one table to each event's window.
    pub fn window_len(&self) -> usize {
        self.history_length + self.future_length
    }
}

/// Aligned impulse histories for one batch of response events.
///
/// All arrays are `(batch × window × impulse)`. Padding rows have value 0,
/// Δt 0, and mask 0; downstream aggregation multiplies by the mask, so
/// padding contributes nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedBatch {
    /// Impulse names in axis order.
    pub impulses: Vec<String>,
    /// Impulse values.
    pub values: Array3<f64>,
    /// Time deltas (response_time − impulse_time).
    pub dt: Array3<f64>,
    /// Validity mask (1.0 = real row, 0.0 = padding).
    pub mask: Array3<f64>,
}

impl AlignedBatch {
    /// Batch size.
    pub fn n_events(&self) -> usize {
        self.values.shape()[0]
    }

    /// Total window length (per-table length × number of merged tables).
    pub fn window_len(&self) -> usize {
        self.values.shape()[1]
    }

    /// Position of an impulse on the impulse axis.
    pub fn impulse_index(&self, name: &str) -> Option<usize> {
        self.impulses.iter().position(|n| n == name)
    }
}

/// Extract aligned windows for `impulses` around each response event.
///
/// # Arguments
/// - `tables`: impulse tables, in the column order of the events'
///   observation-index matrices.
/// - `times`: response timestamps, one per event.
/// - `first_obs` / `last_obs`: `(n_events × n_tables)` half-open window
///   bounds into each table.
/// - `impulses`: requested impulse names; the output impulse axis follows
///   this order.
/// - `config`: history/future window lengths.
///
/// # Errors
/// - [`AlignmentError::UnknownImpulse`] / [`AlignmentError::AmbiguousImpulse`]
///   when an impulse is owned by zero or several tables.
/// - [`AlignmentError::WindowShapeMismatch`] when the index matrices do not
///   have one column per table.
/// - [`AlignmentError::IndexOutOfRange`] / [`AlignmentError::InvertedWindow`]
///   for invalid window bounds.
/// - [`AlignmentError::NegativeDelta`] for ordering violations beyond
///   [`TIME_TIE_TOL`] when `future_length == 0`.
pub fn align_batch(
    tables: &[ImpulseTable], times: &ndarray::Array1<f64>, first_obs: &Array2<usize>,
    last_obs: &Array2<usize>, impulses: &[String], config: &AlignmentConfig,
) -> AlignResult<AlignedBatch> {
    if first_obs.ncols() != tables.len() {
        return Err(AlignmentError::WindowShapeMismatch {
            expected: tables.len(),
            actual: first_obs.ncols(),
        });
    }

    // Resolve each requested impulse to its unique owning table.
    let mut owner = Vec::with_capacity(impulses.len());
    for name in impulses {
        let mut found: Option<usize> = None;
        for (j, table) in tables.iter().enumerate() {
            if table.column(name).is_some() {
                if let Some(prev) = found {
                    return Err(AlignmentError::AmbiguousImpulse {
                        impulse: name.clone(),
                        tables: (tables[prev].name.clone(), table.name.clone()),
                    });
                }
                found = Some(j);
            }
        }
        match found {
            Some(j) => owner.push(j),
            None => return Err(AlignmentError::UnknownImpulse { impulse: name.clone() }),
        }
    }

    // Tables contributing at least one requested impulse, in index order.
    let mut used: Vec<usize> = owner.clone();
    used.sort_unstable();
    used.dedup();

    let n_events = times.len();
    let per_table = config.window_len();
    let window = used.len() * per_table;
    let n_impulses = impulses.len();

    let mut values = Array3::<f64>::zeros((n_events, window, n_impulses));
    let mut dt = Array3::<f64>::zeros((n_events, window, n_impulses));
    let mut mask = Array3::<f64>::zeros((n_events, window, n_impulses));

    // Scratch for one event: row timestamps (padding = −inf so it sorts
    // first) and the per-table fills before the merge sort.
    let mut row_time = vec![f64::NEG_INFINITY; window];

    for b in 0..n_events {
        let response_time = times[b];
        row_time.iter_mut().for_each(|t| *t = f64::NEG_INFINITY);
        let mut fills: Vec<(usize, usize, f64, f64)> = Vec::new(); // (pos, impulse, value, delta)

        for (slot, &j) in used.iter().enumerate() {
            let table = &tables[j];
            let first = first_obs[(b, j)];
            let last = last_obs[(b, j)];
            if first > last {
                return Err(AlignmentError::InvertedWindow {
                    table: table.name.clone(),
                    response_index: b,
                    first,
                    last,
                });
            }
            if last > table.len() {
                return Err(AlignmentError::IndexOutOfRange {
                    table: table.name.clone(),
                    response_index: b,
                    index: last,
                    len: table.len(),
                });
            }

            let causal_start = first.max(last.saturating_sub(config.history_length));
            let n_causal = last - causal_start;
            let future_end = (last + config.future_length).min(table.len());
            let base = slot * per_table;

            for (k, name) in impulses.iter().enumerate() {
                if owner[k] != j {
                    continue;
                }
                let column = table
                    .column(name)
                    .expect("owner resolution guarantees column presence");

                // Causal rows, right-aligned so the newest sits at the end
                // of the causal block.
                for (offset, row) in (causal_start..last).enumerate() {
                    let pos = base + config.history_length - n_causal + offset;
                    let mut delta = response_time - table.times[row];
                    if config.future_length == 0 {
                        if delta < -TIME_TIE_TOL {
                            return Err(AlignmentError::NegativeDelta {
                                impulse: name.clone(),
                                response_index: b,
                                delta,
                            });
                        }
                        delta = delta.max(0.0);
                    }
                    row_time[pos] = table.times[row];
                    fills.push((pos, k, column.values[row], delta));
                }

                // Lookahead rows, left-aligned after the causal block.
                for (offset, row) in (last..future_end).enumerate() {
                    let pos = base + config.history_length + offset;
                    row_time[pos] = table.times[row];
                    fills.push((pos, k, column.values[row], response_time - table.times[row]));
                }
            }
        }

        // Merge heterogeneous-rate tables: stable sort of window positions
        // by row timestamp, padding first.
        let mut order: Vec<usize> = (0..window).collect();
        order.sort_by(|&a, &c| {
            row_time[a].partial_cmp(&row_time[c]).expect("row times are never NaN")
        });
        let mut dest = vec![0usize; window];
        for (new_pos, &old_pos) in order.iter().enumerate() {
            dest[old_pos] = new_pos;
        }

        for (pos, k, value, delta) in fills {
            let p = dest[pos];
            values[(b, p, k)] = value;
            dt[(b, p, k)] = delta;
            mask[(b, p, k)] = 1.0;
        }
    }

    Ok(AlignedBatch { impulses: impulses.to_vec(), values, dt, mask })
}
