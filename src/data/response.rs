//! Response events — validated containers for regression targets.
//!
//! Purpose
//! -------
//! Represent the response side of a deconvolutional regression: event
//! timestamps, per-table observation-index windows bounding each event's
//! causal history, target columns, grouping-factor assignments, and
//! optional standardization metadata recorded at training time.
//!
//! Key behaviors
//! -------------
//! - [`ResponseEvents::new`] enforces shape consistency between the event
//!   axis and every attached column.
//! - [`Standardization`] records the training mean/sd used to standardize
//!   a response; the distribution assembler undoes it at the output
//!   boundary.
//!
//! Conventions
//! -----------
//! - Observation-index windows are half-open `[first, last)` into the
//!   referenced table, with `last` pointing one past the most recent
//!   impulse at or before the event's timestamp. Bounds are checked at
//!   alignment time, not here, because tables arrive separately.
use crate::data::errors::{AlignResult, AlignmentError};
use ndarray::{Array1, Array2};

/// Training-time standardization metadata for one response column.
///
/// `sd` must be strictly positive; a degenerate response (zero variance)
/// is left unstandardized upstream.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Standardization {
    /// Training mean.
    pub mean: f64,
    /// Training standard deviation (> 0).
    pub sd: f64,
}

/// One named response column with optional standardization metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseColumn {
    /// Response name.
    pub name: String,
    /// Observed values, one per event. For categorical responses these are
    /// non-negative class codes stored as `f64`.
    pub values: Array1<f64>,
    /// Present when the response was standardized at training time.
    pub standardization: Option<Standardization>,
}

/// Per-event assignments for one grouping factor, as raw level labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorAssignment {
    /// Grouping-factor name.
    pub factor: String,
    /// Level label per event; unseen labels map to the overall level at
    /// resolution time.
    pub levels: Vec<String>,
}

/// A validated batch of response events.
///
/// Fields
/// ------
/// - `times`: event timestamps, one per event.
/// - `first_obs` / `last_obs`: `(n_events × n_tables)` observation-index
///   windows, column `j` referring to the j-th impulse table passed at
///   alignment time.
/// - `targets`: response columns.
/// - `factors`: grouping-factor assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEvents {
    pub times: Array1<f64>,
    pub first_obs: Array2<usize>,
    pub last_obs: Array2<usize>,
    pub targets: Vec<ResponseColumn>,
    pub factors: Vec<FactorAssignment>,
}

impl ResponseEvents {
    /// Construct validated response events.
    ///
    /// Validates that every attached column has one entry per event and
    /// that the two observation-index matrices agree in shape. Timestamps
    /// must be finite.
    ///
    /// # Errors
    /// - [`AlignmentError::NonFiniteTime`] at the first non-finite event
    ///   timestamp (reported with table name `"response"`).
    /// - [`AlignmentError::WindowShapeMismatch`] when the index matrices
    ///   disagree in shape.
    /// - [`AlignmentError::ResponseLengthMismatch`] /
    ///   [`AlignmentError::GroupLengthMismatch`] at the first offending
    ///   column.
    pub fn new(
        times: Array1<f64>, first_obs: Array2<usize>, last_obs: Array2<usize>,
        targets: Vec<ResponseColumn>, factors: Vec<FactorAssignment>,
    ) -> AlignResult<Self> {
        let n = times.len();
        for (index, &t) in times.iter().enumerate() {
            if !t.is_finite() {
                return Err(AlignmentError::NonFiniteTime {
                    table: "response".to_string(),
                    index,
                    value: t,
                });
            }
        }
        if first_obs.nrows() != n || last_obs.nrows() != n
            || first_obs.ncols() != last_obs.ncols()
        {
            return Err(AlignmentError::WindowShapeMismatch {
                expected: n,
                actual: first_obs.nrows().min(last_obs.nrows()),
            });
        }
        for column in &targets {
            if column.values.len() != n {
                return Err(AlignmentError::ResponseLengthMismatch {
                    column: column.name.clone(),
                    expected: n,
                    actual: column.values.len(),
                });
            }
        }
        for assignment in &factors {
            if assignment.levels.len() != n {
                return Err(AlignmentError::GroupLengthMismatch {
                    factor: assignment.factor.clone(),
                    expected: n,
                    actual: assignment.levels.len(),
                });
            }
        }
        Ok(ResponseEvents { times, first_obs, last_obs, targets, factors })
    }

    /// Number of response events in the batch.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the batch holds no events.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Look up a response column by name.
    pub fn target(&self, name: &str) -> Option<&ResponseColumn> {
        self.targets.iter().find(|c| c.name == name)
    }

    /// Look up a grouping-factor assignment by factor name.
    pub fn assignment(&self, factor: &str) -> Option<&FactorAssignment> {
        self.factors.iter().find(|a| a.factor == factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // Construction succeeds for consistent shapes and exposes lookups.
    fn events_new_accepts_consistent_shapes() {
        let events = ResponseEvents::new(
            array![1.0, 2.0],
            Array2::zeros((2, 1)),
            Array2::zeros((2, 1)),
            vec![ResponseColumn {
                name: "rt".to_string(),
                values: array![0.5, 0.7],
                standardization: None,
            }],
            vec![FactorAssignment {
                factor: "subject".to_string(),
                levels: vec!["s1".to_string(), "s2".to_string()],
            }],
        )
        .unwrap();

        assert_eq!(events.len(), 2);
        assert!(events.target("rt").is_some());
        assert!(events.assignment("subject").is_some());
    }

    #[test]
    // Purpose
    // -------
    // A response column with the wrong length is rejected by name.
    fn events_new_rejects_short_target() {
        let result = ResponseEvents::new(
            array![1.0, 2.0],
            Array2::zeros((2, 1)),
            Array2::zeros((2, 1)),
            vec![ResponseColumn {
                name: "rt".to_string(),
                values: array![0.5],
                standardization: None,
            }],
            vec![],
        );
        assert!(matches!(
            result.unwrap_err(),
            AlignmentError::ResponseLengthMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn events_new_rejects_window_shape_mismatch() {
        let result = ResponseEvents::new(
            array![1.0, 2.0],
            Array2::zeros((1, 1)),
            Array2::zeros((2, 1)),
            vec![],
            vec![],
        );
        assert!(matches!(result.unwrap_err(), AlignmentError::WindowShapeMismatch { .. }));
    }
}
