//! Impulse tables — validated containers for co-temporal predictor streams.
//!
//! Purpose
//! -------
//! Provide validated containers for impulse data used by the alignment
//! layer. An [`ImpulseTable`] holds one shared time axis and any number of
//! named predictor columns sampled on it; several tables with different
//! native sampling rates may coexist in one model.
//!
//! Key behaviors
//! -------------
//! - [`ImpulseTable::new`] enforces basic data invariants (non-empty,
//!   finite values, finite non-decreasing timestamps, consistent column
//!   lengths).
//! - Column lookup by name is O(k) over the column list; tables are small
//!   in the column dimension by construction.
//!
//! Invariants & assumptions
//! ------------------------
//! - `times.len() > 0` and every entry is finite.
//! - `times` is non-decreasing (ties between co-occurring impulses are
//!   allowed).
//! - Every column has exactly `times.len()` finite entries.
//!
//! Downstream usage
//! ----------------
//! - Construct tables at the data boundary; the history aligner consumes
//!   them read-only and may rely on the invariants above without
//!   re-validating.
use crate::data::errors::{AlignResult, AlignmentError};
use ndarray::Array1;

/// One named predictor column sampled on its table's time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseColumn {
    /// Predictor name, unique within the owning table.
    pub name: String,
    /// Sampled values; finite, same length as the table's time axis.
    pub values: Array1<f64>,
}

/// A validated set of co-temporal impulse streams.
///
/// All columns share the table's time axis; heterogeneous sampling rates
/// are represented as separate tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseTable {
    /// Table name, used in error reporting and window bookkeeping.
    pub name: String,
    /// Shared timestamps; finite and non-decreasing.
    pub times: Array1<f64>,
    /// Named predictor columns.
    pub columns: Vec<ImpulseColumn>,
}

impl ImpulseTable {
    /// Construct a validated [`ImpulseTable`].
    ///
    /// Validates:
    /// - the time axis is non-empty, finite, and non-decreasing,
    /// - every column has the same length as the time axis,
    /// - every value is finite.
    ///
    /// # Errors
    /// - [`AlignmentError::EmptyTable`] when `times` is empty.
    /// - [`AlignmentError::NonFiniteTime`] / [`AlignmentError::NonMonotoneTime`]
    ///   at the first offending timestamp.
    /// - [`AlignmentError::ColumnLengthMismatch`] /
    ///   [`AlignmentError::NonFiniteValue`] at the first offending column.
    pub fn new(
        name: impl Into<String>, times: Array1<f64>, columns: Vec<(String, Array1<f64>)>,
    ) -> AlignResult<Self> {
        let name = name.into();
        if times.is_empty() {
            return Err(AlignmentError::EmptyTable { table: name });
        }
        let mut prev = f64::NEG_INFINITY;
        for (index, &t) in times.iter().enumerate() {
            if !t.is_finite() {
                return Err(AlignmentError::NonFiniteTime { table: name, index, value: t });
            }
            if t < prev {
                return Err(AlignmentError::NonMonotoneTime {
                    table: name,
                    index,
                    prev,
                    next: t,
                });
            }
            prev = t;
        }
        let n = times.len();
        let mut cols = Vec::with_capacity(columns.len());
        for (col_name, values) in columns {
            if values.len() != n {
                return Err(AlignmentError::ColumnLengthMismatch {
                    table: name,
                    column: col_name,
                    expected: n,
                    actual: values.len(),
                });
            }
            for (index, &value) in values.iter().enumerate() {
                if !value.is_finite() {
                    return Err(AlignmentError::NonFiniteValue {
                        column: col_name,
                        index,
                        value,
                    });
                }
            }
            cols.push(ImpulseColumn { name: col_name, values });
        }
        Ok(ImpulseTable { name, times, columns: cols })
    }

    /// Number of rows on the shared time axis.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the table holds no rows. Always false after validation.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Look up a column by predictor name.
    pub fn column(&self, name: &str) -> Option<&ImpulseColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn make_table() -> AlignResult<ImpulseTable> {
        ImpulseTable::new(
            "stimuli",
            array![0.0, 1.0, 2.0],
            vec![("x".to_string(), array![0.1, 0.2, 0.3])],
        )
    }

    #[test]
    // Purpose
    // -------
    // A well-formed table constructs and exposes its column by name.
    fn table_new_accepts_valid_input() {
        let table = make_table().unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.column("x").is_some());
        assert!(table.column("y").is_none());
    }

    #[test]
    // Purpose
    // -------
    // Decreasing timestamps are rejected with the first offending index.
    fn table_new_rejects_decreasing_times() {
        let result = ImpulseTable::new(
            "stimuli",
            array![0.0, 2.0, 1.0],
            vec![("x".to_string(), array![0.1, 0.2, 0.3])],
        );
        assert_eq!(
            result.unwrap_err(),
            AlignmentError::NonMonotoneTime {
                table: "stimuli".to_string(),
                index: 2,
                prev: 2.0,
                next: 1.0
            }
        );
    }

    #[test]
    // Purpose
    // -------
    // A column shorter than the time axis is rejected.
    fn table_new_rejects_short_column() {
        let result = ImpulseTable::new(
            "stimuli",
            array![0.0, 1.0, 2.0],
            vec![("x".to_string(), array![0.1, 0.2])],
        );
        assert!(matches!(
            result.unwrap_err(),
            AlignmentError::ColumnLengthMismatch { expected: 3, actual: 2, .. }
        ));
    }

    #[test]
    fn table_new_rejects_non_finite_value() {
        let result = ImpulseTable::new(
            "stimuli",
            array![0.0, 1.0],
            vec![("x".to_string(), array![0.1, f64::NAN])],
        );
        assert!(matches!(
            result.unwrap_err(),
            AlignmentError::NonFiniteValue { index: 1, .. }
        ));
    }
}
