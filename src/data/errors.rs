//! Errors for impulse/response data (container validation, window
//! extraction, and stream merging).
//!
//! This module defines [`AlignmentError`], covering both data-validation
//! failures at container construction and alignment failures when history
//! windows are extracted. Every variant reports the offending identifier
//! (impulse, response index, or column name) so failures are traceable to a
//! concrete record.
//!
//! ## Conventions
//! - **Indices are 0-based** and refer to rows of the owning table.
//! - Timestamps must be **finite** and **non-decreasing** within a table.
//! - Observation-index windows are half-open: `[first, last)`.

/// Result alias for data-layer operations that may produce
/// [`AlignmentError`].
pub type AlignResult<T> = Result<T, AlignmentError>;

/// Unified error type for impulse/response data handling.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentError {
    // ---- Container validation ----
    /// Table or column is empty.
    EmptyTable { table: String },

    /// Column length differs from the table's time axis.
    ColumnLengthMismatch { table: String, column: String, expected: usize, actual: usize },

    /// A value is NaN/±inf.
    NonFiniteValue { column: String, index: usize, value: f64 },

    /// A timestamp is NaN/±inf.
    NonFiniteTime { table: String, index: usize, value: f64 },

    /// Timestamps must be non-decreasing.
    NonMonotoneTime { table: String, index: usize, prev: f64, next: f64 },

    // ---- Window extraction ----
    /// An observation index falls outside the stream's bounds.
    IndexOutOfRange { table: String, response_index: usize, index: usize, len: usize },

    /// `first > last` for a response's window into a table.
    InvertedWindow { table: String, response_index: usize, first: usize, last: usize },

    /// An impulse named by the model is absent from all provided tables.
    UnknownImpulse { impulse: String },

    /// An impulse appears in more than one table; its window would be
    /// ambiguous.
    AmbiguousImpulse { impulse: String, tables: (String, String) },

    /// Δt below the tie tolerance in a causal-only configuration: a true
    /// ordering violation, not floating-point noise.
    NegativeDelta { impulse: String, response_index: usize, delta: f64 },

    /// Observation-index matrix shape does not match the provided tables.
    WindowShapeMismatch { expected: usize, actual: usize },

    // ---- Response validation ----
    /// Response column length differs from the number of events.
    ResponseLengthMismatch { column: String, expected: usize, actual: usize },

    /// A grouping-factor assignment column length differs from the number
    /// of events.
    GroupLengthMismatch { factor: String, expected: usize, actual: usize },
}

impl std::error::Error for AlignmentError {}

impl std::fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignmentError::EmptyTable { table } => {
                write!(f, "Impulse table `{table}` is empty.")
            }
            AlignmentError::ColumnLengthMismatch { table, column, expected, actual } => {
                write!(
                    f,
                    "Column `{column}` in table `{table}` has length {actual}; expected {expected}"
                )
            }
            AlignmentError::NonFiniteValue { column, index, value } => {
                write!(f, "Value in column `{column}` at row {index} is non-finite: {value}")
            }
            AlignmentError::NonFiniteTime { table, index, value } => {
                write!(f, "Timestamp in table `{table}` at row {index} is non-finite: {value}")
            }
            AlignmentError::NonMonotoneTime { table, index, prev, next } => {
                write!(
                    f,
                    "Timestamps in table `{table}` decrease at row {index}: {prev} -> {next}"
                )
            }
            AlignmentError::IndexOutOfRange { table, response_index, index, len } => {
                write!(
                    f,
                    "Observation index {index} for response {response_index} is outside table `{table}` (len {len})"
                )
            }
            AlignmentError::InvertedWindow { table, response_index, first, last } => {
                write!(
                    f,
                    "Response {response_index} has first > last ({first} > {last}) into table `{table}`"
                )
            }
            AlignmentError::UnknownImpulse { impulse } => {
                write!(f, "Impulse `{impulse}` is absent from all provided tables.")
            }
            AlignmentError::AmbiguousImpulse { impulse, tables } => {
                write!(
                    f,
                    "Impulse `{impulse}` appears in both `{}` and `{}`; windows would be ambiguous",
                    tables.0, tables.1
                )
            }
            AlignmentError::NegativeDelta { impulse, response_index, delta } => {
                write!(
                    f,
                    "Response {response_index} precedes impulse `{impulse}` by {delta} (beyond tie tolerance) in a causal-only configuration"
                )
            }
            AlignmentError::WindowShapeMismatch { expected, actual } => {
                write!(
                    f,
                    "Observation-index matrix has {actual} table columns; expected {expected}"
                )
            }
            AlignmentError::ResponseLengthMismatch { column, expected, actual } => {
                write!(
                    f,
                    "Response column `{column}` has length {actual}; expected {expected} events"
                )
            }
            AlignmentError::GroupLengthMismatch { factor, expected, actual } => {
                write!(
                    f,
                    "Grouping factor `{factor}` has {actual} assignments; expected {expected} events"
                )
            }
        }
    }
}
