//! Error types for dataset loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a [`Dataset`](crate::Dataset).
///
/// Every variant is fatal: the loader never hands out a partially built
/// dataset. Trivial or explicitly ignored feature columns are logged
/// warnings, not errors.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A `name:`-prefixed column spec was not found in the header.
    #[error("could not find {role} column {name} in data file")]
    UnknownColumnName { role: &'static str, name: String },

    /// A column spec without the `name:` prefix failed to parse as an index.
    #[error(
        "{role}_column is not a number, if you want to use a column name, \
         please add the prefix \"name:\" to the column name"
    )]
    ColumnNotNumber { role: &'static str },

    /// A resolved role index points past the observed feature columns.
    #[error("{role} column index {index} is out of range for {num_total_features} feature columns")]
    RoleOutOfRange {
        role: &'static str,
        index: usize,
        num_total_features: usize,
    },

    /// An in-data group column cannot be combined with multi-machine,
    /// non-pre-partitioned training.
    #[error(
        "using a group column inside the data file is not supported for parallel \
         training without pre-partitioning; use a separate query file or \
         pre-partition the data"
    )]
    GroupWithoutPrePartition,

    /// Multi-machine loading was requested without a network implementation.
    #[error("distributed loading with {num_machines} machines requires a network")]
    NetworkRequired { num_machines: usize },

    /// The text format of the input could not be recognized.
    #[error("could not recognize data format of {path}")]
    UnrecognizedFormat { path: PathBuf },

    /// No rows survived loading and partitioning.
    #[error("data file {path} is empty")]
    EmptyData { path: PathBuf },

    /// Every feature column was dropped as trivial or ignored.
    #[error("no usable features in data file {path}")]
    NoUsableFeatures { path: PathBuf },

    /// A row's query id ran past the declared number of queries.
    #[error("query id exceeds the range of the query file, please ensure the query file is correct")]
    QueryOutOfRange,

    /// Per-row side data does not line up with the data file.
    #[error("{what} has {got} values but the data has {expected} rows")]
    SideDataMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// A value in a side file failed to parse.
    #[error("could not parse {what} file entry at line {line}")]
    SideDataParse { what: &'static str, line: usize },

    /// The binary stream ended before a declared blob was complete.
    #[error("binary file error: {what} is truncated")]
    Truncated { what: String },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
