//! treeline: dataset loading and feature binning for gradient boosted
//! tree training.
//!
//! The crate ingests tabular training data from a text file (CSV, TSV or
//! LibSVM) or a previously materialized binary cache and produces an
//! in-memory [`Dataset`] whose rows are partitioned across machines and
//! whose feature values are discretized into bounded-cardinality
//! histogram bins, ready for tree learning.
//!
//! # Key Types
//!
//! - [`DatasetLoader`] / [`LoadConfig`] - the builder and its configuration
//! - [`Dataset`] - the loaded, feature-binned product
//! - [`BinMapper`] - per-feature histogram quantizer
//! - [`Network`] - allgather seam for multi-machine loading
//!
//! # Loading
//!
//! ```ignore
//! use treeline::{DatasetLoader, LoadConfig};
//!
//! let config = LoadConfig::builder()
//!     .has_header(true)
//!     .label_column("name:label")
//!     .build();
//! let mut loader = DatasetLoader::new(config);
//! let dataset = loader.load_from_file("train.csv".as_ref(), 0, 1)?;
//! ```
//!
//! Every error in this crate is fatal to the load: the builder never
//! returns a partially built dataset. Trivial or explicitly ignored
//! feature columns are dropped with a logged warning instead.

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod loader;
pub mod network;
pub mod random;

pub use config::{LoadConfig, NO_SPECIFIC};
pub use data::{BinMapper, Dataset, Feature, Metadata};
pub use error::LoadError;
pub use loader::{DatasetLoader, PredictFunction};
pub use network::Network;
pub use random::Random;
