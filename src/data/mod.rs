//! Dataset product types: features, quantizers and metadata.

pub mod bin_mapper;
pub mod dataset;
pub mod feature;
pub mod metadata;

pub use bin_mapper::{BinMapper, ZERO_THRESHOLD};
pub use dataset::Dataset;
pub use feature::Feature;
pub use metadata::Metadata;
