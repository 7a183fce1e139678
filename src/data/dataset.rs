//! The in-memory dataset produced by the loader.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::data::feature::Feature;
use crate::data::metadata::Metadata;

/// A fully loaded, feature-binned dataset.
///
/// Built exactly once per load call and mutated only during its build;
/// afterwards it is handed out by value.
///
/// `used_feature_map` has one entry per observed feature column: `-1` for
/// columns dropped as trivial or ignored, otherwise the index into
/// [`Dataset::features`] where the column lives. Non-negative entries form
/// a contiguous `0..num_features` range assigned in ascending column
/// order.
#[derive(Debug)]
pub struct Dataset {
    pub(crate) data_filename: PathBuf,
    pub(crate) num_data: usize,
    pub(crate) num_class: usize,
    pub(crate) num_total_features: usize,
    pub(crate) used_feature_map: Vec<i32>,
    pub(crate) feature_names: Vec<String>,
    pub(crate) features: Vec<Feature>,
    pub(crate) metadata: Metadata,
    pub(crate) is_loading_from_binfile: bool,
}

impl Dataset {
    pub(crate) fn new(path: &Path, num_class: usize) -> Self {
        Self {
            data_filename: path.to_path_buf(),
            num_data: 0,
            num_class,
            num_total_features: 0,
            used_feature_map: Vec::new(),
            feature_names: Vec::new(),
            features: Vec::new(),
            metadata: Metadata::new(),
            is_loading_from_binfile: false,
        }
    }

    /// Number of rows after local partitioning.
    #[inline]
    pub fn num_data(&self) -> usize {
        self.num_data
    }

    /// Number of kept (non-trivial, non-ignored) feature columns.
    #[inline]
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Number of feature columns observed in the input (post label removal).
    #[inline]
    pub fn num_total_features(&self) -> usize {
        self.num_total_features
    }

    /// Configured class count.
    #[inline]
    pub fn num_class(&self) -> usize {
        self.num_class
    }

    /// Source file this dataset was built from.
    pub fn data_filename(&self) -> &Path {
        &self.data_filename
    }

    /// Column names, one per observed feature column.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Map from observed column index to kept-feature index (`-1` = dropped).
    pub fn used_feature_map(&self) -> &[i32] {
        &self.used_feature_map
    }

    /// Kept feature columns, in ascending original-column order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// One kept feature column.
    pub fn feature(&self, idx: usize) -> &Feature {
        &self.features[idx]
    }

    /// Labels, weights, groups and initial scores.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Whether this dataset was restored from a binary file.
    #[inline]
    pub fn is_loading_from_binfile(&self) -> bool {
        self.is_loading_from_binfile
    }

    /// Finalize every feature's storage after extraction.
    pub fn finish_load(&mut self) {
        self.features.par_iter_mut().for_each(|f| f.finish_load());
    }

    /// Adopt the feature mapping of an already built dataset.
    ///
    /// Used for validation data: bin mappers, the used-feature map and
    /// names are copied from `other` so both datasets bin identically;
    /// fresh (empty) feature columns are allocated for this dataset's rows.
    pub fn copy_feature_mapper_from(
        &mut self,
        other: &Dataset,
        is_enable_sparse: bool,
        num_threads: usize,
    ) {
        self.num_total_features = other.num_total_features;
        self.used_feature_map = other.used_feature_map.clone();
        self.feature_names = other.feature_names.clone();
        self.features = other
            .features
            .iter()
            .map(|f| {
                Feature::new(
                    f.feature_idx(),
                    f.bin_mapper().clone(),
                    self.num_data,
                    is_enable_sparse,
                    num_threads,
                )
            })
            .collect();
    }

    /// Write this dataset's binary cache next to its source file and
    /// return the cache path. A later load of the same source file will
    /// read the cache instead of the text.
    pub fn save_binary_file(&self) -> Result<PathBuf, crate::error::LoadError> {
        let bin_path = crate::io::binary::binary_path(&self.data_filename);
        crate::io::binary::write_dataset_to_file(self, &bin_path)?;
        Ok(bin_path)
    }

    /// Split borrows for the extraction pass.
    pub(crate) fn extract_parts(&mut self) -> (&[Feature], &[i32], usize, &mut Metadata) {
        (
            &self.features,
            &self.used_feature_map,
            self.num_total_features,
            &mut self.metadata,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bin_mapper::BinMapper;

    fn tiny_dataset() -> Dataset {
        let mut dataset = Dataset::new(Path::new("train.csv"), 1);
        dataset.num_data = 2;
        dataset.num_total_features = 2;
        dataset.used_feature_map = vec![0, -1];
        dataset.feature_names = vec!["a".into(), "b".into()];
        let mut sample = vec![1.0, 2.0];
        let mapper = BinMapper::find_bin(&mut sample, 2, 16);
        dataset
            .features
            .push(Feature::new(0, mapper, 2, false, 1));
        dataset
    }

    #[test]
    fn test_counts() {
        let dataset = tiny_dataset();
        assert_eq!(dataset.num_data(), 2);
        assert_eq!(dataset.num_features(), 1);
        assert_eq!(dataset.num_total_features(), 2);
    }

    #[test]
    fn test_copy_feature_mapper() {
        let train = tiny_dataset();
        let mut valid = Dataset::new(Path::new("valid.csv"), 1);
        valid.num_data = 5;
        valid.copy_feature_mapper_from(&train, true, 2);

        assert_eq!(valid.num_total_features(), 2);
        assert_eq!(valid.used_feature_map(), train.used_feature_map());
        assert_eq!(valid.feature_names(), train.feature_names());
        assert_eq!(valid.num_features(), 1);
        assert_eq!(valid.feature(0).num_data(), 5);
        assert_eq!(valid.feature(0).bin_mapper(), train.feature(0).bin_mapper());
    }
}
