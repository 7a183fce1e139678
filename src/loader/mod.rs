//! The dataset builder: entry flows and row partitioning.

mod bin_construct;
pub(crate) mod columns;
mod extract;
pub(crate) mod partition;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::info;

use crate::config::{LoadConfig, NO_SPECIFIC};
use crate::data::bin_mapper::BinMapper;
use crate::data::dataset::Dataset;
use crate::data::metadata::Metadata;
use crate::error::LoadError;
use crate::io::binary;
use crate::io::parser::create_parser;
use crate::io::text_reader::TextReader;
use crate::network::Network;
use crate::random::Random;
use partition::PartitionFilter;

/// Produces a row's initial model scores from its parsed feature pairs.
pub type PredictFunction = Arc<dyn Fn(&[(usize, f64)]) -> Vec<f64> + Send + Sync>;

/// Builds [`Dataset`]s from text files, binary caches or raw samples.
///
/// The loader owns the seeded random stream shared by sampling and
/// partitioning, and resolves column roles once, on the first file it
/// touches. Three entry flows exist:
///
/// - [`DatasetLoader::load_from_file`] — training data, possibly
///   partitioned across machines;
/// - [`DatasetLoader::load_from_file_aligned_with`] — validation data
///   binned exactly like an existing training dataset;
/// - [`DatasetLoader::construct_from_sample_data`] — programmatic
///   construction from caller-supplied per-column samples.
pub struct DatasetLoader {
    config: LoadConfig,
    random: Random,
    predict_fun: Option<PredictFunction>,
    network: Option<Arc<dyn Network>>,
    roles_resolved: bool,
    pub(crate) label_idx: usize,
    pub(crate) weight_idx: i32,
    pub(crate) group_idx: i32,
    pub(crate) ignore_features: HashSet<usize>,
    pub(crate) feature_names: Vec<String>,
}

impl DatasetLoader {
    /// Create a loader; the config is frozen from here on.
    pub fn new(config: LoadConfig) -> Self {
        let random = Random::new(config.data_random_seed);
        Self {
            config,
            random,
            predict_fun: None,
            network: None,
            roles_resolved: false,
            label_idx: 0,
            weight_idx: NO_SPECIFIC,
            group_idx: NO_SPECIFIC,
            ignore_features: HashSet::new(),
            feature_names: Vec::new(),
        }
    }

    /// Score rows with an initial model during extraction.
    pub fn with_predict_fun(mut self, predict_fun: PredictFunction) -> Self {
        self.predict_fun = Some(predict_fun);
        self
    }

    /// Attach the collective used for multi-machine bin construction.
    pub fn with_network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Resolved label column index.
    pub fn label_idx(&self) -> usize {
        self.label_idx
    }

    /// Load training data; rows are partitioned across `num_machines`
    /// unless the input is pre-partitioned.
    ///
    /// A binary cache next to `path` takes precedence over the text file.
    pub fn load_from_file(
        &mut self,
        path: &Path,
        rank: usize,
        num_machines: usize,
    ) -> Result<Dataset, LoadError> {
        self.resolve_columns(path)?;
        // An in-data group column cannot be partitioned on the fly: rows
        // of one query must stay together and group membership is only
        // known after parsing.
        if num_machines > 1 && !self.config.is_pre_partition && self.group_idx >= 0 {
            return Err(LoadError::GroupWithoutPrePartition);
        }

        let mut num_global_data = 0usize;
        let mut used_data_indices: Vec<usize> = Vec::new();
        let mut dataset;
        if let Some(bin_path) = binary::check_can_load_from_bin(path) {
            info!("loading binary cache {}", bin_path.display());
            dataset = binary::read_dataset(
                &bin_path,
                rank,
                num_machines,
                self.config.is_pre_partition,
                self.config.is_enable_sparse,
                &mut self.random,
            )?;
            dataset.data_filename = path.to_path_buf();
        } else {
            dataset = Dataset::new(path, self.config.num_class);
            dataset
                .metadata
                .init_from_file(path, self.config.num_class)?;
            let parser = create_parser(path, self.config.has_header, self.label_idx)?;
            if !self.config.use_two_round_loading {
                let mut text_data = self.load_text_to_memory(
                    path,
                    &dataset.metadata,
                    rank,
                    num_machines,
                    &mut num_global_data,
                    &mut used_data_indices,
                )?;
                dataset.num_data = text_data.len();
                let sample_data = self.sample_from_memory(&text_data);
                self.construct_bin_mappers_from_text(
                    rank,
                    num_machines,
                    &sample_data,
                    parser.as_ref(),
                    &mut dataset,
                )?;
                dataset.metadata.init_buffers(
                    dataset.num_data,
                    self.config.num_class,
                    self.weight_idx,
                    self.group_idx,
                );
                self.extract_features_from_memory(&mut text_data, parser.as_ref(), &mut dataset);
            } else {
                let sample_data = self.sample_from_file(
                    path,
                    &dataset.metadata,
                    rank,
                    num_machines,
                    &mut num_global_data,
                    &mut used_data_indices,
                )?;
                dataset.num_data = if used_data_indices.is_empty() {
                    num_global_data
                } else {
                    used_data_indices.len()
                };
                self.construct_bin_mappers_from_text(
                    rank,
                    num_machines,
                    &sample_data,
                    parser.as_ref(),
                    &mut dataset,
                )?;
                dataset.metadata.init_buffers(
                    dataset.num_data,
                    self.config.num_class,
                    self.weight_idx,
                    self.group_idx,
                );
                self.extract_features_from_file(
                    path,
                    parser.as_ref(),
                    &used_data_indices,
                    &mut dataset,
                )?;
            }
        }
        dataset
            .metadata
            .check_or_partition(num_global_data, &used_data_indices)?;
        self.check_dataset(&dataset)?;
        Ok(dataset)
    }

    /// Load validation data, reusing `train_data`'s bin mappers and
    /// feature mapping so both datasets bin identically.
    ///
    /// Always a single-machine view; the empty/usable-feature checks of
    /// training loads are skipped.
    pub fn load_from_file_aligned_with(
        &mut self,
        path: &Path,
        train_data: &Dataset,
    ) -> Result<Dataset, LoadError> {
        self.resolve_columns(path)?;
        let num_threads = rayon::current_num_threads().max(1);

        let mut num_global_data = 0usize;
        let mut used_data_indices: Vec<usize> = Vec::new();
        let mut dataset;
        if let Some(bin_path) = binary::check_can_load_from_bin(path) {
            info!("loading binary cache {}", bin_path.display());
            dataset = binary::read_dataset(
                &bin_path,
                0,
                1,
                self.config.is_pre_partition,
                self.config.is_enable_sparse,
                &mut self.random,
            )?;
            dataset.data_filename = path.to_path_buf();
        } else {
            dataset = Dataset::new(path, self.config.num_class);
            dataset
                .metadata
                .init_from_file(path, self.config.num_class)?;
            let parser = create_parser(path, self.config.has_header, self.label_idx)?;
            if !self.config.use_two_round_loading {
                let mut text_data = self.load_text_to_memory(
                    path,
                    &dataset.metadata,
                    0,
                    1,
                    &mut num_global_data,
                    &mut used_data_indices,
                )?;
                dataset.num_data = text_data.len();
                dataset.metadata.init_buffers(
                    dataset.num_data,
                    self.config.num_class,
                    self.weight_idx,
                    self.group_idx,
                );
                dataset.copy_feature_mapper_from(
                    train_data,
                    self.config.is_enable_sparse,
                    num_threads,
                );
                self.extract_features_from_memory(&mut text_data, parser.as_ref(), &mut dataset);
            } else {
                let reader = TextReader::open(path, self.config.has_header)?;
                dataset.num_data = reader.count_line()?;
                num_global_data = dataset.num_data;
                dataset.metadata.init_buffers(
                    dataset.num_data,
                    self.config.num_class,
                    self.weight_idx,
                    self.group_idx,
                );
                dataset.copy_feature_mapper_from(
                    train_data,
                    self.config.is_enable_sparse,
                    num_threads,
                );
                self.extract_features_from_file(path, parser.as_ref(), &[], &mut dataset)?;
            }
        }
        dataset
            .metadata
            .check_or_partition(num_global_data, &used_data_indices)?;
        Ok(dataset)
    }

    /// Build a dataset from caller-supplied per-column sample arrays,
    /// bypassing text input entirely. Feature values are pushed by the
    /// caller afterwards, followed by [`Dataset::finish_load`].
    pub fn construct_from_sample_data(
        &mut self,
        mut sample_values: Vec<Vec<f64>>,
        total_sample_size: usize,
        num_data: usize,
    ) -> Result<Dataset, LoadError> {
        let max_bin = self.config.max_bin;
        let mappers: Vec<BinMapper> = sample_values
            .par_iter_mut()
            .map(|values| BinMapper::find_bin(values, total_sample_size, max_bin))
            .collect();

        let mut dataset = Dataset::new(Path::new(""), self.config.num_class);
        dataset.num_data = num_data;
        dataset.num_total_features = mappers.len();
        dataset.used_feature_map = vec![-1; mappers.len()];
        if self.feature_names.is_empty() {
            self.feature_names = (0..mappers.len()).map(|i| format!("Column_{i}")).collect();
        }
        dataset.feature_names = self.feature_names.clone();

        let num_threads = rayon::current_num_threads().max(1);
        self.assemble_features(mappers.into_iter().map(Some).collect(), &mut dataset, num_threads);
        dataset
            .metadata
            .init_buffers(num_data, self.config.num_class, NO_SPECIFIC, NO_SPECIFIC);
        Ok(dataset)
    }

    // -- private helpers ------------------------------------------------------

    /// Resolve column roles from config and header, once per loader.
    fn resolve_columns(&mut self, path: &Path) -> Result<(), LoadError> {
        if self.roles_resolved {
            return Ok(());
        }
        let header = if self.config.has_header {
            Some(TextReader::open(path, true)?.first_line()?)
        } else {
            None
        };
        let roles = columns::resolve(&self.config, header.as_deref())?;
        self.label_idx = roles.label_idx;
        self.weight_idx = roles.weight_idx;
        self.group_idx = roles.group_idx;
        self.ignore_features = roles.ignore_features;
        self.feature_names = roles.feature_names;
        self.roles_resolved = true;
        Ok(())
    }

    /// Read the file into memory, keeping only this machine's rows when
    /// partitioning applies. Returns the kept lines; `num_global_data`
    /// gets the global row count and `used_data_indices` the kept rows.
    fn load_text_to_memory(
        &mut self,
        path: &Path,
        metadata: &Metadata,
        rank: usize,
        num_machines: usize,
        num_global_data: &mut usize,
        used_data_indices: &mut Vec<usize>,
    ) -> Result<Vec<String>, LoadError> {
        let mut reader = TextReader::open(path, self.config.has_header)?;
        used_data_indices.clear();
        if num_machines == 1 || self.config.is_pre_partition {
            *num_global_data = reader.read_all_lines()?;
        } else {
            let random = &mut self.random;
            let mut filter = match metadata.query_boundaries() {
                None => PartitionFilter::by_row(rank, num_machines),
                Some(boundaries) => PartitionFilter::by_query(rank, num_machines, boundaries),
            };
            *num_global_data = reader
                .read_and_filter_lines(|idx| filter.should_keep(random, idx), used_data_indices)?;
        }
        Ok(reader.take_lines())
    }

    /// Uniformly sample lines for bin construction from in-memory text.
    fn sample_from_memory(&mut self, text_data: &[String]) -> Vec<String> {
        let sample_cnt = self.config.bin_construct_sample_cnt.min(text_data.len());
        self.random
            .sample(text_data.len(), sample_cnt)
            .into_iter()
            .map(|i| text_data[i].clone())
            .collect()
    }

    /// Reservoir-sample lines for bin construction straight from the
    /// file, applying the partition predicate when one is needed.
    fn sample_from_file(
        &mut self,
        path: &Path,
        metadata: &Metadata,
        rank: usize,
        num_machines: usize,
        num_global_data: &mut usize,
        used_data_indices: &mut Vec<usize>,
    ) -> Result<Vec<String>, LoadError> {
        let sample_cnt = self.config.bin_construct_sample_cnt;
        let reader = TextReader::open(path, self.config.has_header)?;
        let mut out = Vec::new();
        if num_machines == 1 || self.config.is_pre_partition {
            *num_global_data = reader.sample_from_file(&mut self.random, sample_cnt, &mut out)?;
        } else {
            let mut filter = match metadata.query_boundaries() {
                None => PartitionFilter::by_row(rank, num_machines),
                Some(boundaries) => PartitionFilter::by_query(rank, num_machines, boundaries),
            };
            *num_global_data = reader.sample_and_filter_from_file(
                &mut self.random,
                |random, idx| filter.should_keep(random, idx),
                used_data_indices,
                sample_cnt,
                &mut out,
            )?;
        }
        Ok(out)
    }

    /// Training data must end up non-empty with at least one usable feature.
    fn check_dataset(&self, dataset: &Dataset) -> Result<(), LoadError> {
        if dataset.num_data == 0 {
            return Err(LoadError::EmptyData {
                path: dataset.data_filename.clone(),
            });
        }
        if dataset.features.is_empty() {
            return Err(LoadError::NoUsableFeatures {
                path: dataset.data_filename.clone(),
            });
        }
        Ok(())
    }
}
