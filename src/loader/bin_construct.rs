//! Bin-mapper construction from sampled rows, local or distributed.

use rayon::prelude::*;
use tracing::warn;

use crate::data::bin_mapper::{BinMapper, ZERO_THRESHOLD};
use crate::data::dataset::Dataset;
use crate::data::feature::Feature;
use crate::error::LoadError;
use crate::io::parser::Parser;

use super::DatasetLoader;

impl DatasetLoader {
    /// Learn a bin mapper for every observed column from `sample_data`
    /// and assemble the dataset's feature set.
    ///
    /// With a single machine every column is binned locally in parallel.
    /// With several, the columns are cut into contiguous equal shards
    /// (ceil division, last shard takes the remainder); each machine bins
    /// only its shard into fixed-size slots and one allgather hands every
    /// machine the full set, so all machines end up with identical
    /// mappers.
    pub(crate) fn construct_bin_mappers_from_text(
        &mut self,
        rank: usize,
        num_machines: usize,
        sample_data: &[String],
        parser: &dyn Parser,
        dataset: &mut Dataset,
    ) -> Result<(), LoadError> {
        // sample_values[c] holds the sampled non-zero values of column c.
        let mut sample_values: Vec<Vec<f64>> = Vec::new();
        let mut pairs: Vec<(usize, f64)> = Vec::new();
        let mut label = 0.0;
        for line in sample_data {
            parser.parse_one_line(line, &mut pairs, &mut label);
            for &(column, value) in &pairs {
                if value.abs() > ZERO_THRESHOLD {
                    if column >= sample_values.len() {
                        sample_values.resize_with(column + 1, Vec::new);
                    }
                    sample_values[column].push(value);
                }
            }
        }

        dataset.features.clear();
        dataset.num_total_features = sample_values.len();
        dataset.used_feature_map = vec![-1; sample_values.len()];
        self.check_role_ranges(dataset.num_total_features)?;

        if self.feature_names.is_empty() {
            self.feature_names = (0..dataset.num_total_features)
                .map(|i| format!("Column_{i}"))
                .collect();
        }
        dataset.feature_names = self.feature_names.clone();

        let max_bin = self.config.max_bin;
        let sample_cnt = sample_data.len();
        let num_threads = rayon::current_num_threads().max(1);

        if num_machines == 1 {
            let ignore = &self.ignore_features;
            let mappers: Vec<Option<BinMapper>> = sample_values
                .par_iter_mut()
                .enumerate()
                .map(|(i, values)| {
                    if ignore.contains(&i) {
                        None
                    } else {
                        Some(BinMapper::find_bin(values, sample_cnt, max_bin))
                    }
                })
                .collect();
            self.assemble_features(mappers, dataset, num_threads);
        } else {
            let network = self
                .network
                .clone()
                .ok_or(LoadError::NetworkRequired { num_machines })?;

            // Contiguous shard [start[i], start[i] + len[i]) per machine.
            let total_num_feature = dataset.num_total_features;
            let step = (total_num_feature.div_ceil(num_machines)).max(1);
            let mut start = vec![0usize; num_machines];
            let mut len = vec![0usize; num_machines];
            for i in 0..num_machines - 1 {
                len[i] = step.min(total_num_feature.saturating_sub(start[i]));
                start[i + 1] = start[i] + len[i];
            }
            len[num_machines - 1] = total_num_feature.saturating_sub(start[num_machines - 1]);

            // Mapper sizes differ per feature; every slot is padded to the
            // worst case so offsets are rank-independent.
            let type_size = BinMapper::size_for_specific_bin(max_bin);
            let buffer_size = type_size * total_num_feature;
            let mut input_buffer = vec![0u8; buffer_size];
            let mut output_buffer = vec![0u8; buffer_size];

            let my_start = start[rank];
            let my_len = len[rank];
            input_buffer[my_start * type_size..(my_start + my_len) * type_size]
                .par_chunks_mut(type_size)
                .zip(sample_values[my_start..my_start + my_len].par_iter_mut())
                .for_each(|(slot, values)| {
                    BinMapper::find_bin(values, sample_cnt, max_bin).copy_to(slot);
                });

            let byte_starts: Vec<usize> = start.iter().map(|&s| s * type_size).collect();
            let byte_lens: Vec<usize> = len.iter().map(|&l| l * type_size).collect();
            network.allgather(&input_buffer, &byte_starts, &byte_lens, &mut output_buffer);

            let mappers: Vec<Option<BinMapper>> = (0..total_num_feature)
                .map(|i| {
                    if self.ignore_features.contains(&i) {
                        None
                    } else {
                        Some(BinMapper::copy_from(
                            &output_buffer[i * type_size..(i + 1) * type_size],
                        ))
                    }
                })
                .collect();
            self.assemble_features(mappers, dataset, num_threads);
        }
        Ok(())
    }

    /// Assign kept columns to feature slots in ascending column order;
    /// ignored (`None`) and trivial mappers are dropped with a warning.
    pub(crate) fn assemble_features(
        &self,
        mappers: Vec<Option<BinMapper>>,
        dataset: &mut Dataset,
        num_threads: usize,
    ) {
        for (i, mapper) in mappers.into_iter().enumerate() {
            let name = dataset
                .feature_names
                .get(i)
                .map(String::as_str)
                .unwrap_or("<unnamed>");
            match mapper {
                None => warn!("ignoring feature {name}"),
                Some(mapper) if mapper.is_trivial() => {
                    warn!("ignoring feature {name}, only has one value");
                }
                Some(mapper) => {
                    dataset.used_feature_map[i] = dataset.features.len() as i32;
                    dataset.features.push(Feature::new(
                        i,
                        mapper,
                        dataset.num_data,
                        self.config.is_enable_sparse,
                        num_threads,
                    ));
                }
            }
        }
    }

    fn check_role_ranges(&self, num_total_features: usize) -> Result<(), LoadError> {
        // The label may sit just past the remaining columns (it was the
        // last column before removal), hence the inclusive bound.
        if self.label_idx > num_total_features {
            return Err(LoadError::RoleOutOfRange {
                role: "label",
                index: self.label_idx,
                num_total_features,
            });
        }
        if self.weight_idx >= 0 && self.weight_idx as usize >= num_total_features {
            return Err(LoadError::RoleOutOfRange {
                role: "weight",
                index: self.weight_idx as usize,
                num_total_features,
            });
        }
        if self.group_idx >= 0 && self.group_idx as usize >= num_total_features {
            return Err(LoadError::RoleOutOfRange {
                role: "group",
                index: self.group_idx as usize,
                num_total_features,
            });
        }
        Ok(())
    }
}
