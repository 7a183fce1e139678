//! Second pass over the data: discretize values into the dataset.

use ndarray::{s, Array2, ArrayViewMut2, Axis};
use rayon::prelude::*;

use crate::data::dataset::Dataset;
use crate::error::LoadError;
use crate::io::parser::Parser;
use crate::io::text_reader::TextReader;

use super::DatasetLoader;

/// Everything one worker needs for its contiguous run of rows: the raw
/// lines and mutable windows over the row-indexed outputs. Rows are
/// disjoint across tasks, and the task index doubles as the `tid` handed
/// to per-feature push shards.
struct ChunkTask<'a> {
    tid: usize,
    /// Dataset row of the first line in this chunk.
    start: usize,
    lines: &'a mut [String],
    labels: &'a mut [f32],
    weights: Option<&'a mut [f32]>,
    queries: Option<&'a mut [u32]>,
    /// Init-score columns for this chunk, shape `(num_class, len)`.
    scores: Option<ArrayViewMut2<'a, f64>>,
}

impl DatasetLoader {
    /// Extract features from lines already resident in memory.
    pub(crate) fn extract_features_from_memory(
        &self,
        text_data: &mut Vec<String>,
        parser: &dyn Parser,
        dataset: &mut Dataset,
    ) {
        let mut init_score = self
            .predict_fun
            .as_ref()
            .map(|_| Array2::zeros((self.config.num_class, dataset.num_data)));
        self.extract_block(0, text_data, parser, dataset, init_score.as_mut());
        if let Some(scores) = init_score {
            dataset.metadata.set_init_score(scores);
        }
        dataset.finish_load();
        text_data.clear();
    }

    /// Extract features by streaming the file in blocks.
    ///
    /// When `used_data_indices` is non-empty only those rows are read; the
    /// block offsets then count positions within the kept subset.
    pub(crate) fn extract_features_from_file(
        &self,
        path: &std::path::Path,
        parser: &dyn Parser,
        used_data_indices: &[usize],
        dataset: &mut Dataset,
    ) -> Result<(), LoadError> {
        let mut init_score = self
            .predict_fun
            .as_ref()
            .map(|_| Array2::zeros((self.config.num_class, dataset.num_data)));

        let reader = TextReader::open(path, self.config.has_header)?;
        let mut process = |start_idx: usize, mut lines: Vec<String>| -> Result<(), LoadError> {
            self.extract_block(start_idx, &mut lines, parser, dataset, init_score.as_mut());
            Ok(())
        };
        if !used_data_indices.is_empty() {
            reader.read_part_and_process_parallel(used_data_indices, &mut process)?;
        } else {
            reader.read_all_and_process_parallel(&mut process)?;
        }

        if let Some(scores) = init_score {
            dataset.metadata.set_init_score(scores);
        }
        dataset.finish_load();
        Ok(())
    }

    /// Process one run of lines landing at dataset rows
    /// `start_idx..start_idx + lines.len()`, fanned out over the worker
    /// pool in contiguous chunks.
    fn extract_block(
        &self,
        start_idx: usize,
        lines: &mut [String],
        parser: &dyn Parser,
        dataset: &mut Dataset,
        init_score: Option<&mut Array2<f64>>,
    ) {
        let n = lines.len();
        if n == 0 {
            return;
        }
        let num_threads = rayon::current_num_threads().max(1);
        let chunk = n.div_ceil(num_threads);
        let num_chunks = n.div_ceil(chunk);

        let (features, used_map, num_total_features, metadata) = dataset.extract_parts();
        let (labels, weights, queries) = metadata.buffers_mut();
        let labels = &mut labels[start_idx..start_idx + n];
        let weights = weights.map(|w| &mut w[start_idx..start_idx + n]);
        let queries = queries.map(|q| &mut q[start_idx..start_idx + n]);

        let mut remaining_scores: Option<ArrayViewMut2<'_, f64>> =
            init_score.map(|scores| scores.slice_mut(s![.., start_idx..start_idx + n]));

        let mut tasks: Vec<ChunkTask<'_>> = Vec::with_capacity(num_chunks);
        let line_iter = lines.chunks_mut(chunk);
        let label_iter = labels.chunks_mut(chunk);
        let mut weight_iter = weights.map(|w| w.chunks_mut(chunk));
        let mut query_iter = queries.map(|q| q.chunks_mut(chunk));
        for (tid, (chunk_lines, chunk_labels)) in line_iter.zip(label_iter).enumerate() {
            let chunk_len = chunk_lines.len();
            let scores = remaining_scores.take().map(|r| {
                let (head, tail) = r.split_at(Axis(1), chunk_len);
                remaining_scores = Some(tail);
                head
            });
            tasks.push(ChunkTask {
                tid,
                start: start_idx + tid * chunk,
                lines: chunk_lines,
                labels: chunk_labels,
                weights: weight_iter.as_mut().and_then(Iterator::next),
                queries: query_iter.as_mut().and_then(Iterator::next),
                scores,
            });
        }

        let predict_fun = self.predict_fun.as_deref();
        let weight_idx = self.weight_idx;
        let group_idx = self.group_idx;

        tasks.into_par_iter().for_each(|task| {
            let ChunkTask {
                tid,
                start,
                lines,
                labels,
                mut weights,
                mut queries,
                mut scores,
            } = task;
            let mut pairs: Vec<(usize, f64)> = Vec::new();
            let mut label = 0.0f64;
            for (j, line) in lines.iter_mut().enumerate() {
                parser.parse_one_line(line, &mut pairs, &mut label);
                labels[j] = label as f32;
                if let (Some(predict), Some(scores)) = (predict_fun, scores.as_mut()) {
                    let row_scores = predict(&pairs);
                    for k in 0..scores.nrows().min(row_scores.len()) {
                        scores[[k, j]] = row_scores[k];
                    }
                }
                for &(column, value) in &pairs {
                    if column >= num_total_features {
                        continue;
                    }
                    let feature_idx = used_map[column];
                    if feature_idx >= 0 {
                        features[feature_idx as usize].push_data(tid, start + j, value);
                    } else if column as i32 == weight_idx {
                        if let Some(w) = weights.as_deref_mut() {
                            w[j] = value as f32;
                        }
                    } else if column as i32 == group_idx {
                        if let Some(q) = queries.as_deref_mut() {
                            q[j] = value as u32;
                        }
                    }
                }
                // Free each processed line to bound peak memory.
                line.clear();
            }
        });
    }
}
