//! Per-row metadata: labels, weights, query groups and initial scores.

use std::path::Path;

use ndarray::Array2;
use tracing::info;

use crate::error::LoadError;
use crate::io::bytes::{put_f32, put_f64, put_u32, put_u8, ByteReader};

/// Labels and optional side data of a [`Dataset`](crate::Dataset).
///
/// Weights and query boundaries come either from a column inside the data
/// file or from side files next to it (`<path>.weight` with one weight per
/// row, `<path>.query` with one per-query row count per line). Side data
/// is held in staging buffers until [`Metadata::check_or_partition`]
/// validates it against the loaded rows.
#[derive(Debug, Default)]
pub struct Metadata {
    num_data: usize,
    num_class: usize,
    label: Vec<f32>,
    /// Per-row weights; empty when the dataset has none.
    weights: Vec<f32>,
    /// `num_queries + 1` monotone row offsets; empty when there are no groups.
    query_boundaries: Vec<u32>,
    /// Per-row query ids collected from an in-data group column.
    queries: Vec<u32>,
    /// Initial model scores, shape `(num_class, num_data)`.
    init_score: Option<Array2<f64>>,
    weight_load_from_file: Vec<f32>,
    query_load_from_file: Vec<u32>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load optional `<path>.weight` and `<path>.query` side files.
    pub fn init_from_file(&mut self, path: &Path, num_class: usize) -> Result<(), LoadError> {
        self.num_class = num_class;

        let weight_path = side_path(path, "weight");
        if weight_path.is_file() {
            let content = std::fs::read_to_string(&weight_path)?;
            let mut weights = Vec::new();
            for (i, line) in non_empty_lines(&content) {
                let w: f32 = line
                    .trim()
                    .parse()
                    .map_err(|_| LoadError::SideDataParse {
                        what: "weight",
                        line: i + 1,
                    })?;
                weights.push(w);
            }
            info!(rows = weights.len(), "loaded weight file {}", weight_path.display());
            self.weight_load_from_file = weights;
        }

        let query_path = side_path(path, "query");
        if query_path.is_file() {
            let content = std::fs::read_to_string(&query_path)?;
            let mut boundaries = vec![0u32];
            for (i, line) in non_empty_lines(&content) {
                let cnt: u32 = line
                    .trim()
                    .parse()
                    .map_err(|_| LoadError::SideDataParse {
                        what: "query",
                        line: i + 1,
                    })?;
                boundaries.push(boundaries.last().copied().unwrap_or(0) + cnt);
            }
            info!(
                num_queries = boundaries.len() - 1,
                "loaded query file {}",
                query_path.display()
            );
            self.query_load_from_file = boundaries;
        }
        Ok(())
    }

    /// Allocate per-row buffers for extraction.
    ///
    /// `weight_idx` / `group_idx` use the `-1` sentinel for "not present".
    pub fn init_buffers(&mut self, num_data: usize, num_class: usize, weight_idx: i32, group_idx: i32) {
        self.num_data = num_data;
        self.num_class = num_class;
        self.label = vec![0.0; num_data];
        if weight_idx >= 0 {
            self.weights = vec![0.0; num_data];
        }
        if group_idx >= 0 {
            self.queries = vec![0; num_data];
        }
    }

    /// Number of rows covered by this metadata.
    #[inline]
    pub fn num_data(&self) -> usize {
        self.num_data
    }

    /// Labels, one per row.
    #[inline]
    pub fn label(&self) -> &[f32] {
        &self.label
    }

    /// Per-row weights, if the dataset has them.
    pub fn weights(&self) -> Option<&[f32]> {
        if self.weights.is_empty() {
            None
        } else {
            Some(&self.weights)
        }
    }

    /// Query boundaries: side-file boundaries before extraction, final
    /// boundaries afterwards.
    pub fn query_boundaries(&self) -> Option<&[u32]> {
        if !self.query_boundaries.is_empty() {
            Some(&self.query_boundaries)
        } else if !self.query_load_from_file.is_empty() {
            Some(&self.query_load_from_file)
        } else {
            None
        }
    }

    /// Number of query groups.
    pub fn num_queries(&self) -> usize {
        self.query_boundaries().map_or(0, |b| b.len() - 1)
    }

    /// Initial scores, shape `(num_class, num_data)`.
    pub fn init_score(&self) -> Option<&Array2<f64>> {
        self.init_score.as_ref()
    }

    /// Hand off the init-score matrix after extraction.
    pub fn set_init_score(&mut self, scores: Array2<f64>) {
        debug_assert_eq!(scores.dim(), (self.num_class, self.num_data));
        self.init_score = Some(scores);
    }

    /// Mutable views for the extraction pass: labels, weights, query ids.
    pub(crate) fn buffers_mut(
        &mut self,
    ) -> (&mut [f32], Option<&mut [f32]>, Option<&mut [u32]>) {
        let weights = if self.weights.is_empty() {
            None
        } else {
            Some(self.weights.as_mut_slice())
        };
        let queries = if self.queries.is_empty() {
            None
        } else {
            Some(self.queries.as_mut_slice())
        };
        (self.label.as_mut_slice(), weights, queries)
    }

    /// Validate staged side data against the loaded rows, adopt it, and
    /// convert collected in-data query ids into boundaries.
    ///
    /// `used_indices` is non-empty when this machine kept a subset of the
    /// `num_global_data` rows; side data is global-sized in that case.
    pub fn check_or_partition(
        &mut self,
        num_global_data: usize,
        used_indices: &[usize],
    ) -> Result<(), LoadError> {
        if used_indices.is_empty() {
            if !self.weight_load_from_file.is_empty() {
                if self.weight_load_from_file.len() != self.num_data {
                    return Err(LoadError::SideDataMismatch {
                        what: "weight file",
                        expected: self.num_data,
                        got: self.weight_load_from_file.len(),
                    });
                }
                self.weights = std::mem::take(&mut self.weight_load_from_file);
            }
            if !self.query_load_from_file.is_empty() {
                let last = *self.query_load_from_file.last().unwrap_or(&0) as usize;
                if last != self.num_data {
                    return Err(LoadError::SideDataMismatch {
                        what: "query file",
                        expected: self.num_data,
                        got: last,
                    });
                }
                self.query_boundaries = std::mem::take(&mut self.query_load_from_file);
            }
        } else {
            if !self.weight_load_from_file.is_empty() {
                if self.weight_load_from_file.len() != num_global_data {
                    return Err(LoadError::SideDataMismatch {
                        what: "weight file",
                        expected: num_global_data,
                        got: self.weight_load_from_file.len(),
                    });
                }
                self.weights = used_indices
                    .iter()
                    .map(|&i| self.weight_load_from_file[i])
                    .collect();
                self.weight_load_from_file.clear();
            }
            if !self.query_load_from_file.is_empty() {
                let global = std::mem::take(&mut self.query_load_from_file);
                let last = *global.last().unwrap_or(&0) as usize;
                if last != num_global_data {
                    return Err(LoadError::SideDataMismatch {
                        what: "query file",
                        expected: num_global_data,
                        got: last,
                    });
                }
                self.query_boundaries = partition_boundaries(&global, used_indices);
            }
        }

        if !self.queries.is_empty() {
            self.query_boundaries = boundaries_from_queries(&self.queries);
            self.queries.clear();
        }
        Ok(())
    }

    /// Keep only the given rows; used when re-slicing a binary reload.
    pub fn partition_label(&mut self, used_indices: &[usize]) {
        if used_indices.is_empty() {
            return;
        }
        self.label = used_indices.iter().map(|&i| self.label[i]).collect();
        if !self.weights.is_empty() {
            self.weights = used_indices.iter().map(|&i| self.weights[i]).collect();
        }
        if !self.query_boundaries.is_empty() {
            let global = std::mem::take(&mut self.query_boundaries);
            self.query_boundaries = partition_boundaries(&global, used_indices);
        }
        if let Some(scores) = self.init_score.take() {
            let mut kept = Array2::zeros((self.num_class, used_indices.len()));
            for (local, &global) in used_indices.iter().enumerate() {
                for k in 0..self.num_class {
                    kept[[k, local]] = scores[[k, global]];
                }
            }
            self.init_score = Some(kept);
        }
        self.num_data = used_indices.len();
    }

    // -- binary blob ----------------------------------------------------------

    pub(crate) fn serialized_size(&self) -> usize {
        let mut size = 4 + 4 + 4;
        size += 4 * self.label.len();
        size += 4 * self.weights.len();
        if !self.query_boundaries.is_empty() {
            size += 4 + 4 * self.query_boundaries.len();
        }
        if let Some(scores) = &self.init_score {
            size += 8 * scores.len();
        }
        size
    }

    pub(crate) fn to_bytes(&self, out: &mut Vec<u8>) {
        put_u32(out, self.num_data as u32);
        put_u32(out, self.num_class as u32);
        put_u8(out, u8::from(!self.weights.is_empty()));
        put_u8(out, u8::from(!self.query_boundaries.is_empty()));
        put_u8(out, u8::from(self.init_score.is_some()));
        put_u8(out, 0);
        for &l in &self.label {
            put_f32(out, l);
        }
        for &w in &self.weights {
            put_f32(out, w);
        }
        if !self.query_boundaries.is_empty() {
            put_u32(out, (self.query_boundaries.len() - 1) as u32);
            for &b in &self.query_boundaries {
                put_u32(out, b);
            }
        }
        if let Some(scores) = &self.init_score {
            for k in 0..self.num_class {
                for i in 0..self.num_data {
                    put_f64(out, scores[[k, i]]);
                }
            }
        }
    }

    pub(crate) fn load_from_memory(&mut self, buf: &[u8]) -> Result<(), LoadError> {
        let mut r = ByteReader::new(buf, "metadata");
        self.num_data = r.u32()? as usize;
        self.num_class = r.u32()? as usize;
        let has_weights = r.u8()? != 0;
        let has_query = r.u8()? != 0;
        let has_init = r.u8()? != 0;
        let _pad = r.u8()?;

        self.label = (0..self.num_data)
            .map(|_| r.f32())
            .collect::<Result<_, _>>()?;
        self.weights = if has_weights {
            (0..self.num_data).map(|_| r.f32()).collect::<Result<_, _>>()?
        } else {
            Vec::new()
        };
        self.query_boundaries = if has_query {
            let num_queries = r.u32()? as usize;
            (0..num_queries + 1)
                .map(|_| r.u32())
                .collect::<Result<_, _>>()?
        } else {
            Vec::new()
        };
        self.init_score = if has_init {
            let mut scores = Array2::zeros((self.num_class, self.num_data));
            for k in 0..self.num_class {
                for i in 0..self.num_data {
                    scores[[k, i]] = r.f64()?;
                }
            }
            Some(scores)
        } else {
            None
        };
        self.queries.clear();
        self.weight_load_from_file.clear();
        self.query_load_from_file.clear();
        Ok(())
    }
}

fn side_path(path: &Path, extension: &str) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    std::path::PathBuf::from(name)
}

fn non_empty_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
}

/// Convert per-row query ids into boundaries over runs of equal ids.
fn boundaries_from_queries(queries: &[u32]) -> Vec<u32> {
    let mut boundaries = vec![0u32];
    for i in 1..queries.len() {
        if queries[i] != queries[i - 1] {
            boundaries.push(i as u32);
        }
    }
    boundaries.push(queries.len() as u32);
    boundaries
}

/// Rebuild local boundaries for the whole groups covered by `used_indices`.
fn partition_boundaries(global: &[u32], used_indices: &[usize]) -> Vec<u32> {
    let mut boundaries = vec![0u32];
    let mut gid = 0usize;
    let mut in_group = 0u32;
    for &row in used_indices {
        while gid + 1 < global.len() && row as u32 >= global[gid + 1] {
            if in_group > 0 {
                let last = *boundaries.last().unwrap_or(&0);
                boundaries.push(last + in_group);
                in_group = 0;
            }
            gid += 1;
        }
        in_group += 1;
    }
    if in_group > 0 {
        let last = *boundaries.last().unwrap_or(&0);
        boundaries.push(last + in_group);
    }
    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_boundaries_from_query_runs() {
        let queries = [7, 7, 7, 2, 2, 9];
        assert_eq!(boundaries_from_queries(&queries), vec![0, 3, 5, 6]);
    }

    #[test]
    fn test_partition_boundaries_whole_groups() {
        // Groups of 3 rows each over 9 rows; keep groups 0 and 2.
        let global = [0u32, 3, 6, 9];
        let used = [0usize, 1, 2, 6, 7, 8];
        assert_eq!(partition_boundaries(&global, &used), vec![0, 3, 6]);
    }

    #[test]
    fn test_side_files_loaded_and_checked() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("train.csv");
        std::fs::File::create(&data_path).unwrap();
        let mut wf = std::fs::File::create(dir.path().join("train.csv.weight")).unwrap();
        writeln!(wf, "0.5\n1.5\n2.5").unwrap();
        let mut qf = std::fs::File::create(dir.path().join("train.csv.query")).unwrap();
        writeln!(qf, "2\n1").unwrap();

        let mut metadata = Metadata::new();
        metadata.init_from_file(&data_path, 1).unwrap();
        assert_eq!(metadata.query_boundaries(), Some(&[0u32, 2, 3][..]));

        metadata.init_buffers(3, 1, -1, -1);
        metadata.check_or_partition(3, &[]).unwrap();
        assert_eq!(metadata.weights(), Some(&[0.5f32, 1.5, 2.5][..]));
        assert_eq!(metadata.query_boundaries(), Some(&[0u32, 2, 3][..]));
    }

    #[test]
    fn test_weight_file_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("train.csv");
        std::fs::File::create(&data_path).unwrap();
        let mut wf = std::fs::File::create(dir.path().join("train.csv.weight")).unwrap();
        writeln!(wf, "1.0\n2.0").unwrap();

        let mut metadata = Metadata::new();
        metadata.init_from_file(&data_path, 1).unwrap();
        metadata.init_buffers(5, 1, -1, -1);
        let err = metadata.check_or_partition(5, &[]).unwrap_err();
        assert!(matches!(err, LoadError::SideDataMismatch { .. }));
    }

    #[test]
    fn test_blob_roundtrip() {
        let mut metadata = Metadata::new();
        metadata.init_buffers(4, 2, 0, -1);
        {
            let (label, weights, _) = metadata.buffers_mut();
            label.copy_from_slice(&[0.0, 1.0, 0.0, 1.0]);
            weights.unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        }
        metadata.queries.clear();
        metadata.query_boundaries = vec![0, 2, 4];
        let mut scores = Array2::zeros((2, 4));
        scores[[1, 3]] = 0.25;
        metadata.set_init_score(scores);

        let mut blob = Vec::new();
        metadata.to_bytes(&mut blob);
        assert_eq!(blob.len(), metadata.serialized_size());

        let mut restored = Metadata::new();
        restored.load_from_memory(&blob).unwrap();
        assert_eq!(restored.num_data(), 4);
        assert_eq!(restored.label(), metadata.label());
        assert_eq!(restored.weights(), metadata.weights());
        assert_eq!(restored.query_boundaries(), metadata.query_boundaries());
        assert_eq!(restored.init_score().unwrap()[[1, 3]], 0.25);
    }

    #[test]
    fn test_partition_label_keeps_rows() {
        let mut metadata = Metadata::new();
        metadata.init_buffers(6, 1, 0, -1);
        {
            let (label, weights, _) = metadata.buffers_mut();
            for (i, l) in label.iter_mut().enumerate() {
                *l = i as f32;
            }
            for (i, w) in weights.unwrap().iter_mut().enumerate() {
                *w = 10.0 + i as f32;
            }
        }
        metadata.partition_label(&[1, 4]);
        assert_eq!(metadata.num_data(), 2);
        assert_eq!(metadata.label(), &[1.0, 4.0]);
        assert_eq!(metadata.weights(), Some(&[11.0f32, 14.0][..]));
    }

    #[test]
    fn test_truncated_blob_is_an_error() {
        let mut metadata = Metadata::new();
        metadata.init_buffers(4, 1, -1, -1);
        let mut blob = Vec::new();
        metadata.to_bytes(&mut blob);
        blob.truncate(blob.len() - 2);

        let mut restored = Metadata::new();
        assert!(restored.load_from_memory(&blob).is_err());
    }
}
