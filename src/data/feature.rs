//! A single feature column holding discretized values.

use std::sync::Mutex;

use crate::data::bin_mapper::BinMapper;
use crate::error::LoadError;
use crate::io::bytes::{put_u32, put_u64, ByteReader};

/// Columns whose non-default-bin fraction is below `1 - SPARSE_THRESHOLD`
/// are stored sparsely (when sparse storage is enabled).
const SPARSE_THRESHOLD: f64 = 0.8;

/// Finalized bin storage for one column.
#[derive(Clone, Debug)]
enum BinData {
    DenseU8(Vec<u8>),
    DenseU16(Vec<u16>),
    /// Rows that differ from the default bin, sorted by row.
    Sparse { rows: Vec<u32>, bins: Vec<u32> },
}

/// A feature column: a [`BinMapper`] plus the per-row bin of every row.
///
/// During loading, workers push rows through [`Feature::push_data`] into
/// per-thread shards; [`Feature::finish_load`] merges the shards into the
/// final dense or sparse layout. A feature restored from a binary file is
/// already finalized.
#[derive(Debug)]
pub struct Feature {
    /// Original column index (post label removal).
    feature_idx: usize,
    bin_mapper: BinMapper,
    num_data: usize,
    is_enable_sparse: bool,
    /// One shard per worker; each worker owns exactly one `tid`, so the
    /// mutex is uncontended and exists only to make pushes safe by `&self`.
    push_shards: Vec<Mutex<Vec<(u32, u32)>>>,
    bin_data: Option<BinData>,
}

impl Feature {
    /// Create an empty feature that takes ownership of its mapper.
    ///
    /// `num_threads` bounds the `tid` values that may be passed to
    /// [`Feature::push_data`].
    pub fn new(
        feature_idx: usize,
        bin_mapper: BinMapper,
        num_data: usize,
        is_enable_sparse: bool,
        num_threads: usize,
    ) -> Self {
        let push_shards = (0..num_threads.max(1))
            .map(|_| Mutex::new(Vec::new()))
            .collect();
        Self {
            feature_idx,
            bin_mapper,
            num_data,
            is_enable_sparse,
            push_shards,
            bin_data: None,
        }
    }

    /// Original column index of this feature.
    #[inline]
    pub fn feature_idx(&self) -> usize {
        self.feature_idx
    }

    /// The quantizer owned by this feature.
    #[inline]
    pub fn bin_mapper(&self) -> &BinMapper {
        &self.bin_mapper
    }

    /// Number of rows.
    #[inline]
    pub fn num_data(&self) -> usize {
        self.num_data
    }

    /// Discretize `value` and record it for `row`.
    ///
    /// Safe to call concurrently as long as each calling thread uses its
    /// own `tid < num_threads` and row indices are disjoint across threads.
    pub fn push_data(&self, tid: usize, row: usize, value: f64) {
        let bin = self.bin_mapper.value_to_bin(value);
        if bin != self.bin_mapper.default_bin() {
            let mut shard = self.push_shards[tid]
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            shard.push((row as u32, bin));
        }
    }

    /// Merge the per-thread shards into the final storage layout.
    pub fn finish_load(&mut self) {
        if self.bin_data.is_some() {
            return;
        }
        let shards = std::mem::take(&mut self.push_shards);
        let mut pairs: Vec<(u32, u32)> = shards
            .into_iter()
            .flat_map(|s| {
                s.into_inner()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
            })
            .collect();
        pairs.sort_unstable_by_key(|&(row, _)| row);
        self.bin_data = Some(self.assemble(&pairs));
    }

    fn assemble(&self, pairs: &[(u32, u32)]) -> BinData {
        let non_default_rate = if self.num_data == 0 {
            0.0
        } else {
            pairs.len() as f64 / self.num_data as f64
        };
        if self.is_enable_sparse && 1.0 - non_default_rate >= SPARSE_THRESHOLD {
            let rows = pairs.iter().map(|&(r, _)| r).collect();
            let bins = pairs.iter().map(|&(_, b)| b).collect();
            BinData::Sparse { rows, bins }
        } else if self.bin_mapper.num_bins() <= 256 {
            let default = self.bin_mapper.default_bin() as u8;
            let mut data = vec![default; self.num_data];
            for &(row, bin) in pairs {
                data[row as usize] = bin as u8;
            }
            BinData::DenseU8(data)
        } else {
            let default = self.bin_mapper.default_bin() as u16;
            let mut data = vec![default; self.num_data];
            for &(row, bin) in pairs {
                data[row as usize] = bin as u16;
            }
            BinData::DenseU16(data)
        }
    }

    /// Bin of `row`. Rows never pushed read as the default bin.
    #[inline]
    pub fn bin(&self, row: usize) -> u32 {
        match &self.bin_data {
            Some(BinData::DenseU8(data)) => data[row] as u32,
            Some(BinData::DenseU16(data)) => data[row] as u32,
            Some(BinData::Sparse { rows, bins }) => match rows.binary_search(&(row as u32)) {
                Ok(at) => bins[at],
                Err(_) => self.bin_mapper.default_bin(),
            },
            None => self.bin_mapper.default_bin(),
        }
    }

    // -- binary blob ----------------------------------------------------------

    fn bin_width(&self) -> usize {
        if self.bin_mapper.num_bins() <= 256 {
            1
        } else {
            2
        }
    }

    pub(crate) fn serialized_size(&self) -> usize {
        4 + 4 + 8 + self.bin_mapper.serialized_size() + self.bin_width() * self.num_data
    }

    /// Encode this finalized feature. Bins are always written densely.
    pub(crate) fn to_bytes(&self, out: &mut Vec<u8>) {
        put_u32(out, self.feature_idx as u32);
        put_u32(out, self.bin_width() as u32);
        put_u64(out, self.num_data as u64);
        self.bin_mapper.to_bytes(out);
        match self.bin_width() {
            1 => {
                for row in 0..self.num_data {
                    out.push(self.bin(row) as u8);
                }
            }
            _ => {
                for row in 0..self.num_data {
                    out.extend_from_slice(&(self.bin(row) as u16).to_le_bytes());
                }
            }
        }
    }

    /// Decode a feature blob written by [`Feature::to_bytes`].
    ///
    /// When `used_data_indices` is non-empty, only those rows are
    /// materialized (in the given order); the blob itself always covers
    /// `num_global_data` rows.
    pub(crate) fn from_bytes(
        buffer: &[u8],
        num_global_data: usize,
        used_data_indices: &[usize],
        is_enable_sparse: bool,
    ) -> Result<Self, LoadError> {
        let mut r = ByteReader::new(buffer, "feature");
        let feature_idx = r.u32()? as usize;
        let bin_width = r.u32()? as usize;
        let disk_num_data = r.u64()? as usize;
        if disk_num_data != num_global_data || !matches!(bin_width, 1 | 2) {
            return Err(LoadError::Truncated {
                what: format!("feature {feature_idx}"),
            });
        }
        let bin_mapper = BinMapper::from_reader(&mut r)?;
        let raw = r.bytes(bin_width * num_global_data)?;

        let read_bin = |row: usize| -> u32 {
            match bin_width {
                1 => raw[row] as u32,
                _ => u16::from_le_bytes([raw[2 * row], raw[2 * row + 1]]) as u32,
            }
        };

        let num_data = if used_data_indices.is_empty() {
            num_global_data
        } else {
            used_data_indices.len()
        };
        let mut feature = Self {
            feature_idx,
            bin_mapper,
            num_data,
            is_enable_sparse,
            push_shards: Vec::new(),
            bin_data: None,
        };

        let default = feature.bin_mapper.default_bin();
        let mut pairs = Vec::new();
        if used_data_indices.is_empty() {
            for row in 0..num_global_data {
                let bin = read_bin(row);
                if bin != default {
                    pairs.push((row as u32, bin));
                }
            }
        } else {
            for (local, &global) in used_data_indices.iter().enumerate() {
                let bin = read_bin(global);
                if bin != default {
                    pairs.push((local as u32, bin));
                }
            }
        }
        feature.bin_data = Some(feature.assemble(&pairs));
        Ok(feature)
    }
}
