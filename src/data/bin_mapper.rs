//! Histogram quantizers for feature values.

use crate::error::LoadError;
use crate::io::bytes::{put_f64, put_u32, ByteReader};

/// Sampled values at or below this magnitude are treated as zero.
pub const ZERO_THRESHOLD: f64 = 1e-15;

/// Maps continuous feature values to small bin indices.
///
/// A mapper is learned from a sample of a column's non-zero values via
/// [`BinMapper::find_bin`]; rows absent from the sample are implicit
/// zeros, which is why `find_bin` also takes the total sample size.
///
/// Two serialization channels exist: a variable-length encoding used by
/// the dataset binary format, and a fixed-size slot encoding
/// ([`BinMapper::copy_to`] / [`BinMapper::copy_from`]) sized by
/// [`BinMapper::size_for_specific_bin`], used to exchange mappers between
/// machines through a byte-addressed allgather.
#[derive(Clone, Debug, PartialEq)]
pub struct BinMapper {
    /// Upper bound of each bin; the last entry is `f64::MAX`.
    bin_upper_bounds: Vec<f64>,
    /// Smallest sampled value (zero if the sample was empty).
    min_val: f64,
    /// Largest sampled value.
    max_val: f64,
}

impl BinMapper {
    /// Learn a quantization from sampled non-zero values of one column.
    ///
    /// `values` holds the sampled values with `|v| > ZERO_THRESHOLD`;
    /// `total_sample_cnt - values.len()` rows are implicit zeros. The
    /// sample is sorted in place. The result has at most `max_bin` bins.
    pub fn find_bin(values: &mut [f64], total_sample_cnt: usize, max_bin: usize) -> Self {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        // Distinct values with multiplicity, zeros folded back in.
        let zero_cnt = total_sample_cnt - values.len();
        let mut distinct: Vec<f64> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for &v in values.iter() {
            if distinct.last() == Some(&v) {
                *counts.last_mut().unwrap() += 1;
            } else {
                distinct.push(v);
                counts.push(1);
            }
        }
        if zero_cnt > 0 {
            let at = distinct.partition_point(|&d| d < 0.0);
            distinct.insert(at, 0.0);
            counts.insert(at, zero_cnt);
        }

        let (min_val, max_val) = match (distinct.first(), distinct.last()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => (0.0, 0.0),
        };

        let bin_upper_bounds = if distinct.len() <= 1 {
            // Single-valued column: one bin, no splitting signal.
            vec![f64::MAX]
        } else if distinct.len() <= max_bin {
            // One bin per distinct value, bounded at the midpoints.
            let mut bounds: Vec<f64> = distinct
                .windows(2)
                .map(|w| (w[0] + w[1]) / 2.0)
                .collect();
            bounds.push(f64::MAX);
            bounds
        } else {
            // Count-weighted quantiles over the distinct values.
            let total = total_sample_cnt as f64;
            let mut bounds = Vec::with_capacity(max_bin);
            let mut cumulative = 0.0;
            let mut target_bin = 1usize;
            for i in 0..distinct.len() - 1 {
                cumulative += counts[i] as f64;
                if target_bin < max_bin && cumulative >= target_bin as f64 * total / max_bin as f64
                {
                    bounds.push((distinct[i] + distinct[i + 1]) / 2.0);
                    while target_bin < max_bin
                        && target_bin as f64 * total / max_bin as f64 <= cumulative
                    {
                        target_bin += 1;
                    }
                }
            }
            bounds.push(f64::MAX);
            bounds
        };

        Self {
            bin_upper_bounds,
            min_val,
            max_val,
        }
    }

    /// Number of bins.
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.bin_upper_bounds.len()
    }

    /// A trivial mapper has a single bin and carries no splitting signal.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.bin_upper_bounds.len() <= 1
    }

    /// Smallest sampled value.
    #[inline]
    pub fn min_val(&self) -> f64 {
        self.min_val
    }

    /// Largest sampled value.
    #[inline]
    pub fn max_val(&self) -> f64 {
        self.max_val
    }

    /// Map a value to its bin: the first bin whose upper bound is >= value.
    #[inline]
    pub fn value_to_bin(&self, value: f64) -> u32 {
        let value = if value.is_nan() { 0.0 } else { value };
        let bin = self.bin_upper_bounds.partition_point(|&b| b < value);
        bin.min(self.bin_upper_bounds.len() - 1) as u32
    }

    /// Bin that implicit zeros fall into.
    #[inline]
    pub fn default_bin(&self) -> u32 {
        self.value_to_bin(0.0)
    }

    // -- fixed-slot channel (distributed exchange) ----------------------------

    /// Slot size, in bytes, that can hold any mapper learned with `max_bin`.
    pub fn size_for_specific_bin(max_bin: usize) -> usize {
        // bin count + reserved word + min/max + one bound per possible bin
        4 + 4 + 16 + 8 * max_bin
    }

    /// Serialize into a fixed-size slot, zero-padding the tail.
    ///
    /// `buffer` must be at least [`Self::size_for_specific_bin`] bytes for
    /// the `max_bin` this mapper was learned with.
    pub fn copy_to(&self, buffer: &mut [u8]) {
        let n = self.bin_upper_bounds.len();
        assert!(buffer.len() >= 24 + 8 * n, "bin mapper slot too small");
        buffer.fill(0);
        buffer[0..4].copy_from_slice(&(n as u32).to_le_bytes());
        buffer[8..16].copy_from_slice(&self.min_val.to_le_bytes());
        buffer[16..24].copy_from_slice(&self.max_val.to_le_bytes());
        for (i, &b) in self.bin_upper_bounds.iter().enumerate() {
            let at = 24 + 8 * i;
            buffer[at..at + 8].copy_from_slice(&b.to_le_bytes());
        }
    }

    /// Deserialize from a slot written by [`Self::copy_to`].
    pub fn copy_from(buffer: &[u8]) -> Self {
        let n = u32::from_le_bytes(buffer[0..4].try_into().unwrap()) as usize;
        assert!(buffer.len() >= 24 + 8 * n, "bin mapper slot too small");
        let min_val = f64::from_le_bytes(buffer[8..16].try_into().unwrap());
        let max_val = f64::from_le_bytes(buffer[16..24].try_into().unwrap());
        let bin_upper_bounds = (0..n)
            .map(|i| {
                let at = 24 + 8 * i;
                f64::from_le_bytes(buffer[at..at + 8].try_into().unwrap())
            })
            .collect();
        Self {
            bin_upper_bounds,
            min_val,
            max_val,
        }
    }

    // -- variable-length channel (dataset binary format) ----------------------

    pub(crate) fn serialized_size(&self) -> usize {
        24 + 8 * self.bin_upper_bounds.len()
    }

    pub(crate) fn to_bytes(&self, out: &mut Vec<u8>) {
        put_u32(out, self.bin_upper_bounds.len() as u32);
        put_u32(out, 0);
        put_f64(out, self.min_val);
        put_f64(out, self.max_val);
        for &b in &self.bin_upper_bounds {
            put_f64(out, b);
        }
    }

    pub(crate) fn from_reader(r: &mut ByteReader<'_>) -> Result<Self, LoadError> {
        let n = r.u32()? as usize;
        let _reserved = r.u32()?;
        let min_val = r.f64()?;
        let max_val = r.f64()?;
        let mut bin_upper_bounds = Vec::with_capacity(n);
        for _ in 0..n {
            bin_upper_bounds.push(r.f64()?);
        }
        Ok(Self {
            bin_upper_bounds,
            min_val,
            max_val,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_distinct_values_get_own_bins() {
        let mut values = vec![1.0, 4.0, 7.0];
        let mapper = BinMapper::find_bin(&mut values, 3, 16);
        assert_eq!(mapper.num_bins(), 3);
        assert!(!mapper.is_trivial());
        assert_eq!(mapper.value_to_bin(1.0), 0);
        assert_eq!(mapper.value_to_bin(4.0), 1);
        assert_eq!(mapper.value_to_bin(7.0), 2);
        assert_eq!(mapper.value_to_bin(100.0), 2);
        assert_eq!(mapper.value_to_bin(-5.0), 0);
    }

    #[test]
    fn test_implicit_zeros_form_a_bin() {
        // 2 sampled non-zeros out of 10 rows: zeros dominate.
        let mut values = vec![3.0, 5.0];
        let mapper = BinMapper::find_bin(&mut values, 10, 16);
        assert_eq!(mapper.num_bins(), 3);
        assert_eq!(mapper.value_to_bin(0.0), 0);
        assert_eq!(mapper.default_bin(), 0);
        assert_eq!(mapper.value_to_bin(3.0), 1);
        assert_eq!(mapper.value_to_bin(5.0), 2);
    }

    #[test]
    fn test_single_value_is_trivial() {
        let mut values = vec![5.0, 5.0, 5.0];
        let mapper = BinMapper::find_bin(&mut values, 3, 16);
        assert!(mapper.is_trivial());
        assert_eq!(mapper.num_bins(), 1);
    }

    #[test]
    fn test_all_zero_is_trivial() {
        let mut values = vec![];
        let mapper = BinMapper::find_bin(&mut values, 100, 16);
        assert!(mapper.is_trivial());
    }

    #[test]
    fn test_empty_sample_is_trivial() {
        let mut values = vec![];
        let mapper = BinMapper::find_bin(&mut values, 0, 16);
        assert!(mapper.is_trivial());
    }

    #[test]
    fn test_quantile_path_respects_max_bin() {
        let mut values: Vec<f64> = (1..=300).map(|i| i as f64).collect();
        let n = values.len();
        let mapper = BinMapper::find_bin(&mut values, n, 16);
        assert!(mapper.num_bins() <= 16);
        assert!(mapper.num_bins() > 1);
        // Bins are monotone in the value.
        let mut last = 0;
        for v in (1..=300).step_by(10) {
            let bin = mapper.value_to_bin(v as f64);
            assert!(bin >= last);
            last = bin;
        }
        assert_abs_diff_eq!(mapper.min_val(), 1.0);
        assert_abs_diff_eq!(mapper.max_val(), 300.0);
    }

    #[test]
    fn test_nan_maps_like_zero() {
        let mut values = vec![-2.0, 3.0];
        let mapper = BinMapper::find_bin(&mut values, 10, 16);
        assert_eq!(mapper.value_to_bin(f64::NAN), mapper.value_to_bin(0.0));
    }

    #[test]
    fn test_slot_roundtrip() {
        let max_bin = 32;
        let mut values: Vec<f64> = (0..100).map(|i| (i % 17) as f64 + 0.5).collect();
        let mapper = BinMapper::find_bin(&mut values, 120, max_bin);

        let mut slot = vec![0u8; BinMapper::size_for_specific_bin(max_bin)];
        mapper.copy_to(&mut slot);
        let restored = BinMapper::copy_from(&slot);
        assert_eq!(mapper, restored);
    }

    #[test]
    fn test_slot_size_covers_worst_case() {
        let max_bin = 8;
        let mut values: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let n = values.len();
        let mapper = BinMapper::find_bin(&mut values, n, max_bin);
        assert!(mapper.serialized_size() <= BinMapper::size_for_specific_bin(max_bin));
    }

    #[test]
    fn test_variable_roundtrip() {
        let mut values = vec![1.0, 2.0, 2.0, 9.0];
        let mapper = BinMapper::find_bin(&mut values, 6, 16);
        let mut buf = Vec::new();
        mapper.to_bytes(&mut buf);
        assert_eq!(buf.len(), mapper.serialized_size());
        let mut r = ByteReader::new(&buf, "mapper");
        let restored = BinMapper::from_reader(&mut r).unwrap();
        assert_eq!(mapper, restored);
    }
}
