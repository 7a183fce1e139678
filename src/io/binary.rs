//! On-disk binary format for built datasets.
//!
//! The stream is a sequence of size-prefixed blobs, all little-endian:
//!
//! ```text
//! u64  size_of_header
//! header: u32 num_data, i32 num_class, i32 num_features,
//!         i32 num_total_features, u64 num_used_feature_map,
//!         i32[num_used_feature_map] used_feature_map,
//!         (i32 name_len, u8[name_len] name) per observed column
//! u64  size_of_metadata
//! metadata blob
//! (u64 size_of_feature, feature blob) per kept feature
//! ```
//!
//! On reload the row set can be re-partitioned for a different machine
//! count: the same row/query predicate used during text loading selects
//! `used_data_indices`, metadata keeps only those rows, and every feature
//! blob is re-sliced while decoding.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::data::dataset::Dataset;
use crate::data::feature::Feature;
use crate::error::LoadError;
use crate::io::bytes::{put_i32, put_u32, put_u64, ByteReader};
use crate::loader::partition::PartitionFilter;
use crate::random::Random;

/// Initial scratch allocation for size-prefixed blob reads.
const INITIAL_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Path of the binary cache next to a data file (`<path>.bin`).
pub fn binary_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bin");
    PathBuf::from(name)
}

/// Binary cache path if one exists next to `path`. Absence is not an
/// error; it just sends the loader down the text path.
pub fn check_can_load_from_bin(path: &Path) -> Option<PathBuf> {
    let bin = binary_path(path);
    bin.is_file().then_some(bin)
}

/// Reusable read buffer that grows before any blob is read into it.
pub(crate) struct ScratchBuffer {
    buf: Vec<u8>,
}

impl ScratchBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
        }
    }

    /// Slice of exactly `size` bytes, growing the buffer first if needed.
    pub fn ensure(&mut self, size: usize) -> &mut [u8] {
        if size > self.buf.len() {
            self.buf.resize(size, 0);
        }
        &mut self.buf[..size]
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

fn read_size(reader: &mut impl Read, what: &str) -> Result<usize, LoadError> {
    let mut raw = [0u8; 8];
    reader.read_exact(&mut raw).map_err(|e| truncated(e, what))?;
    Ok(u64::from_le_bytes(raw) as usize)
}

fn read_blob<'a>(
    reader: &mut impl Read,
    scratch: &'a mut ScratchBuffer,
    size: usize,
    what: &str,
) -> Result<&'a [u8], LoadError> {
    let slot = scratch.ensure(size);
    reader.read_exact(slot).map_err(|e| truncated(e, what))?;
    Ok(slot)
}

fn truncated(err: std::io::Error, what: &str) -> LoadError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        LoadError::Truncated {
            what: what.to_string(),
        }
    } else {
        LoadError::Io(err)
    }
}

/// Serialize a built dataset into `writer`.
pub fn write_dataset(dataset: &Dataset, writer: &mut impl Write) -> Result<(), LoadError> {
    let mut header = Vec::new();
    put_u32(&mut header, dataset.num_data() as u32);
    put_i32(&mut header, dataset.num_class() as i32);
    put_i32(&mut header, dataset.num_features() as i32);
    put_i32(&mut header, dataset.num_total_features() as i32);
    put_u64(&mut header, dataset.used_feature_map().len() as u64);
    for &entry in dataset.used_feature_map() {
        put_i32(&mut header, entry);
    }
    for i in 0..dataset.num_total_features() {
        // Missing names get the same placeholder the loader fills in.
        let synthetic;
        let name = match dataset.feature_names().get(i) {
            Some(name) => name.as_str(),
            None => {
                synthetic = format!("Column_{i}");
                synthetic.as_str()
            }
        };
        put_i32(&mut header, name.len() as i32);
        header.extend_from_slice(name.as_bytes());
    }
    writer.write_all(&(header.len() as u64).to_le_bytes())?;
    writer.write_all(&header)?;

    let mut metadata = Vec::new();
    dataset.metadata().to_bytes(&mut metadata);
    writer.write_all(&(metadata.len() as u64).to_le_bytes())?;
    writer.write_all(&metadata)?;

    let mut blob = Vec::new();
    for feature in dataset.features() {
        blob.clear();
        feature.to_bytes(&mut blob);
        writer.write_all(&(blob.len() as u64).to_le_bytes())?;
        writer.write_all(&blob)?;
    }
    Ok(())
}

/// Write the binary cache for `dataset` next to its source file and
/// return the cache path.
pub fn write_dataset_to_file(dataset: &Dataset, bin_path: &Path) -> Result<(), LoadError> {
    let mut writer = BufWriter::new(File::create(bin_path)?);
    write_dataset(dataset, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Restore a dataset from its binary cache.
///
/// When `num_machines > 1` and the caller is not pre-partitioned, the
/// on-disk rows are re-partitioned for this `rank` with the same
/// row/query predicate used during text loading.
pub fn read_dataset(
    bin_path: &Path,
    rank: usize,
    num_machines: usize,
    is_pre_partition: bool,
    is_enable_sparse: bool,
    random: &mut Random,
) -> Result<Dataset, LoadError> {
    let mut reader = BufReader::new(File::open(bin_path)?);
    let mut scratch = ScratchBuffer::with_capacity(INITIAL_BUFFER_SIZE);

    let header_size = read_size(&mut reader, "header")?;
    let header = read_blob(&mut reader, &mut scratch, header_size, "header")?;
    let mut r = ByteReader::new(header, "header");

    let mut dataset = Dataset::new(bin_path, 1);
    dataset.num_data = r.u32()? as usize;
    dataset.num_class = r.i32()? as usize;
    let num_features = r.i32()? as usize;
    dataset.num_total_features = r.i32()? as usize;
    let num_used_feature_map = r.u64()? as usize;
    dataset.used_feature_map = (0..num_used_feature_map)
        .map(|_| r.i32())
        .collect::<Result<_, _>>()?;
    dataset.feature_names = (0..dataset.num_total_features)
        .map(|_| {
            let len = r.i32()? as usize;
            let raw = r.bytes(len)?;
            Ok(String::from_utf8_lossy(raw).into_owned())
        })
        .collect::<Result<_, LoadError>>()?;

    let metadata_size = read_size(&mut reader, "metadata")?;
    let blob = read_blob(&mut reader, &mut scratch, metadata_size, "metadata")?;
    dataset.metadata.load_from_memory(blob)?;

    let num_global_data = dataset.num_data;
    let mut used_data_indices: Vec<usize> = Vec::new();
    if num_machines > 1 && !is_pre_partition {
        let boundaries = dataset.metadata.query_boundaries().map(<[u32]>::to_vec);
        let mut filter = match &boundaries {
            None => PartitionFilter::by_row(rank, num_machines),
            Some(b) => PartitionFilter::by_query(rank, num_machines, b),
        };
        for i in 0..num_global_data {
            if filter.should_keep(random, i)? {
                used_data_indices.push(i);
            }
        }
        dataset.num_data = used_data_indices.len();
    }
    dataset.metadata.partition_label(&used_data_indices);

    for i in 0..num_features {
        let what = format!("feature {i}");
        let feature_size = read_size(&mut reader, &what)?;
        let blob = read_blob(&mut reader, &mut scratch, feature_size, &what)?;
        dataset.features.push(Feature::from_bytes(
            blob,
            num_global_data,
            &used_data_indices,
            is_enable_sparse,
        )?);
    }
    dataset.is_loading_from_binfile = true;
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_path_appends_suffix() {
        assert_eq!(
            binary_path(Path::new("/tmp/train.csv")),
            PathBuf::from("/tmp/train.csv.bin")
        );
    }

    #[test]
    fn test_check_can_load_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_can_load_from_bin(&dir.path().join("train.csv")).is_none());
    }

    #[test]
    fn test_scratch_grows_before_read() {
        let mut scratch = ScratchBuffer::with_capacity(4);
        assert_eq!(scratch.capacity(), 4);
        let slot = scratch.ensure(10);
        assert_eq!(slot.len(), 10);
        assert!(scratch.capacity() >= 10);
    }

    #[test]
    fn test_scratch_does_not_shrink() {
        let mut scratch = ScratchBuffer::with_capacity(16);
        let slot = scratch.ensure(4);
        assert_eq!(slot.len(), 4);
        assert_eq!(scratch.capacity(), 16);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        std::fs::write(&path, 64u64.to_le_bytes()).unwrap();

        let err = read_dataset(&path, 0, 1, false, true, &mut Random::new(1)).unwrap_err();
        assert!(matches!(err, LoadError::Truncated { .. }));
    }
}
