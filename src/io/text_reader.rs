//! Buffered text input with sampling, filtering and block streaming.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::random::Random;

/// Number of lines handed to a block callback at a time.
const BLOCK_LINES: usize = 8192;

/// Line-oriented reader over one data file.
///
/// When `has_header` is set the first line is skipped by every pass; line
/// indices always refer to data lines only. Blank lines are skipped and
/// not counted.
pub struct TextReader {
    path: PathBuf,
    has_header: bool,
    lines: Vec<String>,
}

impl TextReader {
    /// Open a reader; fails early if the file cannot be read.
    pub fn open(path: &Path, has_header: bool) -> Result<Self, LoadError> {
        File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            has_header,
            lines: Vec::new(),
        })
    }

    fn reader(&self) -> Result<BufReader<File>, LoadError> {
        Ok(BufReader::new(File::open(&self.path)?))
    }

    /// First line of the file (the header when one exists).
    pub fn first_line(&self) -> Result<String, LoadError> {
        let mut reader = self.reader()?;
        let mut line = String::new();
        reader.read_line(&mut line)?;
        Ok(trim_newline(&line).to_string())
    }

    /// Stream every data line through `f`; returns the number of lines.
    fn for_each_line(
        &self,
        mut f: impl FnMut(usize, String) -> Result<(), LoadError>,
    ) -> Result<usize, LoadError> {
        let mut reader = self.reader()?;
        let mut raw = String::new();
        if self.has_header {
            reader.read_line(&mut raw)?;
        }
        let mut idx = 0;
        loop {
            raw.clear();
            if reader.read_line(&mut raw)? == 0 {
                break;
            }
            let line = trim_newline(&raw);
            if line.is_empty() {
                continue;
            }
            f(idx, line.to_string())?;
            idx += 1;
        }
        Ok(idx)
    }

    /// Count data lines without keeping them.
    pub fn count_line(&self) -> Result<usize, LoadError> {
        self.for_each_line(|_, _| Ok(()))
    }

    /// Read every data line into memory; returns the global line count.
    pub fn read_all_lines(&mut self) -> Result<usize, LoadError> {
        let mut lines = Vec::new();
        let total = self.for_each_line(|_, line| {
            lines.push(line);
            Ok(())
        })?;
        self.lines = lines;
        Ok(total)
    }

    /// Read only lines accepted by `predicate` into memory; appends the
    /// accepted indices to `used_indices` and returns the global count.
    pub fn read_and_filter_lines(
        &mut self,
        mut predicate: impl FnMut(usize) -> Result<bool, LoadError>,
        used_indices: &mut Vec<usize>,
    ) -> Result<usize, LoadError> {
        let mut lines = Vec::new();
        let total = self.for_each_line(|idx, line| {
            if predicate(idx)? {
                used_indices.push(idx);
                lines.push(line);
            }
            Ok(())
        })?;
        self.lines = lines;
        Ok(total)
    }

    /// Move the lines read by the last `read_*` call out of the reader.
    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }

    /// Reservoir-sample `k` data lines; returns the global line count.
    pub fn sample_from_file(
        &self,
        random: &mut Random,
        k: usize,
        out: &mut Vec<String>,
    ) -> Result<usize, LoadError> {
        out.clear();
        self.for_each_line(|idx, line| {
            if out.len() < k {
                out.push(line);
            } else {
                let j = random.next_int(0, idx + 1);
                if j < k {
                    out[j] = line;
                }
            }
            Ok(())
        })
    }

    /// Reservoir-sample `k` lines among those accepted by `predicate`;
    /// appends every accepted index to `used_indices` and returns the
    /// global line count.
    ///
    /// The predicate receives the same random stream the reservoir draws
    /// from, so partition decisions and sampling interleave in one
    /// deterministic sequence.
    pub fn sample_and_filter_from_file(
        &self,
        random: &mut Random,
        mut predicate: impl FnMut(&mut Random, usize) -> Result<bool, LoadError>,
        used_indices: &mut Vec<usize>,
        k: usize,
        out: &mut Vec<String>,
    ) -> Result<usize, LoadError> {
        out.clear();
        let mut accepted = 0usize;
        self.for_each_line(|idx, line| {
            if predicate(random, idx)? {
                used_indices.push(idx);
                if out.len() < k {
                    out.push(line);
                } else {
                    let j = random.next_int(0, accepted + 1);
                    if j < k {
                        out[j] = line;
                    }
                }
                accepted += 1;
            }
            Ok(())
        })
    }

    /// Stream every data line in blocks; `process` gets the offset of the
    /// block's first line and the block's lines.
    pub fn read_all_and_process_parallel(
        &self,
        mut process: impl FnMut(usize, Vec<String>) -> Result<(), LoadError>,
    ) -> Result<(), LoadError> {
        let mut block = Vec::with_capacity(BLOCK_LINES);
        let mut start = 0usize;
        self.for_each_line(|_, line| {
            block.push(line);
            if block.len() >= BLOCK_LINES {
                process(start, std::mem::take(&mut block))?;
                start += BLOCK_LINES;
            }
            Ok(())
        })?;
        if !block.is_empty() {
            process(start, block)?;
        }
        Ok(())
    }

    /// Stream only the lines at `indices` (ascending) in blocks; block
    /// offsets count positions within the selected subset.
    pub fn read_part_and_process_parallel(
        &self,
        indices: &[usize],
        mut process: impl FnMut(usize, Vec<String>) -> Result<(), LoadError>,
    ) -> Result<(), LoadError> {
        let mut block = Vec::with_capacity(BLOCK_LINES);
        let mut start = 0usize;
        let mut cursor = 0usize;
        self.for_each_line(|idx, line| {
            if cursor < indices.len() && indices[cursor] == idx {
                cursor += 1;
                block.push(line);
                if block.len() >= BLOCK_LINES {
                    process(start, std::mem::take(&mut block))?;
                    start += BLOCK_LINES;
                }
            }
            Ok(())
        })?;
        if !block.is_empty() {
            process(start, block)?;
        }
        Ok(())
    }
}

fn trim_newline(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
