//! Line parsers for the supported text formats.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use crate::error::LoadError;

/// Parses one data line into feature pairs and a label.
pub trait Parser: Send + Sync {
    /// Parse `line` into `(column, value)` pairs, clearing `out_pairs`
    /// first, and write the label to `out_label`.
    ///
    /// Column indices are post-label-removal: the parser is constructed
    /// with the label's position and hides that column from the output.
    fn parse_one_line(&self, line: &str, out_pairs: &mut Vec<(usize, f64)>, out_label: &mut f64);
}

/// Lenient numeric parse: unparseable or empty fields read as NaN.
fn parse_value(token: &str) -> f64 {
    token.trim().parse().unwrap_or(f64::NAN)
}

/// CSV/TSV-style parser over a fixed delimiter.
pub struct DelimitedParser {
    delimiter: char,
    label_idx: usize,
}

impl DelimitedParser {
    pub fn csv(label_idx: usize) -> Self {
        Self {
            delimiter: ',',
            label_idx,
        }
    }

    pub fn tsv(label_idx: usize) -> Self {
        Self {
            delimiter: '\t',
            label_idx,
        }
    }
}

impl Parser for DelimitedParser {
    fn parse_one_line(&self, line: &str, out_pairs: &mut Vec<(usize, f64)>, out_label: &mut f64) {
        out_pairs.clear();
        for (j, token) in line.split(self.delimiter).enumerate() {
            if j == self.label_idx {
                *out_label = parse_value(token);
            } else {
                let column = if j > self.label_idx { j - 1 } else { j };
                out_pairs.push((column, parse_value(token)));
            }
        }
    }
}

/// LibSVM-style parser: a leading label token followed by `index:value`
/// pairs. Feature indices are used as written; the label is its own token,
/// so no index shift applies.
pub struct LibSvmParser;

impl Parser for LibSvmParser {
    fn parse_one_line(&self, line: &str, out_pairs: &mut Vec<(usize, f64)>, out_label: &mut f64) {
        out_pairs.clear();
        let mut tokens = line.split_whitespace();
        *out_label = tokens.next().map_or(f64::NAN, parse_value);
        for token in tokens {
            let Some((idx, value)) = token.split_once(':') else {
                continue;
            };
            let Ok(column) = idx.trim().parse::<usize>() else {
                continue;
            };
            out_pairs.push((column, parse_value(value)));
        }
    }
}

/// Inspect the first data line of `path` and build a matching parser.
pub fn create_parser(
    path: &Path,
    has_header: bool,
    label_idx: usize,
) -> Result<Box<dyn Parser>, LoadError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = String::new();
    if has_header {
        reader.read_line(&mut line)?;
    }
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let probe = line.trim();
        if probe.is_empty() {
            continue;
        }

        let mut tokens = probe.split_whitespace();
        let _leading = tokens.next();
        if tokens.clone().next().is_some() && tokens.all(|t| t.contains(':')) {
            info!("recognized {} as libsvm", path.display());
            return Ok(Box::new(LibSvmParser));
        }
        if probe.contains('\t') {
            info!("recognized {} as tsv", path.display());
            return Ok(Box::new(DelimitedParser::tsv(label_idx)));
        }
        if probe.contains(',') {
            info!("recognized {} as csv", path.display());
            return Ok(Box::new(DelimitedParser::csv(label_idx)));
        }
        if probe.parse::<f64>().is_ok() {
            // Single-column file: the label alone.
            return Ok(Box::new(DelimitedParser::csv(label_idx)));
        }
        break;
    }
    Err(LoadError::UnrecognizedFormat {
        path: path.to_path_buf(),
    })
}
