//! Text and binary input/output.

pub mod binary;
pub(crate) mod bytes;
pub mod parser;
pub mod text_reader;

pub use binary::{binary_path, check_can_load_from_bin};
pub use parser::{create_parser, DelimitedParser, LibSvmParser, Parser};
pub use text_reader::TextReader;
