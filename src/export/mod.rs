//! The marketplace's CSV export in, the reconciled ledger table out.

use thiserror::Error;

pub mod reader;
pub mod writer;

pub use reader::{parse_export, read_export, ImportedExport, INPUT_COLUMNS};
pub use writer::{output_file_name, write_ledger, write_outputs, OutputPaths, OUTPUT_COLUMNS};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {message}")]
    InvalidRow { line: u64, message: String },
    #[error("json encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
