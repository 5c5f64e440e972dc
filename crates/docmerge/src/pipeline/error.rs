use std::path::PathBuf;

use thiserror::Error;

/// Causes that stop a run. Anything recoverable goes to the ledger instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(
        "Output file limit exceeded before processing {context}: requires {required} file(s), \
         but only {remaining} slot(s) remain (max_output_files={max})."
    )]
    CapacityExceeded {
        context: String,
        required: usize,
        remaining: usize,
        max: usize,
    },

    #[error("Word document processing requires a document converter. Details: {reason}")]
    ConverterUnavailable { reason: String },

    #[error("Input path must exist and be accessible.")]
    InvalidInput { path: PathBuf },

    #[error("Input path must be a folder or .zip file.")]
    InputNotArchive { path: PathBuf },

    #[error("Unable to generate a unique group name for ZIP archive '{0}'")]
    GroupNamesExhausted(PathBuf),

    #[error("Document processing failed: {0}")]
    Processing(#[from] crate::error::ProcessError),

    #[error("Storage failed: {0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("Archive expansion failed: {0}")]
    Archive(#[from] crate::error::ArchiveError),

    #[error("Conversion failed: {0}")]
    Convert(#[from] crate::error::ConvertError),

    #[error("Processing group '{group}' panicked: {message}")]
    Panicked { group: String, message: String },
}
