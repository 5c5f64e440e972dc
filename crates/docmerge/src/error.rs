use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineError;

#[derive(Error, Debug)]
pub enum DocmergeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{source}\nRun log: {}\nManifest: {}", log_path.display(), manifest_path.display())]
    Run {
        #[source]
        source: PipelineError,
        log_path: PathBuf,
        manifest_path: PathBuf,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process DOCX: {0}")]
    DocxProcessing(String),

    #[error("Failed to process image: {0}")]
    ImageProcessing(String),

    #[error("Failed to parse email: {0}")]
    EmailParse(String),

    #[error("Text extraction failed: {0}")]
    TextExtraction(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to allocate a unique destination for '{0}'")]
    FileExists(PathBuf),

    #[error("Failed to create temporary directory '{prefix}': {source}")]
    TempDir {
        prefix: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to open archive '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to read archive entry {index} of '{path}': {source}")]
    Read {
        path: PathBuf,
        index: usize,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Unable to resolve ZIP filename collisions for '{0}'")]
    NameSpaceExhausted(String),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Document converter unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Conversion timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Conversion failed: {0}")]
    Failed(String),

    #[error("Failed to launch converter '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DocmergeError>;
