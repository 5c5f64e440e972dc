pub mod analyzer;
pub mod archive;
pub mod config;
pub mod convert;
pub mod email;
pub mod error;
pub mod ledger;
pub mod manifest;
pub mod packer;
pub mod pipeline;
pub mod processor;
pub mod runlog;
pub mod sanitize;
pub mod storage;
pub mod telemetry;
pub mod tempdirs;

pub use config::{load_config, load_config_from_str, RunConfig};
pub use convert::{DocumentConverter, SofficeConverter};
pub use error::{ArchiveError, ConfigError, ConvertError, DocmergeError, ProcessError, Result, StorageError};
pub use ledger::{Ledger, Warning, WarningKind};
pub use manifest::Manifest;
pub use pipeline::{CancelFlag, MergeOrchestrator, ProgressEvent, ProgressReporter, RunState};
pub use telemetry::{init_tracing, LogFormat};
