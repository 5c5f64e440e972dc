pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, validate_config};
pub use schema::{
    ArtifactAction, EmailConfig, EmailOutputMode, LoggingConfig, OutputConfig, OutputLayout,
    PrivacyMode, RelocationConfig, RunConfig, TransferAction, WordConfig, WordOutputMode,
    ZipConfig, MAX_BATCH_WORDS,
};
