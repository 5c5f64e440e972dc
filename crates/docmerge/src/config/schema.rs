use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Word-count ceiling for every produced batch. Not configurable.
pub const MAX_BATCH_WORDS: usize = 50_000;

/// Conversions faster than this are never cut off, whatever the config says.
pub const MIN_CONVERT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_file_size_kb")]
    pub max_file_size_kb: u64,
    #[serde(default = "default_max_output_files")]
    pub max_output_files: usize,
    #[serde(default = "default_true")]
    pub process_pdfs: bool,
    #[serde(default = "default_true")]
    pub process_word_documents: bool,
    #[serde(default = "default_true")]
    pub process_emails: bool,
    #[serde(default = "default_true")]
    pub process_zip_archives: bool,
    #[serde(default)]
    pub zip: ZipConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub relocation: RelocationConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub word: WordConfig,
}

fn default_max_file_size_kb() -> u64 {
    102_400
}

fn default_max_output_files() -> usize {
    300
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_file_size_kb: default_max_file_size_kb(),
            max_output_files: default_max_output_files(),
            process_pdfs: true,
            process_word_documents: true,
            process_emails: true,
            process_zip_archives: true,
            zip: ZipConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
            relocation: RelocationConfig::default(),
            email: EmailConfig::default(),
            word: WordConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn max_batch_bytes(&self) -> u64 {
        self.max_file_size_kb.saturating_mul(1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipConfig {
    #[serde(default = "default_zip_filename_length")]
    pub max_filename_length: usize,
    #[serde(default = "default_true")]
    pub include_extension_in_limit: bool,
    #[serde(default = "default_nested_depth_limit")]
    pub nested_depth_limit: usize,
    /// Cumulative byte budget per top-level archive. Zero disables both the
    /// budget and the compression-ratio check.
    #[serde(default = "default_max_extract_bytes")]
    pub max_extract_bytes: u64,
}

fn default_zip_filename_length() -> usize {
    50
}

fn default_nested_depth_limit() -> usize {
    1
}

fn default_max_extract_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

impl Default for ZipConfig {
    fn default() -> Self {
        Self {
            max_filename_length: default_zip_filename_length(),
            include_extension_in_limit: true,
            nested_depth_limit: default_nested_depth_limit(),
            max_extract_bytes: default_max_extract_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    #[default]
    Structured,
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub layout: OutputLayout,
    #[serde(default = "default_processed_subdir")]
    pub processed_subdir: String,
    #[serde(default = "default_unprocessed_subdir")]
    pub unprocessed_subdir: String,
    #[serde(default = "default_failed_subdir")]
    pub failed_subdir: String,
    #[serde(default = "default_logs_subdir")]
    pub logs_subdir: String,
}

fn default_processed_subdir() -> String {
    "processed".to_string()
}

fn default_unprocessed_subdir() -> String {
    "unprocessed".to_string()
}

fn default_failed_subdir() -> String {
    "failed".to_string()
}

fn default_logs_subdir() -> String {
    "logs".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            layout: OutputLayout::default(),
            processed_subdir: default_processed_subdir(),
            unprocessed_subdir: default_unprocessed_subdir(),
            failed_subdir: default_failed_subdir(),
            logs_subdir: default_logs_subdir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    #[default]
    Redacted,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub detailed: bool,
    #[serde(default)]
    pub privacy_mode: PrivacyMode,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            detailed: true,
            privacy_mode: PrivacyMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferAction {
    #[default]
    Copy,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactAction {
    #[default]
    Copy,
    Move,
    MetadataOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocationConfig {
    #[serde(default = "default_true")]
    pub include_source_files: bool,
    #[serde(default = "default_true")]
    pub relocate_input_files: bool,
    #[serde(default)]
    pub input_action: TransferAction,
    #[serde(default = "default_true")]
    pub include_failed_artifacts: bool,
    #[serde(default)]
    pub failed_artifact_action: ArtifactAction,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            include_source_files: true,
            relocate_input_files: true,
            input_action: TransferAction::default(),
            include_failed_artifacts: true,
            failed_artifact_action: ArtifactAction::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailOutputMode {
    #[default]
    SizeBatched,
    Threaded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub output_mode: EmailOutputMode,
    #[serde(default = "default_email_max_output_file_mb")]
    pub max_output_file_mb: u64,
    #[serde(default = "default_true")]
    pub include_attachment_index: bool,
    #[serde(default = "default_email_batch_name_prefix")]
    pub batch_name_prefix: String,
}

fn default_email_max_output_file_mb() -> u64 {
    25
}

fn default_email_batch_name_prefix() -> String {
    "emails_batch".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            output_mode: EmailOutputMode::default(),
            max_output_file_mb: default_email_max_output_file_mb(),
            include_attachment_index: true,
            batch_name_prefix: default_email_batch_name_prefix(),
        }
    }
}

impl EmailConfig {
    pub fn max_batch_bytes(&self) -> u64 {
        self.max_output_file_mb.saturating_mul(1024 * 1024)
    }
}

/// How Word documents are turned into batch outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordOutputMode {
    /// Convert to PDF when a converter is available, otherwise merge as DOCX.
    #[default]
    Auto,
    /// Convert to PDF; a missing converter is fatal.
    Pdf,
    /// Merge the documents' bodies into DOCX batches.
    Docx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordConfig {
    #[serde(default)]
    pub output_mode: WordOutputMode,
    #[serde(default = "default_convert_timeout_seconds")]
    pub convert_timeout_seconds: u64,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default)]
    pub converter_program: Option<PathBuf>,
}

fn default_convert_timeout_seconds() -> u64 {
    120
}

fn default_progress_interval() -> usize {
    10
}

impl Default for WordConfig {
    fn default() -> Self {
        Self {
            output_mode: WordOutputMode::default(),
            convert_timeout_seconds: default_convert_timeout_seconds(),
            progress_interval: default_progress_interval(),
            converter_program: None,
        }
    }
}

impl WordConfig {
    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_seconds.max(MIN_CONVERT_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_matches_default() {
        let parsed: RunConfig = serde_json::from_str("{}").unwrap();
        let default = RunConfig::default();

        assert_eq!(parsed.max_file_size_kb, default.max_file_size_kb);
        assert_eq!(parsed.max_output_files, 300);
        assert!(parsed.process_zip_archives);
        assert_eq!(parsed.zip.max_filename_length, 50);
        assert_eq!(parsed.zip.nested_depth_limit, 1);
        assert_eq!(parsed.zip.max_extract_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(parsed.output.layout, OutputLayout::Structured);
        assert_eq!(parsed.logging.privacy_mode, PrivacyMode::Redacted);
        assert_eq!(parsed.relocation.input_action, TransferAction::Copy);
        assert_eq!(parsed.email.batch_name_prefix, "emails_batch");
        assert_eq!(parsed.word.output_mode, WordOutputMode::Auto);
    }

    #[test]
    fn test_enum_spellings() {
        let json = r#"{
            "output": { "layout": "flat" },
            "logging": { "privacy_mode": "full" },
            "relocation": { "input_action": "move", "failed_artifact_action": "metadata_only" },
            "email": { "output_mode": "threaded" },
            "word": { "output_mode": "docx" }
        }"#;
        let parsed: RunConfig = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.output.layout, OutputLayout::Flat);
        assert_eq!(parsed.logging.privacy_mode, PrivacyMode::Full);
        assert_eq!(parsed.relocation.input_action, TransferAction::Move);
        assert_eq!(
            parsed.relocation.failed_artifact_action,
            ArtifactAction::MetadataOnly
        );
        assert_eq!(parsed.email.output_mode, EmailOutputMode::Threaded);
        assert_eq!(parsed.word.output_mode, WordOutputMode::Docx);
    }

    #[test]
    fn test_convert_timeout_has_floor() {
        let word = WordConfig {
            convert_timeout_seconds: 2,
            ..WordConfig::default()
        };
        assert_eq!(word.convert_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_byte_caps() {
        let config = RunConfig {
            max_file_size_kb: 1024,
            ..RunConfig::default()
        };
        assert_eq!(config.max_batch_bytes(), 1024 * 1024);
        assert_eq!(config.email.max_batch_bytes(), 25 * 1024 * 1024);
    }
}
