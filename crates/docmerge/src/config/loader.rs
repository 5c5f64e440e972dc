use std::path::Path;

use crate::config::schema::RunConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/run-config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<RunConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: RunConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.max_file_size_kb == 0 {
        return Err(ConfigError::Validation {
            message: "max_file_size_kb must be greater than zero".to_string(),
        });
    }

    if config.email.max_output_file_mb == 0 {
        return Err(ConfigError::Validation {
            message: "email.max_output_file_mb must be greater than zero".to_string(),
        });
    }

    // Output names are built as `{group}_{prefix}{n}.txt` directly inside the
    // processed directory.
    let prefix = &config.email.batch_name_prefix;
    if prefix.is_empty() || prefix.contains(['/', '\\']) {
        return Err(ConfigError::Validation {
            message: format!("Invalid email.batch_name_prefix: '{}'", prefix),
        });
    }

    let subdirs = [
        ("processed_subdir", &config.output.processed_subdir),
        ("unprocessed_subdir", &config.output.unprocessed_subdir),
        ("failed_subdir", &config.output.failed_subdir),
        ("logs_subdir", &config.output.logs_subdir),
    ];
    for (name, value) in subdirs {
        if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
            return Err(ConfigError::Validation {
                message: format!("output.{} must be a plain directory name, got '{}'", name, value),
            });
        }
    }

    Ok(())
}
