use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Compiler configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Prefix shared by every alias allocated for one statement
    #[validate(length(min = 1, max = 8, message = "Alias prefix must be 1-8 characters"))]
    #[validate(custom(
        function = "validate_alias_prefix",
        message = "Alias prefix must start with a letter and contain only lowercase letters and digits"
    ))]
    pub alias_prefix: String,

    /// Maximum relationship nesting depth (selection and filter combined)
    #[validate(range(
        min = 1,
        max = 64,
        message = "Max nesting depth must be between 1 and 64"
    ))]
    pub max_nesting_depth: u32,

    /// Number of key/value pairs per json_build_object call.
    /// PostgreSQL caps function arguments at 100, i.e. 50 pairs.
    #[validate(range(
        min = 1,
        max = 50,
        message = "JSON object chunk size must be between 1 and 50"
    ))]
    pub json_chunk_size: usize,

    /// Whether `Name` may resolve to a property declared as `name` (and vice versa)
    pub case_fallback: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            alias_prefix: "t".to_string(),
            max_nesting_depth: 16,
            json_chunk_size: 50,
            case_fallback: true,
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            alias_prefix: env::var("NESTQL_ALIAS_PREFIX").unwrap_or_else(|_| "t".to_string()),
            max_nesting_depth: parse_env_var("NESTQL_MAX_NESTING_DEPTH", "16")?,
            json_chunk_size: parse_env_var("NESTQL_JSON_CHUNK_SIZE", "50")?,
            case_fallback: parse_env_var("NESTQL_CASE_FALLBACK", "true")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

fn validate_alias_prefix(prefix: &str) -> Result<(), ValidationError> {
    let mut chars = prefix.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    if !starts_with_letter
        || !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::new("alias_prefix"));
    }
    Ok(())
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
