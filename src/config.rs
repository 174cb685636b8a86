use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Lowering configuration with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringConfig {
    /// Pad expanded IN lists up to the next power of two so that statements
    /// with similar cardinalities share one SQL shape
    pub in_clause_parameter_padding: bool,

    /// Largest IN list the target database accepts; exceeding it only warns
    #[validate(range(
        min = 1,
        max = 65535,
        message = "IN expression count limit must be between 1 and 65535"
    ))]
    pub in_expression_count_limit: Option<u32>,

    /// Reuse one SQL selection for repeated expressions in the top-level
    /// select list
    pub deduplicate_selection_items: bool,

    /// Reference `e.assoc` and `e.assoc.id` through the owner's foreign key
    /// columns instead of joining the target table
    pub implicit_fk_optimization: bool,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            in_clause_parameter_padding: false,
            in_expression_count_limit: None,
            deduplicate_selection_items: true,
            implicit_fk_optimization: true,
        }
    }
}

impl LoweringConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let in_expression_count_limit = match env::var("SQM_LOWERING_IN_EXPRESSION_LIMIT") {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().parse().map_err(|e| ConfigError::Parse {
                field: "SQM_LOWERING_IN_EXPRESSION_LIMIT".to_string(),
                value,
                source: Box::new(e),
            })?),
            _ => None,
        };

        let config = Self {
            in_clause_parameter_padding: parse_env_var("SQM_LOWERING_IN_CLAUSE_PADDING", "false")?,
            in_expression_count_limit,
            deduplicate_selection_items: parse_env_var("SQM_LOWERING_DEDUPLICATE_SELECTIONS", "true")?,
            implicit_fk_optimization: parse_env_var("SQM_LOWERING_FK_OPTIMIZATION", "true")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply command-line flags over this configuration. Only flags that were
    /// given change anything.
    pub fn with_cli_overrides(mut self, cli: CliConfig) -> Result<Self, ConfigError> {
        if cli.in_clause_parameter_padding {
            self.in_clause_parameter_padding = true;
        }
        if cli.in_expression_count_limit.is_some() {
            self.in_expression_count_limit = cli.in_expression_count_limit;
        }
        if cli.no_selection_deduplication {
            self.deduplicate_selection_items = false;
        }
        if cli.no_fk_optimization {
            self.implicit_fk_optimization = false;
        }

        self.validate()?;
        Ok(self)
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

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    pub in_clause_parameter_padding: bool,
    pub in_expression_count_limit: Option<u32>,
    pub no_selection_deduplication: bool,
    pub no_fk_optimization: bool,
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

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for key in [
            "SQM_LOWERING_IN_EXPRESSION_LIMIT",
            "SQM_LOWERING_IN_CLAUSE_PADDING",
            "SQM_LOWERING_DEDUPLICATE_SELECTIONS",
            "SQM_LOWERING_FK_OPTIMIZATION",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = LoweringConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.in_clause_parameter_padding);
        assert!(config.deduplicate_selection_items);
        assert!(config.implicit_fk_optimization);
    }

    #[test]
    fn test_invalid_in_limit() {
        let config = LoweringConfig {
            in_expression_count_limit: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LoweringConfig {
            in_expression_count_limit: Some(1000),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("SQM_LOWERING_IN_CLAUSE_PADDING", "true");
        env::set_var("SQM_LOWERING_IN_EXPRESSION_LIMIT", "1000");

        let config = LoweringConfig::from_env().unwrap();
        assert!(config.in_clause_parameter_padding);
        assert_eq!(config.in_expression_count_limit, Some(1000));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        env::set_var("SQM_LOWERING_FK_OPTIMIZATION", "maybe");
        let err = LoweringConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_cli_flags_override_env() {
        clear_env();
        env::set_var("SQM_LOWERING_IN_CLAUSE_PADDING", "true");
        env::set_var("SQM_LOWERING_IN_EXPRESSION_LIMIT", "1000");

        let cli = CliConfig {
            in_expression_count_limit: Some(250),
            no_fk_optimization: true,
            ..CliConfig::default()
        };
        let config = LoweringConfig::from_env().unwrap().with_cli_overrides(cli).unwrap();
        // unset flags leave the environment's values alone
        assert!(config.in_clause_parameter_padding);
        assert!(config.deduplicate_selection_items);
        assert_eq!(config.in_expression_count_limit, Some(250));
        assert!(!config.implicit_fk_optimization);
        clear_env();
    }

    #[test]
    fn test_cli_override_is_validated() {
        let cli = CliConfig {
            in_expression_count_limit: Some(0),
            ..CliConfig::default()
        };
        let err = LoweringConfig::default().with_cli_overrides(cli).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "in_clause_parameter_padding: true\nin_expression_count_limit: 500").unwrap();

        let config = LoweringConfig::from_yaml_file(file.path()).unwrap();
        assert!(config.in_clause_parameter_padding);
        assert_eq!(config.in_expression_count_limit, Some(500));
        // unspecified keys keep their defaults
        assert!(config.deduplicate_selection_items);
    }

    #[test]
    fn test_yaml_validation_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "in_expression_count_limit: 70000").unwrap();
        let err = LoweringConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
