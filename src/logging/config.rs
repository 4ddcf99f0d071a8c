//! Logging configuration: per-component levels and output destinations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file location in logs (impacts performance)
    pub include_file_location: bool,

    /// Solver-boundary log level
    pub solver_level: String,

    /// Session/controller log level
    pub session_level: String,

    /// Suggestion-workflow log level
    pub suggestion_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
            solver_level: "info".to_string(),
            session_level: "info".to_string(),
            suggestion_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration for development sessions
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            solver_level: "trace".to_string(),
            session_level: "debug".to_string(),
            suggestion_level: "debug".to_string(),
        }
    }

    /// Low-overhead configuration for deployed hosts
    pub fn production() -> Self {
        Self {
            global_level: "warn".to_string(),
            console_output: false,
            log_directory: Some(PathBuf::from("/var/log/model-registration")),
            include_file_location: false,
            solver_level: "info".to_string(),
            session_level: "info".to_string(),
            suggestion_level: "warn".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];

        for (name, level) in [
            ("global_level", &self.global_level),
            ("solver_level", &self.solver_level),
            ("session_level", &self.session_level),
            ("suggestion_level", &self.suggestion_level),
        ] {
            if !valid_levels.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, valid_levels
                ));
            }
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// Effective level for one component
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "solver" | "client" => &self.solver_level,
            "session" | "controller" => &self.session_level,
            "suggestion" => &self.suggestion_level,
            _ => &self.global_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.global_level, "info");
        assert!(config.console_output);
        assert!(config.log_directory.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.solver_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_component_level_selection() {
        let config = LoggingConfig::development();
        assert_eq!(config.get_component_level("solver"), "trace");
        assert_eq!(config.get_component_level("session"), "debug");
        assert_eq!(config.get_component_level("unknown"), "debug");
    }
}
