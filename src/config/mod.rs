use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(Default)]
pub struct RegistrationConfig {
    pub solver: SolverConfig,
    pub gate: GateConfig,
    pub display: DisplayConfig,
    pub suggestion: SuggestionConfig,
}

/// Endpoint and profile facts for the external solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub profile: String,
    pub device_profile: String,
}

/// Commit-gate thresholds, in the solver's original model units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub overlap_min: f64,
    pub center_distance_max: f64,
    pub rmse_max: f64,
}

/// Display canonicalization facts shared by every loaded model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Edge of the fixed viewing volume models are normalized into.
    pub canonical_size: f64,
    /// Pick tolerance around a ray, in display units.
    pub pick_radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionConfig {
    pub default_num_pairs: usize,
    /// Vertex step for the preview-quality nearest-vertex search.
    pub snap_subsample_stride: usize,
    pub mode: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            request_timeout_secs: 120,
            profile: "default".to_string(),
            device_profile: "desktop".to_string(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            overlap_min: 0.18,
            center_distance_max: 40.0,
            rmse_max: 3.0,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            canonical_size: 3.0,
            pick_radius: 0.05,
        }
    }
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            default_num_pairs: 3,
            snap_subsample_stride: 16,
            mode: "auto".to_string(),
        }
    }
}

impl RegistrationConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;

        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        format: ConfigFormat,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.solver.base_url.is_empty() {
            errors.push("Solver base_url must not be empty".to_string());
        }

        if self.solver.request_timeout_secs == 0 {
            errors.push("Solver request_timeout_secs must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.gate.overlap_min) {
            errors.push("Gate overlap_min must be within [0, 1]".to_string());
        }

        if self.gate.center_distance_max <= 0.0 {
            errors.push("Gate center_distance_max must be positive".to_string());
        }

        if self.gate.rmse_max <= 0.0 {
            errors.push("Gate rmse_max must be positive".to_string());
        }

        if self.display.canonical_size <= 0.0 {
            errors.push("Display canonical_size must be positive".to_string());
        }

        if self.display.pick_radius <= 0.0 {
            errors.push("Display pick_radius must be positive".to_string());
        }

        if self.suggestion.default_num_pairs < 3 {
            errors.push("Suggestion default_num_pairs must be at least 3".to_string());
        }

        if self.suggestion.snap_subsample_stride == 0 {
            errors.push("Suggestion snap_subsample_stride must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigFormat {
    Json,
    Toml,
}

pub fn load_config_or_default(config_path: Option<&str>) -> RegistrationConfig {
    match config_path {
        Some(path) => match RegistrationConfig::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    for error in &errors {
                        tracing::warn!(error = %error, "configuration validation error");
                    }
                    tracing::warn!("using default configuration instead");
                    RegistrationConfig::default()
                } else {
                    config
                }
            }
            Err(e) => {
                tracing::warn!(path = path, error = %e, "failed to load config, using defaults");
                RegistrationConfig::default()
            }
        },
        None => RegistrationConfig::default(),
    }
}
