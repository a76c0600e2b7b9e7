//! Configuration settings for the attack tree engine

use crate::synthesis::SynthesisOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub solver: SolverConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Per-check limit; 0 disables it
    pub timeout_seconds: u64,
    /// Largest trace-length bound to explore; defaults to the leaf count
    pub max_bound: Option<usize>,
    pub parallel_bounds: bool,
    pub minimize_cores: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub tree_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub output_directory: PathBuf,
    pub save_schedule: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            solver: SolverConfig {
                timeout_seconds: 300,
                max_bound: None,
                parallel_bounds: false,
                minimize_cores: true,
            },
            input: InputConfig {
                tree_file: PathBuf::from("input/trees/paper.yaml"),
            },
            output: OutputConfig {
                format: OutputFormat::Text,
                output_directory: PathBuf::from("output/schedules"),
                save_schedule: false,
            },
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a YAML file
    pub fn to_file(&self, path: &PathBuf) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize settings")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.output.output_directory.as_os_str().is_empty() {
            anyhow::bail!("Output directory must not be empty");
        }

        if self.input.tree_file.as_os_str().is_empty() {
            anyhow::bail!("Tree file must not be empty");
        }

        Ok(())
    }

    /// Check that the configured tree file is present
    pub fn ensure_tree_file(&self) -> Result<()> {
        if !self.input.tree_file.exists() {
            anyhow::bail!("Tree file does not exist: {}", self.input.tree_file.display());
        }
        Ok(())
    }

    /// Merge settings with command line overrides
    pub fn merge_with_cli(&mut self, cli_overrides: &CliOverrides) {
        if let Some(timeout) = cli_overrides.timeout_seconds {
            self.solver.timeout_seconds = timeout;
        }
        if let Some(max_bound) = cli_overrides.max_bound {
            self.solver.max_bound = Some(max_bound);
        }
        if cli_overrides.parallel {
            self.solver.parallel_bounds = true;
        }
        if let Some(ref tree_file) = cli_overrides.tree_file {
            self.input.tree_file = tree_file.clone();
        }
        if let Some(ref output_dir) = cli_overrides.output_dir {
            self.output.output_directory = output_dir.clone();
        }
        if let Some(format) = cli_overrides.format {
            self.output.format = format;
        }
        if cli_overrides.save {
            self.output.save_schedule = true;
        }
    }
}

impl From<&Settings> for SynthesisOptions {
    fn from(settings: &Settings) -> Self {
        let timeout = match settings.solver.timeout_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };
        SynthesisOptions {
            timeout,
            max_bound: settings.solver.max_bound,
            parallel: settings.solver.parallel_bounds,
            minimize_cores: settings.solver.minimize_cores,
        }
    }
}

/// Command line overrides for settings
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub timeout_seconds: Option<u64>,
    pub max_bound: Option<usize>,
    pub parallel: bool,
    pub tree_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub save: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_through_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut settings = Settings::default();
        settings.solver.max_bound = Some(4);
        settings.output.format = OutputFormat::Json;
        settings.to_file(&path).unwrap();

        let loaded = Settings::from_file(&path).unwrap();
        assert_eq!(loaded.solver.max_bound, Some(4));
        assert_eq!(loaded.output.format, OutputFormat::Json);
        assert_eq!(loaded.solver.timeout_seconds, 300);
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "solver: [not, a, map]").unwrap();

        let error = Settings::from_file(&path).unwrap_err();
        assert!(error.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_cli_overrides() {
        let mut settings = Settings::default();
        settings.merge_with_cli(&CliOverrides {
            timeout_seconds: Some(0),
            max_bound: Some(2),
            parallel: true,
            tree_file: Some(PathBuf::from("trees/custom.json")),
            format: Some(OutputFormat::Json),
            ..CliOverrides::default()
        });

        assert_eq!(settings.input.tree_file, PathBuf::from("trees/custom.json"));
        assert_eq!(settings.output.format, OutputFormat::Json);
        assert!(!settings.output.save_schedule);

        let options = SynthesisOptions::from(&settings);
        assert_eq!(options.timeout, None);
        assert_eq!(options.max_bound, Some(2));
        assert!(options.parallel);
        assert!(options.minimize_cores);
    }

    #[test]
    fn test_timeout_conversion() {
        let options = SynthesisOptions::from(&Settings::default());
        assert_eq!(options.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_missing_tree_file() {
        let mut settings = Settings::default();
        settings.input.tree_file = PathBuf::from("/definitely/not/here.yaml");
        assert!(settings.validate().is_ok());
        assert!(settings.ensure_tree_file().is_err());
    }
}
