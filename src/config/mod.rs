//! Configuration management for the attack tree engine

pub mod settings;

pub use settings::{CliOverrides, InputConfig, OutputConfig, OutputFormat, Settings, SolverConfig};
