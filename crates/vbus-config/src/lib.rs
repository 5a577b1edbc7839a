//! Scenario configuration for vbus
//!
//! Provides hierarchical scenario loading from multiple sources:
//! 1. `--seed` command-line argument (highest precedence)
//! 2. Environment variables (`VBUS__*`, `__` separates nested keys)
//! 3. `<stem>.local.toml` next to the scenario file (gitignored, local overrides)
//! 4. The scenario TOML file itself
//! 5. Built-in defaults (lowest precedence)
//!
//! The merged scenario is validated before it is returned, so a loaded
//! scenario can always be handed to `Simulation::new`.

use anyhow::Result;
use std::path::Path;
use vbus_sim::Scenario;

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::{ScenarioLoader, local_override_path};

/// Load and validate the scenario at `path` from default sources
pub fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario> {
    ScenarioLoader::new(path).load()
}

/// Parse a single TOML document as a scenario, without layering
pub fn parse_scenario(toml_text: &str) -> Result<Scenario, ConfigError> {
    let scenario: Scenario = toml::from_str(toml_text)?;
    scenario.validate()?;
    Ok(scenario)
}

/// Render a scenario as TOML
pub fn render_scenario(scenario: &Scenario) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(scenario)?)
}

/// Write a scenario as TOML to `path`
pub fn write_scenario(path: impl AsRef<Path>, scenario: &Scenario) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let text = render_scenario(scenario)?;
    std::fs::write(path, text).map_err(|source| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    })
}
