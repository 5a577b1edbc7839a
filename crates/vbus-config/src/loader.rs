//! Scenario loader with multi-source merging

use crate::ConfigError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use vbus_sim::Scenario;

/// Path of the gitignored override that sits next to a scenario file.
///
/// `bench/highway.toml` is overridden by `bench/highway.local.toml`.
pub fn local_override_path(scenario_file: impl AsRef<Path>) -> PathBuf {
    let path = scenario_file.as_ref();
    let stem = path
        .file_stem()
        .map_or_else(|| "scenario".to_string(), |s| s.to_string_lossy().into_owned());
    path.with_file_name(format!("{stem}.local.toml"))
}

/// Scenario loader with builder pattern
pub struct ScenarioLoader {
    scenario_file: PathBuf,
    env_prefix: String,
    env_source: Option<config::Map<String, String>>,
    seed: Option<u64>,
}

impl ScenarioLoader {
    /// Create a loader for the scenario at `scenario_file`
    pub fn new(scenario_file: impl AsRef<Path>) -> Self {
        Self {
            scenario_file: scenario_file.as_ref().to_path_buf(),
            env_prefix: "VBUS".to_string(),
            env_source: None,
            seed: None,
        }
    }

    /// Set the environment variable prefix (default: "VBUS")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read overrides from `vars` instead of the process environment
    pub fn with_environment(mut self, vars: config::Map<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Override the seed after all other sources are merged
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Load the scenario from all sources with proper precedence, then validate it
    pub fn load(self) -> Result<Scenario> {
        let scenario_file = self.scenario_file.clone();
        let scenario = self.load_unvalidated()?;
        scenario
            .validate()
            .map_err(ConfigError::from)
            .with_context(|| format!("Scenario {} is invalid", scenario_file.display()))?;
        Ok(scenario)
    }

    /// Merge all sources without running scenario validation
    pub fn load_unvalidated(self) -> Result<Scenario> {
        if !self.scenario_file.exists() {
            return Err(ConfigError::NotFound {
                path: self.scenario_file,
            }
            .into());
        }

        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = Scenario::default();
        builder = builder.add_source(
            config::Config::try_from(&defaults).context("Failed to encode scenario defaults")?,
        );

        // 2. Scenario file
        debug!(path = %self.scenario_file.display(), "loading scenario file");
        builder = builder.add_source(
            config::File::from(self.scenario_file.clone())
                .required(true)
                .format(config::FileFormat::Toml),
        );

        // 3. Local override (<stem>.local.toml, gitignored)
        let local_file = local_override_path(&self.scenario_file);
        if local_file.exists() {
            debug!(path = %local_file.display(), "applying local scenario override");
            builder = builder.add_source(
                config::File::from(local_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Environment variables (VBUS__SEED, VBUS__ANALYZER__WINDOW_NS, ...)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(self.env_source),
        );

        let merged = builder.build().with_context(|| {
            format!(
                "Failed to build scenario from {}",
                self.scenario_file.display()
            )
        })?;

        let mut scenario: Scenario = merged
            .try_deserialize()
            .context("Failed to deserialize scenario")?;

        // 5. Command-line seed
        if let Some(seed) = self.seed {
            scenario.seed = seed;
        }

        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use vbus_sim::{ClockMode, DEFAULT_DURATION_NS, FaultType, PayloadGenerator};

    const MINIMAL: &str = r#"
name = "minimal"

[[nodes]]
id = 1
name = "engine"

[[nodes.messages]]
arbitration_id = 0x100
period_ns = 10_000_000
"#;

    fn env(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn loader(path: &Path) -> ScenarioLoader {
        // Isolate every test from the process environment.
        ScenarioLoader::new(path).with_environment(config::Map::new())
    }

    #[test]
    fn test_local_override_path() {
        assert_eq!(
            local_override_path("bench/highway.toml"),
            PathBuf::from("bench/highway.local.toml")
        );
    }

    #[test]
    fn test_missing_file_is_reported() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let err = loader(&temp_dir.path().join("absent.toml"))
            .load()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn test_defaults_fill_unset_fields() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("minimal.toml");
        fs::write(&path, MINIMAL).expect("Failed to write scenario");

        let scenario = loader(&path).load().expect("Failed to load scenario");

        assert_eq!(scenario.name, "minimal");
        assert_eq!(scenario.seed, 0);
        assert_eq!(scenario.duration_ns, DEFAULT_DURATION_NS);
        assert_eq!(scenario.clock, ClockMode::Step);
        assert_eq!(scenario.nodes.len(), 1);
        let message = &scenario.nodes[0].messages[0];
        assert_eq!(message.arbitration_id.as_raw(), 0x100);
        assert_eq!(message.payload, PayloadGenerator::default());
        assert!(message.enabled);
    }

    #[test]
    fn test_full_scenario_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("full.toml");
        fs::write(
            &path,
            r#"
name = "full"
seed = 99
duration_ns = 2_000_000_000

[clock.scaled]
factor = 4.0

[analyzer]
window_ns = 500_000_000
enable_counter_detection = false

[[nodes]]
id = 7
name = "climate"

[[nodes.messages]]
arbitration_id = 0x124
period_ns = 100_000_000
jitter_ns = 2_000_000
payload = { kind = "temperature", len = 4 }

[[faults]]
fault_type = "burst"
probability = 0.05
count = 3
interval_ns = 1_000_000
target_ids = [0x124]

[[expectations]]
arbitration_id = 0x124
period_ns = 100_000_000
tolerance_percent = 10.0
"#,
        )
        .expect("Failed to write scenario");

        let scenario = loader(&path).load().expect("Failed to load scenario");

        assert_eq!(scenario.seed, 99);
        assert_eq!(scenario.clock, ClockMode::Scaled { factor: 4.0 });
        assert_eq!(scenario.analyzer.window_ns, 500_000_000);
        assert!(!scenario.analyzer.enable_counter_detection);
        assert!(scenario.analyzer.enable_deadline_detection);
        assert_eq!(scenario.faults[0].fault_type, FaultType::Burst);
        assert_eq!(scenario.faults[0].count, Some(3));
        assert_eq!(scenario.expectations[0].tolerance_percent, 10.0);
        assert!(matches!(
            scenario.nodes[0].messages[0].payload,
            PayloadGenerator::Temperature { len: 4, .. }
        ));
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bench.toml");
        fs::write(&path, MINIMAL).expect("Failed to write scenario");
        fs::write(
            temp_dir.path().join("bench.local.toml"),
            "seed = 1234\nduration_ns = 5_000_000\n",
        )
        .expect("Failed to write local override");

        let scenario = loader(&path).load().expect("Failed to load scenario");

        assert_eq!(scenario.seed, 1234);
        assert_eq!(scenario.duration_ns, 5_000_000);
        assert_eq!(scenario.name, "minimal");
    }

    #[test]
    fn test_environment_overrides_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("env.toml");
        fs::write(&path, MINIMAL).expect("Failed to write scenario");
        fs::write(temp_dir.path().join("env.local.toml"), "seed = 5\n")
            .expect("Failed to write local override");

        let scenario = ScenarioLoader::new(&path)
            .with_environment(env(&[
                ("VBUS__SEED", "42"),
                ("VBUS__ANALYZER__WINDOW_NS", "250000000"),
                ("OTHER__SEED", "7"),
            ]))
            .load()
            .expect("Failed to load scenario");

        assert_eq!(scenario.seed, 42);
        assert_eq!(scenario.analyzer.window_ns, 250_000_000);
    }

    #[test]
    fn test_seed_argument_has_highest_precedence() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seeded.toml");
        fs::write(&path, MINIMAL).expect("Failed to write scenario");

        let scenario = ScenarioLoader::new(&path)
            .with_environment(env(&[("VBUS__SEED", "42")]))
            .with_seed(Some(7))
            .load()
            .expect("Failed to load scenario");

        assert_eq!(scenario.seed, 7);
    }

    #[test]
    fn test_invalid_scenario_is_rejected_after_merge() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, MINIMAL).expect("Failed to write scenario");
        fs::write(
            temp_dir.path().join("bad.local.toml"),
            "duration_ns = 0\n",
        )
        .expect("Failed to write local override");

        let err = loader(&path).load().unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("duration_ns"), "{message}");

        // The unvalidated path still merges.
        let scenario = loader(&path).load_unvalidated().expect("merge succeeds");
        assert_eq!(scenario.duration_ns, 0);
    }
}
