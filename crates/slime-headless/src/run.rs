use std::path::Path;

use serde::{Deserialize, Serialize};
use slime_core::DriverSettings;
use slime_params::SimulationConfig;

/// Contents of a run file. Every section is optional.
///
/// ```yaml
/// steps: 500
/// snapshot_every: 100
/// settings:
///   field_size: [512, 512]
///   agent_count: 50000
///   seed: 42
/// config:
///   a: { color: { r: 255, g: 0, b: 0 }, sample_angle: 0.785, sample_distance: 5.0, speed: 5.0,
///        interactions: { a: 1.0, b: -0.5, c: 0.0, alpha: 0.0 } }
///   ...
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub steps: u32,
    /// 0 disables snapshots
    pub snapshot_every: u32,
    pub metrics_every: u32,
    pub settings: DriverSettings,
    pub config: SimulationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: 1000,
            snapshot_every: 250,
            metrics_every: 10,
            settings: DriverSettings::default(),
            config: SimulationConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.settings.validate()?;
        if self.steps == 0 {
            anyhow::bail!("step count must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let run: RunConfig = serde_yaml::from_str("steps: 20\nsettings:\n  agent_count: 9\n").unwrap();
        assert_eq!(run.steps, 20);
        assert_eq!(run.settings.agent_count, 9);
        assert_eq!(run.settings.field_size, [1024, 1024]);
        assert_eq!(run.config, SimulationConfig::default());
        run.validate().unwrap();
    }

    #[test]
    fn species_section_parses() {
        let yaml = r#"
config:
  a: { color: { r: 255, g: 0, b: 0 }, sample_angle: 0.5, sample_distance: 9.0, speed: 2.0,
       interactions: { a: 1.0, b: -0.5, c: 0.0, alpha: 0.0 } }
  b: { color: { r: 0, g: 255, b: 0 }, sample_angle: 0.5, sample_distance: 9.0, speed: 2.0,
       interactions: { a: 0.0, b: 1.0, c: 0.0, alpha: 0.0 }, interactions_locked: false }
  c: { color: { r: 0, g: 0, b: 255 }, sample_angle: 0.5, sample_distance: 9.0, speed: 2.0,
       interactions: { a: 0.0, b: 0.0, c: 1.0, alpha: 0.0 } }
"#;
        let run: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(run.config.a.interactions.b, -0.5);
        assert_eq!(run.config.a.sample_distance, 9.0);
        assert!(!run.config.a.interactions_locked);
        assert!(!run.config.b.interactions_locked);
    }

    #[test]
    fn empty_population_or_field_is_rejected() {
        let mut run = RunConfig::default();
        run.settings.agent_count = 0;
        assert!(run.validate().is_err());

        let mut run = RunConfig::default();
        run.settings.field_size = [0, 0];
        let err = run.validate().unwrap_err();
        assert!(err.to_string().contains("field_size"), "{}", err);
    }

    #[test]
    fn zero_steps_is_rejected() {
        let run = RunConfig {
            steps: 0,
            ..Default::default()
        };
        assert!(run.validate().is_err());
    }
}
