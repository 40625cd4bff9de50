//! Complete run description: simulation window, strategies, timing signal.

use anyhow::{anyhow, Context, Result};
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::output::SimulationResult;
use crate::engine::simulator::{SimulationConfig, Simulator, TimingEntry, TimingSignal};
use crate::engine::timeline::ChainTimeline;
use crate::strategies::{Strategy, StrategySpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RunConfig {
    #[garde(dive)]
    pub simulation: SimulationConfig,
    /// Strategies, indexed from 0 by the timing signal
    #[garde(length(min = 1), dive)]
    pub strategies: Vec<StrategySpec>,
    /// Switch points; strategy 0 runs when empty
    #[serde(default)]
    #[garde(skip)]
    pub timing_signal: Vec<TimingEntry>,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse run configuration")?;
        config
            .validate()
            .map_err(|e| anyhow!("Validation error: {e}"))?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid run file {}", path.display()))
    }

    pub fn build_strategies(&self) -> Vec<Box<dyn Strategy>> {
        self.strategies.iter().map(StrategySpec::build).collect()
    }

    pub fn timing(&self) -> Option<TimingSignal> {
        (!self.timing_signal.is_empty()).then(|| TimingSignal::from(self.timing_signal.as_slice()))
    }

    /// Build fresh strategies and simulate them over `timeline`.
    pub fn run(&self, timeline: &ChainTimeline) -> Result<SimulationResult> {
        let mut simulator = Simulator::new(timeline, self.build_strategies(), self.timing())?;
        Ok(simulator.run(&self.simulation)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const RUN: &str = r#"
[simulation]
start = "2024-04-01T00:00:00"
end = "2024-04-08T00:00:00"
time_step = "1d"
starting_capital = 50000.0

[simulation.surface]
default_iv = 0.8

[[strategies]]
strategy = "option_selling"
trade_interval = "1d"
option_type = "put"

[[strategies]]
strategy = "married_put"
trade_interval = "7d"

[[timing_signal]]
time = "2024-04-03T00:00:00"
strategy = 1
"#;

    #[test]
    fn parses_full_run_file() {
        let config = RunConfig::from_toml_str(RUN).unwrap();
        assert_eq!(config.simulation.time_step, TimeDelta::days(1));
        assert_eq!(config.simulation.starting_capital, 50_000.0);
        assert_eq!(config.simulation.surface.default_iv, 0.8);
        assert_eq!(config.simulation.surface.iv_margin, 1.25);
        assert_eq!(config.strategies.len(), 2);
        assert_eq!(config.strategies[1].name(), "married_put");
        let timing = config.timing().unwrap();
        assert_eq!(timing.strategy_at(config.simulation.start), 0);
        assert_eq!(timing.strategy_at(config.simulation.end), 1);
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let config = RunConfig::from_toml_str(
            r#"
[simulation]
start = "2024-04-01T00:00:00"
end = "2024-04-02T00:00:00"

[[strategies]]
strategy = "iron_condor"
trade_interval = "1d"
"#,
        )
        .unwrap();
        assert_eq!(config.simulation.time_step, TimeDelta::hours(1));
        assert_eq!(config.simulation.starting_capital, 1_000_000.0);
        assert!(config.timing().is_none());
    }

    #[test]
    fn rejects_empty_strategy_list() {
        let err = RunConfig::from_toml_str(
            r#"
strategies = []

[simulation]
start = "2024-04-01T00:00:00"
end = "2024-04-02T00:00:00"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Validation error"));
    }

    #[test]
    fn rejects_malformed_duration() {
        let err = RunConfig::from_toml_str(
            r#"
[simulation]
start = "2024-04-01T00:00:00"
end = "2024-04-02T00:00:00"
time_step = "soon"

[[strategies]]
strategy = "married_put"
trade_interval = "1d"
"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, RUN).unwrap();
        assert_eq!(RunConfig::from_toml_file(&path).unwrap().strategies.len(), 2);
        assert!(RunConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    }
}
