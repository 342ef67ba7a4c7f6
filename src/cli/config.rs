// CLI Configuration - TOML simulation settings with CLI overrides
// Principle: Clear mapping between user input and internal configuration

use crate::governance::{GovernanceKind, GovernanceParams};
use crate::server::EnvironmentSettings;
use crate::types::Score;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // === Timing ===

    pub iterations: u32,

    pub turns_per_iteration: u32,

    /// Survival threshold is applied every this many turns
    pub threshold_period: u32,

    // === Survival ===

    /// Lower bound (inclusive) of a freshly drawn threshold
    pub threshold_min: Score,

    /// Upper bound (exclusive) of a freshly drawn threshold
    pub threshold_max: Score,

    /// Score of agents at start and after revival
    pub initial_score: Score,

    // === Population ===

    /// Master seed; entropy when absent
    pub seed: Option<u64>,

    pub team_size: usize,

    pub honest_agents: usize,

    pub cheater_agents: usize,

    /// Share of the expected contribution a cheater keeps back
    pub cheater_skim_percent: u32,

    // === Governance ===

    /// Number of past turns an audit may look back over
    pub audit_window: usize,

    /// Rules teams may choose from; the first one governs freshly formed teams
    pub rule_menu: Vec<GovernanceKind>,

    /// Roll dice for income at the start of each turn
    pub roll_dice: bool,

    /// Where recorded turns are exported as JSON
    pub output: Option<PathBuf>,

    pub params: GovernanceParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 3,
            turns_per_iteration: 20,
            threshold_period: 3,

            threshold_min: 10,
            threshold_max: 20,
            initial_score: 0,

            seed: None,
            team_size: 4,
            honest_agents: 16,
            cheater_agents: 4,
            cheater_skim_percent: 50,

            audit_window: 5,
            rule_menu: GovernanceKind::ALL.to_vec(),
            roll_dice: true,
            output: None,

            params: GovernanceParams::default(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::Write(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    // Builder-style methods for CLI overrides

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if seed.is_some() {
            self.seed = seed;
        }
        self
    }

    pub fn with_iterations(mut self, iterations: Option<u32>) -> Self {
        if let Some(iterations) = iterations {
            self.iterations = iterations;
        }
        self
    }

    pub fn with_turns(mut self, turns: Option<u32>) -> Self {
        if let Some(turns) = turns {
            self.turns_per_iteration = turns;
        }
        self
    }

    pub fn with_agents(mut self, honest: Option<usize>, cheaters: Option<usize>) -> Self {
        if let Some(honest) = honest {
            self.honest_agents = honest;
        }
        if let Some(cheaters) = cheaters {
            self.cheater_agents = cheaters;
        }
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        if output.is_some() {
            self.output = output;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.honest_agents + self.cheater_agents == 0 {
            return Err(ConfigError::Invalid("at least one agent is required".into()));
        }

        if self.rule_menu.is_empty() {
            return Err(ConfigError::Invalid("rule_menu must not be empty".into()));
        }

        if self.threshold_period == 0 {
            return Err(ConfigError::Invalid("threshold_period must be at least 1".into()));
        }

        if self.threshold_min > self.threshold_max {
            return Err(ConfigError::Invalid(format!(
                "threshold_min ({}) must not exceed threshold_max ({})",
                self.threshold_min, self.threshold_max
            )));
        }

        if self.team_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "team_size ({}) must be at least 2",
                self.team_size
            )));
        }

        if self.cheater_skim_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "cheater_skim_percent ({}) must be at most 100",
                self.cheater_skim_percent
            )));
        }

        let boundaries = self.params.rank_boundary.initial_boundaries;
        if boundaries.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::Invalid(format!(
                "rank_boundary.initial_boundaries must be non-decreasing: {:?}",
                boundaries
            )));
        }

        Ok(())
    }

    /// Settings handed to the environment
    pub fn settings(&self) -> EnvironmentSettings {
        EnvironmentSettings {
            iterations: self.iterations,
            turns_per_iteration: self.turns_per_iteration,
            threshold_period: self.threshold_period,
            threshold_min: self.threshold_min,
            threshold_max: self.threshold_max,
            initial_score: self.initial_score,
            team_size: self.team_size,
            audit_window: self.audit_window,
            rule_menu: self.rule_menu.clone(),
            params: self.params.clone(),
            roll_dice: self.roll_dice,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to write config file: {0}")]
    Write(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
