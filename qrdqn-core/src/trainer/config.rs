//! Configuration of [`Trainer`](super::Trainer).
use crate::EpsilonSchedule;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// The number of environment steps of a run.
    pub total_timesteps: usize,

    /// Warmup period, for filling replay buffer, in environment steps.
    pub warmup_period: usize,

    /// Interval of optimization steps in environment steps.
    pub opt_interval: usize,

    /// Interval of target network updates in environment steps.
    pub target_update_interval: usize,

    /// The number of recent episode returns used to choose the risk preference.
    pub reward_window: usize,

    /// Threshold on the mean of recent episode returns below which the agent
    /// acts risk-seeking.
    pub risk_threshold: f32,

    /// Exploration schedule.
    pub epsilon: EpsilonSchedule,

    /// Interval of progress logging in optimization steps.
    pub record_interval: usize,

    /// Random seed of the environment.
    pub env_seed: i64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            total_timesteps: 1_000_000,
            warmup_period: 0,
            opt_interval: 1,
            target_update_interval: 10_000,
            reward_window: 10,
            risk_threshold: 0.5,
            epsilon: EpsilonSchedule::default(),
            record_interval: 1000,
            env_seed: 0,
        }
    }
}

impl TrainerConfig {
    /// Sets the number of environment steps.
    ///
    /// The horizon of the epsilon schedule is set to the same value.
    pub fn total_timesteps(mut self, v: usize) -> Self {
        self.total_timesteps = v;
        self.epsilon = self.epsilon.total_timesteps(v);
        self
    }

    /// Sets the warmup period in environment steps.
    pub fn warmup_period(mut self, v: usize) -> Self {
        self.warmup_period = v;
        self
    }

    /// Sets the interval of optimization in environment steps.
    pub fn opt_interval(mut self, v: usize) -> Self {
        self.opt_interval = v;
        self
    }

    /// Sets the interval of target network updates in environment steps.
    pub fn target_update_interval(mut self, v: usize) -> Self {
        self.target_update_interval = v;
        self
    }

    /// Sets the number of episode returns used to choose the risk preference.
    pub fn reward_window(mut self, v: usize) -> Self {
        self.reward_window = v;
        self
    }

    /// Sets the risk threshold.
    pub fn risk_threshold(mut self, v: f32) -> Self {
        self.risk_threshold = v;
        self
    }

    /// Sets the exploration schedule.
    pub fn epsilon(mut self, v: EpsilonSchedule) -> Self {
        self.epsilon = v;
        self
    }

    /// Sets the interval of progress logging in optimization steps.
    pub fn record_interval(mut self, v: usize) -> Self {
        self.record_interval = v;
        self
    }

    /// Sets the random seed of the environment.
    pub fn env_seed(mut self, v: i64) -> Self {
        self.env_seed = v;
        self
    }

    /// Constructs [`TrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        log::info!("Load config of trainer from {}", path_.to_str().unwrap_or("?"));
        Ok(b)
    }

    /// Saves [`TrainerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        log::info!("Save config of trainer into {}", path_.to_str().unwrap_or("?"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_trainer_config() -> Result<()> {
        let config = TrainerConfig::default()
            .total_timesteps(5000)
            .warmup_period(100)
            .target_update_interval(500)
            .risk_threshold(-1.0)
            .epsilon(EpsilonSchedule::default().eps_final(0.05));

        let dir = TempDir::new("trainer_config")?;
        let path = dir.path().join("trainer.yaml");
        config.save(&path)?;
        let config_ = TrainerConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
