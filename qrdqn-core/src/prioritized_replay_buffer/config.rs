//! Configuration of the prioritized replay buffer.
use super::WeightNormalizer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of prioritization.
///
/// The exponent of importance sampling weights is not part of this
/// configuration. It is owned by the agent through
/// [`BetaSchedule`](crate::BetaSchedule) and passed to every call of
/// [`ReplayBufferBase::batch`](crate::ReplayBufferBase::batch).
///
/// ```rust
/// use qrdqn_core::prioritized_replay_buffer::{PerConfig, WeightNormalizer};
///
/// let config = PerConfig::default()
///     .alpha(0.6)
///     .eps(1e-6)
///     .normalize(WeightNormalizer::Batch);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Prioritization exponent. 0 gives uniform sampling.
    pub alpha: f32,

    /// Added to priorities so that every transition can be sampled.
    pub eps: f32,

    /// Normalization of importance sampling weights.
    pub normalize: WeightNormalizer,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            eps: 1e-6,
            normalize: WeightNormalizer::Batch,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the constant added to priorities.
    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Sets the normalization of importance sampling weights.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Configuration of [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
///
/// If `per_config` is `None`, transitions are sampled uniformly and all
/// importance sampling weights are 1.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PrioritizedReplayBufferConfig {
    /// Maximum number of transitions. The oldest transitions are overwritten
    /// when the buffer is full.
    pub capacity: usize,

    /// Random seed for sampling.
    pub seed: u64,

    /// Configuration of prioritization.
    pub per_config: Option<PerConfig>,
}

impl Default for PrioritizedReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            seed: 42,
            per_config: Some(PerConfig::default()),
        }
    }
}

impl PrioritizedReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the configuration of prioritization.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_replay_buffer_config() -> Result<()> {
        let config = PrioritizedReplayBufferConfig::default()
            .capacity(1000)
            .seed(7)
            .per_config(Some(
                PerConfig::default()
                    .alpha(0.5)
                    .normalize(WeightNormalizer::All),
            ));

        let dir = TempDir::new("prioritized_replay_buffer_config")?;
        let path = dir.path().join("replay_buffer.yaml");
        config.save(&path)?;
        let config_ = PrioritizedReplayBufferConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
