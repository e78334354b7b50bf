//! Configuration of QR-DQN agent.
use super::{EpsilonGreedy, QrDqnModelConfig};
use crate::{util::OutDim, Device};
use anyhow::Result;
use log::info;
use qrdqn_core::BetaSchedule;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`QrDqn`](super::QrDqn) agent.
///
/// `Q` is the configuration of the quantile network.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct QrDqnConfig<Q>
where
    Q: OutDim,
{
    pub model_config: QrDqnModelConfig<Q>,
    pub n_actions: usize,
    pub num_quantiles: usize,
    pub gamma: f64,
    pub batch_size: usize,
    pub beta: BetaSchedule,
    pub explorer: EpsilonGreedy,
    pub train: bool,
    pub seed: u64,
    pub device: Device,
}

impl<Q> Default for QrDqnConfig<Q>
where
    Q: OutDim,
{
    /// Constructs QR-DQN config with default parameters.
    fn default() -> Self {
        Self {
            model_config: Default::default(),
            n_actions: 0,
            num_quantiles: 51,
            gamma: 0.99,
            batch_size: 32,
            beta: BetaSchedule::default(),
            explorer: EpsilonGreedy::default(),
            train: false,
            seed: 42,
            device: Device::Cpu,
        }
    }
}

impl<Q> QrDqnConfig<Q>
where
    Q: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the model.
    pub fn model_config(mut self, model_config: QrDqnModelConfig<Q>) -> Self {
        self.model_config = model_config;
        self
    }

    /// Sets the number of actions.
    pub fn n_actions(mut self, v: usize) -> Self {
        self.n_actions = v;
        self
    }

    /// Sets the number of quantiles of each action.
    pub fn num_quantiles(mut self, v: usize) -> Self {
        self.num_quantiles = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the schedule of the importance sampling exponent.
    pub fn beta(mut self, v: BetaSchedule) -> Self {
        self.beta = v;
        self
    }

    /// Sets the explorer.
    pub fn explorer(mut self, v: EpsilonGreedy) -> Self {
        self.explorer = v;
        self
    }

    /// Sets the random seed of exploration.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Loads [`QrDqnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of QR-DQN agent from {}", path_.display());
        Ok(b)
    }

    /// Saves [`QrDqnConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of QR-DQN agent into {}", path_.display());
        Ok(())
    }
}
