//! Policy.
use super::Env;
use crate::RiskPreference;
use anyhow::Result;
use serde::de::DeserializeOwned;
use std::path::Path;

/// A policy on an environment with a discrete action space.
pub trait Policy<E: Env> {
    /// Configuration.
    type Config: Clone + DeserializeOwned;

    /// Builds the policy.
    fn build(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Build the policy with the configuration in the yaml file of the given path.
    fn build_from_path(path: impl AsRef<Path>) -> Result<Self>
    where
        Self: Sized,
    {
        let file = std::fs::File::open(path)?;
        let rdr = std::io::BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)?;
        Self::build(config)
    }

    /// Chooses an action index given an observation.
    ///
    /// `risk` selects how the return distribution of each action is summarized
    /// before taking the argmax.
    fn sample(&mut self, obs: &E::Obs, risk: RiskPreference) -> Result<usize>;
}
