//! Environment.
use super::{Info, Obs, Step};
use crate::record::Record;
use anyhow::Result;

/// Represents an environment with a discrete action space.
///
/// Actions are indices in `0..n_actions()`.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Obs;

    /// Information in the [`Step`] object.
    type Info: Info;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Performs an environment step.
    fn step(&mut self, act: usize) -> Result<(Step<Self>, Record)>
    where
        Self: Sized;

    /// Samples an action uniformly from the action space.
    ///
    /// Agents and [`Trainer`](crate::Trainer) never call this: epsilon-greedy
    /// exploration draws from the agent's own seeded generator. It serves
    /// callers that act without an agent, e.g. a random baseline.
    fn sample_random_action(&mut self) -> usize;

    /// The number of discrete actions.
    fn n_actions(&self) -> usize;
}
