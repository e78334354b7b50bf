//! Agent.
use super::{Env, Policy, ReplayBufferBase};
use crate::record::Record;
use anyhow::Result;

/// Represents a trainable policy on an environment.
pub trait Agent<E: Env, R: ReplayBufferBase>: Policy<E> {
    /// Set the policy to training mode.
    fn train(&mut self);

    /// Set the policy to evaluation mode.
    fn eval(&mut self);

    /// Return if it is in training mode.
    fn is_train(&self) -> bool;

    /// Sets the exploration rate used in training mode.
    ///
    /// The schedule of epsilon is owned by the caller, see
    /// [`EpsilonSchedule`](crate::EpsilonSchedule).
    fn set_epsilon(&mut self, epsilon: f64);

    /// Performs an optimization step.
    ///
    /// `buffer` is a replay buffer from which transitions will be taken
    /// for updating model parameters. Returns `Ok(None)` without touching the
    /// buffer when the step is skipped, e.g. when the buffer holds fewer
    /// transitions than a batch.
    fn opt(&mut self, buffer: &mut R) -> Result<Option<Record>>;

    /// Copies the parameters of the online model into the target model.
    fn update_target(&mut self) -> Result<()>;
}
