//! Conversion of environment steps into transitions.
use super::{BatchBase, GenericTransitionBatch};
use crate::{error::QrError, Env, Obs, Step, StepProcessor};
use anyhow::Result;
use std::{default::Default, marker::PhantomData};

/// Configuration of [`SimpleStepProcessor`].
#[derive(Clone, Debug, Default)]
pub struct SimpleStepProcessorConfig {}

/// Makes 1-step transitions from a non-vectorized environment.
///
/// The processor keeps the last observation. After an episode ends, the
/// caller resets the environment and passes the new initial observation to
/// [`StepProcessor::reset`].
pub struct SimpleStepProcessor<E, O> {
    prev_obs: Option<O>,
    phantom: PhantomData<E>,
}

impl<E, O> StepProcessor<E> for SimpleStepProcessor<E, O>
where
    E: Env,
    O: BatchBase + From<E::Obs>,
{
    type Config = SimpleStepProcessorConfig;
    type Output = GenericTransitionBatch<O>;

    fn build(_config: &Self::Config) -> Self {
        Self {
            prev_obs: None,
            phantom: PhantomData,
        }
    }

    fn reset(&mut self, init_obs: E::Obs) {
        self.prev_obs = Some(init_obs.into());
    }

    fn process(&mut self, step: Step<E>) -> Result<Self::Output> {
        if step.obs.len() != 1 {
            return Err(QrError::ShapeMismatch(format!(
                "expected a single observation, got {}",
                step.obs.len()
            ))
            .into());
        }

        let next_obs: O = step.obs.clone().into();
        let obs = match self.prev_obs.replace(step.obs.into()) {
            Some(obs) => obs,
            None => anyhow::bail!("prev_obs is not set. Forgot to call reset()?"),
        };

        Ok(GenericTransitionBatch {
            obs,
            act: vec![step.act],
            next_obs,
            reward: vec![step.reward],
            is_terminated: vec![step.is_terminated as i8],
            is_truncated: vec![step.is_truncated as i8],
            weight: None,
            ix_sample: None,
        })
    }
}
