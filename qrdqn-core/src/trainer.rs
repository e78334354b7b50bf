//! Train [`Agent`].
mod config;
use crate::{
    record::Record, select_risk_preference, Agent, Env, ExperienceBufferBase, ReplayBufferBase,
    RiskPreference, StepProcessor,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::{debug, info};
use std::collections::VecDeque;

/// Counters returned by [`Trainer::train`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainStats {
    /// The number of environment steps.
    pub env_steps: usize,

    /// The number of completed optimization steps.
    pub opt_steps: usize,

    /// The number of finished episodes.
    pub episodes: usize,

    /// Loss of the last completed optimization step.
    pub last_loss: Option<f32>,
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the training loop.
///
/// # Training loop
///
/// For every environment step `t` in `0..total_timesteps`:
///
/// 1. Set the exploration rate of the agent to `epsilon.value(t)`.
/// 2. Choose a [`RiskPreference`] with [`select_risk_preference`] from the
///    returns of the last `reward_window` episodes.
/// 3. Sample an action from the agent, step the environment and push the
///    transition made by [`StepProcessor`] into the replay buffer.
/// 4. If the episode ended, store its return, reset the environment and the
///    step processor.
/// 5. If `t >= warmup_period` and `t % opt_interval == 0`, do an optimization
///    step with [`Agent::opt`]. The agent may skip it, e.g. while the buffer
///    holds fewer transitions than a batch.
/// 6. If `(t + 1) % target_update_interval == 0`, copy the online parameters
///    into the target model with [`Agent::update_target`].
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|action|B[Env]
///     B -->|Env::Obs|A
///     B -->|"Step&lt;E: Env&gt;"|C[StepProcessor]
///     C -->|ExperienceBufferBase::Item|D[ReplayBufferBase]
///     D -->|ReplayBufferBase::Batch|A
///     A -->|TD errors|D
/// ```
pub struct Trainer<E, P, R>
where
    E: Env,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    config: TrainerConfig,

    /// Configuration of the environment for training.
    env_config: E::Config,

    /// Configuration of the transition producer.
    step_proc_config: P::Config,

    phantom: std::marker::PhantomData<R>,
}

impl<E, P, R> Trainer<E, P, R>
where
    E: Env,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig, env_config: E::Config, step_proc_config: P::Config) -> Self {
        Self {
            config,
            env_config,
            step_proc_config,
            phantom: std::marker::PhantomData,
        }
    }

    /// The configuration of the trainer.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn is_opt_step(&self, t: usize) -> bool {
        t >= self.config.warmup_period && t % self.config.opt_interval.max(1) == 0
    }

    fn is_target_update_step(&self, t: usize) -> bool {
        (t + 1) % self.config.target_update_interval.max(1) == 0
    }

    /// Trains the agent with transitions pushed into `buffer`.
    pub fn train<A>(&mut self, agent: &mut A, buffer: &mut R) -> Result<TrainStats>
    where
        A: Agent<E, R>,
    {
        let mut env = E::build(&self.env_config, self.config.env_seed)?;
        let mut step_proc = P::build(&self.step_proc_config);
        let mut returns = VecDeque::with_capacity(self.config.reward_window);
        let mut episode_return = 0f32;
        let mut stats = TrainStats::default();

        let obs = env.reset()?;
        step_proc.reset(obs.clone());
        let mut obs = obs;
        agent.train();

        for t in 0..self.config.total_timesteps {
            agent.set_epsilon(self.config.epsilon.value(t));
            let risk = select_risk_preference(returns.make_contiguous(), self.config.risk_threshold);

            let act = agent.sample(&obs, risk)?;
            let (step, _record) = env.step(act)?;
            let is_done = step.is_done();
            episode_return += step.reward;
            obs = step.obs.clone();
            buffer.push(step_proc.process(step)?)?;
            stats.env_steps += 1;

            if is_done {
                stats.episodes += 1;
                debug!(
                    "episode {} finished with return {} at step {}",
                    stats.episodes, episode_return, t
                );
                if self.config.reward_window > 0 {
                    if returns.len() == self.config.reward_window {
                        returns.pop_front();
                    }
                    returns.push_back(episode_return);
                }
                episode_return = 0.0;
                obs = env.reset()?;
                step_proc.reset(obs.clone());
            }

            if self.is_opt_step(t) {
                if let Some(record) = agent.opt(buffer)? {
                    stats.opt_steps += 1;
                    stats.last_loss = record.get_scalar("loss").ok();
                    if stats.opt_steps % self.config.record_interval.max(1) == 0 {
                        Self::log_progress(&stats, &record, risk, buffer.len());
                    }
                }
            }

            if self.is_target_update_step(t) {
                agent.update_target()?;
                debug!("target model updated at step {}", t);
            }
        }

        info!(
            "training finished: env_steps = {}, opt_steps = {}, episodes = {}",
            stats.env_steps, stats.opt_steps, stats.episodes
        );

        Ok(stats)
    }

    fn log_progress(stats: &TrainStats, record: &Record, risk: RiskPreference, buffer_len: usize) {
        let td = record.get_scalar("td_error_mean").unwrap_or(f32::NAN);
        let beta = record.get_scalar("beta").unwrap_or(f32::NAN);
        info!(
            "env_steps = {}, opt_steps = {}, episodes = {}, loss = {:.5}, td_error_mean = {:.5}, beta = {:.3}, risk = {}, buffer = {}",
            stats.env_steps,
            stats.opt_steps,
            stats.episodes,
            stats.last_loss.unwrap_or(f32::NAN),
            td,
            beta,
            risk,
            buffer_len
        );
    }
}
