#![warn(missing_docs)]
//! Core components of a quantile-regression DQN learner.
//!
//! This crate is independent of any tensor backend. It defines the interfaces
//! between an environment, an agent and a replay buffer, and provides:
//!
//! * [`PrioritizedReplayBuffer`](prioritized_replay_buffer::PrioritizedReplayBuffer),
//!   a sum-tree based prioritized experience replay,
//! * [`EpsilonSchedule`] and [`BetaSchedule`], the exploration and
//!   importance-sampling schedules,
//! * [`select_risk_preference`], which maps recent episode returns to a
//!   [`RiskPreference`],
//! * [`Trainer`], the sequential training loop.
pub mod error;
pub mod prioritized_replay_buffer;
pub mod record;

mod base;
pub use base::{
    Agent, Env, ExperienceBufferBase, Info, Obs, Policy, ReplayBufferBase, Step, StepProcessor,
    TransitionBatch,
};

mod risk;
pub use risk::{select_risk_preference, RiskPreference};

mod schedule;
pub use schedule::{BetaSchedule, EpsilonSchedule};

mod trainer;
pub use trainer::{TrainStats, Trainer, TrainerConfig};
