//! Prioritized experience replay.
//!
//! Transitions are stored in a ring buffer. Each transition carries a priority
//! derived from its latest absolute TD error; sampling probability is
//! proportional to `(priority + eps)^alpha`, and importance sampling weights
//! `(N * P(i))^-beta` correct for the induced bias.
//!
//! # Key Components
//!
//! - [`PrioritizedReplayBuffer`]: the replay buffer
//! - [`GenericTransitionBatch`]: a batch of transitions, both pushed to and sampled from the buffer
//! - [`SimpleStepProcessor`]: converts environment steps to transitions
//! - [`PerConfig`]: configuration of prioritization
//!
//! # Examples
//!
//! ```ignore
//! use qrdqn_core::prioritized_replay_buffer::{
//!     PerConfig, PrioritizedReplayBuffer, PrioritizedReplayBufferConfig, WeightNormalizer,
//! };
//!
//! let config = PrioritizedReplayBufferConfig::default()
//!     .capacity(10000)
//!     .seed(42)
//!     .per_config(Some(PerConfig::default().alpha(0.6).normalize(WeightNormalizer::Batch)));
//!
//! let mut buffer = PrioritizedReplayBuffer::<TensorBatch>::build(&config);
//! ```
mod base;
mod batch;
mod config;
mod step_proc;
pub use base::{PrioritizedReplayBuffer, SumTree, WeightNormalizer};
pub use batch::{BatchBase, GenericTransitionBatch};
pub use config::{PerConfig, PrioritizedReplayBufferConfig};
pub use step_proc::{SimpleStepProcessor, SimpleStepProcessorConfig};
