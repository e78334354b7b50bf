//! QR-DQN agent.
//!
//! The agent predicts `num_quantiles` quantiles of the return of every action.
//! Quantiles are learned with the quantile Huber loss on double-Q targets,
//! computed from the online network's choice of the next action and the target
//! network's quantiles of it.
mod base;
mod config;
mod explorer;
mod model;
pub use base::QrDqn;
pub use config::QrDqnConfig;
pub use explorer::EpsilonGreedy;
pub use model::{QrDqnModel, QrDqnModelConfig};
