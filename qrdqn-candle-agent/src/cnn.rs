//! Convolutional neural network for single-channel image observations.
//!
//! The architecture is the same as in the DQN Nature paper. The last layer
//! outputs `n_actions * n_quantiles` values. Pixel values are used as given,
//! without rescaling.
mod base;
mod config;
pub use base::Cnn;
pub use config::CnnConfig;
