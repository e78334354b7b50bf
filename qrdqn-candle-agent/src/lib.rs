//! QR-DQN agent implemented with [candle](https://crates.io/crates/candle-core).
//!
//! The agent [`QrDqn`](qrdqn::QrDqn) predicts a set of return quantiles for
//! every action, learns them with the quantile Huber loss on batches from a
//! prioritized replay buffer and selects actions by a risk-sensitive summary of
//! the quantiles.
pub mod cnn;
pub mod mlp;
pub mod model;
mod obs;
pub mod opt;
pub mod qrdqn;
mod tensor_batch;
pub mod util;
use anyhow::Result;
pub use obs::ImageObs;
use serde::{Deserialize, Serialize};
pub use tensor_batch::TensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Device {
    /// Creates the corresponding [`candle_core::Device`].
    pub fn to_candle(self) -> Result<candle_core::Device> {
        match self {
            Self::Cpu => Ok(candle_core::Device::Cpu),
            Self::Cuda(n) => Ok(candle_core::Device::new_cuda(n)?),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}
