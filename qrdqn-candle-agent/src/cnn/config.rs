use crate::util::OutDim;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Cnn`](super::Cnn).
pub struct CnnConfig {
    pub(super) in_channels: i64,
    pub(super) height: usize,
    pub(super) width: usize,
    pub(super) out_dim: i64,
}

impl Default for CnnConfig {
    /// 84x84 images with a single channel.
    fn default() -> Self {
        Self {
            in_channels: 1,
            height: 84,
            width: 84,
            out_dim: 0,
        }
    }
}

impl CnnConfig {
    /// Constructs [`CnnConfig`].
    pub fn new(in_channels: i64, out_dim: i64) -> Self {
        Self {
            in_channels,
            out_dim,
            ..Default::default()
        }
    }

    /// Sets the size of input images.
    pub fn image_size(mut self, height: usize, width: usize) -> Self {
        self.height = height;
        self.width = width;
        self
    }
}

impl OutDim for CnnConfig {
    /// Gets output dimension.
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    /// Sets output dimension.
    fn set_out_dim(&mut self, v: i64) {
        self.out_dim = v;
    }
}
