use super::CnnConfig;
use crate::model::SubModel1;
use anyhow::Result;
use candle_core::{DType::F32, Device, Tensor};
use candle_nn::{
    conv::Conv2dConfig,
    conv2d_no_bias, linear,
    sequential::{seq, Sequential},
    Module, VarBuilder,
};
use qrdqn_core::error::QrError;

/// (kernel, stride) of the convolutional layers.
const CONV_LAYERS: [(usize, usize); 3] = [(8, 4), (4, 2), (3, 1)];

#[allow(dead_code)]
/// Convolutional neural network, which has the same architecture of the DQN paper.
///
/// Takes a tensor of shape `(batch_size, in_channels, height, width)`.
pub struct Cnn {
    in_channels: i64,
    out_dim: i64,
    device: Device,
    seq: Sequential,
}

impl Cnn {
    fn stride(s: usize) -> Conv2dConfig {
        Conv2dConfig {
            stride: s,
            ..Default::default()
        }
    }

    /// Number of features after the convolutional layers.
    fn flatten_dim(height: usize, width: usize) -> Result<usize> {
        let (mut h, mut w) = (height, width);
        for (k, s) in CONV_LAYERS {
            if h < k || w < k {
                return Err(QrError::ShapeMismatch(format!(
                    "image of size {}x{} is too small for the network",
                    height, width
                ))
                .into());
            }
            h = (h - k) / s + 1;
            w = (w - k) / s + 1;
        }
        Ok(64 * h * w)
    }

    fn create_net(vb: &VarBuilder, config: &CnnConfig) -> Result<Sequential> {
        let flatten_dim = Self::flatten_dim(config.height, config.width)?;
        let [(k1, s1), (k2, s2), (k3, s3)] = CONV_LAYERS;
        let seq = seq()
            .add_fn(|xs| xs.to_dtype(F32))
            .add(conv2d_no_bias(
                config.in_channels as _,
                32,
                k1,
                Self::stride(s1),
                vb.pp("c1"),
            )?)
            .add_fn(|xs| xs.relu())
            .add(conv2d_no_bias(32, 64, k2, Self::stride(s2), vb.pp("c2"))?)
            .add_fn(|xs| xs.relu())
            .add(conv2d_no_bias(64, 64, k3, Self::stride(s3), vb.pp("c3"))?)
            .add_fn(|xs| xs.relu()?.flatten_from(1))
            .add(linear(flatten_dim, 512, vb.pp("l1"))?)
            .add_fn(|xs| xs.relu())
            .add(linear(512, config.out_dim as _, vb.pp("l2"))?);

        Ok(seq)
    }
}

impl SubModel1 for Cnn {
    type Config = CnnConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, x: &Self::Input) -> Result<Tensor> {
        Ok(self.seq.forward(&x.to_device(&self.device)?)?)
    }

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        if config.out_dim <= 0 {
            return Err(QrError::InvalidArgument(format!(
                "output dimension of Cnn must be positive, got {}",
                config.out_dim
            ))
            .into());
        }
        let device = vb.device().clone();
        let seq = Self::create_net(&vb, &config)?;

        Ok(Self {
            in_channels: config.in_channels,
            out_dim: config.out_dim,
            device,
            seq,
        })
    }
}
