use crate::{util::arrayd_to_tensor, TensorBatch};
use anyhow::Result;
use candle_core::Tensor;
use ndarray::ArrayD;
use num_traits::AsPrimitive;
use qrdqn_core::{error::QrError, Obs};

/// A single-channel image observation.
///
/// Held as an f32 tensor of shape `(1, 1, height, width)`.
#[derive(Clone, Debug)]
pub struct ImageObs {
    tensor: Tensor,
}

impl ImageObs {
    /// Creates an observation from an array of shape `(height, width, 1)`.
    ///
    /// Pixel values are converted to f32 without rescaling.
    pub fn from_array<T: AsPrimitive<f32>>(a: ArrayD<T>) -> Result<Self> {
        let shape = a.shape().to_vec();
        if shape.len() != 3 || shape[2] != 1 {
            return Err(QrError::ShapeMismatch(format!(
                "image observation must have shape (height, width, 1), got {:?}",
                shape
            ))
            .into());
        }

        let t = arrayd_to_tensor::<T, f32>(a, false)?;
        let tensor = t.permute((2, 0, 1))?.unsqueeze(0)?.contiguous()?;
        Ok(Self { tensor })
    }

    /// Wraps a tensor of shape `(1, 1, height, width)`.
    pub fn from_tensor(tensor: Tensor) -> Result<Self> {
        if !matches!(tensor.dims(), [1, 1, _, _]) {
            return Err(QrError::ShapeMismatch(format!(
                "image observation must have shape (1, 1, height, width), got {:?}",
                tensor.dims()
            ))
            .into());
        }
        Ok(Self { tensor })
    }

    /// The tensor of shape `(1, 1, height, width)`.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }
}

impl Obs for ImageObs {
    fn len(&self) -> usize {
        self.tensor.dims()[0]
    }
}

impl From<ImageObs> for Tensor {
    fn from(obs: ImageObs) -> Self {
        obs.tensor
    }
}

impl From<ImageObs> for TensorBatch {
    fn from(obs: ImageObs) -> Self {
        TensorBatch::from_tensor(obs.tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn test_image_obs_layout() -> Result<()> {
        let a = Array::from_shape_fn(IxDyn(&[2, 3, 1]), |ix| (ix[0] * 10 + ix[1]) as u8);
        let obs = ImageObs::from_array(a)?;
        assert_eq!(obs.tensor().dims(), &[1, 1, 2, 3]);
        assert_eq!(obs.len(), 1);

        let v: Vec<f32> = obs.tensor().flatten_all()?.to_vec1()?;
        assert_eq!(v, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        Ok(())
    }

    #[test]
    fn test_image_obs_rejects_channels() {
        let a = Array::<f32, _>::zeros(IxDyn(&[4, 4, 3]));
        assert!(ImageObs::from_array(a).is_err());
    }
}
