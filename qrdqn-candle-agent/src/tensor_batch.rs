use anyhow::Result;
use candle_core::{Device, IndexOp, Tensor};
use qrdqn_core::{error::QrError, prioritized_replay_buffer::BatchBase};

/// A buffer consisting of a [`Tensor`].
///
/// The first dimension is the batch dimension. Storage of a replay buffer is
/// allocated with the shape `[capacity, data.dims()[1..]]` at the first push.
///
/// [`Tensor`]: https://docs.rs/candle-core/0.8.4/candle_core/struct.Tensor.html
#[derive(Clone, Debug)]
pub struct TensorBatch {
    buf: Option<Tensor>,
    capacity: usize,
}

impl TensorBatch {
    /// Wraps a tensor whose first dimension is the batch dimension.
    pub fn from_tensor(t: Tensor) -> Self {
        let capacity = t.dims().first().copied().unwrap_or(0);
        Self {
            buf: Some(t),
            capacity,
        }
    }

    /// Moves the data to `device`.
    pub fn to(&mut self, device: &Device) -> Result<()> {
        if let Some(buf) = &self.buf {
            self.buf = Some(buf.to_device(device)?);
        }
        Ok(())
    }

    /// Returns the underlying tensor, `None` before the first push.
    pub fn tensor(&self) -> Option<&Tensor> {
        self.buf.as_ref()
    }

    /// Consumes the batch and returns the underlying tensor.
    pub fn into_tensor(self) -> Result<Tensor> {
        self.buf
            .ok_or_else(|| QrError::ShapeMismatch("tensor batch holds no data".into()).into())
    }
}

impl BatchBase for TensorBatch {
    fn new(capacity: usize) -> Self {
        Self {
            buf: None,
            capacity,
        }
    }

    /// Pushes given data, wrapping around at the capacity.
    fn push(&mut self, index: usize, data: Self) -> Result<()> {
        let data = match data.buf {
            Some(data) => data,
            None => return Ok(()),
        };

        let batch_size = data.dims()[0];
        if batch_size == 0 {
            return Ok(());
        }

        if self.buf.is_none() {
            let mut shape = data.dims().to_vec();
            shape[0] = self.capacity;
            self.buf = Some(Tensor::zeros(shape, data.dtype(), data.device())?);
        }
        let buf = self
            .buf
            .as_ref()
            .ok_or_else(|| anyhow::Error::from(QrError::EmptyBuffer))?;

        if buf.dims()[1..] != data.dims()[1..] {
            return Err(QrError::ShapeMismatch(format!(
                "pushed data has shape {:?}, storage has {:?}",
                data.dims(),
                buf.dims()
            ))
            .into());
        }

        let data = data.to_device(buf.device())?.to_dtype(buf.dtype())?;
        if index + batch_size > self.capacity {
            let n = self.capacity - index;
            buf.slice_set(&data.i((..n,))?.contiguous()?, 0, index)?;
            buf.slice_set(&data.i((n..,))?.contiguous()?, 0, 0)?;
        } else {
            buf.slice_set(&data.contiguous()?, 0, index)?;
        }

        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Result<Self> {
        let buf = self
            .buf
            .as_ref()
            .ok_or_else(|| anyhow::Error::from(QrError::EmptyBuffer))?;
        let capacity = ixs.len();
        let ixs = {
            let ixs = ixs.iter().map(|&x| x as u32).collect::<Vec<_>>();
            Tensor::from_vec(ixs, (capacity,), buf.device())?
        };
        let buf = Some(buf.index_select(&ixs, 0)?);
        Ok(Self { buf, capacity })
    }
}

impl From<Tensor> for TensorBatch {
    fn from(t: Tensor) -> Self {
        Self::from_tensor(t)
    }
}

impl TryFrom<TensorBatch> for Tensor {
    type Error = anyhow::Error;

    fn try_from(b: TensorBatch) -> Result<Self> {
        b.into_tensor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn test_push_wraps_around() -> Result<()> {
        let device = Device::Cpu;
        let mut storage = TensorBatch::new(3);
        let data = Tensor::new(&[[1f32, 1.0], [2.0, 2.0]], &device)?;
        storage.push(0, data.into())?;
        let data = Tensor::new(&[[3f32, 3.0], [4.0, 4.0]], &device)?;
        storage.push(2, data.into())?;

        let t: Vec<Vec<f32>> = storage.tensor().unwrap().to_vec2()?;
        assert_eq!(t, vec![vec![4.0, 4.0], vec![2.0, 2.0], vec![3.0, 3.0]]);

        let s: Vec<Vec<f32>> = storage.sample(&[2, 2, 1])?.into_tensor()?.to_vec2()?;
        assert_eq!(s, vec![vec![3.0, 3.0], vec![3.0, 3.0], vec![2.0, 2.0]]);
        Ok(())
    }

    #[test]
    fn test_push_shape_mismatch() -> Result<()> {
        let device = Device::Cpu;
        let mut storage = TensorBatch::new(4);
        storage.push(0, Tensor::zeros((1, 2), DType::F32, &device)?.into())?;
        assert!(storage
            .push(1, Tensor::zeros((1, 3), DType::F32, &device)?.into())
            .is_err());
        Ok(())
    }

    #[test]
    fn test_sample_before_push() {
        let storage = TensorBatch::new(4);
        assert!(storage.sample(&[0]).is_err());
    }
}
