use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};

/// Returns the quantile midpoints `tau_hat[i] = (i + 0.5) / n` as a tensor of shape `(n,)`.
pub fn quantile_midpoints(n: usize, device: &Device) -> Result<Tensor> {
    let tau = (0..n)
        .map(|i| (i as f32 + 0.5) / n as f32)
        .collect::<Vec<_>>();
    Ok(Tensor::from_vec(tau, (n,), device)?)
}

/// Elementwise Huber loss with threshold `k`.
pub fn huber(x: &Tensor, k: f64) -> Result<Tensor> {
    let abs = x.abs()?;
    let cond = abs.lt(k)?.to_dtype(DType::F32)?;
    let quadratic = (cond.mul(&x.sqr()?)? * 0.5)?;
    let linear = (cond.affine(-1.0, 1.0)?.mul(&abs.affine(1.0, -0.5 * k)?)? * k)?;
    Ok((quadratic + linear)?)
}

/// Quantile Huber loss of each batch element.
///
/// `pred` and `target` have shape `(batch_size, n_quantiles)` and `tau` has
/// shape `(n_quantiles,)`. For `delta[b, i, j] = target[b, i] - pred[b, j]`,
/// the loss is `|tau[i] - 1{delta < 0}| * huber(delta)` averaged over `j`
/// and then over `i`. The indicator does not propagate gradients.
///
/// Returns a tensor of shape `(batch_size,)`.
pub fn quantile_huber_loss(pred: &Tensor, target: &Tensor, tau: &Tensor) -> Result<Tensor> {
    let (batch_size, n_quantiles) = pred.dims2()?;
    anyhow::ensure!(
        target.dims() == [batch_size, n_quantiles],
        "target has shape {:?}, but predictions have {:?}",
        target.dims(),
        pred.dims()
    );
    anyhow::ensure!(
        tau.dims() == [n_quantiles],
        "tau has shape {:?} for {} quantiles",
        tau.dims(),
        n_quantiles
    );

    let delta = target.unsqueeze(2)?.broadcast_sub(&pred.unsqueeze(1)?)?;
    let indicator = delta.detach().lt(0f64)?.to_dtype(DType::F32)?;
    let tau = tau.reshape((1, n_quantiles, 1))?;
    let weight = tau.broadcast_sub(&indicator)?.abs()?;
    let loss = weight.mul(&huber(&delta, 1.0)?)?;

    Ok(loss.mean(D::Minus1)?.mean(D::Minus1)?)
}

/// Importance-weighted quantile Huber loss and absolute TD errors.
///
/// The loss is `mean_b(weight[b] * quantile_huber_loss[b])`, with weight 1 when
/// `weight` is `None`. The TD error of a batch element is the mean over
/// quantiles of `|target - pred|`, detached from the graph.
pub fn quantile_regression_loss(
    pred: &Tensor,
    target: &Tensor,
    tau: &Tensor,
    weight: Option<&Tensor>,
) -> Result<(Tensor, Tensor)> {
    let per_sample = quantile_huber_loss(pred, target, tau)?;
    let loss = match weight {
        Some(w) => per_sample.mul(w)?.mean_all()?,
        None => per_sample.mean_all()?,
    };
    let td_err = (target - pred)?.abs()?.mean(D::Minus1)?.detach();
    Ok((loss, td_err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_midpoints() -> Result<()> {
        for n in [1usize, 2, 5, 51] {
            let tau: Vec<f32> = quantile_midpoints(n, &Device::Cpu)?.to_vec1()?;
            assert_eq!(tau.len(), n);
            for (i, t) in tau.iter().enumerate() {
                assert!((t - (i as f32 + 0.5) / n as f32).abs() < 1e-6);
                assert!(*t > 0.0 && *t < 1.0);
            }
            assert!(tau.windows(2).all(|w| w[0] < w[1]));
        }
        Ok(())
    }

    #[test]
    fn test_huber() -> Result<()> {
        let x = Tensor::new(&[-3f32, -1.0, -0.5, 0.0, 0.5, 2.0], &Device::Cpu)?;
        let y: Vec<f32> = huber(&x, 1.0)?.to_vec1()?;
        let expected = [2.5f32, 0.5, 0.125, 0.0, 0.125, 1.5];
        for (a, b) in y.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
        }
        Ok(())
    }

    #[test]
    fn test_zero_loss_for_equal_inputs() -> Result<()> {
        let device = Device::Cpu;
        let tau = quantile_midpoints(1, &device)?;
        let pred = Tensor::new(&[[1.5f32], [-2.0], [0.0]], &device)?;
        let w = Tensor::new(&[0.2f32, 1.0, 0.7], &device)?;
        let (loss, td) = quantile_regression_loss(&pred, &pred.clone(), &tau, Some(&w))?;
        assert_eq!(loss.to_scalar::<f32>()?, 0.0);
        assert_eq!(td.to_vec1::<f32>()?, vec![0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_quantile_huber_loss_values() -> Result<()> {
        let device = Device::Cpu;

        // A single quantile at the median, overestimation and underestimation
        // are penalized equally.
        let tau = quantile_midpoints(1, &device)?;
        let pred = Tensor::new(&[[0f32], [2.0]], &device)?;
        let target = Tensor::new(&[[2f32], [0.0]], &device)?;
        let loss: Vec<f32> = quantile_huber_loss(&pred, &target, &tau)?.to_vec1()?;
        assert!((loss[0] - 0.75).abs() < 1e-6);
        assert!((loss[1] - 0.75).abs() < 1e-6);

        // Two quantiles, tau = [0.25, 0.75]
        let tau = quantile_midpoints(2, &device)?;
        let pred = Tensor::new(&[[0f32, 0.0]], &device)?;
        let target = Tensor::new(&[[0.5f32, -0.5]], &device)?;
        let (loss, td) = quantile_regression_loss(&pred, &target, &tau, None)?;
        assert!((loss.to_scalar::<f32>()? - 0.03125).abs() < 1e-6);
        assert!((td.to_vec1::<f32>()?[0] - 0.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_importance_weights() -> Result<()> {
        let device = Device::Cpu;
        let tau = quantile_midpoints(1, &device)?;
        let pred = Tensor::new(&[[0f32], [0.0]], &device)?;
        let target = Tensor::new(&[[2f32], [2.0]], &device)?;
        let w = Tensor::new(&[1f32, 0.0], &device)?;
        let (loss, _) = quantile_regression_loss(&pred, &target, &tau, Some(&w))?;
        assert!((loss.to_scalar::<f32>()? - 0.375).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_shape_mismatch() -> Result<()> {
        let device = Device::Cpu;
        let tau = quantile_midpoints(2, &device)?;
        let pred = Tensor::zeros((3, 2), DType::F32, &device)?;
        let target = Tensor::zeros((3, 3), DType::F32, &device)?;
        assert!(quantile_huber_loss(&pred, &target, &tau).is_err());
        Ok(())
    }
}
