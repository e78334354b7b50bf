//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor, WithDType};
use candle_nn::VarMap;
use log::trace;
mod quantile_loss;
use ndarray::ArrayD;
use num_traits::AsPrimitive;
use qrdqn_core::{error::QrError, RiskPreference};
pub use quantile_loss::{huber, quantile_huber_loss, quantile_midpoints, quantile_regression_loss};

/// Copies all variables of `src` into `dest`.
///
/// Variables are identified by their names. Both maps are locked during the
/// copy. A variable missing in `src` or a shape mismatch is an error.
pub fn hard_update(dest: &VarMap, src: &VarMap) -> Result<()> {
    trace!("dest");
    let dest = dest
        .data()
        .lock()
        .map_err(|_| anyhow!("failed to lock the destination VarMap"))?;
    trace!("src");
    let src = src
        .data()
        .lock()
        .map_err(|_| anyhow!("failed to lock the source VarMap"))?;

    if dest.len() != src.len() {
        return Err(QrError::ShapeMismatch(format!(
            "{} variables in destination, {} in source",
            dest.len(),
            src.len()
        ))
        .into());
    }

    for (k_dest, v_dest) in dest.iter() {
        let v_src = src
            .get(k_dest)
            .ok_or_else(|| QrError::ShapeMismatch(format!("variable {} is missing in source", k_dest)))?;
        if v_src.shape() != v_dest.shape() {
            return Err(QrError::ShapeMismatch(format!(
                "variable {}: {:?} in source, {:?} in destination",
                k_dest,
                v_src.shape(),
                v_dest.shape()
            ))
            .into());
        }
        v_dest.set(v_src.as_tensor())?;
    }

    Ok(())
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: i64);
}

/// Value at quantile `q` of `values` with linear interpolation between the
/// two nearest sorted samples, `pos = q * (n - 1)`.
///
/// Returns `None` for an empty slice.
pub fn percentile(values: &[f32], q: f64) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = (pos - lo as f64) as f32;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Reduces the quantiles of an action to a scalar.
///
/// * [`RiskPreference::Neutral`]: mean
/// * [`RiskPreference::RiskAverse`]: 10th percentile
/// * [`RiskPreference::RiskSeeking`]: 90th percentile
///
/// Returns `None` if `quantiles` is empty.
pub fn summarize_quantiles(quantiles: &[f32], risk: RiskPreference) -> Option<f32> {
    match risk {
        RiskPreference::Neutral if quantiles.is_empty() => None,
        RiskPreference::Neutral => Some(quantiles.iter().sum::<f32>() / quantiles.len() as f32),
        RiskPreference::RiskAverse => percentile(quantiles, 0.1),
        RiskPreference::RiskSeeking => percentile(quantiles, 0.9),
    }
}

/// Index of the largest value, the lowest index on ties.
///
/// Returns `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Converts [`ArrayD`] into [`Tensor`] with element type `T2`.
pub fn arrayd_to_tensor<T1, T2>(a: ArrayD<T1>, add_batch_dim: bool) -> Result<Tensor>
where
    T1: AsPrimitive<T2>,
    T2: WithDType,
{
    let shape = a.shape().to_vec();
    let v = a.iter().map(|e| e.as_()).collect::<Vec<_>>();
    let t = Tensor::from_vec(v, shape, &Device::Cpu)?;

    match add_batch_dim {
        true => Ok(t.unsqueeze(0)?),
        false => Ok(t),
    }
}
