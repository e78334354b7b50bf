use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::OutDim,
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use qrdqn_core::error::QrError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`QrDqnModel`].
pub struct QrDqnModelConfig<Q>
where
    Q: OutDim,
{
    pub(super) q_config: Option<Q>,
    pub(super) opt_config: OptimizerConfig,
}

impl<Q> Default for QrDqnModelConfig<Q>
where
    Q: OutDim,
{
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl<Q> QrDqnModelConfig<Q>
where
    Q: DeserializeOwned + Serialize + OutDim,
{
    /// Sets configurations of the quantile network.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets output dimension of the model.
    pub fn out_dim(mut self, v: i64) -> Self {
        if let Some(q_config) = &mut self.q_config {
            q_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [`QrDqnModelConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`QrDqnModelConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Quantile network with its parameters and optimizer.
///
/// The output of the network is reshaped to `(batch_size, n_actions, n_quantiles)`.
pub struct QrDqnModel<Q>
where
    Q: SubModel1<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim,
{
    varmap: VarMap,
    n_actions: usize,
    n_quantiles: usize,
    q: Q,
    opt: Optimizer,
}

impl<Q> QrDqnModel<Q>
where
    Q: SubModel1<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`QrDqnModel`].
    ///
    /// The output dimension of the network is set to `n_actions * n_quantiles`.
    pub fn build(
        config: QrDqnModelConfig<Q::Config>,
        n_actions: usize,
        n_quantiles: usize,
        device: Device,
    ) -> Result<Self> {
        let config = config.out_dim((n_actions * n_quantiles) as _);
        let q_config = config.q_config.context("q_config is not set.")?;
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            Q::build(vb, q_config)?
        };
        let opt = config.opt_config.build(varmap.all_vars())?;
        info!(
            "Built quantile network: {} actions, {} quantiles, {} variables",
            n_actions,
            n_quantiles,
            varmap.all_vars().len()
        );

        Ok(Self {
            varmap,
            n_actions,
            n_quantiles,
            q,
            opt,
        })
    }

    /// Outputs the quantiles of all actions given observation(s).
    ///
    /// The returned tensor has shape `(batch_size, n_actions, n_quantiles)`.
    pub fn forward(&self, obs: &Q::Input) -> Result<Tensor> {
        let x = self.q.forward(obs)?;
        let batch_size = x.dims().first().copied().unwrap_or(0);
        if x.elem_count() != batch_size * self.n_actions * self.n_quantiles {
            return Err(QrError::ShapeMismatch(format!(
                "network output of shape {:?} cannot be reshaped to ({}, {}, {})",
                x.dims(),
                batch_size,
                self.n_actions,
                self.n_quantiles
            ))
            .into());
        }
        Ok(x.reshape((batch_size, self.n_actions, self.n_quantiles))?)
    }

    /// Computes gradients of `loss` and updates the parameters.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Returns the parameters of the model.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp, MlpConfig};

    #[test]
    fn test_forward_shape() -> Result<()> {
        let config = QrDqnModelConfig::default().q_config(MlpConfig::new(4, vec![8], 0, false));
        let model = QrDqnModel::<Mlp>::build(config, 3, 5, Device::Cpu)?;
        let x = Tensor::zeros((2, 4), DType::F32, &Device::Cpu)?;
        assert_eq!(model.forward(&x)?.dims(), &[2, 3, 5]);
        Ok(())
    }

    #[test]
    fn test_missing_q_config() {
        let config = QrDqnModelConfig::<MlpConfig>::default();
        assert!(QrDqnModel::<Mlp>::build(config, 3, 5, Device::Cpu).is_err());
    }
}
