//! QR-DQN agent implemented with candle.
use super::{config::QrDqnConfig, explorer::EpsilonGreedy, model::QrDqnModel};
use crate::{
    model::SubModel1,
    util::{
        argmax, hard_update, quantile_midpoints, quantile_regression_loss, summarize_quantiles,
        OutDim,
    },
};
use anyhow::Result;
use candle_core::{Device, IndexOp, Tensor, D};
use log::{debug, trace};
use qrdqn_core::{
    error::QrError,
    record::{Record, RecordValue},
    Agent, BetaSchedule, Env, Policy, ReplayBufferBase, RiskPreference, TransitionBatch,
};
use rand::{rngs::SmallRng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, marker::PhantomData};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// QR-DQN agent implemented with candle.
///
/// The online network `qnet` is trained by [`Agent::opt`] on batches sampled
/// from a prioritized replay buffer. The target network `qnet_tgt` is a copy
/// of the online network refreshed by [`Agent::update_target`].
///
/// ```mermaid
/// flowchart TB
///   Buffer([Replay buffer]) -->|batch| Pred[qnet: quantiles of taken actions]
///   Buffer -->|next_obs| Sel[qnet: argmax of mean quantiles]
///   Sel -->|next actions| Tgt[qnet_tgt: quantiles of next actions]
///   Tgt --> Bellman[reward + gamma * quantiles, zero if done]
///   Pred --> Loss[quantile Huber loss]
///   Bellman --> Loss
///   Loss -->|backward| Pred
///   Loss -->|TD errors| Buffer
/// ```
pub struct QrDqn<E, Q, R>
where
    Q: SubModel1<Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim,
{
    qnet: QrDqnModel<Q>,
    qnet_tgt: QrDqnModel<Q>,
    n_actions: usize,
    n_quantiles: usize,
    tau: Tensor,
    gamma: f64,
    batch_size: usize,
    beta: BetaSchedule,
    explorer: EpsilonGreedy,
    train: bool,
    n_opts: usize,
    device: Device,
    rng: SmallRng,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, R> QrDqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    E::Obs: Into<Tensor>,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    /// Chooses an action for a single observation.
    ///
    /// In training mode a uniformly random action is taken with probability
    /// epsilon. Otherwise the quantiles of each action are reduced according
    /// to `risk` and the best action is returned, the lowest index on ties.
    pub fn choose_action(&mut self, obs: &E::Obs, risk: RiskPreference) -> Result<usize> {
        if self.train {
            if let Some(act) = self.explorer.action(self.n_actions, &mut self.rng)? {
                return Ok(act);
            }
        }

        let x: Tensor = obs.clone().into();
        let q = self.qnet.forward(&x)?.detach().i(0)?;
        let q: Vec<Vec<f32>> = q.to_vec2()?;
        let values = q
            .iter()
            .map(|quantiles| summarize_quantiles(quantiles, risk))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| QrError::ShapeMismatch("no quantiles per action".into()))?;
        trace!("{} values of actions: {:?}", risk, values);

        argmax(&values)
            .ok_or_else(|| QrError::InvalidAction("the action space is empty".into()).into())
    }

    /// Computes double-Q targets of shape `(batch_size, n_quantiles)`.
    ///
    /// The next action is the argmax of the online network's mean quantiles,
    /// its quantiles are taken from the target network. The future term of
    /// done transitions is zero regardless of the target network output.
    pub fn bellman_targets(&self, next_obs: &Tensor, reward: &[f32], done: &[bool]) -> Result<Tensor> {
        let batch_size = reward.len();
        if done.len() != batch_size {
            return Err(QrError::ShapeMismatch(format!(
                "{} rewards and {} done flags",
                batch_size,
                done.len()
            ))
            .into());
        }
        let n = self.n_quantiles;

        let next_act = {
            let q: Vec<Vec<f32>> = self
                .qnet
                .forward(next_obs)?
                .detach()
                .mean(D::Minus1)?
                .to_vec2()?;
            if q.len() != batch_size {
                return Err(QrError::ShapeMismatch(format!(
                    "{} next observations and {} rewards",
                    q.len(),
                    batch_size
                ))
                .into());
            }
            q.iter()
                .map(|v| {
                    argmax(v)
                        .map(|a| a as u32)
                        .ok_or_else(|| QrError::InvalidAction("the action space is empty".into()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        let next_act = Tensor::from_vec(next_act, (batch_size, 1, 1), &self.device)?
            .broadcast_as((batch_size, 1, n))?
            .contiguous()?;

        let q_next = self
            .qnet_tgt
            .forward(next_obs)?
            .detach()
            .gather(&next_act, 1)?
            .squeeze(1)?;
        let future = (q_next * self.gamma)?;

        let mask = {
            let done = done.iter().map(|&d| d as u8).collect::<Vec<_>>();
            Tensor::from_vec(done, (batch_size, 1), &self.device)?
                .broadcast_as((batch_size, n))?
                .contiguous()?
        };
        let future = mask.where_cond(&future.zeros_like()?, &future)?;
        let reward = Tensor::from_slice(reward, (batch_size, 1), &self.device)?;

        Ok(reward.broadcast_add(&future)?.detach())
    }

    /// Performs a gradient step on a batch of transitions.
    ///
    /// Returns the loss and the absolute TD errors of the transitions.
    /// Missing importance sampling weights are taken as 1.
    #[allow(clippy::too_many_arguments)]
    pub fn learn_from_batch(
        &mut self,
        obs: &Tensor,
        act: &[usize],
        next_obs: &Tensor,
        reward: &[f32],
        done: &[bool],
        weight: Option<&[f32]>,
    ) -> Result<(f32, Vec<f32>)> {
        let batch_size = act.len();
        if reward.len() != batch_size || weight.is_some_and(|w| w.len() != batch_size) {
            return Err(QrError::ShapeMismatch(format!(
                "{} actions, {} rewards and {:?} weights in a batch",
                batch_size,
                reward.len(),
                weight.map(|w| w.len())
            ))
            .into());
        }
        if let Some(&a) = act.iter().find(|&&a| a >= self.n_actions) {
            return Err(QrError::InvalidAction(format!(
                "action {} in a batch, {} actions available",
                a, self.n_actions
            ))
            .into());
        }
        let n = self.n_quantiles;

        let target = self.bellman_targets(next_obs, reward, done)?;
        let pred = {
            let act = act.iter().map(|&a| a as u32).collect::<Vec<_>>();
            let act = Tensor::from_vec(act, (batch_size, 1, 1), &self.device)?
                .broadcast_as((batch_size, 1, n))?
                .contiguous()?;
            self.qnet.forward(obs)?.gather(&act, 1)?.squeeze(1)?
        };
        let weight = weight
            .map(|w| Tensor::from_slice(w, (batch_size,), &self.device))
            .transpose()?;

        let (loss, td_err) = quantile_regression_loss(&pred, &target, &self.tau, weight.as_ref())?;
        self.qnet.backward_step(&loss)?;

        Ok((loss.to_scalar::<f32>()?, td_err.to_vec1::<f32>()?))
    }

    /// Samples a batch, updates the online network and writes back priorities.
    pub fn train_step(&mut self, buffer: &mut R) -> Result<Record> {
        let beta = self.beta.beta();
        let batch = buffer.batch(self.batch_size, beta)?;
        let (obs, act, next_obs, reward, is_terminated, is_truncated, ixs, weight) = batch.unpack();
        let done = is_terminated
            .iter()
            .zip(is_truncated.iter())
            .map(|(&t1, &t2)| t1 != 0 || t2 != 0)
            .collect::<Vec<_>>();
        let obs: Tensor = obs.try_into()?;
        let next_obs: Tensor = next_obs.try_into()?;

        let (loss, td_err) =
            self.learn_from_batch(&obs, &act, &next_obs, &reward, &done, weight.as_deref())?;

        if let Some(ixs) = ixs {
            buffer.update_priority(&ixs, &td_err)?;
        }
        let beta = self.beta.advance();
        self.n_opts += 1;

        let td_error_mean = td_err.iter().sum::<f32>() / td_err.len() as f32;
        trace!(
            "opt step {}: loss = {}, td_error_mean = {}",
            self.n_opts,
            loss,
            td_error_mean
        );

        Ok(Record::from_slice(&[
            ("loss", RecordValue::Scalar(loss)),
            ("td_error_mean", RecordValue::Scalar(td_error_mean)),
            ("beta", RecordValue::Scalar(beta)),
        ]))
    }

    /// The number of completed optimization steps.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// The current exponent of importance sampling weights.
    pub fn beta(&self) -> f32 {
        self.beta.beta()
    }
}

impl<E, Q, R> Policy<E> for QrDqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    E::Obs: Into<Tensor>,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    type Config = QrDqnConfig<Q::Config>;

    /// Constructs QR-DQN agent.
    ///
    /// The target network starts as a copy of the online network.
    fn build(config: Self::Config) -> Result<Self> {
        if config.n_actions == 0 {
            return Err(QrError::InvalidAction("the action space is empty".into()).into());
        }
        if config.num_quantiles == 0 {
            return Err(QrError::InvalidArgument("num_quantiles must be positive".into()).into());
        }

        let device = config.device.to_candle()?;
        let n_actions = config.n_actions;
        let n_quantiles = config.num_quantiles;
        let qnet = QrDqnModel::build(
            config.model_config.clone(),
            n_actions,
            n_quantiles,
            device.clone(),
        )?;
        let qnet_tgt = QrDqnModel::build(config.model_config, n_actions, n_quantiles, device.clone())?;
        hard_update(qnet_tgt.get_varmap(), qnet.get_varmap())?;
        let tau = quantile_midpoints(n_quantiles, &device)?;

        Ok(QrDqn {
            qnet,
            qnet_tgt,
            n_actions,
            n_quantiles,
            tau,
            gamma: config.gamma,
            batch_size: config.batch_size,
            beta: config.beta,
            explorer: config.explorer,
            train: config.train,
            n_opts: 0,
            device,
            rng: SmallRng::seed_from_u64(config.seed),
            phantom: PhantomData,
        })
    }

    fn sample(&mut self, obs: &E::Obs, risk: RiskPreference) -> Result<usize> {
        self.choose_action(obs, risk)
    }
}

impl<E, Q, R> Agent<E, R> for QrDqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    E::Obs: Into<Tensor>,
    <R::Batch as TransitionBatch>::ObsBatch: TryInto<Tensor, Error = anyhow::Error>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn set_epsilon(&mut self, epsilon: f64) {
        self.explorer.eps = epsilon;
    }

    fn opt(&mut self, buffer: &mut R) -> Result<Option<Record>> {
        if buffer.len() < self.batch_size {
            debug!(
                "Skip optimization: {} transitions in buffer, batch size {}",
                buffer.len(),
                self.batch_size
            );
            return Ok(None);
        }
        Ok(Some(self.train_step(buffer)?))
    }

    fn update_target(&mut self) -> Result<()> {
        hard_update(self.qnet_tgt.get_varmap(), self.qnet.get_varmap())?;
        debug!("Update target network after {} opt steps", self.n_opts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        opt::OptimizerConfig,
        qrdqn::QrDqnModelConfig,
        TensorBatch,
    };
    use candle_core::DType;
    use qrdqn_core::{
        prioritized_replay_buffer::{
            GenericTransitionBatch, PrioritizedReplayBuffer, PrioritizedReplayBufferConfig,
        },
        ExperienceBufferBase, Obs, Step,
    };

    const OBS_DIM: usize = 4;
    const N_ACTIONS: usize = 3;

    #[derive(Clone, Debug)]
    struct VecObs(Tensor);

    impl Obs for VecObs {
        fn len(&self) -> usize {
            self.0.dims()[0]
        }
    }

    impl From<VecObs> for Tensor {
        fn from(obs: VecObs) -> Self {
            obs.0
        }
    }

    /// Never stepped, only fixes the observation type.
    struct VecEnv;

    impl Env for VecEnv {
        type Config = ();
        type Obs = VecObs;
        type Info = ();

        fn build(_config: &Self::Config, _seed: i64) -> Result<Self> {
            Ok(Self)
        }

        fn reset(&mut self) -> Result<Self::Obs> {
            Ok(VecObs(Tensor::zeros((1, OBS_DIM), DType::F32, &Device::Cpu)?))
        }

        fn step(&mut self, _act: usize) -> Result<(Step<Self>, Record)> {
            unimplemented!()
        }

        fn sample_random_action(&mut self) -> usize {
            0
        }

        fn n_actions(&self) -> usize {
            N_ACTIONS
        }
    }

    type Buffer = PrioritizedReplayBuffer<TensorBatch>;
    type TestAgent = QrDqn<VecEnv, Mlp, Buffer>;

    fn config() -> QrDqnConfig<MlpConfig> {
        let model_config = QrDqnModelConfig::default()
            .q_config(MlpConfig::new(OBS_DIM as _, vec![16, 16], 0, false))
            .opt_config(OptimizerConfig::default().learning_rate(1e-3));
        QrDqnConfig::default()
            .model_config(model_config)
            .n_actions(N_ACTIONS)
            .num_quantiles(8)
            .batch_size(4)
    }

    fn obs(v: f32) -> Result<Tensor> {
        Ok(Tensor::full(v, (1, OBS_DIM), &Device::Cpu)?)
    }

    fn batch_obs(batch_size: usize) -> Result<Tensor> {
        let v = (0..batch_size * OBS_DIM)
            .map(|i| (i as f32 * 0.37).sin())
            .collect::<Vec<_>>();
        Ok(Tensor::from_vec(v, (batch_size, OBS_DIM), &Device::Cpu)?)
    }

    fn fill_nan(varmap: &candle_nn::VarMap) -> Result<()> {
        for var in varmap.all_vars() {
            var.set(&var.as_tensor().affine(0.0, f64::NAN)?)?;
        }
        Ok(())
    }

    fn transition(v: f32, act: usize, reward: f32) -> Result<GenericTransitionBatch<TensorBatch>> {
        Ok(GenericTransitionBatch {
            obs: obs(v)?.into(),
            act: vec![act],
            next_obs: obs(v + 1.0)?.into(),
            reward: vec![reward],
            is_terminated: vec![0],
            is_truncated: vec![0],
            weight: None,
            ix_sample: None,
        })
    }

    #[test]
    fn test_greedy_action_is_deterministic() -> Result<()> {
        let mut agent = TestAgent::build(config())?;
        agent.train();
        agent.set_epsilon(0.0);
        let o = VecObs(obs(0.3)?);

        for risk in [
            RiskPreference::Neutral,
            RiskPreference::RiskAverse,
            RiskPreference::RiskSeeking,
        ] {
            let a = agent.choose_action(&o, risk)?;
            assert!(a < N_ACTIONS);
            for _ in 0..20 {
                assert_eq!(agent.choose_action(&o, risk)?, a);
            }
        }
        Ok(())
    }

    #[test]
    fn test_random_action_is_uniform() -> Result<()> {
        let mut agent = TestAgent::build(config())?;
        agent.train();
        agent.set_epsilon(1.0);
        let o = VecObs(obs(0.3)?);

        let n = 30_000;
        let mut counts = [0usize; N_ACTIONS];
        for _ in 0..n {
            counts[agent.choose_action(&o, RiskPreference::Neutral)?] += 1;
        }
        for c in counts {
            let freq = c as f64 / n as f64;
            assert!((freq - 1.0 / N_ACTIONS as f64).abs() < 0.02, "{:?}", counts);
        }
        Ok(())
    }

    #[test]
    fn test_eval_mode_ignores_epsilon() -> Result<()> {
        let mut agent = TestAgent::build(config())?;
        agent.eval();
        agent.set_epsilon(1.0);
        let o = VecObs(obs(-0.7)?);
        let a = agent.choose_action(&o, RiskPreference::Neutral)?;
        for _ in 0..50 {
            assert_eq!(agent.choose_action(&o, RiskPreference::Neutral)?, a);
        }
        Ok(())
    }

    /// Sets a single linear layer so that the quantiles of every action are
    /// the given constants, independent of the observation.
    fn set_constant_quantiles(agent: &TestAgent, quantiles: &[[f32; 8]; N_ACTIONS]) -> Result<()> {
        let data = agent.qnet.get_varmap().data().lock().unwrap();
        let weight = &data["mlp.ln0.weight"];
        weight.set(&weight.as_tensor().zeros_like()?)?;
        let bias = quantiles.iter().flatten().copied().collect::<Vec<_>>();
        data["mlp.ln0.bias"].set(&Tensor::from_vec(bias, N_ACTIONS * 8, &Device::Cpu)?)?;
        Ok(())
    }

    #[test]
    fn test_risk_preference_switches_greedy_action() -> Result<()> {
        let model_config = QrDqnModelConfig::default()
            .q_config(MlpConfig::new(OBS_DIM as _, vec![], 0, false))
            .opt_config(OptimizerConfig::default());
        let mut agent = TestAgent::build(config().model_config(model_config))?;
        agent.eval();

        // Action 0 is narrow around 1.0, action 1 is wide with a slightly
        // higher mean, action 2 is always zero.
        set_constant_quantiles(
            &agent,
            &[
                [0.8, 0.9, 0.95, 1.0, 1.0, 1.05, 1.1, 1.2],
                [-5.0, -3.0, -1.0, 0.0, 1.0, 2.0, 5.0, 10.0],
                [0.0; 8],
            ],
        )?;

        for v in [-1.0, 0.0, 2.5] {
            let o = VecObs(obs(v)?);
            assert_eq!(agent.choose_action(&o, RiskPreference::RiskAverse)?, 0);
            assert_eq!(agent.choose_action(&o, RiskPreference::RiskSeeking)?, 1);
            assert_eq!(agent.choose_action(&o, RiskPreference::Neutral)?, 1);
        }
        Ok(())
    }

    #[test]
    fn test_empty_action_space() {
        assert!(TestAgent::build(config().n_actions(0)).is_err());
    }

    #[test]
    fn test_terminal_targets_equal_rewards() -> Result<()> {
        let agent = TestAgent::build(config())?;
        fill_nan(agent.qnet_tgt.get_varmap())?;

        let reward = [1.5f32, -2.0, 0.0, 7.25];
        let target = agent.bellman_targets(&batch_obs(4)?, &reward, &[true; 4])?;
        assert_eq!(target.dims(), &[4, 8]);
        let target: Vec<Vec<f32>> = target.to_vec2()?;
        for (row, r) in target.iter().zip(reward.iter()) {
            assert!(row.iter().all(|v| v == r), "{:?}", row);
        }
        Ok(())
    }

    #[test]
    fn test_non_terminal_targets_use_target_network() -> Result<()> {
        let agent = TestAgent::build(config().gamma(0.5))?;
        let next_obs = batch_obs(2)?;
        let reward = [1.0f32, -1.0];
        let target: Vec<Vec<f32>> = agent
            .bellman_targets(&next_obs, &reward, &[false, true])?
            .to_vec2()?;

        // Online and target networks are equal after construction
        let q: Vec<Vec<Vec<f32>>> = agent.qnet_tgt.forward(&next_obs)?.to_vec3()?;
        let means = q[0]
            .iter()
            .map(|qs| qs.iter().sum::<f32>() / qs.len() as f32)
            .collect::<Vec<_>>();
        let a = argmax(&means).unwrap();
        for (t, qv) in target[0].iter().zip(q[0][a].iter()) {
            assert!((t - (1.0 + 0.5 * qv)).abs() < 1e-5);
        }
        assert!(target[1].iter().all(|&t| t == -1.0));
        Ok(())
    }

    #[test]
    fn test_loss_decreases_on_fixed_batch() -> Result<()> {
        let mut agent = TestAgent::build(config())?;
        let obs = batch_obs(4)?;
        let next_obs = batch_obs(4)?;
        let act = [0usize, 1, 2, 1];
        let reward = [5.0f32, -3.0, 2.0, 4.0];
        let done = [true; 4];

        let (loss1, td1) = agent.learn_from_batch(&obs, &act, &next_obs, &reward, &done, None)?;
        let (loss2, _) = agent.learn_from_batch(&obs, &act, &next_obs, &reward, &done, None)?;
        assert_eq!(td1.len(), 4);
        assert!(td1.iter().all(|&e| e.is_finite() && e >= 0.0));
        assert!(loss2 < loss1, "{} >= {}", loss2, loss1);
        Ok(())
    }

    #[test]
    fn test_learn_rejects_invalid_batch() -> Result<()> {
        let mut agent = TestAgent::build(config())?;
        let obs = batch_obs(2)?;
        assert!(agent
            .learn_from_batch(&obs, &[0, 3], &obs, &[0.0, 0.0], &[false, false], None)
            .is_err());
        assert!(agent
            .learn_from_batch(&obs, &[0, 1], &obs, &[0.0], &[false, false], None)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_update_target() -> Result<()> {
        let mut agent = TestAgent::build(config())?;
        let mut buffer = Buffer::build(&PrioritizedReplayBufferConfig::default().capacity(16));
        for i in 0..8 {
            buffer.push(transition(i as f32 * 0.1, i % N_ACTIONS, 1.0)?)?;
        }
        agent.opt(&mut buffer)?;

        let x = batch_obs(3)?;
        let diff = |agent: &TestAgent| -> Result<f32> {
            let q = agent.qnet.forward(&x)?;
            let q_tgt = agent.qnet_tgt.forward(&x)?;
            Ok((q - q_tgt)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?)
        };
        assert!(diff(&agent)? > 0.0);
        agent.update_target()?;
        assert_eq!(diff(&agent)?, 0.0);
        Ok(())
    }

    #[test]
    fn test_opt_skipped_without_enough_transitions() -> Result<()> {
        let mut agent = TestAgent::build(config())?;
        let mut buffer = Buffer::build(&PrioritizedReplayBufferConfig::default().capacity(16));
        for i in 0..3 {
            buffer.push(transition(i as f32, 0, 0.0)?)?;
        }
        let total = buffer.sum_tree().map(|t| t.total());

        assert!(agent.opt(&mut buffer)?.is_none());
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.sum_tree().map(|t| t.total()), total);
        assert_eq!(agent.beta(), 0.4);
        assert_eq!(agent.n_opts(), 0);

        buffer.push(transition(3.0, 0, 0.0)?)?;
        let record = agent.opt(&mut buffer)?.unwrap();
        assert!(record.get_scalar("loss")?.is_finite());
        assert!(record.get_scalar("td_error_mean")? >= 0.0);
        assert!((record.get_scalar("beta")? - 0.401).abs() < 1e-6);
        assert!((agent.beta() - 0.401).abs() < 1e-6);
        assert_eq!(agent.n_opts(), 1);
        assert_ne!(buffer.sum_tree().map(|t| t.total()), total);
        Ok(())
    }
}
