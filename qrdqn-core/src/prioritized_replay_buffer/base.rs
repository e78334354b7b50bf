//! Ring buffer of transitions with sum-tree based prioritized sampling.
mod sum_tree;
use super::{BatchBase, GenericTransitionBatch, PrioritizedReplayBufferConfig};
use crate::{error::QrError, ExperienceBufferBase, ReplayBufferBase, TransitionBatch};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
pub use sum_tree::{SumTree, WeightNormalizer};

/// A replay buffer with prioritized experience replay.
///
/// Sampling probability of transition `i` is `p_i / sum_k p_k` with
/// `p_i = (|td_i| + eps)^alpha`. New transitions get the largest priority seen
/// so far, so they are sampled at least once with high probability.
///
/// ```ignore
/// let config = PrioritizedReplayBufferConfig::default().capacity(10000);
/// let mut buffer = PrioritizedReplayBuffer::<ObsBatch>::build(&config);
///
/// buffer.push(transition)?;
/// let batch = buffer.batch(32, beta)?;
/// let (.., ixs, weights) = batch.unpack();
///
/// // ... compute TD errors with weights ...
/// buffer.update_priority(&ixs.unwrap(), &td_errs)?;
/// ```
pub struct PrioritizedReplayBuffer<O: BatchBase> {
    capacity: usize,

    /// Insertion index.
    i: usize,

    size: usize,
    obs: O,
    act: Vec<usize>,
    next_obs: O,
    reward: Vec<f32>,
    is_terminated: Vec<i8>,
    is_truncated: Vec<i8>,
    rng: StdRng,

    /// `None` for uniform sampling.
    sum_tree: Option<SumTree>,
}

impl<O: BatchBase> PrioritizedReplayBuffer<O> {
    /// Creates a buffer, failing on a zero capacity.
    pub fn try_build(config: &PrioritizedReplayBufferConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(QrError::InvalidArgument("capacity of replay buffer must be positive".into()).into());
        }
        Ok(<Self as ReplayBufferBase>::build(config))
    }

    /// Maximum number of transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The sum tree, `None` if sampling is uniform.
    pub fn sum_tree(&self) -> Option<&SumTree> {
        self.sum_tree.as_ref()
    }

    #[inline]
    fn push_slice<T: Copy>(capacity: usize, i: usize, dst: &mut [T], src: &[T]) {
        let mut j = i;
        for &v in src.iter() {
            dst[j] = v;
            j += 1;
            if j == capacity {
                j = 0;
            }
        }
    }

    fn sample_slice<T: Copy>(src: &[T], ixs: &[usize]) -> Vec<T> {
        ixs.iter().map(|&ix| src[ix]).collect()
    }

    /// Returns the number of terminated episodes in the buffer.
    pub fn num_terminated_flags(&self) -> usize {
        self.is_terminated[..self.size]
            .iter()
            .map(|&is_terminated| is_terminated as usize)
            .sum()
    }

    /// Returns the sum of all rewards in the buffer.
    pub fn sum_rewards(&self) -> f32 {
        self.reward[..self.size].iter().sum()
    }
}

impl<O: BatchBase> ExperienceBufferBase for PrioritizedReplayBuffer<O> {
    type Item = GenericTransitionBatch<O>;

    fn len(&self) -> usize {
        self.size
    }

    /// Appends transitions, overwriting the oldest ones when the buffer is full.
    fn push(&mut self, tr: Self::Item) -> Result<()> {
        let len = tr.len();
        if tr.act.len() != len || tr.is_terminated.len() != len || tr.is_truncated.len() != len {
            return Err(QrError::ShapeMismatch(format!(
                "transition fields have different lengths: reward={}, act={}, is_terminated={}, is_truncated={}",
                len,
                tr.act.len(),
                tr.is_terminated.len(),
                tr.is_truncated.len()
            ))
            .into());
        }
        if len > self.capacity {
            return Err(QrError::ShapeMismatch(format!(
                "{} transitions pushed at once into a buffer of capacity {}",
                len, self.capacity
            ))
            .into());
        }

        let (obs, act, next_obs, reward, is_terminated, is_truncated, _, _) = tr.unpack();
        self.obs.push(self.i, obs)?;
        self.next_obs.push(self.i, next_obs)?;
        Self::push_slice(self.capacity, self.i, &mut self.act, &act);
        Self::push_slice(self.capacity, self.i, &mut self.reward, &reward);
        Self::push_slice(self.capacity, self.i, &mut self.is_terminated, &is_terminated);
        Self::push_slice(self.capacity, self.i, &mut self.is_truncated, &is_truncated);

        if let Some(sum_tree) = self.sum_tree.as_mut() {
            for j in 0..len {
                sum_tree.add((self.i + j) % self.capacity);
            }
        }

        self.i = (self.i + len) % self.capacity;
        self.size = (self.size + len).min(self.capacity);

        Ok(())
    }
}

impl<O: BatchBase> ReplayBufferBase for PrioritizedReplayBuffer<O> {
    type Config = PrioritizedReplayBufferConfig;
    type Batch = GenericTransitionBatch<O>;

    /// Creates a buffer. A zero capacity is replaced with 1, use
    /// [`PrioritizedReplayBuffer::try_build`] to reject it instead.
    fn build(config: &Self::Config) -> Self {
        let capacity = config.capacity.max(1);
        let sum_tree = config
            .per_config
            .as_ref()
            .map(|c| SumTree::new(capacity, c.alpha, c.eps, c.normalize));

        Self {
            capacity,
            i: 0,
            size: 0,
            obs: O::new(capacity),
            act: vec![0; capacity],
            next_obs: O::new(capacity),
            reward: vec![0.; capacity],
            is_terminated: vec![0; capacity],
            is_truncated: vec![0; capacity],
            rng: StdRng::seed_from_u64(config.seed),
            sum_tree,
        }
    }

    fn batch(&mut self, size: usize, beta: f32) -> Result<Self::Batch> {
        if self.size == 0 {
            return Err(QrError::EmptyBuffer.into());
        }
        if size == 0 {
            return Err(QrError::InvalidArgument("batch size must be positive".into()).into());
        }

        let (ixs, weight) = match &self.sum_tree {
            Some(sum_tree) => {
                let (ixs, weight) = sum_tree.sample(size, beta, &mut self.rng);
                (ixs, Some(weight))
            }
            None => {
                let ixs = (0..size)
                    .map(|_| self.rng.gen_range(0..self.size))
                    .collect::<Vec<_>>();
                (ixs, None)
            }
        };

        Ok(Self::Batch {
            obs: self.obs.sample(&ixs)?,
            act: Self::sample_slice(&self.act, &ixs),
            next_obs: self.next_obs.sample(&ixs)?,
            reward: Self::sample_slice(&self.reward, &ixs),
            is_terminated: Self::sample_slice(&self.is_terminated, &ixs),
            is_truncated: Self::sample_slice(&self.is_truncated, &ixs),
            ix_sample: Some(ixs),
            weight,
        })
    }

    /// Sets the priorities of transitions at `ixs` to `|td_errs|`.
    ///
    /// Nothing is updated if any index or TD error is invalid.
    fn update_priority(&mut self, ixs: &[usize], td_errs: &[f32]) -> Result<()> {
        if ixs.len() != td_errs.len() {
            return Err(QrError::ShapeMismatch(format!(
                "{} indices and {} TD errors",
                ixs.len(),
                td_errs.len()
            ))
            .into());
        }
        if let Some(&ix) = ixs.iter().find(|&&ix| ix >= self.size) {
            return Err(QrError::IndexOutOfRange(ix, self.size).into());
        }
        if let Some(td) = td_errs.iter().find(|td| !td.is_finite()) {
            return Err(QrError::InvalidArgument(format!("TD error must be finite, got {}", td)).into());
        }

        if let Some(sum_tree) = self.sum_tree.as_mut() {
            for (&ix, &td_err) in ixs.iter().zip(td_errs.iter()) {
                sum_tree.update(ix, td_err.abs());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prioritized_replay_buffer::PerConfig;

    /// Scalar observations.
    #[derive(Clone, Debug, PartialEq)]
    struct ScalarBatch(Vec<f32>);

    impl BatchBase for ScalarBatch {
        fn new(capacity: usize) -> Self {
            Self(vec![0.; capacity])
        }

        fn push(&mut self, ix: usize, data: Self) -> Result<()> {
            let capacity = self.0.len();
            for (j, v) in data.0.into_iter().enumerate() {
                self.0[(ix + j) % capacity] = v;
            }
            Ok(())
        }

        fn sample(&self, ixs: &[usize]) -> Result<Self> {
            Ok(Self(ixs.iter().map(|&ix| self.0[ix]).collect()))
        }
    }

    fn transition(v: f32) -> GenericTransitionBatch<ScalarBatch> {
        GenericTransitionBatch {
            obs: ScalarBatch(vec![v]),
            act: vec![v as usize % 2],
            next_obs: ScalarBatch(vec![v + 1.0]),
            reward: vec![v],
            is_terminated: vec![0],
            is_truncated: vec![0],
            weight: None,
            ix_sample: None,
        }
    }

    fn buffer(capacity: usize) -> PrioritizedReplayBuffer<ScalarBatch> {
        let config = PrioritizedReplayBufferConfig::default()
            .capacity(capacity)
            .per_config(Some(PerConfig::default()));
        PrioritizedReplayBuffer::build(&config)
    }

    #[test]
    fn test_zero_capacity() {
        let config = PrioritizedReplayBufferConfig::default().capacity(0);
        let err = PrioritizedReplayBuffer::<ScalarBatch>::try_build(&config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<QrError>(),
            Some(QrError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_ring_buffer_overwrites_oldest() -> Result<()> {
        let mut buffer = buffer(3);
        for v in 0..5 {
            buffer.push(transition(v as f32))?;
        }
        assert_eq!(buffer.len(), 3);
        // slots hold 3, 4, 2
        assert_eq!(buffer.sum_rewards(), 9.0);
        assert_eq!(buffer.sum_tree().unwrap().len(), 3);
        Ok(())
    }

    #[test]
    fn test_empty_buffer() {
        let mut buffer = buffer(4);
        let err = buffer.batch(2, 0.4).err().unwrap();
        assert_eq!(err.downcast_ref::<QrError>(), Some(&QrError::EmptyBuffer));
    }

    #[test]
    fn test_batch_shapes_and_weights() -> Result<()> {
        let mut buffer = buffer(16);
        for v in 0..10 {
            buffer.push(transition(v as f32))?;
        }
        let batch = buffer.batch(8, 0.4)?;
        assert_eq!(batch.len(), 8);
        let (obs, _act, next_obs, reward, _, _, ixs, ws) = batch.unpack();
        let ixs = ixs.unwrap();
        let ws = ws.unwrap();
        assert!(ixs.iter().all(|&ix| ix < 10));
        assert!(ws.iter().all(|&w| w > 0.0 && w <= 1.0 + 1e-6));
        for k in 0..8 {
            assert_eq!(obs.0[k], reward[k]);
            assert_eq!(next_obs.0[k], reward[k] + 1.0);
        }
        Ok(())
    }

    #[test]
    fn test_update_priority_shifts_sampling() -> Result<()> {
        let mut buffer = buffer(4);
        for v in 0..4 {
            buffer.push(transition(v as f32))?;
        }
        buffer.update_priority(&[0, 1, 2, 3], &[0.0, 0.0, -10.0, 0.0])?;

        let batch = buffer.batch(1000, 1.0)?;
        let ixs = batch.ix_sample.unwrap();
        let n2 = ixs.iter().filter(|&&ix| ix == 2).count();
        assert!(n2 > 950, "index 2 sampled {} times", n2);

        // new transitions get the largest priority seen so far
        assert_eq!(buffer.sum_tree().unwrap().max_priority(), 10.0);
        Ok(())
    }

    #[test]
    fn test_update_priority_rejects_invalid_input() -> Result<()> {
        let mut buffer = buffer(4);
        buffer.push(transition(0.0))?;
        buffer.push(transition(1.0))?;
        let total = buffer.sum_tree().unwrap().total();

        let err = buffer.update_priority(&[0, 2], &[1.0, 1.0]).err().unwrap();
        assert_eq!(err.downcast_ref::<QrError>(), Some(&QrError::IndexOutOfRange(2, 2)));

        let err = buffer.update_priority(&[0, 1], &[1.0, f32::NAN]).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<QrError>(),
            Some(QrError::InvalidArgument(_))
        ));

        let err = buffer.update_priority(&[0, 1], &[1.0]).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<QrError>(),
            Some(QrError::ShapeMismatch(_))
        ));

        assert_eq!(buffer.sum_tree().unwrap().total(), total);
        Ok(())
    }

    #[test]
    fn test_uniform_sampling() -> Result<()> {
        let config = PrioritizedReplayBufferConfig::default()
            .capacity(8)
            .per_config(None);
        let mut buffer = PrioritizedReplayBuffer::<ScalarBatch>::build(&config);
        for v in 0..4 {
            buffer.push(transition(v as f32))?;
        }
        let batch = buffer.batch(100, 0.4)?;
        assert!(batch.weight.is_none());
        assert!(batch.ix_sample.unwrap().iter().all(|&ix| ix < 4));
        Ok(())
    }
}
