//! Transition batches stored in and sampled from the replay buffer.
use crate::TransitionBatch;
use anyhow::Result;

/// Storage of a batch of observations.
///
/// A replay buffer allocates one object with [`BatchBase::new`] for the whole
/// capacity, writes incoming observations with [`BatchBase::push`] and gathers
/// minibatches with [`BatchBase::sample`].
///
/// ```ignore
/// struct ObsBatch {
///     data: Vec<f32>,
/// }
///
/// impl BatchBase for ObsBatch {
///     fn new(capacity: usize) -> Self {
///         Self { data: Vec::with_capacity(capacity) }
///     }
///
///     fn push(&mut self, ix: usize, data: Self) -> Result<()> {
///         // Write `data` at `ix`, wrapping around at the capacity
///     }
///
///     fn sample(&self, ixs: &[usize]) -> Result<Self> {
///         // Gather rows at `ixs`
///     }
/// }
/// ```
pub trait BatchBase: Sized {
    /// Creates storage for `capacity` items.
    fn new(capacity: usize) -> Self;

    /// Writes the items in `data` starting at index `ix`.
    fn push(&mut self, ix: usize, data: Self) -> Result<()>;

    /// Gathers the items at `ixs`.
    fn sample(&self, ixs: &[usize]) -> Result<Self>;
}

/// A batch of transitions `(o_t, a_t, o_t+1, r_t, is_terminated_t, is_truncated_t)`.
///
/// Actions are indices of a discrete action space. `weight` and `ix_sample`
/// are set by [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer)
/// when the batch is sampled.
#[derive(Clone, Debug)]
pub struct GenericTransitionBatch<O: BatchBase> {
    /// Observations.
    pub obs: O,

    /// Actions.
    pub act: Vec<usize>,

    /// Next observations.
    pub next_obs: O,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Termination flags.
    pub is_terminated: Vec<i8>,

    /// Truncation flags.
    pub is_truncated: Vec<i8>,

    /// Importance sampling weights.
    pub weight: Option<Vec<f32>>,

    /// Indices of sampled transitions in the replay buffer.
    pub ix_sample: Option<Vec<usize>>,
}

impl<O: BatchBase> TransitionBatch for GenericTransitionBatch<O> {
    type ObsBatch = O;

    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Vec<usize>,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Vec<i8>,
        Option<Vec<usize>>,
        Option<Vec<f32>>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.is_truncated,
            self.ix_sample,
            self.weight,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn obs(&self) -> &Self::ObsBatch {
        &self.obs
    }

    fn act(&self) -> &Vec<usize> {
        &self.act
    }
}

impl<O: BatchBase> GenericTransitionBatch<O> {
    /// Creates an empty batch with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            obs: O::new(capacity),
            act: Vec::with_capacity(capacity),
            next_obs: O::new(capacity),
            reward: Vec::with_capacity(capacity),
            is_terminated: Vec::with_capacity(capacity),
            is_truncated: Vec::with_capacity(capacity),
            weight: None,
            ix_sample: None,
        }
    }

    /// Returns `true` for transitions where the episode terminated or was truncated.
    pub fn is_done(&self) -> Vec<bool> {
        self.is_terminated
            .iter()
            .zip(self.is_truncated.iter())
            .map(|(&t, &u)| t != 0 || u != 0)
            .collect()
    }
}
