//! Batch.

/// A batch of transitions sampled from a replay buffer.
pub trait TransitionBatch {
    /// A set of observations in a batch.
    type ObsBatch;

    /// Unpack the data
    /// `(o_t, a_t, o_t+1, r_t, is_terminated_t, is_truncated_t, ixs, weights)`.
    ///
    /// `ixs` are the replay indices of the sampled transitions and `weights` their
    /// importance sampling weights. Both are `None` for batches not taken from
    /// a prioritized buffer.
    #[allow(clippy::type_complexity)]
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
    );

    /// Returns the number of transitions.
    fn len(&self) -> usize;

    /// Returns `o_t`.
    fn obs(&self) -> &Self::ObsBatch;

    /// Returns `a_t`.
    fn act(&self) -> &Vec<usize>;
}
