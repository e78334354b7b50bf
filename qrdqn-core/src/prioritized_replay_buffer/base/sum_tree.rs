//! Sum tree for prioritized sampling.
//!
//! Adapted from <https://github.com/jaromiru/AI-blog/blob/master/SumTree.py> and
//! <https://github.com/openai/baselines/blob/master/baselines/deepq/replay_buffer.py>.
use rand::Rng;
use segment_tree::{ops::MinIgnoreNaN, SegmentPoint};
use serde::{Deserialize, Serialize};

/// Normalization of importance sampling weights.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Divide by the largest weight any stored transition could get.
    All,

    /// Divide by the largest weight in the sampled batch.
    Batch,
}

/// Binary tree whose leaves hold `(priority + eps)^alpha` and whose inner
/// nodes hold the sum of their children.
#[derive(Debug)]
pub struct SumTree {
    eps: f32,
    alpha: f32,
    capacity: usize,
    n_samples: usize,
    tree: Vec<f32>,
    min_tree: SegmentPoint<f32, MinIgnoreNaN>,
    max_priority: f32,
    normalize: WeightNormalizer,
}

impl SumTree {
    /// Creates a sum tree with `capacity` leaves.
    pub fn new(capacity: usize, alpha: f32, eps: f32, normalize: WeightNormalizer) -> Self {
        assert!(capacity > 0, "capacity of SumTree must be positive");
        Self {
            eps,
            alpha,
            capacity,
            n_samples: 0,
            tree: vec![0f32; 2 * capacity - 1],
            min_tree: SegmentPoint::build(vec![f32::MAX; capacity], MinIgnoreNaN),
            max_priority: 1.0,
            normalize,
        }
    }

    fn propagate(&mut self, ix: usize, change: f32) {
        let mut ix = ix;
        while ix != 0 {
            ix = (ix - 1) / 2;
            self.tree[ix] += change;
        }
    }

    fn retrieve(&self, s: f32) -> usize {
        let mut ix = 0;
        let mut s = s;

        loop {
            let left = 2 * ix + 1;
            let right = left + 1;

            if left >= self.tree.len() {
                return ix;
            }

            if s <= self.tree[left] || self.tree[right] == 0f32 {
                ix = left;
            } else {
                s -= self.tree[left];
                ix = right;
            }
        }
    }

    /// Sum of all stored values.
    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// The number of leaves holding a priority.
    pub fn len(&self) -> usize {
        self.n_samples
    }

    /// Returns `true` if no priority has been added.
    pub fn is_empty(&self) -> bool {
        self.n_samples == 0
    }

    /// The largest priority seen so far, before `eps` and `alpha` are applied.
    ///
    /// Newly added transitions get this priority. It is 1.0 before any update.
    pub fn max_priority(&self) -> f32 {
        self.max_priority
    }

    /// The stored value `(priority + eps)^alpha` of the `ix`-th leaf.
    pub fn value(&self, ix: usize) -> f32 {
        self.tree[ix + self.capacity - 1]
    }

    /// Adds a transition at the `ix`-th leaf with the maximal priority.
    pub fn add(&mut self, ix: usize) {
        debug_assert!(ix < self.capacity);

        self.update(ix, self.max_priority);

        if self.n_samples < self.capacity {
            self.n_samples += 1;
        }
    }

    /// Updates the priority of the `ix`-th leaf.
    ///
    /// `p` is a non-negative priority, typically an absolute TD error.
    pub fn update(&mut self, ix: usize, p: f32) {
        debug_assert!(ix < self.capacity);
        debug_assert!(p.is_finite() && p >= 0.0);

        self.max_priority = self.max_priority.max(p);
        let v = (p + self.eps).powf(self.alpha);
        self.min_tree.modify(ix, v);
        let ix = ix + self.capacity - 1;
        let change = v - self.tree[ix];
        self.tree[ix] = v;
        self.propagate(ix, change);
    }

    /// Gets the index of the leaf at which the cumulative sum reaches `s`.
    pub fn get(&self, s: f32) -> usize {
        let ix = self.retrieve(s);
        debug_assert!(ix >= (self.capacity - 1));
        (ix + 1 - self.capacity).min(self.n_samples.saturating_sub(1))
    }

    /// Samples indices proportionally to the stored values and returns them
    /// with importance sampling weights.
    ///
    /// Sampling is stratified: the total is split into `batch_size` equal
    /// segments and the `k`-th index is drawn uniformly from the `k`-th segment.
    ///
    /// The weight is $w_i=\left(N P(i)\right)^{-\beta}$, normalized according to
    /// [`WeightNormalizer`].
    pub fn sample(&self, batch_size: usize, beta: f32, rng: &mut impl Rng) -> (Vec<usize>, Vec<f32>) {
        let p_sum = self.total();
        let segment = p_sum / batch_size as f32;
        let indices = (0..batch_size)
            .map(|k| self.get(segment * (k as f32 + rng.gen::<f32>())))
            .collect::<Vec<_>>();

        let n = self.n_samples as f32 / p_sum;
        let ws = indices
            .iter()
            .map(|&ix| (n * self.value(ix)).powf(-beta))
            .collect::<Vec<_>>();

        let w_max = match self.normalize {
            WeightNormalizer::All => {
                let p_min = self.min_tree.query(0, self.n_samples);
                (n * p_min).powf(-beta)
            }
            WeightNormalizer::Batch => ws.iter().fold(f32::MIN_POSITIVE, |m, &w| w.max(m)),
        };
        let ws = ws.iter().map(|w| w / w_max).collect();

        (indices, ws)
    }
}
