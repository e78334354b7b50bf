//! Schedules of exploration rate and importance sampling exponent.
use serde::{Deserialize, Serialize};

/// Linear decay of epsilon driven by the caller's environment step counter.
///
/// Epsilon moves from `eps_start` to `eps_final` during the first
/// `decay_fraction * total_timesteps` steps and stays at `eps_final` afterwards.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EpsilonSchedule {
    /// Initial value of epsilon.
    pub eps_start: f64,

    /// Final value of epsilon.
    pub eps_final: f64,

    /// Fraction of `total_timesteps` over which epsilon decays.
    pub decay_fraction: f64,

    /// Total number of environment steps of a run.
    pub total_timesteps: usize,
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self {
            eps_start: 1.0,
            eps_final: 0.01,
            decay_fraction: 0.1,
            total_timesteps: 1_000_000,
        }
    }
}

impl EpsilonSchedule {
    /// Sets the initial value.
    pub fn eps_start(mut self, v: f64) -> Self {
        self.eps_start = v;
        self
    }

    /// Sets the final value.
    pub fn eps_final(mut self, v: f64) -> Self {
        self.eps_final = v;
        self
    }

    /// Sets the fraction of total timesteps used for decay.
    pub fn decay_fraction(mut self, v: f64) -> Self {
        self.decay_fraction = v;
        self
    }

    /// Sets the total number of timesteps.
    pub fn total_timesteps(mut self, v: usize) -> Self {
        self.total_timesteps = v;
        self
    }

    /// Number of steps until epsilon reaches its final value, at least 1.
    pub fn decay_steps(&self) -> usize {
        ((self.decay_fraction * self.total_timesteps as f64).round() as usize).max(1)
    }

    /// Epsilon at environment step `step`.
    pub fn value(&self, step: usize) -> f64 {
        let decay_steps = self.decay_steps();
        if step >= decay_steps {
            return self.eps_final;
        }
        let progress = step as f64 / decay_steps as f64;
        self.eps_start + (self.eps_final - self.eps_start) * progress
    }
}

/// Exponent of importance sampling weights for prioritized replay.
///
/// Beta starts at `beta_0` and increases by `increment` after every completed
/// optimization step, clamped at 1.0.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BetaSchedule {
    /// Initial value of beta.
    pub beta_0: f32,

    /// Increment of beta per optimization step.
    pub increment: f32,

    /// Current value.
    #[serde(default)]
    beta: Option<f32>,
}

impl Default for BetaSchedule {
    fn default() -> Self {
        Self::new(0.4, 0.001)
    }
}

impl BetaSchedule {
    /// Creates a schedule.
    pub fn new(beta_0: f32, increment: f32) -> Self {
        Self {
            beta_0,
            increment,
            beta: None,
        }
    }

    /// Gets the current exponent of importance sampling weights.
    pub fn beta(&self) -> f32 {
        self.beta.unwrap_or(self.beta_0).min(1.0)
    }

    /// Advances beta by one optimization step and returns the new value.
    pub fn advance(&mut self) -> f32 {
        let beta = (self.beta() + self.increment).min(1.0);
        self.beta = Some(beta);
        beta
    }
}
