//! Exploration strategy of QR-DQN.
use anyhow::Result;
use qrdqn_core::error::QrError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Epsilon-greedy explorer.
///
/// The exploration rate is set from outside at every environment step, see
/// [`Agent::set_epsilon`](qrdqn_core::Agent::set_epsilon).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpsilonGreedy {
    /// Probability of taking a random action.
    pub eps: f64,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self { eps: 1.0 }
    }
}

impl EpsilonGreedy {
    /// Constructs epsilon-greedy explorer.
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }

    /// Draws a uniformly random action with probability `eps`.
    ///
    /// Returns `None` when the greedy action should be taken.
    pub fn action(&self, n_actions: usize, rng: &mut impl Rng) -> Result<Option<usize>> {
        if n_actions == 0 {
            return Err(QrError::InvalidAction("the action space is empty".into()).into());
        }

        if rng.gen::<f64>() < self.eps {
            Ok(Some(rng.gen_range(0..n_actions)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_epsilon_extremes() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(0);
        let greedy = EpsilonGreedy::new(0.0);
        let random = EpsilonGreedy::new(1.0);
        for _ in 0..1000 {
            assert_eq!(greedy.action(4, &mut rng)?, None);
            assert!(random.action(4, &mut rng)?.unwrap() < 4);
        }
        Ok(())
    }

    #[test]
    fn test_empty_action_space() {
        let mut rng = SmallRng::seed_from_u64(0);
        let err = EpsilonGreedy::new(1.0).action(0, &mut rng).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QrError>(),
            Some(QrError::InvalidAction(_))
        ));
    }
}
