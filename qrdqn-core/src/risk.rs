//! Risk preference of action selection.
use crate::error::QrError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How the return distribution of an action is summarized when acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskPreference {
    /// Mean of the quantiles.
    Neutral,

    /// 10th percentile of the quantiles.
    RiskAverse,

    /// 90th percentile of the quantiles.
    RiskSeeking,
}

impl Default for RiskPreference {
    fn default() -> Self {
        Self::Neutral
    }
}

impl RiskPreference {
    /// Returns the name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::RiskAverse => "risk-averse",
            Self::RiskSeeking => "risk-seeking",
        }
    }
}

impl fmt::Display for RiskPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskPreference {
    type Err = QrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neutral" => Ok(Self::Neutral),
            "risk-averse" => Ok(Self::RiskAverse),
            "risk-seeking" => Ok(Self::RiskSeeking),
            _ => Err(QrError::InvalidArgument(format!(
                "unknown risk preference {:?}, expected one of \
                 \"neutral\", \"risk-averse\" or \"risk-seeking\"",
                s
            ))),
        }
    }
}

/// Chooses a risk preference from recent episode returns.
///
/// An empty history gives [`RiskPreference::Neutral`]. If the mean of
/// `recent_rewards` is strictly below `threshold`, [`RiskPreference::RiskSeeking`]
/// is returned, otherwise [`RiskPreference::RiskAverse`].
pub fn select_risk_preference(recent_rewards: &[f32], threshold: f32) -> RiskPreference {
    if recent_rewards.is_empty() {
        return RiskPreference::Neutral;
    }

    let mean = recent_rewards.iter().map(|&r| r as f64).sum::<f64>() / recent_rewards.len() as f64;

    if mean < threshold as f64 {
        RiskPreference::RiskSeeking
    } else {
        RiskPreference::RiskAverse
    }
}
