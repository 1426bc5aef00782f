// Provider-agnostic likelihood scale.
//
// Content-safety providers report scores on their own native scales (an
// ordinal 0-5, or a probability 0.0-1.0). Everything is mapped onto the
// ordinal `Likelihood` below before any threshold is applied.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Content categories in their fixed declared order. The order is the
/// tie-break when two categories share the highest normalized score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SafetyCategory {
    Adult,
    Spoof,
    Medical,
    Violence,
    Racy,
}

impl SafetyCategory {
    pub const ALL: [SafetyCategory; 5] = [
        SafetyCategory::Adult,
        SafetyCategory::Spoof,
        SafetyCategory::Medical,
        SafetyCategory::Violence,
        SafetyCategory::Racy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyCategory::Adult => "adult",
            SafetyCategory::Spoof => "spoof",
            SafetyCategory::Medical => "medical",
            SafetyCategory::Violence => "violence",
            SafetyCategory::Racy => "racy",
        }
    }
}

impl std::fmt::Display for SafetyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Six-point ordinal likelihood.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Likelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

impl Likelihood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Likelihood::Unknown => "unknown",
            Likelihood::VeryUnlikely => "very unlikely",
            Likelihood::Unlikely => "unlikely",
            Likelihood::Possible => "possible",
            Likelihood::Likely => "likely",
            Likelihood::VeryLikely => "very likely",
        }
    }

    /// Map an ordinal 0-5 score. Out-of-range values saturate at the top.
    pub fn from_ordinal(value: u8) -> Self {
        match value {
            0 => Likelihood::Unknown,
            1 => Likelihood::VeryUnlikely,
            2 => Likelihood::Unlikely,
            3 => Likelihood::Possible,
            4 => Likelihood::Likely,
            _ => Likelihood::VeryLikely,
        }
    }

    /// Map a probability in 0.0-1.0. The `Likely` band starts at 0.5 so a
    /// "likely or worse" threshold flags probabilities of one half and above.
    pub fn from_probability(value: f64) -> Self {
        if value.is_nan() || value < 0.0 {
            return Likelihood::Unknown;
        }
        if value < 0.1 {
            Likelihood::VeryUnlikely
        } else if value < 0.3 {
            Likelihood::Unlikely
        } else if value < 0.5 {
            Likelihood::Possible
        } else if value < 0.75 {
            Likelihood::Likely
        } else {
            Likelihood::VeryLikely
        }
    }
}

impl std::fmt::Display for Likelihood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Likelihood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "unknown" => Ok(Likelihood::Unknown),
            "very unlikely" => Ok(Likelihood::VeryUnlikely),
            "unlikely" => Ok(Likelihood::Unlikely),
            "possible" => Ok(Likelihood::Possible),
            "likely" => Ok(Likelihood::Likely),
            "very likely" => Ok(Likelihood::VeryLikely),
            other => Err(format!("unknown likelihood: {other}")),
        }
    }
}

/// A score as reported by a provider, before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeScore {
    Ordinal(u8),
    Probability(f64),
}

impl NativeScore {
    pub fn normalize(self) -> Likelihood {
        match self {
            NativeScore::Ordinal(v) => Likelihood::from_ordinal(v),
            NativeScore::Probability(p) => Likelihood::from_probability(p),
        }
    }
}

/// The most severe category: highest normalized likelihood, ties broken by
/// declared category order.
pub fn most_severe(
    scores: &[(SafetyCategory, Likelihood)],
) -> Option<(SafetyCategory, Likelihood)> {
    let mut sorted: Vec<_> = scores.to_vec();
    sorted.sort_by_key(|(category, _)| *category);
    sorted
        .into_iter()
        .fold(None, |best, (category, likelihood)| match best {
            Some((_, top)) if top >= likelihood => best,
            _ => Some((category, likelihood)),
        })
}
