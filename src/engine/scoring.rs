// src/engine/scoring.rs

pub const DEFAULT_CORRECT_WEIGHT: f64 = 1.0;
pub const DEFAULT_INCORRECT_WEIGHT: f64 = 2.0;

pub const CORRECT_WEIGHT_KEY: &str = "QUESTION_SCORE_WEIGHT_CORRECT";
pub const INCORRECT_WEIGHT_KEY: &str = "QUESTION_SCORE_WEIGHT_INCORRECT";

/// Coefficients of the priority score.
///
/// A lower score means weaker performance and therefore a higher priority
/// for being served again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub correct: f64,
    pub incorrect: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            correct: DEFAULT_CORRECT_WEIGHT,
            incorrect: DEFAULT_INCORRECT_WEIGHT,
        }
    }
}

impl ScoreWeights {
    /// Resolves the weights through `lookup`, typically an environment reader.
    ///
    /// Each weight is overridden independently. Missing, unparsable or
    /// non-finite values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            correct: parse_weight(lookup(CORRECT_WEIGHT_KEY)).unwrap_or(defaults.correct),
            incorrect: parse_weight(lookup(INCORRECT_WEIGHT_KEY)).unwrap_or(defaults.incorrect),
        }
    }

    /// `count_correct * correct - count_incorrect * incorrect`
    pub fn score(&self, count_correct: u32, count_incorrect: u32) -> f64 {
        f64::from(count_correct) * self.correct - f64::from(count_incorrect) * self.incorrect
    }
}

fn parse_weight(raw: Option<String>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|w| w.is_finite())
}
