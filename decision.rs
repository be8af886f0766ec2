use crate::labels::{gender_label, RACE_LABELS, GENDER_THRESHOLD};
use crate::models::{GenderScore, Prediction, RaceScores};

/// First-occurrence argmax: on equal scores the lower index wins.
/// Non-finite scores never win over finite ones.
pub fn decide_race(scores: &RaceScores) -> Prediction {
    let values = scores.values().map(finite_or_min);
    let mut best_idx = 0usize;
    let mut best = values[0];
    for (idx, score) in values.iter().copied().enumerate().skip(1) {
        if score > best {
            best = score;
            best_idx = idx;
        }
    }
    Prediction::new(RACE_LABELS[best_idx], to_percent(best))
}

/// Strictly greater than the threshold is "Male"; 0.5 itself is "Female".
pub fn decide_gender(score: GenderScore) -> Prediction {
    let value = score.value();
    let is_male = value > GENDER_THRESHOLD;
    let confidence = if is_male { value } else { 1.0 - value };
    Prediction::new(gender_label(is_male), to_percent(confidence))
}

fn finite_or_min(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        f32::NEG_INFINITY
    }
}

// Non-finite input reports zero confidence rather than NaN.
fn to_percent(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).clamp(0.0, 100.0)
}
