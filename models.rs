use serde::{Deserialize, Serialize};

/// Race classifier output, one score per entry of `RACE_LABELS`.
/// Built by `inference::race_scores`, which rejects non-finite values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaceScores([f32; 3]);

impl RaceScores {
    pub(crate) fn new(scores: [f32; 3]) -> Self {
        Self(scores)
    }

    pub fn values(&self) -> [f32; 3] {
        self.0
    }
}

/// Probability of the "Male" class. Built by `inference::gender_score`,
/// which clamps it into [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenderScore(f32);

impl GenderScore {
    pub(crate) fn new(score: f32) -> Self {
        Self(score)
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Percentage in [0, 100].
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: &str, confidence: f32) -> Self {
        Self {
            label: label.to_string(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub race: Prediction,
    pub gender: Prediction,
}

/// Where the bytes of a request came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ImageSource {
    Upload(String),
    Sample(String),
}

impl ImageSource {
    pub fn name(&self) -> &str {
        match self {
            Self::Upload(name) | Self::Sample(name) => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReport {
    pub source: ImageSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionReport {
    pub fn success(source: ImageSource, result: PredictionResult) -> Self {
        Self {
            source,
            race: Some(result.race),
            gender: Some(result.gender),
            error: None,
        }
    }

    pub fn failure(source: ImageSource, message: String) -> Self {
        Self {
            source,
            race: None,
            gender: None,
            error: Some(message),
        }
    }
}
