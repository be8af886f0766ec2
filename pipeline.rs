use std::time::Instant;

use crate::config::AppConfig;
use crate::decision::{decide_gender, decide_race};
use crate::error::Result;
use crate::inference::{gender_score, invoke, race_scores, Classifier};
use crate::models::PredictionResult;
use crate::onnx::OnnxClassifier;
use crate::preprocess::{preprocess, NormalizedTensor};

/// The two face attribute classifiers, loaded once and reused per request.
pub struct Predictor {
    race: Box<dyn Classifier>,
    gender: Box<dyn Classifier>,
    parallel: bool,
}

impl Predictor {
    pub fn new(race: Box<dyn Classifier>, gender: Box<dyn Classifier>, parallel: bool) -> Self {
        Self {
            race,
            gender,
            parallel,
        }
    }

    /// Loads both models. Any failure here is fatal for the process.
    pub fn load(config: &AppConfig) -> Result<Self> {
        let runtime = config.runtime();
        let race = OnnxClassifier::load("race", &config.race_model(), runtime)?;
        let gender = OnnxClassifier::load("gender", &config.gender_model(), runtime)?;
        Ok(Self::new(
            Box::new(race),
            Box::new(gender),
            config.parallel_inference,
        ))
    }

    pub fn predict_bytes(&mut self, bytes: &[u8]) -> Result<PredictionResult> {
        let start = Instant::now();
        let tensor = preprocess(bytes)?;
        let preprocessed = start.elapsed();
        let result = self.predict_tensor(&tensor)?;
        log::debug!(
            "prediction took {:?} (preprocess {:?})",
            start.elapsed(),
            preprocessed
        );
        Ok(result)
    }

    pub fn predict_tensor(&mut self, tensor: &NormalizedTensor) -> Result<PredictionResult> {
        let race_model = self.race.as_mut();
        let gender_model = self.gender.as_mut();
        let (race_raw, gender_raw) = if self.parallel {
            rayon::join(
                || invoke(race_model, tensor),
                || invoke(gender_model, tensor),
            )
        } else {
            (invoke(race_model, tensor), invoke(gender_model, tensor))
        };
        let race = race_scores(self.race.name(), &race_raw?)?;
        let gender = gender_score(self.gender.name(), &gender_raw?)?;
        log::debug!("raw scores race={:?} gender={:?}", race.values(), gender.value());

        Ok(PredictionResult {
            race: decide_race(&race),
            gender: decide_gender(gender),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::inference::tests::{FailingClassifier, FixedClassifier};
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use ndarray::Array4;
    use std::io::Cursor;
    use std::sync::atomic::Ordering;

    fn jpeg_bytes() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(300, 400))
            .write_to(&mut buf, ImageOutputFormat::Jpeg(85))
            .unwrap();
        buf.into_inner()
    }

    fn predictor(race: Vec<f32>, gender: Vec<f32>, parallel: bool) -> Predictor {
        Predictor::new(
            Box::new(FixedClassifier::new("race", race)),
            Box::new(FixedClassifier::new("gender", gender)),
            parallel,
        )
    }

    #[test]
    fn end_to_end_with_fixed_models() {
        for parallel in [true, false] {
            let mut p = predictor(vec![0.05, 0.15, 0.80], vec![0.9], parallel);
            let result = p.predict_bytes(&jpeg_bytes()).unwrap();
            assert_eq!(result.race.label, "White");
            assert_eq!(result.gender.label, "Male");
            assert!((result.gender.confidence - 90.0).abs() < 1e-3);
        }
    }

    #[test]
    fn corrupt_upload_never_reaches_models() {
        let race = FixedClassifier::new("race", vec![0.3, 0.3, 0.4]);
        let calls = race.calls.clone();
        let mut p = Predictor::new(
            Box::new(race),
            Box::new(FixedClassifier::new("gender", vec![0.2])),
            true,
        );
        let err = p.predict_bytes(b"\xff\xd8\xff garbage").unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)), "{err:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wrong_tensor_shape_is_shape_mismatch() {
        let mut p = predictor(vec![0.3, 0.3, 0.4], vec![0.2], false);
        let tensor = Array4::<f32>::zeros((1, 224, 224, 4));
        let err = p.predict_tensor(&tensor).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn failing_gender_model_is_inference_error() {
        let mut p = Predictor::new(
            Box::new(FixedClassifier::new("race", vec![0.3, 0.3, 0.4])),
            Box::new(FailingClassifier),
            true,
        );
        let err = p.predict_bytes(&jpeg_bytes()).unwrap_err();
        assert!(matches!(err, Error::Inference { .. }), "{err:?}");
    }

    #[test]
    fn nan_output_is_rejected() {
        let mut p = predictor(vec![f32::NAN, 0.3, 0.4], vec![0.2], false);
        let err = p.predict_bytes(&jpeg_bytes()).unwrap_err();
        assert!(matches!(err, Error::Inference { .. }));
    }
}
