use std::panic::{catch_unwind, AssertUnwindSafe};

use ndarray::{Array4, ArrayView4};

use crate::error::{Error, Result};
use crate::models::{GenderScore, RaceScores};
use crate::preprocess::check_shape;

/// A loaded image classifier that maps one input batch to a flat score vector.
pub trait Classifier: Send {
    fn name(&self) -> &str;

    fn predict(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>>;
}

/// Runs `model` on `tensor`. The shape is checked first; a malformed tensor
/// never reaches the model.
pub fn invoke<C>(model: &mut C, tensor: &Array4<f32>) -> Result<Vec<f32>>
where
    C: Classifier + ?Sized,
{
    check_shape(tensor.shape())?;
    let name = model.name().to_string();
    match catch_unwind(AssertUnwindSafe(|| model.predict(tensor.view()))) {
        Ok(Ok(scores)) => Ok(scores),
        Ok(Err(err @ Error::Inference { .. })) => Err(err),
        Ok(Err(err)) => Err(Error::inference(&name, err)),
        Err(_) => Err(Error::inference(&name, "ONNX runtime panic")),
    }
}

pub fn race_scores(model: &str, raw: &[f32]) -> Result<RaceScores> {
    let values: [f32; 3] = raw.try_into().map_err(|_| {
        Error::inference(model, format!("expected 3 scores, got {}", raw.len()))
    })?;
    let mut out = [0.0f32; 3];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = sanitize(model, value)?;
    }
    Ok(RaceScores::new(out))
}

pub fn gender_score(model: &str, raw: &[f32]) -> Result<GenderScore> {
    let value = raw
        .first()
        .copied()
        .ok_or_else(|| Error::inference(model, "model returned no scores"))?;
    Ok(GenderScore::new(sanitize(model, value)?))
}

// Non-finite outputs are rejected; finite ones outside [0, 1] are clamped.
fn sanitize(model: &str, value: f32) -> Result<f32> {
    if !value.is_finite() {
        return Err(Error::inference(
            model,
            format!("model produced non-finite score {value}"),
        ));
    }
    if !(0.0..=1.0).contains(&value) {
        log::warn!("{model} score {value} outside [0, 1]; clamping");
    }
    Ok(value.clamp(0.0, 1.0))
}
