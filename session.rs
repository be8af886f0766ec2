//! Per-session state and the event handler the front end drives.
//!
//! Every user action becomes one `Event`; `handle_event` re-runs the same
//! pipeline for it against an explicit `SessionContext`.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{ImageSource, PredictionReport, PredictionResult};
use crate::pipeline::Predictor;

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: Uuid,
    pub selected_sample: Option<String>,
    pub last: Option<PredictionResult>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            selected_sample: None,
            last: None,
        }
    }

    pub fn reset(&mut self) {
        self.selected_sample = None;
        self.last = None;
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Upload { name: String, bytes: Vec<u8> },
    SelectSample(String),
    Reset,
    ListSamples,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Report(PredictionReport),
    Samples(Vec<String>),
    Cleared,
}

/// Bundled sample images the front end offers as shortcuts.
#[derive(Debug, Clone)]
pub struct SampleLibrary {
    dir: PathBuf,
    names: Vec<String>,
}

impl SampleLibrary {
    pub fn new(dir: impl Into<PathBuf>, names: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            names,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.samples_dir.clone(), config.sample_names.clone())
    }

    /// Only the configured samples that exist on disk.
    pub fn available(&self) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| self.dir.join(name).is_file())
            .cloned()
            .collect()
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        if !self.names.iter().any(|n| n == name) {
            return Err(Error::UnknownSample(name.to_string()));
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(Error::UnknownSample(name.to_string()));
        }
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(name)?;
        std::fs::read(&path).map_err(|e| {
            log::warn!("Failed to read sample {}: {e}", path.display());
            Error::UnknownSample(name.to_string())
        })
    }
}

/// Reads an uploaded file after checking its extension against the config.
pub fn read_upload(config: &AppConfig, path: &Path) -> Result<Vec<u8>> {
    if !config.is_allowed_upload(path) {
        return Err(Error::ImageDecode(format!(
            "{} is not one of: {}",
            path.display(),
            config.allowed_extensions.join(", ")
        )));
    }
    std::fs::read(path).map_err(|e| Error::ImageDecode(format!("{}: {e}", path.display())))
}

pub fn handle_event(
    ctx: &mut SessionContext,
    predictor: &mut Predictor,
    samples: &SampleLibrary,
    event: Event,
) -> Outcome {
    match event {
        Event::Reset => {
            ctx.reset();
            log::debug!("[{}] reset", ctx.id);
            Outcome::Cleared
        }
        Event::ListSamples => Outcome::Samples(samples.available()),
        Event::Upload { name, bytes } => {
            ctx.selected_sample = None;
            run(ctx, predictor, ImageSource::Upload(name), Ok(bytes))
        }
        Event::SelectSample(name) => {
            let bytes = samples.read(&name);
            if bytes.is_err() {
                ctx.selected_sample = None;
            } else {
                ctx.selected_sample = Some(name.clone());
            }
            run(ctx, predictor, ImageSource::Sample(name), bytes)
        }
    }
}

fn run(
    ctx: &mut SessionContext,
    predictor: &mut Predictor,
    source: ImageSource,
    bytes: Result<Vec<u8>>,
) -> Outcome {
    let result = bytes.and_then(|bytes| predictor.predict_bytes(&bytes));
    match result {
        Ok(prediction) => {
            log::debug!(
                "[{}] {}: race={} ({:.1}%) gender={} ({:.1}%)",
                ctx.id,
                source.name(),
                prediction.race.label,
                prediction.race.confidence,
                prediction.gender.label,
                prediction.gender.confidence
            );
            ctx.last = Some(prediction.clone());
            Outcome::Report(PredictionReport::success(source, prediction))
        }
        Err(err) => {
            if err.is_recoverable() {
                log::warn!("[{}] {} failed: {err}", ctx.id, source.name());
            } else {
                log::error!("[{}] {} failed: {err}", ctx.id, source.name());
            }
            ctx.last = None;
            Outcome::Report(PredictionReport::failure(source, err.user_message()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::tests::FixedClassifier;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(64, 48))
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn predictor() -> Predictor {
        Predictor::new(
            Box::new(FixedClassifier::new("race", vec![0.7, 0.2, 0.1])),
            Box::new(FixedClassifier::new("gender", vec![0.5])),
            false,
        )
    }

    fn sample_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fairface_samples_{tag}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn upload_produces_report_and_clears_selection() {
        let mut ctx = SessionContext::new();
        ctx.selected_sample = Some("sample1.jpg".into());
        let mut p = predictor();
        let samples = SampleLibrary::new(sample_dir("upload"), vec![]);
        let outcome = handle_event(
            &mut ctx,
            &mut p,
            &samples,
            Event::Upload {
                name: "me.png".into(),
                bytes: png_bytes(),
            },
        );
        match outcome {
            Outcome::Report(report) => {
                assert_eq!(report.race.unwrap().label, "Asian");
                assert_eq!(report.gender.unwrap().label, "Female");
                assert!(report.error.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(ctx.selected_sample.is_none());
        assert!(ctx.last.is_some());
    }

    #[test]
    fn corrupt_upload_reports_error_without_result() {
        let mut ctx = SessionContext::new();
        let mut p = predictor();
        let samples = SampleLibrary::new(sample_dir("corrupt"), vec![]);
        let outcome = handle_event(
            &mut ctx,
            &mut p,
            &samples,
            Event::Upload {
                name: "broken.jpg".into(),
                bytes: vec![1, 2, 3],
            },
        );
        match outcome {
            Outcome::Report(report) => {
                assert!(report.race.is_none());
                assert!(report.error.unwrap().starts_with("Could not read the image"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(ctx.last.is_none());
    }

    #[test]
    fn selecting_existing_sample_tracks_selection() {
        let dir = sample_dir("select");
        std::fs::write(dir.join("sample1.png"), png_bytes()).unwrap();
        let samples = SampleLibrary::new(&dir, vec!["sample1.png".into(), "sample2.png".into()]);
        let mut ctx = SessionContext::new();
        let mut p = predictor();

        let outcome = handle_event(
            &mut ctx,
            &mut p,
            &samples,
            Event::SelectSample("sample1.png".into()),
        );
        assert!(matches!(outcome, Outcome::Report(ref r) if r.error.is_none()));
        assert_eq!(ctx.selected_sample.as_deref(), Some("sample1.png"));

        match handle_event(&mut ctx, &mut p, &samples, Event::ListSamples) {
            Outcome::Samples(names) => assert_eq!(names, vec!["sample1.png".to_string()]),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn missing_sample_clears_selection() {
        let samples = SampleLibrary::new(sample_dir("missing"), vec!["sample3.jpg".into()]);
        let mut ctx = SessionContext::new();
        ctx.selected_sample = Some("sample3.jpg".into());
        let mut p = predictor();
        let outcome = handle_event(
            &mut ctx,
            &mut p,
            &samples,
            Event::SelectSample("sample3.jpg".into()),
        );
        match outcome {
            Outcome::Report(report) => {
                assert_eq!(report.error.as_deref(), Some("Failed to load sample image"))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(ctx.selected_sample.is_none());
    }

    #[test]
    fn reset_clears_session() {
        let mut ctx = SessionContext::new();
        let id = ctx.id;
        ctx.selected_sample = Some("sample1.jpg".into());
        let mut p = predictor();
        let samples = SampleLibrary::new(sample_dir("reset"), vec![]);
        let outcome = handle_event(&mut ctx, &mut p, &samples, Event::Reset);
        assert!(matches!(outcome, Outcome::Cleared));
        assert!(ctx.selected_sample.is_none());
        assert!(ctx.last.is_none());
        assert_eq!(ctx.id, id);
    }

    #[test]
    fn upload_extension_is_checked_before_reading() {
        let config = AppConfig::default();
        let err = read_upload(&config, Path::new("/nonexistent/face.gif")).unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
    }
}
