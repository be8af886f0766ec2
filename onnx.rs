use crate::error::{Error, Result};
use crate::inference::Classifier;
use ndarray::ArrayView4;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

#[cfg(target_os = "windows")]
use ort::execution_providers::{DirectMLExecutionProvider, ExecutionProvider};

#[cfg(target_os = "windows")]
const ORT_DYLIB_NAME: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const ORT_DYLIB_NAME: &str = "libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const ORT_DYLIB_NAME: &str = "libonnxruntime.so";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferenceProvider {
    Cpu,
    DirectML { device_id: u32 },
}

impl InferenceProvider {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::DirectML { .. } => "GPU (DirectML)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderChoice {
    #[default]
    Auto,
    CpuOnly,
    DirectMlOnly,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrtRuntimeConfig {
    pub provider: ProviderChoice,
    pub device_id: Option<u32>,
}

impl OrtRuntimeConfig {
    fn resolved_device_id(self) -> u32 {
        self.device_id.unwrap_or(0)
    }
}

/// An ONNX export of one of the face attribute classifiers.
pub struct OnnxClassifier {
    name: String,
    session: Session,
}

impl OnnxClassifier {
    pub fn load(name: &str, model_path: &Path, cfg: OrtRuntimeConfig) -> Result<Self> {
        let (session, provider) = build_session(model_path, cfg)?;
        log::info!(
            "Loaded {name} model from {} on {}",
            model_path.display(),
            provider.label()
        );
        Ok(Self {
            name: name.to_string(),
            session,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>> {
        let tensor = Tensor::from_array(input.to_owned())
            .map_err(|e| Error::inference(&self.name, e))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| Error::inference(&self.name, e))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::inference(&self.name, e))?;
        log::debug!("{} output shape {:?}", self.name, shape);
        Ok(data.to_vec())
    }
}

fn ort_candidate_paths(exe_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(exe_dir) = exe_dir {
        candidates.push(exe_dir.join("onnxruntime").join(ORT_DYLIB_NAME));
        candidates.push(exe_dir.join(ORT_DYLIB_NAME));
    }
    candidates.push(Path::new("onnxruntime").join(ORT_DYLIB_NAME));
    candidates
}

fn pick_ort_dylib(candidates: Vec<PathBuf>) -> Option<(PathBuf, PathBuf)> {
    for candidate in candidates {
        if candidate.exists() {
            let dir = candidate.parent()?.to_path_buf();
            return Some((candidate, dir));
        }
    }
    None
}

fn resolve_ort_dylib_path() -> Option<(PathBuf, PathBuf)> {
    if let Ok(path) = std::env::var("ORT_DYLIB_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            let dir = path.parent()?.to_path_buf();
            return Some((path, dir));
        }
    }
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    pick_ort_dylib(ort_candidate_paths(exe_dir.as_deref()))
}

#[cfg(target_os = "windows")]
fn prepend_path_dir(dir: &Path) {
    let paths = std::env::var_os("PATH").unwrap_or_default();
    let mut new_paths = std::ffi::OsString::new();
    new_paths.push(dir);
    new_paths.push(";");
    new_paths.push(&paths);
    std::env::set_var("PATH", new_paths);
}

#[cfg(not(target_os = "windows"))]
fn prepend_path_dir(_dir: &Path) {}

fn ensure_environment() -> Result<()> {
    match resolve_ort_dylib_path() {
        Some((dylib_path, dylib_dir)) => {
            std::env::set_var("ORT_DYLIB_PATH", &dylib_path);
            prepend_path_dir(&dylib_dir);
        }
        None => log::warn!(
            "{ORT_DYLIB_NAME} not found next to the executable; relying on the system loader"
        ),
    }
    let committed = ort::init()
        .with_name("fairface")
        .commit()
        .map_err(|e| Error::Config(format!("Failed to init ORT environment: {e}")))?;
    if committed {
        log::debug!("ONNX Runtime environment initialised");
    }
    Ok(())
}

fn load_error(model_path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::ModelLoad {
        path: model_path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Tags a runtime error with the model file it came from.
trait ModelContext<T> {
    fn for_model(self, model_path: &Path) -> Result<T>;
}

impl<T, E: std::fmt::Display> ModelContext<T> for std::result::Result<T, E> {
    fn for_model(self, model_path: &Path) -> Result<T> {
        self.map_err(|e| load_error(model_path, e))
    }
}

#[cfg(target_os = "windows")]
fn directml_available() -> bool {
    matches!(DirectMLExecutionProvider::default().is_available(), Ok(true))
}

#[cfg(not(target_os = "windows"))]
fn directml_available() -> bool {
    false
}

/// Providers to try, in order. Empty when the choice cannot be satisfied.
fn provider_plan(cfg: OrtRuntimeConfig, directml: bool) -> Vec<InferenceProvider> {
    let gpu = InferenceProvider::DirectML {
        device_id: cfg.resolved_device_id(),
    };
    match (cfg.provider, directml) {
        (ProviderChoice::CpuOnly, _) => vec![InferenceProvider::Cpu],
        (ProviderChoice::Auto, true) => vec![gpu, InferenceProvider::Cpu],
        (ProviderChoice::Auto, false) => vec![InferenceProvider::Cpu],
        (ProviderChoice::DirectMlOnly, true) => vec![gpu],
        (ProviderChoice::DirectMlOnly, false) => Vec::new(),
    }
}

fn open_session(model_path: &Path, provider: InferenceProvider) -> Result<Session> {
    let build = || -> Result<Session> {
        #[allow(unused_mut)]
        let mut builder = Session::builder()
            .for_model(model_path)?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .for_model(model_path)?
            .with_parallel_execution(false)
            .for_model(model_path)?;
        #[cfg(target_os = "windows")]
        {
            if let InferenceProvider::DirectML { device_id } = provider {
                let ep = DirectMLExecutionProvider::default()
                    .with_device_id(device_id as i32)
                    .build();
                builder = builder
                    .with_memory_pattern(false)
                    .for_model(model_path)?
                    .with_execution_providers([ep])
                    .for_model(model_path)?;
            }
        }
        #[cfg(not(target_os = "windows"))]
        let _ = provider;
        builder.commit_from_file(model_path).for_model(model_path)
    };
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(build)).unwrap_or_else(|_| {
        Err(load_error(
            model_path,
            "ONNX Runtime panicked while building session",
        ))
    })
}

pub fn build_session(
    model_path: &Path,
    cfg: OrtRuntimeConfig,
) -> Result<(Session, InferenceProvider)> {
    if !model_path.exists() {
        return Err(load_error(model_path, "model file not found"));
    }
    ensure_environment().for_model(model_path)?;

    let plan = provider_plan(cfg, directml_available());
    if plan.is_empty() {
        return Err(load_error(
            model_path,
            format!("DirectML device {} unavailable", cfg.resolved_device_id()),
        ));
    }
    if cfg.provider == ProviderChoice::Auto && plan.len() == 1 && cfg!(target_os = "windows") {
        log::warn!(
            "DirectML execution provider unavailable; falling back to CPU for {}",
            model_path.display()
        );
    }

    let mut last_err = None;
    for provider in plan {
        match open_session(model_path, provider) {
            Ok(session) => return Ok((session, provider)),
            Err(err) => {
                log::warn!("{} session failed: {err}", provider.label());
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| load_error(model_path, "no execution provider")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_load_error_naming_file() {
        let path = std::env::temp_dir().join("fairface_missing_race.onnx");
        let _ = std::fs::remove_file(&path);
        let err = OnnxClassifier::load("race", &path, OrtRuntimeConfig::default())
            .err()
            .expect("missing model must not load");
        match err {
            Error::ModelLoad { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected model load error, got {other:?}"),
        }
    }

    #[test]
    fn dylib_candidates_prefer_bundled_dir() {
        let exe_dir = Path::new("/opt/fairface");
        let candidates = ort_candidate_paths(Some(exe_dir));
        assert_eq!(
            candidates[0],
            exe_dir.join("onnxruntime").join(ORT_DYLIB_NAME)
        );
        assert!(pick_ort_dylib(vec![PathBuf::from("/nonexistent/lib")]).is_none());
    }

    #[test]
    fn provider_plan_follows_choice_and_availability() {
        let cfg = |provider| OrtRuntimeConfig {
            provider,
            device_id: Some(1),
        };
        let gpu = InferenceProvider::DirectML { device_id: 1 };
        assert_eq!(
            provider_plan(cfg(ProviderChoice::Auto), true),
            vec![gpu, InferenceProvider::Cpu]
        );
        assert_eq!(
            provider_plan(cfg(ProviderChoice::Auto), false),
            vec![InferenceProvider::Cpu]
        );
        assert_eq!(
            provider_plan(cfg(ProviderChoice::CpuOnly), true),
            vec![InferenceProvider::Cpu]
        );
        assert_eq!(provider_plan(cfg(ProviderChoice::DirectMlOnly), true), vec![gpu]);
        assert!(provider_plan(cfg(ProviderChoice::DirectMlOnly), false).is_empty());
    }

    #[test]
    fn runtime_errors_are_tagged_with_model_path() {
        let path = Path::new("models/gender.onnx");
        let res: std::result::Result<(), &str> = Err("bad graph");
        match res.for_model(path).unwrap_err() {
            Error::ModelLoad { path: p, reason } => {
                assert_eq!(p, path);
                assert_eq!(reason, "bad graph");
            }
            other => panic!("expected model load error, got {other:?}"),
        }
    }

    #[test]
    fn provider_choice_reads_snake_case() {
        let choice: ProviderChoice = serde_json::from_str("\"cpu_only\"").unwrap();
        assert_eq!(choice, ProviderChoice::CpuOnly);
        let choice: ProviderChoice = serde_json::from_str("\"direct_ml_only\"").unwrap();
        assert_eq!(choice, ProviderChoice::DirectMlOnly);
    }
}
