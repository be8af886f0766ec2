use crate::error::{Error, Result};
use crate::onnx::{OrtRuntimeConfig, ProviderChoice};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_race_model_path")]
    pub race_model_path: PathBuf,
    #[serde(default = "default_gender_model_path")]
    pub gender_model_path: PathBuf,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_samples_dir")]
    pub samples_dir: PathBuf,
    #[serde(default = "default_sample_names")]
    pub sample_names: Vec<String>,
    #[serde(default)]
    pub provider: ProviderChoice,
    #[serde(default)]
    pub device_id: Option<u32>,
    #[serde(default = "default_parallel_inference")]
    pub parallel_inference: bool,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            race_model_path: default_race_model_path(),
            gender_model_path: default_gender_model_path(),
            models_dir: default_models_dir(),
            samples_dir: default_samples_dir(),
            sample_names: default_sample_names(),
            provider: ProviderChoice::Auto,
            device_id: None,
            parallel_inference: default_parallel_inference(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_race_model_path() -> PathBuf {
    PathBuf::from("fairface_race_classifier.onnx")
}

fn default_gender_model_path() -> PathBuf {
    PathBuf::from("fairface_gender_classifier.onnx")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_samples_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_sample_names() -> Vec<String> {
    ["sample1.jpg", "sample2.jpg", "sample3.jpg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_parallel_inference() -> bool {
    true
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png"].iter().map(|s| s.to_string()).collect()
}

impl AppConfig {
    /// Reads a JSON config file. Fields left out fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.race_model_path.as_os_str().is_empty()
            || self.gender_model_path.as_os_str().is_empty()
        {
            return Err(Error::Config("model paths must not be empty".into()));
        }
        if self.allowed_extensions.is_empty() {
            return Err(Error::Config("allowed_extensions must not be empty".into()));
        }
        Ok(())
    }

    pub fn resolve_model(&self, name: &Path) -> PathBuf {
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.models_dir.join(name)
        }
    }

    pub fn race_model(&self) -> PathBuf {
        self.resolve_model(&self.race_model_path)
    }

    pub fn gender_model(&self) -> PathBuf {
        self.resolve_model(&self.gender_model_path)
    }

    pub fn runtime(&self) -> OrtRuntimeConfig {
        OrtRuntimeConfig {
            provider: self.provider,
            device_id: self.device_id,
        }
    }

    pub fn is_allowed_upload(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}
