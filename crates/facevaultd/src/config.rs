use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Daemon configuration.
///
/// Loaded from an optional TOML file named by `FACEVAULT_CONFIG`, then
/// overridden field by field from `FACEVAULT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Socket address the HTTP server binds to.
    pub listen_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// SCRFD model file name inside `model_dir`.
    pub detector_model: String,
    /// ArcFace model file name inside `model_dir`.
    pub recognizer_model: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory that `GET /image/{id}` writes decoded images into.
    pub output_dir: PathBuf,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    /// Maximum accepted request body size in bytes.
    pub body_limit_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            model_dir: PathBuf::from("./models"),
            detector_model: "scrfd.onnx".to_string(),
            recognizer_model: "arcface.onnx".to_string(),
            db_path: default_data_dir(|k| std::env::var(k).ok()).join("faces.db"),
            output_dir: PathBuf::from("./output"),
            intra_threads: 2,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("FACEVAULT_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self {
                db_path: default_data_dir(&lookup).join("faces.db"),
                ..Self::default()
            },
        };

        if let Some(v) = lookup("FACEVAULT_LISTEN_ADDR") {
            config.listen_addr = v;
        }
        if let Some(v) = lookup("FACEVAULT_MODEL_DIR") {
            config.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEVAULT_DETECTOR_MODEL") {
            config.detector_model = v;
        }
        if let Some(v) = lookup("FACEVAULT_RECOGNIZER_MODEL") {
            config.recognizer_model = v;
        }
        if let Some(v) = lookup("FACEVAULT_DB_PATH") {
            config.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEVAULT_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        config.intra_threads = parse_or(&lookup, "FACEVAULT_INTRA_THREADS", config.intra_threads);
        config.body_limit_bytes =
            parse_or(&lookup, "FACEVAULT_BODY_LIMIT_BYTES", config.body_limit_bytes);

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(&self.detector_model)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(&self.recognizer_model)
            .to_string_lossy()
            .into_owned()
    }
}

fn default_data_dir<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facevault")
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
