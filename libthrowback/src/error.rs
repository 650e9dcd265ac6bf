//! Error types for Throwback

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ThrowbackError>;

#[derive(Error, Debug)]
pub enum ThrowbackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("No eligible sets found (threshold_days={threshold_days}). Raise the threshold or add content.")]
    NoEligibleSets { threshold_days: u32 },

    #[error("No manifest entry found for set_name: {0}")]
    SetNotFound(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl ThrowbackError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ThrowbackError::Config(_) | ThrowbackError::Manifest(_) | ThrowbackError::History(_) => {
                2
            }
            ThrowbackError::NoEligibleSets { .. } | ThrowbackError::SetNotFound(_) => 3,
            ThrowbackError::Template(_) => 4,
            ThrowbackError::Platform(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Image file not found: {}", .0.display())]
    ImageNotFound(PathBuf),
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Manifest entry {index} has an empty set_name")]
    EmptyName { index: usize },

    #[error("Set '{0}' has no images")]
    NoImages(String),

    #[error("Duplicate set_name in manifest: {0}")]
    DuplicateName(String),
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to read history file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unparsable history file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write history file {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to compile template {path}: {reason}")]
    Compile { path: PathBuf, reason: String },

    #[error("Failed to render template {path}: {reason}")]
    Render { path: PathBuf, reason: String },
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Media upload failed: {0}")]
    Upload(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Image preparation failed: {0}")]
    Media(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            PlatformError::Timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            PlatformError::Network(error.to_string())
        } else if error.is_decode() {
            PlatformError::Posting(format!("Invalid response body: {}", error))
        } else {
            PlatformError::Network(error.to_string())
        }
    }
}
