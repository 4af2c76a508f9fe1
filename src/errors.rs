//! Typed error hierarchy for the scenecast engine.
//!
//! - `ConfigError`: missing credentials and bad configuration
//! - `ServiceError`: a remote generation call failed
//! - `CacheError`: the content cache could not be read or written
//! - `StepError`: a workflow step failed, tagged with a `Severity`
//! - `ExecutorError`: what a run surfaces to its caller

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration problems detected before any remote call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing generation service credentials: set {var} or pass a key explicitly")]
    MissingCredentials { var: &'static str },

    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Failures of a single remote generation call.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Could not decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("{endpoint} returned no usable output reference")]
    MissingOutput { endpoint: String },

    #[error("Failed to download {url} to {path}: {message}")]
    Download {
        url: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to upload {path}: {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Errors from the persistent content cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to access cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse cache file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache file {path} has unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u64,
        expected: u32,
    },
}

/// Whether a failed step aborts the run or is dropped with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Degradable,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "fatal"),
            Severity::Degradable => write!(f, "degradable"),
        }
    }
}

/// A failed workflow step.
///
/// `step` names the kind of work (`narration`, `image`, `video`, ...),
/// `target` the scene or asset it belonged to.
#[derive(Debug, Error)]
#[error("{step} step for {target} failed: {source}")]
pub struct StepError {
    pub step: &'static str,
    pub target: String,
    pub severity: Severity,
    #[source]
    pub source: ServiceError,
}

impl StepError {
    pub fn fatal(step: &'static str, target: impl Into<String>, source: ServiceError) -> Self {
        Self {
            step,
            target: target.into(),
            severity: Severity::Fatal,
            source,
        }
    }

    pub fn degradable(
        step: &'static str,
        target: impl Into<String>,
        source: ServiceError,
    ) -> Self {
        Self {
            step,
            target: target.into(),
            severity: Severity::Degradable,
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Errors that abort a workflow run.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Step(StepError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run directory {path} is locked by another scenecast run")]
    RunLocked { path: PathBuf },

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),
}

impl From<StepError> for ExecutorError {
    fn from(err: StepError) -> Self {
        ExecutorError::Step(err)
    }
}
