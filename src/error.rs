//! Error taxonomy for annotation runs
//!
//! Every variant is fatal at the orchestrator level: a corpus with a
//! missing or misaligned annotation layer is invalid output, so nothing
//! here is retried or patched over.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while annotating text and writing the corpus
#[derive(Debug, Error)]
pub enum AnnotatorError {
    #[error("processing step '{step}' is not available in model '{model}' of engine '{engine}'{}", hint_suffix(.hint))]
    UnsupportedStep {
        engine: String,
        model: String,
        step: String,
        hint: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("engine '{engine}' failed to load model '{model}': {reason}")]
    EngineLoad {
        engine: String,
        model: String,
        reason: String,
    },

    #[error("engine '{engine}' failed: {reason}")]
    EngineInvocation { engine: String, reason: String },

    #[error("engine '{engine}' timed out during {stage} after {seconds} seconds")]
    Timeout {
        engine: String,
        stage: &'static str,
        seconds: u64,
    },

    #[error("engine '{engine}' produced {found} tokens for sentence {sentence}, segmentation has {expected}")]
    Alignment {
        engine: String,
        sentence: usize,
        expected: usize,
        found: usize,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load config {}: {reason}", .path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("corpus encoding failed: {0}")]
    Encode(String),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!(" (see {})", h),
        None => String::new(),
    }
}

impl AnnotatorError {
    /// Whether this error comes from configuration rather than from running an engine
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AnnotatorError::UnsupportedStep { .. } | AnnotatorError::Configuration(_)
        )
    }
}

/// Result type for annotation operations
pub type AnnotatorResult<T> = Result<T, AnnotatorError>;
