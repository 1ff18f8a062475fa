//! Run configuration
//!
//! Loaded from YAML or JSON. Example:
//!
//! ```yaml
//! corpus_name: test
//! language: en
//! tool: [spacy, spacy, stanza]
//! processing_type: [sentencize, tokenize, lemma]
//! paths:
//!   output_dir: out
//! spacy:
//!   device: prefer_gpu
//! ```

use crate::engine::{BridgeCommand, Device, JobRequest};
use crate::error::{AnnotatorError, AnnotatorResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default per-invocation engine timeout
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 600;

fn default_language() -> String {
    "en".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_ENGINE_TIMEOUT_SECS
}

/// Top-level configuration for one annotation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    pub corpus_name: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Engines in requested order; repeats are allowed and run once
    pub tool: Vec<String>,
    /// Processing steps. When as long as `tool`, entry i belongs to tool i;
    /// otherwise the whole list applies to every engine.
    #[serde(default)]
    pub processing_type: Vec<String>,
    /// Re-run the segmenting engine in pretokenized mode for its layers
    #[serde(default)]
    pub refine_segmenter: bool,
    #[serde(default = "default_timeout")]
    pub engine_timeout_secs: u64,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub spacy: EngineSection,
    #[serde(default)]
    pub stanza: EngineSection,
    #[serde(default)]
    pub somajo: EngineSection,
    #[serde(default)]
    pub rule: EngineSection,
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Where the VRT file is written
    pub output_dir: PathBuf,
    /// Parent of encoded corpus data directories
    pub corpus_dir: PathBuf,
    /// Corpus registry directory for the encoder
    pub registry_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            corpus_dir: PathBuf::from("corpora"),
            registry_dir: PathBuf::from("registry"),
        }
    }
}

/// How external engines are launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let command = BridgeCommand::default();
        Self {
            program: command.program,
            args: command.args,
        }
    }
}

impl BridgeConfig {
    pub fn command(&self) -> BridgeCommand {
        BridgeCommand::new(self.program.clone(), self.args.clone())
    }
}

/// Per-engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Steps for this engine, overriding `processing_type`
    pub processors: Option<Vec<String>>,
    /// Model name or path
    #[serde(alias = "pretrained")]
    pub model: Option<String>,
    pub text_type: Option<String>,
    pub device: Device,
    /// Passed through to the engine unchanged
    pub options: serde_json::Value,
}

impl AnnotatorConfig {
    /// Minimal configuration with defaults for everything else
    pub fn new(corpus_name: impl Into<String>, tool: Vec<String>, processing_type: Vec<String>) -> Self {
        Self {
            corpus_name: corpus_name.into(),
            language: default_language(),
            tool,
            processing_type,
            refine_segmenter: false,
            engine_timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
            paths: Paths::default(),
            bridge: BridgeConfig::default(),
            spacy: EngineSection::default(),
            stanza: EngineSection::default(),
            somajo: EngineSection::default(),
            rule: EngineSection::default(),
        }
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML
    pub fn load(path: &Path) -> AnnotatorResult<Self> {
        let load_err = |reason: String| AnnotatorError::ConfigLoad {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))
        } else {
            serde_yaml::from_str(&content).map_err(|e| load_err(e.to_string()))
        }
    }

    /// Default config location (`~/.config/annotator/config.yaml`)
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
        config_dir.join("annotator").join("config.yaml")
    }

    pub fn validate(&self) -> AnnotatorResult<()> {
        let name = self.corpus_name.trim();
        if name.is_empty() {
            return Err(AnnotatorError::Configuration(
                "corpus_name must not be empty".to_string(),
            ));
        }
        if name.contains(|c: char| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(AnnotatorError::Configuration(format!(
                "corpus_name '{}' must not contain whitespace or path separators",
                name
            )));
        }
        if self.tool.iter().all(|t| t.trim().is_empty()) {
            return Err(AnnotatorError::Configuration(
                "tool list must name at least one engine".to_string(),
            ));
        }
        if self.engine_timeout_secs == 0 {
            return Err(AnnotatorError::Configuration(
                "engine_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings block for an engine, if it has one
    pub fn section(&self, engine: &str) -> Option<&EngineSection> {
        match engine {
            "spacy" => Some(&self.spacy),
            "stanza" => Some(&self.stanza),
            "somajo" => Some(&self.somajo),
            "rule" => Some(&self.rule),
            _ => None,
        }
    }

    /// Processing steps requested from one engine
    pub fn steps_for(&self, engine: &str) -> Vec<String> {
        if let Some(processors) = self.section(engine).and_then(|s| s.processors.as_ref()) {
            return processors.clone();
        }
        if self.processing_type.len() == self.tool.len() {
            self.tool
                .iter()
                .zip(&self.processing_type)
                .filter(|(tool, _)| tool.trim() == engine)
                .map(|(_, step)| step.clone())
                .collect()
        } else {
            self.processing_type.clone()
        }
    }

    /// Job request for one engine, in segmenting mode
    pub fn job_request(&self, engine: &str) -> JobRequest {
        let mut job = JobRequest::new(engine, self.corpus_name.trim(), self.steps_for(engine))
            .with_language(self.language.clone());
        if let Some(section) = self.section(engine) {
            if let Some(model) = &section.model {
                job = job.with_model(model.clone());
            }
            if let Some(text_type) = &section.text_type {
                job = job.with_text_type(text_type.clone());
            }
            job = job
                .with_device(section.device)
                .with_options(section.options.clone());
        }
        job
    }
}
