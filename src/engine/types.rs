//! Core types for engine invocation
//!
//! A [`JobRequest`] describes one engine call, an [`EngineHandle`] is the
//! built engine, and a [`RawResult`] is its native output before
//! normalization into a [`crate::document::Document`].

use serde::{Deserialize, Serialize};
use std::any::Any;

/// Annotation layer a processing step produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Fine-grained part-of-speech tag
    Tag,
    /// Coarse (universal) part-of-speech
    Pos,
    /// Morphological features
    Morph,
    /// Dependency relation
    Dep,
    Lemma,
    /// Named-entity label
    Ner,
    /// Pattern-based entity label
    Ruler,
    /// Knowledge-base identifier from entity linking
    Linker,
}

/// One processing step an engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    /// Engine-native step name
    pub step: &'static str,
    /// Generic names accepted for this step
    pub aliases: &'static [&'static str],
    /// Layer produced, or `None` for structural steps (tokenization, vectors)
    pub layer: Option<Layer>,
}

impl Capability {
    pub const fn structural(step: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            step,
            aliases,
            layer: None,
        }
    }

    pub const fn layer(step: &'static str, aliases: &'static [&'static str], layer: Layer) -> Self {
        Self {
            step,
            aliases,
            layer: Some(layer),
        }
    }

    /// Whether a requested step name refers to this capability
    pub fn matches(&self, requested: &str) -> bool {
        let requested = requested.trim();
        self.step.eq_ignore_ascii_case(requested)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(requested))
    }
}

/// Device preference passed through to engines that support it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Auto,
    PreferGpu,
    RequireGpu,
    RequireCpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::PreferGpu => "prefer_gpu",
            Device::RequireGpu => "require_gpu",
            Device::RequireCpu => "require_cpu",
        }
    }
}

/// Describes one engine invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Engine identifier (e.g. "spacy")
    pub engine: String,
    /// Job identifier, used in output headers
    pub job_id: String,
    /// Requested processing steps in declaration order
    pub steps: Vec<String>,
    pub language: String,
    /// Explicit model name or path; engines fall back to a default
    pub model: Option<String>,
    /// Text genre used to pick a default model (e.g. "news")
    pub text_type: Option<String>,
    pub device: Device,
    /// Opaque engine-specific options
    pub options: serde_json::Value,
    /// Whether the input is already sentence-segmented
    pub pretokenized: bool,
}

impl JobRequest {
    pub fn new(engine: impl Into<String>, job_id: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            engine: engine.into(),
            job_id: job_id.into(),
            steps,
            language: "en".to_string(),
            model: None,
            text_type: None,
            device: Device::default(),
            options: serde_json::Value::Null,
            pretokenized: false,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_text_type(mut self, text_type: impl Into<String>) -> Self {
        self.text_type = Some(text_type.into());
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    /// Copy of this job for the given segmentation mode
    pub fn pretokenized(&self, pretokenized: bool) -> Self {
        Self {
            pretokenized,
            ..self.clone()
        }
    }

    /// Model name for messages, before an engine has resolved its default
    pub fn model_label(&self) -> &str {
        self.model.as_deref().unwrap_or("default")
    }
}

/// Input handed to an engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineInput {
    /// One span of raw text; the engine segments it
    Text(String),
    /// Pre-segmented sentences; each must come back as exactly one sentence
    Sentences(Vec<String>),
}

impl EngineInput {
    pub fn is_pretokenized(&self) -> bool {
        matches!(self, EngineInput::Sentences(_))
    }

    /// Number of input units (1 for raw text)
    pub fn unit_count(&self) -> usize {
        match self {
            EngineInput::Text(_) => 1,
            EngineInput::Sentences(s) => s.len(),
        }
    }
}

/// A requested step resolved against an engine's capabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    /// Column name, the step name as requested
    pub column: String,
    /// Engine-native step name
    pub native: &'static str,
    pub layer: Option<Layer>,
}

/// A built, validated engine ready to apply to input.
///
/// The engine-owned state is opaque here; adapters downcast it.
pub struct EngineHandle {
    pub job: JobRequest,
    /// Model actually loaded
    pub model: String,
    pub steps: Vec<ResolvedStep>,
    state: Box<dyn Any + Send + Sync>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("job", &self.job)
            .field("model", &self.model)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl EngineHandle {
    pub fn new(
        job: JobRequest,
        model: impl Into<String>,
        steps: Vec<ResolvedStep>,
        state: impl Any + Send + Sync + 'static,
    ) -> Self {
        Self {
            job,
            model: model.into(),
            steps,
            state: Box::new(state),
        }
    }

    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }

    pub fn state_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.state.downcast_mut::<T>()
    }

    /// Steps that produce a column, as (column, layer)
    pub fn layers(&self) -> impl Iterator<Item = (&str, Layer)> {
        self.steps
            .iter()
            .filter_map(|s| s.layer.map(|layer| (s.column.as_str(), layer)))
    }

    /// Column names this handle produces, in requested order
    pub fn columns(&self) -> Vec<String> {
        self.layers().map(|(c, _)| c.to_string()).collect()
    }

    pub fn has_step(&self, native: &str) -> bool {
        self.steps.iter().any(|s| s.native == native)
    }
}

/// Engine-native output of one `apply` call
pub struct RawResult {
    /// Whether the input was pre-segmented
    pub pretokenized: bool,
    /// Input units as submitted, in order
    pub units: Vec<String>,
    data: Box<dyn Any + Send + Sync>,
}

impl std::fmt::Debug for RawResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResult")
            .field("pretokenized", &self.pretokenized)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}

impl RawResult {
    pub fn new(input: &EngineInput, data: impl Any + Send + Sync + 'static) -> Self {
        let units = match input {
            EngineInput::Text(t) => vec![t.clone()],
            EngineInput::Sentences(s) => s.clone(),
        };
        Self {
            pretokenized: input.is_pretokenized(),
            units,
            data: Box::new(data),
        }
    }

    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_matches_step_and_aliases() {
        let cap = Capability::layer("lemmatizer", &["lemma"], Layer::Lemma);
        assert!(cap.matches("lemmatizer"));
        assert!(cap.matches(" lemma "));
        assert!(cap.matches("LEMMA"));
        assert!(!cap.matches("tagger"));
    }

    #[test]
    fn pretokenized_copy_keeps_everything_else() {
        let job = JobRequest::new("stanza", "job", vec!["pos".into()]).with_language("de");
        let pre = job.pretokenized(true);
        assert!(pre.pretokenized);
        assert!(!job.pretokenized);
        assert_eq!(pre.language, "de");
        assert_eq!(pre.steps, job.steps);
    }

    #[test]
    fn handle_state_downcasts() {
        let job = JobRequest::new("x", "job", vec![]);
        let mut handle = EngineHandle::new(job, "m", vec![], 41_u32);
        *handle.state_mut::<u32>().unwrap() += 1;
        assert_eq!(handle.state::<u32>(), Some(&42));
        assert!(handle.state::<String>().is_none());
    }
}
