//! Engine trait defining the annotation engine interface

use super::types::{Capability, EngineHandle, EngineInput, JobRequest, RawResult, ResolvedStep};
use crate::document::Document;
use crate::error::{AnnotatorError, AnnotatorResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for annotation engines
///
/// An engine turns text into a [`Document`] in three stages: `build`
/// validates the job and loads the model, `apply` runs the engine on
/// raw text or pre-segmented sentences, and `normalize` maps native
/// output onto the generic model.
///
/// # Example
///
/// ```ignore
/// struct Whitespace;
///
/// #[async_trait]
/// impl Engine for Whitespace {
///     fn id(&self) -> &str { "whitespace" }
///     fn name(&self) -> &str { "Whitespace tokenizer" }
///     fn capabilities(&self) -> &[Capability] { &[Capability::structural("tokenize", &[])] }
///
///     async fn build(&self, job: &JobRequest) -> AnnotatorResult<EngineHandle> {
///         let steps = self.resolve_steps(job, "whitespace")?;
///         Ok(EngineHandle::new(job.clone(), "whitespace", steps, ()))
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait Engine: Send + Sync {
    /// Identifier used in configuration (`tool` entries)
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Processing steps this engine understands
    fn capabilities(&self) -> &[Capability];

    /// Whether the engine can establish sentence segmentation from raw text
    fn can_segment(&self) -> bool {
        true
    }

    /// Find the capability behind a requested step name
    fn resolve(&self, step: &str) -> Option<&Capability> {
        self.capabilities().iter().find(|c| c.matches(step))
    }

    /// Resolve every requested step, failing on the first unknown one.
    ///
    /// Repeated steps are resolved once.
    fn resolve_steps(&self, job: &JobRequest, model: &str) -> AnnotatorResult<Vec<ResolvedStep>> {
        let mut resolved: Vec<ResolvedStep> = Vec::with_capacity(job.steps.len());
        for step in &job.steps {
            let column = step.trim();
            if column.is_empty() || resolved.iter().any(|r| r.column == column) {
                continue;
            }
            let cap = self
                .resolve(column)
                .ok_or_else(|| AnnotatorError::UnsupportedStep {
                    engine: self.id().to_string(),
                    model: model.to_string(),
                    step: column.to_string(),
                    hint: None,
                })?;
            resolved.push(ResolvedStep {
                column: column.to_string(),
                native: cap.step,
                layer: cap.layer,
            });
        }
        Ok(resolved)
    }

    /// Construct and validate an engine instance for the job
    async fn build(&self, job: &JobRequest) -> AnnotatorResult<EngineHandle>;

    /// Run the engine on the input
    ///
    /// For [`EngineInput::Sentences`] every unit must come back as exactly
    /// one sentence; the engine must neither merge nor split units.
    async fn apply(&self, handle: &mut EngineHandle, input: EngineInput) -> AnnotatorResult<RawResult>;

    /// Map native output onto the generic document model
    fn normalize(&self, handle: &EngineHandle, raw: RawResult) -> AnnotatorResult<Document>;
}

/// Registry of available engines, dispatched by identifier
#[derive(Default)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn Engine>>,
}

impl EngineRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
        }
    }

    /// Register an engine, replacing any engine with the same id
    pub fn register<E: Engine + 'static>(&mut self, engine: E) {
        self.register_arc(Arc::new(engine));
    }

    pub fn register_arc(&mut self, engine: Arc<dyn Engine>) {
        self.engines.retain(|e| e.id() != engine.id());
        self.engines.push(engine);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Engine>> {
        self.engines.iter().find(|e| e.id() == id).cloned()
    }

    /// Look up an engine, failing with a configuration error
    pub fn require(&self, id: &str) -> AnnotatorResult<Arc<dyn Engine>> {
        self.get(id).ok_or_else(|| {
            AnnotatorError::Configuration(format!(
                "unknown engine '{}' (available: {})",
                id,
                self.ids().join(", ")
            ))
        })
    }

    /// Registered engine ids in registration order
    pub fn ids(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.id()).collect()
    }

    pub fn engines(&self) -> impl Iterator<Item = &dyn Engine> {
        self.engines.iter().map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Layer;

    struct StubEngine {
        id: &'static str,
    }

    const STUB_CAPS: &[Capability] = &[
        Capability::structural("tokenize", &[]),
        Capability::layer("tagger", &["pos"], Layer::Tag),
    ];

    #[async_trait]
    impl Engine for StubEngine {
        fn id(&self) -> &str {
            self.id
        }
        fn name(&self) -> &str {
            "Stub"
        }
        fn capabilities(&self) -> &[Capability] {
            STUB_CAPS
        }
        async fn build(&self, job: &JobRequest) -> AnnotatorResult<EngineHandle> {
            let steps = self.resolve_steps(job, "stub")?;
            Ok(EngineHandle::new(job.clone(), "stub", steps, ()))
        }
        async fn apply(&self, _handle: &mut EngineHandle, input: EngineInput) -> AnnotatorResult<RawResult> {
            Ok(RawResult::new(&input, ()))
        }
        fn normalize(&self, handle: &EngineHandle, _raw: RawResult) -> AnnotatorResult<Document> {
            Ok(Document::builder(self.id, &handle.job.job_id).finish())
        }
    }

    #[test]
    fn resolve_steps_maps_aliases_and_skips_repeats() {
        let engine = StubEngine { id: "stub" };
        let job = JobRequest::new(
            "stub",
            "job",
            vec!["tokenize".into(), "pos".into(), "pos".into()],
        );
        let steps = engine.resolve_steps(&job, "stub").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].column, "pos");
        assert_eq!(steps[1].native, "tagger");
        assert_eq!(steps[1].layer, Some(Layer::Tag));
    }

    #[test]
    fn resolve_steps_rejects_unknown_step() {
        let engine = StubEngine { id: "stub" };
        let job = JobRequest::new("stub", "job", vec!["lemma".into()]).with_model("tiny");
        let err = engine.resolve_steps(&job, job.model_label()).unwrap_err();
        assert!(matches!(
            err,
            AnnotatorError::UnsupportedStep { ref step, ref model, .. } if step == "lemma" && model == "tiny"
        ));
    }

    #[test]
    fn registry_dispatches_by_id() {
        let mut registry = EngineRegistry::new();
        registry.register(StubEngine { id: "a" });
        registry.register(StubEngine { id: "b" });
        registry.register(StubEngine { id: "a" });

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["b", "a"]);
        assert!(registry.get("b").is_some());
        let err = registry.require("c").err().unwrap();
        assert!(err.to_string().contains("unknown engine 'c'"));
    }
}
