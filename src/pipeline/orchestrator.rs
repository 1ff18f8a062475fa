//! Orchestrator sequencing engine passes over one input
//!
//! The run moves from unsegmented to segmented exactly once: the first
//! engine of the plan splits and tokenizes the raw text, then every later
//! engine runs in pretokenized mode over that sentence list and only adds
//! columns. Passes run strictly one after another.

use super::assembler::{assemble_sentence_level, assemble_token_level, LineList};
use super::plan::RunPlan;
use super::tags::{AccumulatedOutput, TagSet};
use crate::document::Document;
use crate::engine::{Engine, EngineHandle, EngineInput, EngineRegistry, JobRequest};
use crate::error::{AnnotatorError, AnnotatorResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Structural attribute recorded for segmented output
const SENTENCE_TAG: &str = "s";
/// Structural attribute enclosing each chunk of a chunked run
const PARAGRAPH_TAG: &str = "p";

/// A built engine ready to apply
struct Pass {
    engine: Arc<dyn Engine>,
    handle: EngineHandle,
}

impl Pass {
    fn id(&self) -> &str {
        self.engine.id()
    }
}

/// Runs a plan's engines over text and merges their output
pub struct Orchestrator {
    registry: EngineRegistry,
}

impl Orchestrator {
    pub fn new(registry: EngineRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Check the plan without running anything: every engine known, every
    /// step resolvable, and the first engine able to segment.
    pub fn validate(&self, plan: &RunPlan) -> AnnotatorResult<()> {
        if plan.jobs().is_empty() {
            return Err(AnnotatorError::Configuration(
                "no engines requested".to_string(),
            ));
        }
        for (i, job) in plan.jobs().iter().enumerate() {
            let engine = self.registry.require(&job.engine)?;
            engine.resolve_steps(job, job.model_label())?;
            if i == 0 && !engine.can_segment() {
                return Err(AnnotatorError::Configuration(format!(
                    "engine '{}' cannot establish sentence segmentation and must not run first",
                    job.engine
                )));
            }
        }
        Ok(())
    }

    /// Annotate one text
    pub async fn run(&self, plan: &RunPlan, text: &str) -> AnnotatorResult<AccumulatedOutput> {
        self.run_chunks(plan, &[text.to_string()], false).await
    }

    /// Annotate consecutive chunks of one input with continuous token
    /// indices. Engines are built once and reused for every chunk, and each
    /// chunk is enclosed in a `<p>` region.
    pub async fn run_chunked(
        &self,
        plan: &RunPlan,
        chunks: &[String],
    ) -> AnnotatorResult<AccumulatedOutput> {
        self.run_chunks(plan, chunks, true).await
    }

    async fn run_chunks(
        &self,
        plan: &RunPlan,
        chunks: &[String],
        paragraphs: bool,
    ) -> AnnotatorResult<AccumulatedOutput> {
        self.validate(plan)?;
        let (mut segmenter, mut augmenters) = self.build_passes(plan).await?;

        let mut output = AccumulatedOutput::default();
        for (k, chunk) in chunks.iter().enumerate() {
            let start = output.lines.next_index();
            let mut lines = self
                .process_chunk(plan, &mut segmenter, &mut augmenters, chunk, start)
                .await?;
            if paragraphs {
                lines.wrap_paragraph();
            }
            if k == 0 {
                output.lines = lines;
                output.stags.push(SENTENCE_TAG);
                if paragraphs {
                    output.stags.push(PARAGRAPH_TAG);
                }
            } else {
                output.lines.append(lines);
            }
        }

        output.ptags = std::iter::once(&segmenter)
            .chain(augmenters.iter())
            .flat_map(|p| p.handle.columns())
            .collect::<TagSet>();
        info!(
            engines = ?plan.tools(),
            tokens = output.lines.next_index(),
            ptags = ?output.ptags.names(),
            "annotation run complete"
        );
        Ok(output)
    }

    async fn build_passes(&self, plan: &RunPlan) -> AnnotatorResult<(Pass, Vec<Pass>)> {
        let first = plan.segmenter().ok_or_else(|| {
            AnnotatorError::Configuration("no engines requested".to_string())
        })?;
        let first_engine = self.registry.require(&first.engine)?;

        let segmenting_job = if plan.refine_segmenter {
            structural_only(first_engine.as_ref(), first)
        } else {
            first.pretokenized(false)
        };
        let segmenter = self.build(plan, first_engine.clone(), &segmenting_job).await?;

        let mut augmenters = Vec::with_capacity(plan.jobs().len());
        if plan.refine_segmenter {
            augmenters.push(self.build(plan, first_engine, &first.pretokenized(true)).await?);
        }
        for job in plan.augmenters() {
            let engine = self.registry.require(&job.engine)?;
            augmenters.push(self.build(plan, engine, &job.pretokenized(true)).await?);
        }
        Ok((segmenter, augmenters))
    }

    async fn build(
        &self,
        plan: &RunPlan,
        engine: Arc<dyn Engine>,
        job: &JobRequest,
    ) -> AnnotatorResult<Pass> {
        info!(
            engine = engine.id(),
            steps = ?job.steps,
            pretokenized = job.pretokenized,
            "building engine"
        );
        let handle = timed(plan.timeout, engine.id(), "build", engine.build(job)).await?;
        debug!(engine = engine.id(), model = %handle.model, columns = ?handle.columns(), "engine ready");
        Ok(Pass { engine, handle })
    }

    async fn process_chunk(
        &self,
        plan: &RunPlan,
        segmenter: &mut Pass,
        augmenters: &mut [Pass],
        text: &str,
        start: usize,
    ) -> AnnotatorResult<LineList> {
        let document = invoke(plan, segmenter, EngineInput::Text(text.to_string())).await?;
        let mut lines = assemble_sentence_level(&document, start);
        let sentences = document.sentence_texts();
        info!(
            engine = segmenter.id(),
            sentences = sentences.len(),
            tokens = document.token_count(),
            "segmentation established"
        );
        if sentences.is_empty() {
            warn!(engine = segmenter.id(), "no sentences found, skipping annotation passes");
            return Ok(lines);
        }

        for pass in augmenters.iter_mut() {
            let document = invoke(plan, pass, EngineInput::Sentences(sentences.clone())).await?;
            lines = assemble_token_level(lines, &document).map_err(|e| {
                error!(engine = pass.id(), stage = "merge", error = %e, "annotation pass failed");
                e
            })?;
            info!(engine = pass.id(), columns = ?document.columns(), "annotation pass merged");
        }
        Ok(lines)
    }
}

/// Apply a built engine and normalize its output
async fn invoke(plan: &RunPlan, pass: &mut Pass, input: EngineInput) -> AnnotatorResult<Document> {
    debug!(engine = pass.id(), units = input.unit_count(), "applying engine");
    let engine = pass.engine.clone();
    let raw = timed(
        plan.timeout,
        engine.id(),
        "apply",
        engine.apply(&mut pass.handle, input),
    )
    .await?;
    engine.normalize(&pass.handle, raw).map_err(|e| {
        error!(engine = engine.id(), stage = "normalize", error = %e, "engine output rejected");
        e
    })
}

/// Await an engine call under the run's timeout
async fn timed<T>(
    limit: Duration,
    engine: &str,
    stage: &'static str,
    call: impl Future<Output = AnnotatorResult<T>>,
) -> AnnotatorResult<T> {
    let result = match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AnnotatorError::Timeout {
            engine: engine.to_string(),
            stage,
            seconds: limit.as_secs(),
        }),
    };
    result.map_err(|e| {
        error!(engine, stage, error = %e, "engine call failed");
        e
    })
}

/// Copy of the job keeping only steps that produce no column, so the
/// segmenting pass contributes segmentation alone
fn structural_only(engine: &dyn Engine, job: &JobRequest) -> JobRequest {
    let mut job = job.pretokenized(false);
    job.steps
        .retain(|step| engine.resolve(step).is_some_and(|c| c.layer.is_none()));
    job
}
