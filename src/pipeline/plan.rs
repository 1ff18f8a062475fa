//! Run plan: which engines run, in which order, with which jobs

use crate::config::{AnnotatorConfig, DEFAULT_ENGINE_TIMEOUT_SECS};
use crate::engine::JobRequest;
use crate::error::AnnotatorResult;
use std::time::Duration;

/// Stable de-duplication keeping the first occurrence of every item
pub fn ordered_unique(items: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(item) {
            unique.push(item.clone());
        }
    }
    unique
}

/// Ordered, de-duplicated engine sequence with one job per engine.
///
/// Computed once before a run; the first job establishes segmentation,
/// every later job augments it.
#[derive(Debug, Clone)]
pub struct RunPlan {
    jobs: Vec<JobRequest>,
    /// Re-run the segmenting engine in pretokenized mode for its layers
    pub refine_segmenter: bool,
    /// Limit for each engine build and apply
    pub timeout: Duration,
}

impl RunPlan {
    /// Plan running `tools` with the same steps for every engine
    pub fn new(job_id: &str, tools: &[String], steps: Vec<String>) -> Self {
        let jobs = ordered_unique(&clean(tools))
            .into_iter()
            .map(|tool| JobRequest::new(tool, job_id, steps.clone()))
            .collect();
        Self {
            jobs,
            refine_segmenter: false,
            timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
        }
    }

    /// Validate the configuration and derive the plan from it
    pub fn from_config(config: &AnnotatorConfig) -> AnnotatorResult<Self> {
        config.validate()?;
        let jobs = ordered_unique(&clean(&config.tool))
            .iter()
            .map(|tool| config.job_request(tool))
            .collect();
        Ok(Self {
            jobs,
            refine_segmenter: config.refine_segmenter,
            timeout: Duration::from_secs(config.engine_timeout_secs),
        })
    }

    /// Replace the job for `job.engine`, or append it if the engine is new
    pub fn with_job(mut self, job: JobRequest) -> Self {
        match self.jobs.iter_mut().find(|j| j.engine == job.engine) {
            Some(existing) => *existing = job,
            None => self.jobs.push(job),
        }
        self
    }

    pub fn with_refine_segmenter(mut self, refine: bool) -> Self {
        self.refine_segmenter = refine;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn jobs(&self) -> &[JobRequest] {
        &self.jobs
    }

    /// Engine identifiers in run order
    pub fn tools(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.engine.as_str()).collect()
    }

    pub fn job(&self, engine: &str) -> Option<&JobRequest> {
        self.jobs.iter().find(|j| j.engine == engine)
    }

    /// Job that establishes segmentation
    pub fn segmenter(&self) -> Option<&JobRequest> {
        self.jobs.first()
    }

    /// Jobs that augment the established segmentation
    pub fn augmenters(&self) -> &[JobRequest] {
        self.jobs.get(1..).unwrap_or(&[])
    }
}

fn clean(tools: &[String]) -> Vec<String> {
    tools
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
