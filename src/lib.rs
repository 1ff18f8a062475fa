//! Annotator: multi-engine linguistic annotation to VRT corpora
//!
//! Runs one or more annotation engines over raw text and merges their
//! per-token layers into a single verticalized (VRT) file for a corpus
//! indexer.
//!
//! # Core Concepts
//!
//! - **Engines**: interchangeable annotators described by their capabilities
//! - **Segmentation**: fixed once by the first engine; later engines run
//!   pretokenized and only add columns
//! - **Accumulators**: `ptags` (token attributes) and `stags` (structural
//!   attributes) handed to the corpus encoder with the VRT file
//!
//! # Example
//!
//! ```
//! use annotator::{EngineRegistry, Orchestrator, RuleEngine, RunPlan};
//!
//! let mut registry = EngineRegistry::new();
//! registry.register(RuleEngine::new());
//! let orchestrator = Orchestrator::new(registry);
//! let plan = RunPlan::new("demo", &["rule".to_string()], vec!["tokenize".to_string()]);
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let output = runtime.block_on(orchestrator.run(&plan, "Dogs bark.")).unwrap();
//! assert!(output.render().contains("0 Dogs\n"));
//! ```

pub mod config;
pub mod document;
pub mod encode;
pub mod engine;
mod error;
pub mod pipeline;
pub mod vrt;

pub use config::AnnotatorConfig;
pub use document::{AttrValue, Document, Sentence, Token};
pub use encode::{CorpusEncoder, CwbEncoder};
pub use engine::{
    default_registry, BridgeCommand, Engine, EngineInput, EngineRegistry, JobRequest, RuleEngine,
};
pub use error::{AnnotatorError, AnnotatorResult};
pub use pipeline::{AccumulatedOutput, LineList, Orchestrator, RunPlan, TagSet};
pub use vrt::{vrt_path, write_vrt};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
