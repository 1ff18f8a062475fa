//! Annotation pipeline
//!
//! Plans a run, sequences engine passes, and assembles their output into
//! VRT lines with the attribute accumulators the corpus encoder needs.

mod assembler;
mod orchestrator;
mod plan;
mod tags;

pub use assembler::{assemble_sentence_level, assemble_token_level, Line, LineList, TokenLine};
pub use orchestrator::Orchestrator;
pub use plan::{ordered_unique, RunPlan};
pub use tags::{AccumulatedOutput, TagSet};
