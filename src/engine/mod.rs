//! Annotation engine layer
//!
//! Every engine implements [`Engine`]: it validates a job against its
//! capabilities, runs on raw text or pre-segmented sentences, and maps its
//! native output onto the generic [`Document`](crate::document::Document).
//! External engines are reached through the [`bridge`].

pub mod bridge;
pub mod rule;
pub mod somajo;
pub mod spacy;
pub mod stanza;
mod traits;
mod types;

pub use bridge::{BridgeCommand, BridgeError, BridgeLauncher, BridgeTransport, ScriptedBridge};
pub use rule::RuleEngine;
pub use somajo::SomajoEngine;
pub use spacy::SpacyEngine;
pub use stanza::StanzaEngine;
pub use traits::{Engine, EngineRegistry};
pub use types::{
    Capability, Device, EngineHandle, EngineInput, JobRequest, Layer, RawResult, ResolvedStep,
};

use std::sync::Arc;

/// Registry with every built-in engine, external ones sharing `launcher`
pub fn default_registry(launcher: Arc<dyn BridgeLauncher>) -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    registry.register(RuleEngine::new());
    registry.register(SpacyEngine::new(launcher.clone()));
    registry.register(StanzaEngine::new(launcher.clone()));
    registry.register(SomajoEngine::new(launcher));
    registry
}
