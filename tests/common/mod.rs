//! Common test utilities for annotator integration tests
//!
//! Provides a scripted engine that counts its invocations and can be made
//! to misalign, stall, or refuse to segment.

pub mod mock_engine;

pub use mock_engine::MockEngine;

/// Owned strings from literals
pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
