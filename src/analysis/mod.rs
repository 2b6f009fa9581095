//! Inference over captured input
//!
//! `AnalysisEngine` validates and normalizes; the `AnalysisBackend` does the work.

pub mod backend;
pub mod engine;
pub mod simulated;

pub use backend::{AnalysisBackend, AudioPayload, Finding, ImagePayload};
pub use engine::AnalysisEngine;
pub use simulated::SimulatedBackend;
