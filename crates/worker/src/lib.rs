//! Job orchestration for the ComfyUI bridge.
//!
//! Owns the in-memory job registry, the single worker loop that drives
//! jobs through ComfyUI, and the correlator that folds ComfyUI events
//! back into job state. [`orchestrator::Orchestrator`] wires them
//! together and manages their lifetime.

pub mod config;
pub mod correlator;
pub mod orchestrator;
pub mod registry;
pub mod worker;

#[cfg(test)]
mod test_support;
