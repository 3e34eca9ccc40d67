//! Domain types and pure logic for the Tapnow ComfyUI bridge.
//!
//! Holds the job model, the error taxonomy shared by every crate, the
//! workflow graph representation, the parameter injector and the
//! filesystem-backed template store.

pub mod error;
pub mod injector;
pub mod job;
pub mod templates;
pub mod types;
pub mod workflow;
