//! Sample acquisition service internals.

pub mod orchestrator;
