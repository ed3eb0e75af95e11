//! Common types and utilities shared across the storm-sampler workspace.

pub mod config;
pub mod error;
pub mod grid;
pub mod report;
pub mod window;

pub use config::{remap_extrapolate, set_remap_extrapolate};
pub use error::{StormError, StormResult};
pub use grid::GridSpec;
pub use report::DataInfo;
pub use window::SampleWindow;
