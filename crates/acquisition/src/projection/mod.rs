//! Map projections of the source grids.
//!
//! The resampler works by inverting each source projection at the sample
//! grid's cell centers, so both projections here are used index-first:
//! geographic coordinates in, fractional grid indices out.

mod geostationary;
mod lambert;

pub use geostationary::Geostationary;
pub use lambert::LambertConformal;
