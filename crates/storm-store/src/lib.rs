//! Grid storage for training samples.
//!
//! Fetchers hand their aligned grids around as NetCDF intermediates inside
//! the sample directory; the merged products land in chunked Zarr stores.
//! This crate owns both formats plus the post-hoc sample validation.

pub mod netcdf;
pub mod stack;
pub mod validate;
pub mod zarr;

pub use stack::GridStack;

/// Merged predictor store written by the merge stage.
pub const INPUTS_STORE: &str = "inputs.zarr";
/// Future-window reflectivity store written by the radar fetcher.
pub const RADAR_STORE: &str = "mrms.zarr";
/// Initiation mask store written by the labeler.
pub const TARGET_STORE: &str = "target.zarr";

/// Reflectivity variable carried in the radar store.
pub const REFLECTIVITY_VAR: &str = "ReflectivityM10C_500mabovemeansealevel";
/// Most-unstable CAPE variable carried in the inputs store.
pub const CAPE_VAR: &str = "CAPE_255M0mbaboveground";
/// Most-unstable CIN variable carried in the inputs store.
pub const CIN_VAR: &str = "CIN_255M0mbaboveground";
