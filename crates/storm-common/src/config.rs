//! Environment-driven settings.

use std::env;

/// Switch controlling out-of-domain behavior during spatial resampling.
/// `off` leaves target cells outside the source domain missing; anything
/// else (including unset) clamps to the nearest source edge.
pub const REMAP_EXTRAPOLATE_VAR: &str = "REMAP_EXTRAPOLATE";

/// Read the extrapolation switch for this process.
pub fn remap_extrapolate() -> bool {
    match env::var(REMAP_EXTRAPOLATE_VAR) {
        Ok(value) => !value.eq_ignore_ascii_case("off"),
        Err(_) => true,
    }
}

/// Force the extrapolation switch for this process.
pub fn set_remap_extrapolate(on: bool) {
    env::set_var(REMAP_EXTRAPOLATE_VAR, if on { "on" } else { "off" });
}
