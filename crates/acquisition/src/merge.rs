//! Predictor merge: three intermediates into one store.

use tracing::info;

use storm_common::StormResult;
use storm_store::INPUTS_STORE;

use crate::SamplePaths;

/// Intermediates the merge consumes, in merge order.
pub const INPUT_FILES: [&str; 3] = ["goes.nc", "hrrr.nc", "elev.nc"];

/// Combines the satellite, model, and terrain intermediates into the
/// predictor store. All three must already sit on the same axes; a fetcher
/// that aligned wrong fails here rather than producing a skewed store.
pub fn merge_inputs(paths: &SamplePaths) -> StormResult<()> {
    let mut merged = storm_store::netcdf::read_stack(&paths.intermediate(INPUT_FILES[0]))?;
    for file in &INPUT_FILES[1..] {
        let stack = storm_store::netcdf::read_stack(&paths.intermediate(file))?;
        merged.merge_vars(stack)?;
    }

    storm_store::zarr::write_store(&paths.store(INPUTS_STORE), &merged)?;
    info!(
        sample = %paths.sample_dir.display(),
        vars = merged.vars.len(),
        "Predictor store written"
    );
    Ok(())
}
