//! Convective-initiation labeling.
//!
//! A finished sample holds thirteen future reflectivity frames and a
//! predictor store whose final step sits at the sample anchor. A grid
//! point initiates when enough of those future frames clear the
//! reflectivity threshold under instability that supports convection,
//! and the point is not an isolated speckle.

use std::path::Path;

use tracing::info;

use storm_common::{StormError, StormResult};
use storm_store::stack::GridStack;
use storm_store::{zarr, CAPE_VAR, CIN_VAR, INPUTS_STORE, RADAR_STORE, REFLECTIVITY_VAR, TARGET_STORE};

mod convolve;
mod rule;

pub use convolve::convolve3x3;
pub use rule::LabelRule;

/// Radar frames examined per sample.
pub const LABEL_STEPS: usize = 13;

/// Predictor step used for the instability gates. The inputs axis ends at
/// the sample anchor, so the last step is the state at initiation time.
pub const GATE_STEP: usize = 12;

/// Builds the initiation mask for one sample.
///
/// `refl` holds [`LABEL_STEPS`] planes; `cape` and `cin` are single planes
/// on the same grid. Returns the mask (1.0 hit, 0.0 miss) and the number
/// of hits.
pub fn compute_target(
    refl: &[f32],
    cape: &[f32],
    cin: &[f32],
    ny: usize,
    nx: usize,
    rule: &LabelRule,
) -> (Vec<f32>, usize) {
    let plane = ny * nx;

    // Per-point count of frames where reflectivity and instability both
    // clear the rule. NaN never passes a comparison, so missing cells stay
    // inactive.
    let mut activation = vec![0u32; plane];
    for step in 0..LABEL_STEPS {
        let frame = &refl[step * plane..(step + 1) * plane];
        for idx in 0..plane {
            if frame[idx] >= rule.ref_dbz && cape[idx] >= rule.cape && cin[idx] >= rule.cin {
                activation[idx] += 1;
            }
        }
    }

    // Isolated speckles drop out: the 3x3 neighborhood sum has to clear
    // touch + 1, strictly.
    let neighborhood = convolve3x3(&activation, ny, nx);
    let floor = rule.touch + 1;

    let mut target = vec![0.0f32; plane];
    let mut count = 0usize;
    for idx in 0..plane {
        if activation[idx] >= 1 && neighborhood[idx] > floor {
            target[idx] = 1.0;
            count += 1;
        }
    }
    (target, count)
}

/// Labels one sample directory, writing the target store next to the
/// stores it was derived from. Returns the number of initiation points.
pub fn label_sample(sample_dir: &Path, rule: &LabelRule) -> StormResult<usize> {
    let radar = zarr::read_store(&sample_dir.join(RADAR_STORE))?;
    let inputs = zarr::read_store(&sample_dir.join(INPUTS_STORE))?;

    if radar.times.len() < LABEL_STEPS {
        return Err(StormError::ShapeMismatch {
            expected: LABEL_STEPS,
            got: radar.times.len(),
        });
    }
    if inputs.lats != radar.lats || inputs.lons != radar.lons {
        return Err(StormError::InvalidGrid(
            "predictor and radar stores sit on different grids".to_string(),
        ));
    }

    let ny = radar.lats.len();
    let nx = radar.lons.len();
    let plane = ny * nx;

    let refl = radar
        .var(REFLECTIVITY_VAR)
        .ok_or_else(|| StormError::MissingData(format!("no {} in radar store", REFLECTIVITY_VAR)))?;
    let cape = inputs
        .plane(CAPE_VAR, GATE_STEP)
        .ok_or_else(|| StormError::MissingData(format!("no {} at step {}", CAPE_VAR, GATE_STEP)))?;
    let cin = inputs
        .plane(CIN_VAR, GATE_STEP)
        .ok_or_else(|| StormError::MissingData(format!("no {} at step {}", CIN_VAR, GATE_STEP)))?;

    let (target, count) = compute_target(&refl[..LABEL_STEPS * plane], cape, cin, ny, nx, rule);

    // The mask is stamped with the first future frame time, the earliest
    // moment the label can be observed.
    let first = *radar.times.first().ok_or_else(|| {
        StormError::MissingData("radar store has an empty time axis".to_string())
    })?;
    let mut out = GridStack::new(vec![first], radar.lats.clone(), radar.lons.clone());
    out.add_var("target", target)?;
    zarr::write_store(&sample_dir.join(TARGET_STORE), &out)?;

    info!("Labeled {} initiation point(s)", count);
    Ok(count)
}

/// Instance-log line for a labeled sample.
pub fn instance_line(dir_name: &str, count: usize) -> String {
    format!("Instances of convective initiation in {}: {}", dir_name, count)
}

/// Instance-log line for a sample that failed to label.
pub fn error_line(dir_name: &str, err: &StormError) -> String {
    format!("Error in {}: {}", dir_name, err)
}
