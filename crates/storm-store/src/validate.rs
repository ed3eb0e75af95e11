//! Post-hoc sample validation.
//!
//! The validator runs in the background after a sample finishes. It never
//! fails; anything wrong with the sample comes back as warning lines for
//! the data log.

use std::path::Path;

use tracing::info;
use walkdir::WalkDir;

use crate::zarr::{self, INPUTS_STORE_FILES, RADAR_STORE_FILES};
use crate::{INPUTS_STORE, RADAR_STORE};

/// Counts regular files under `dir`, recursively.
pub fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count()
}

/// Checks a finished sample directory and returns warning lines for the
/// data log, empty when the sample is clean.
///
/// Three things are checked: that both stores open at all, that no
/// variable carries NaN cells, and that the on-disk file census matches
/// the fixed store layout.
pub fn validate_sample(sample_dir: &Path, dir_name: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let inputs = zarr::read_store(&sample_dir.join(INPUTS_STORE));
    let radar = zarr::read_store(&sample_dir.join(RADAR_STORE));
    match (inputs, radar) {
        (Ok(inputs), Ok(radar)) => {
            let mut nan_planes = 0usize;
            for stack in [&inputs, &radar] {
                for name in stack.vars.keys() {
                    for step in 0..stack.times.len() {
                        let has_nan = stack
                            .plane(name, step)
                            .map(|plane| plane.iter().any(|v| v.is_nan()))
                            .unwrap_or(false);
                        if has_nan {
                            nan_planes += 1;
                        }
                    }
                }
            }
            if nan_planes > 0 {
                warnings.push(format!("{} contains NaN", dir_name));
            }

            let inputs_files = count_files(&sample_dir.join(INPUTS_STORE));
            let radar_files = count_files(&sample_dir.join(RADAR_STORE));
            if inputs_files != INPUTS_STORE_FILES || radar_files != RADAR_STORE_FILES {
                warnings.push(format!(
                    "{} contains {} inputs and {} mrms",
                    dir_name, inputs_files, radar_files
                ));
            }
        }
        _ => warnings.push(format!("{} contains no zarr", dir_name)),
    }

    info!("Done processing {}", dir_name);
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::GridStack;
    use chrono::{Duration, TimeZone, Utc};

    fn stack(vars: usize, nan_cell: bool) -> GridStack {
        let start = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let times = (0..13).map(|i| start + Duration::minutes(5 * i)).collect();
        let lats: Vec<f64> = (0..3).map(|i| 30.0 + 0.02 * i as f64).collect();
        let lons: Vec<f64> = (0..3).map(|i| -100.0 + 0.02 * i as f64).collect();
        let mut stack = GridStack::new(times, lats, lons);
        for v in 0..vars {
            let mut data = vec![1.0f32; 13 * 9];
            if nan_cell && v == 0 {
                data[4] = f32::NAN;
            }
            stack.add_var(format!("var{:02}", v), data).unwrap();
        }
        stack
    }

    #[test]
    fn clean_sample_produces_no_warnings() {
        let dir = tempfile::tempdir().unwrap();
        zarr::write_store(&dir.path().join(INPUTS_STORE), &stack(11, false)).unwrap();
        zarr::write_store(&dir.path().join(RADAR_STORE), &stack(1, false)).unwrap();

        assert!(validate_sample(dir.path(), "20230601_1200").is_empty());
    }

    #[test]
    fn nan_cells_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        zarr::write_store(&dir.path().join(INPUTS_STORE), &stack(11, true)).unwrap();
        zarr::write_store(&dir.path().join(RADAR_STORE), &stack(1, false)).unwrap();

        let warnings = validate_sample(dir.path(), "20230601_1200");
        assert_eq!(warnings, vec!["20230601_1200 contains NaN".to_string()]);
    }

    #[test]
    fn short_store_is_reported_with_its_census() {
        let dir = tempfile::tempdir().unwrap();
        // Nine variables instead of eleven: 161 expected, 133 on disk.
        zarr::write_store(&dir.path().join(INPUTS_STORE), &stack(9, false)).unwrap();
        zarr::write_store(&dir.path().join(RADAR_STORE), &stack(1, false)).unwrap();

        let warnings = validate_sample(dir.path(), "20230601_1200");
        assert_eq!(
            warnings,
            vec!["20230601_1200 contains 133 inputs and 21 mrms".to_string()]
        );
    }

    #[test]
    fn missing_stores_report_no_zarr() {
        let dir = tempfile::tempdir().unwrap();
        let warnings = validate_sample(dir.path(), "20230601_1200");
        assert_eq!(
            warnings,
            vec!["20230601_1200 contains no zarr".to_string()]
        );
    }
}
