//! NetCDF intermediates.
//!
//! Each fetcher drops its aligned stack into the sample directory as a
//! NetCDF file; the merge stage picks them back up. Dimensions are always
//! `(time, latitude, longitude)` with time in epoch seconds.

use std::path::Path;
use std::sync::Once;

use chrono::DateTime;
use storm_common::{StormError, StormResult};

use crate::stack::GridStack;

/// Units attribute written on every time coordinate.
pub const EPOCH_UNITS: &str = "seconds since 1970-01-01 00:00:00";

static HDF5_SILENCE: Once = Once::new();

/// Disables HDF5's automatic error printing to stderr.
///
/// The HDF5 C library dumps a full error stack to stderr whenever a read
/// fails, even when the failure is handled. Call before any NetCDF I/O.
pub fn silence_hdf5_errors() {
    HDF5_SILENCE.call_once(|| unsafe {
        hdf5_metno_sys::h5e::H5Eset_auto2(
            hdf5_metno_sys::h5e::H5E_DEFAULT,
            None,
            std::ptr::null_mut(),
        );
    });
}

fn nc_err(e: netcdf::Error) -> StormError {
    StormError::NetCdf(e.to_string())
}

/// Writes a stack to `path`, replacing any existing file.
pub fn write_stack(path: &Path, stack: &GridStack) -> StormResult<()> {
    silence_hdf5_errors();
    let mut file = netcdf::create(path).map_err(nc_err)?;

    file.add_dimension("time", stack.times.len()).map_err(nc_err)?;
    file.add_dimension("latitude", stack.lats.len())
        .map_err(nc_err)?;
    file.add_dimension("longitude", stack.lons.len())
        .map_err(nc_err)?;

    let secs: Vec<i64> = stack.times.iter().map(|t| t.timestamp()).collect();
    let mut time_var = file.add_variable::<i64>("time", &["time"]).map_err(nc_err)?;
    time_var.put_attribute("units", EPOCH_UNITS).map_err(nc_err)?;
    time_var.put_values(&secs, ..).map_err(nc_err)?;

    let mut lat_var = file
        .add_variable::<f64>("latitude", &["latitude"])
        .map_err(nc_err)?;
    lat_var.put_values(&stack.lats, ..).map_err(nc_err)?;

    let mut lon_var = file
        .add_variable::<f64>("longitude", &["longitude"])
        .map_err(nc_err)?;
    lon_var.put_values(&stack.lons, ..).map_err(nc_err)?;

    for (name, data) in &stack.vars {
        let mut var = file
            .add_variable::<f32>(name, &["time", "latitude", "longitude"])
            .map_err(nc_err)?;
        var.put_values(data, ..).map_err(nc_err)?;
    }
    Ok(())
}

/// Reads a stack written by [`write_stack`].
///
/// Every 3-D float variable in the file is loaded; anything else (the
/// coordinates included) is skipped.
pub fn read_stack(path: &Path) -> StormResult<GridStack> {
    silence_hdf5_errors();
    let file = netcdf::open(path).map_err(nc_err)?;

    let secs: Vec<i64> = coord_var(&file, "time")?.get_values(..).map_err(nc_err)?;
    let mut times = Vec::with_capacity(secs.len());
    for s in secs {
        let time = DateTime::from_timestamp(s, 0).ok_or_else(|| {
            StormError::InvalidTime(format!("epoch seconds {} out of range", s))
        })?;
        times.push(time);
    }
    let lats: Vec<f64> = coord_var(&file, "latitude")?
        .get_values(..)
        .map_err(nc_err)?;
    let lons: Vec<f64> = coord_var(&file, "longitude")?
        .get_values(..)
        .map_err(nc_err)?;

    let mut stack = GridStack::new(times, lats, lons);
    for var in file.variables() {
        if var.dimensions().len() != 3 {
            continue;
        }
        let data: Vec<f32> = var.get_values(..).map_err(nc_err)?;
        stack.add_var(var.name(), data)?;
    }
    Ok(stack)
}

fn coord_var<'f>(file: &'f netcdf::File, name: &str) -> StormResult<netcdf::Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| StormError::NetCdf(format!("missing coordinate variable {}", name)))
}
