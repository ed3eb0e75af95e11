//! Zarr V3 stores.
//!
//! Finished products are chunked one time step per chunk so a training
//! loader can pull single frames without touching the rest of the store.
//! The on-disk file count per store is fixed, which is what the validator
//! leans on to spot truncated writes.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use storm_common::{StormError, StormResult};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::netcdf::EPOCH_UNITS;
use crate::stack::GridStack;

/// Files in a finished inputs store: one group document, eleven variables
/// at one metadata document plus thirteen chunks each, and three
/// single-chunk coordinate arrays.
pub const INPUTS_STORE_FILES: usize = 161;
/// Files in a finished radar store (one variable).
pub const RADAR_STORE_FILES: usize = 21;

/// On-disk file count for a store with `vars` variables over `steps` time
/// steps, written by [`write_store`].
pub fn expected_store_files(vars: usize, steps: usize) -> usize {
    1 + vars * (1 + steps) + 3 * 2
}

/// Writes a stack as a Zarr store at `dir`, replacing anything already there.
pub fn write_store(dir: &Path, stack: &GridStack) -> StormResult<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    // All-fill chunks must still land on disk or the store file census
    // becomes data dependent.
    zarrs::config::global_config_mut().set_store_empty_chunks(true);

    let store = Arc::new(
        FilesystemStore::new(dir).map_err(|e| StormError::Zarr(e.to_string()))?,
    );

    GroupBuilder::new()
        .build(store.clone(), "/")
        .map_err(|e| StormError::Zarr(e.to_string()))?
        .store_metadata()
        .map_err(|e| StormError::Zarr(e.to_string()))?;

    let nt = stack.times.len() as u64;
    let ny = stack.lats.len() as u64;
    let nx = stack.lons.len() as u64;

    let secs: Vec<i64> = stack.times.iter().map(|t| t.timestamp()).collect();
    write_time_coord(&store, &secs)?;
    write_f64_coord(&store, "/latitude", &stack.lats)?;
    write_f64_coord(&store, "/longitude", &stack.lons)?;

    for (name, data) in &stack.vars {
        let chunk_grid: zarrs::array::ChunkGrid = vec![1, ny, nx]
            .try_into()
            .map_err(|e| StormError::Zarr(format!("{:?}", e)))?;
        let array = ArrayBuilder::new(
            vec![nt, ny, nx],
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        )
        .build(store.clone(), &format!("/{}", name))
        .map_err(|e| StormError::Zarr(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| StormError::Zarr(e.to_string()))?;

        let subset = ArraySubset::new_with_start_shape(vec![0, 0, 0], vec![nt, ny, nx])
            .map_err(|e| StormError::Zarr(e.to_string()))?;
        array
            .store_array_subset_elements(&subset, data)
            .map_err(|e| StormError::Zarr(e.to_string()))?;
    }
    Ok(())
}

fn write_time_coord(store: &Arc<FilesystemStore>, secs: &[i64]) -> StormResult<()> {
    let len = secs.len().max(1) as u64;
    let chunk_grid: zarrs::array::ChunkGrid = vec![len]
        .try_into()
        .map_err(|e| StormError::Zarr(format!("{:?}", e)))?;

    let mut attrs = serde_json::Map::new();
    attrs.insert("units".to_string(), serde_json::json!(EPOCH_UNITS));

    let mut builder = ArrayBuilder::new(
        vec![secs.len() as u64],
        DataType::Int64,
        chunk_grid,
        FillValue::from(0i64),
    );
    builder.attributes(attrs);
    let array = builder
        .build(store.clone(), "/time")
        .map_err(|e| StormError::Zarr(e.to_string()))?;
    array
        .store_metadata()
        .map_err(|e| StormError::Zarr(e.to_string()))?;

    let subset = ArraySubset::new_with_start_shape(vec![0], vec![secs.len() as u64])
        .map_err(|e| StormError::Zarr(e.to_string()))?;
    array
        .store_array_subset_elements(&subset, secs)
        .map_err(|e| StormError::Zarr(e.to_string()))?;
    Ok(())
}

fn write_f64_coord(store: &Arc<FilesystemStore>, path: &str, values: &[f64]) -> StormResult<()> {
    let len = values.len().max(1) as u64;
    let chunk_grid: zarrs::array::ChunkGrid = vec![len]
        .try_into()
        .map_err(|e| StormError::Zarr(format!("{:?}", e)))?;
    let array = ArrayBuilder::new(
        vec![values.len() as u64],
        DataType::Float64,
        chunk_grid,
        FillValue::from(f64::NAN),
    )
    .build(store.clone(), path)
    .map_err(|e| StormError::Zarr(e.to_string()))?;
    array
        .store_metadata()
        .map_err(|e| StormError::Zarr(e.to_string()))?;

    let subset = ArraySubset::new_with_start_shape(vec![0], vec![values.len() as u64])
        .map_err(|e| StormError::Zarr(e.to_string()))?;
    array
        .store_array_subset_elements(&subset, values)
        .map_err(|e| StormError::Zarr(e.to_string()))?;
    Ok(())
}

/// Reads a store written by [`write_store`].
pub fn read_store(dir: &Path) -> StormResult<GridStack> {
    let store = Arc::new(
        FilesystemStore::new(dir).map_err(|e| StormError::Zarr(e.to_string()))?,
    );

    let secs: Vec<i64> = read_coord(&store, "/time")?;
    let mut times = Vec::with_capacity(secs.len());
    for s in secs {
        let time = DateTime::from_timestamp(s, 0).ok_or_else(|| {
            StormError::InvalidTime(format!("epoch seconds {} out of range", s))
        })?;
        times.push(time);
    }
    let lats: Vec<f64> = read_coord(&store, "/latitude")?;
    let lons: Vec<f64> = read_coord(&store, "/longitude")?;

    let mut stack = GridStack::new(times, lats, lons);

    // Every array other than the coordinates is a data variable. Arrays sit
    // in their own subdirectories under the store root.
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if matches!(name.as_str(), "time" | "latitude" | "longitude") {
            continue;
        }
        names.push(name);
    }
    names.sort();

    for name in names {
        let array = Array::open(store.clone(), &format!("/{}", name))
            .map_err(|e| StormError::Zarr(e.to_string()))?;
        let shape = array.shape().to_vec();
        if shape.len() != 3 {
            continue;
        }
        let subset = ArraySubset::new_with_start_shape(vec![0, 0, 0], shape)
            .map_err(|e| StormError::Zarr(e.to_string()))?;
        let data: Vec<f32> = array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| StormError::Zarr(e.to_string()))?;
        stack.add_var(name, data)?;
    }
    Ok(stack)
}

fn read_coord<T: zarrs::array::ElementOwned>(
    store: &Arc<FilesystemStore>,
    path: &str,
) -> StormResult<Vec<T>> {
    let array = Array::open(store.clone(), path)
        .map_err(|e| StormError::Zarr(e.to_string()))?;
    let shape = array.shape().to_vec();
    let subset = ArraySubset::new_with_start_shape(vec![0], shape)
        .map_err(|e| StormError::Zarr(e.to_string()))?;
    array
        .retrieve_array_subset_elements(&subset)
        .map_err(|e| StormError::Zarr(e.to_string()))
}
