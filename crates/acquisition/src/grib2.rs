//! GRIB2 payload decoding.
//!
//! MRMS products arrive gzipped, one message per file, on the fixed CONUS
//! mosaic grid; HRRR fields arrive as standalone messages cut out of the
//! analysis file by byte range. Either way the result is a flat value
//! vector paired with a [`SourceGrid`] for the resampler.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;

use storm_common::{StormError, StormResult};

use crate::resample::SourceGrid;

/// Columns of the MRMS CONUS mosaic.
pub const MRMS_NX: usize = 7000;
/// Rows of the MRMS CONUS mosaic.
pub const MRMS_NY: usize = 3500;

/// Decompresses a gzipped archive object.
pub fn gunzip(data: &[u8]) -> StormResult<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Decodes the value section of the first message in a GRIB2 file.
///
/// Both archive layouts this crate touches put exactly one field per
/// fetched blob, so the first message is the whole payload.
pub fn decode_first_message(data: Vec<u8>) -> StormResult<Vec<f32>> {
    let grib2 = grib::from_reader(Cursor::new(data))
        .map_err(|e| StormError::Grib2(format!("{:?}", e)))?;
    let (_, submessage) = grib2
        .iter()
        .next()
        .ok_or_else(|| StormError::Grib2("file holds no messages".to_string()))?;
    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| StormError::Grib2(format!("{:?}", e)))?;
    let values = decoder
        .dispatch()
        .map_err(|e| StormError::Grib2(e.to_string()))?;
    Ok(values.collect())
}

/// The MRMS CONUS mosaic geometry: 0.01 degree cells, rows north to south
/// from 54.995N, columns west to east from 129.995W.
pub fn mrms_conus_grid() -> SourceGrid {
    let lats = (0..MRMS_NY).map(|j| 54.995 - 0.01 * j as f64).collect();
    let lons = (0..MRMS_NX).map(|i| -129.995 + 0.01 * i as f64).collect();
    SourceGrid::RegularLatLon { lats, lons }
}

/// Decodes one gzipped MRMS mosaic file.
pub fn decode_mrms(gz: &[u8]) -> StormResult<(Vec<f32>, SourceGrid)> {
    let values = decode_first_message(gunzip(gz)?)?;
    if values.len() != MRMS_NX * MRMS_NY {
        return Err(StormError::ShapeMismatch {
            expected: MRMS_NX * MRMS_NY,
            got: values.len(),
        });
    }
    Ok((values, mrms_conus_grid()))
}
