//! GRIB index sidecar parsing.
//!
//! HRRR analysis files ship with a `.idx` sidecar listing every message as
//! `num:offset:d=YYYYMMDDHH:VAR:LEVEL:forecast:`. Byte ranges derived from
//! consecutive offsets let the model fetcher pull eight fields out of a
//! ~700 MB file without downloading the rest.

use std::ops::Range;

use storm_store::{CAPE_VAR, CIN_VAR};

/// One message of a GRIB index sidecar, with its byte range in the data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxRecord {
    pub message: usize,
    pub var: String,
    pub level: String,
    pub range: Range<usize>,
}

/// Parses an index sidecar. `file_size` bounds the last message's range.
///
/// Malformed lines are skipped; offsets that do not increase would produce
/// an empty range and are skipped as well.
pub fn parse_idx(text: &str, file_size: usize) -> Vec<IdxRecord> {
    let mut starts = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 5 {
            continue;
        }
        let (Ok(message), Ok(start)) = (fields[0].parse::<usize>(), fields[1].parse::<usize>())
        else {
            continue;
        };
        starts.push((message, start, fields[3].to_string(), fields[4].to_string()));
    }

    let mut records = Vec::with_capacity(starts.len());
    for (i, (message, start, var, level)) in starts.iter().enumerate() {
        let end = match starts.get(i + 1) {
            Some((_, next_start, _, _)) => *next_start,
            None => file_size,
        };
        if end <= *start {
            continue;
        }
        records.push(IdxRecord {
            message: *message,
            var: var.clone(),
            level: level.clone(),
            range: *start..end,
        });
    }
    records
}

/// Store variable name for a wanted HRRR analysis field, `None` for fields
/// outside the predictor set.
///
/// The level of free convection carries an unassigned level code that GRIB
/// tooling renders inconsistently, so its aliases are accepted too.
pub fn hrrr_store_name(var: &str, level: &str) -> Option<&'static str> {
    match (var, level) {
        ("PWAT", "entire atmosphere (considered as a single layer)") => {
            Some("PWAT_entireatmosphere_consideredasasinglelayer_")
        }
        ("VVEL", "700 mb") => Some("VVEL_700mb"),
        ("VVEL", "850 mb") => Some("VVEL_850mb"),
        ("VVEL", "925 mb") => Some("VVEL_925mb"),
        ("CAPE", "255-0 mb above ground") => Some(CAPE_VAR),
        ("CIN", "255-0 mb above ground") => Some(CIN_VAR),
        ("HGT", "equilibrium level") => Some("HGT_equilibriumlevel"),
        ("HGT", "level of free convection") | ("HGT", "no_level") | ("HGT", "reserved") => {
            Some("HGT_leveloffreeconvection")
        }
        _ => None,
    }
}
