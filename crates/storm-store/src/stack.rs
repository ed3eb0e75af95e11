//! In-memory grid stacks.
//!
//! A [`GridStack`] is a set of variables sharing one `(time, latitude,
//! longitude)` axis triple, each stored as a flat row-major `[t][y][x]`
//! array. All alignment work (time merging, interpolation, relabeling)
//! happens here before anything touches disk.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use storm_common::{StormError, StormResult};

#[derive(Debug, Clone, Default)]
pub struct GridStack {
    pub times: Vec<DateTime<Utc>>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    /// Variable name to flat `[t][y][x]` values. BTreeMap keeps iteration
    /// order stable so stores come out deterministic.
    pub vars: BTreeMap<String, Vec<f32>>,
}

impl GridStack {
    pub fn new(times: Vec<DateTime<Utc>>, lats: Vec<f64>, lons: Vec<f64>) -> Self {
        Self {
            times,
            lats,
            lons,
            vars: BTreeMap::new(),
        }
    }

    /// Cells in one time step.
    pub fn plane_len(&self) -> usize {
        self.lats.len() * self.lons.len()
    }

    /// Total cells across all time steps.
    pub fn len(&self) -> usize {
        self.times.len() * self.plane_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a variable, rejecting data that does not fill the axes exactly.
    pub fn add_var(&mut self, name: impl Into<String>, data: Vec<f32>) -> StormResult<()> {
        if data.len() != self.len() {
            return Err(StormError::ShapeMismatch {
                expected: self.len(),
                got: data.len(),
            });
        }
        self.vars.insert(name.into(), data);
        Ok(())
    }

    pub fn var(&self, name: &str) -> Option<&[f32]> {
        self.vars.get(name).map(|v| v.as_slice())
    }

    /// One time step of one variable.
    pub fn plane(&self, name: &str, step: usize) -> Option<&[f32]> {
        let plane = self.plane_len();
        let data = self.vars.get(name)?;
        data.get(step * plane..(step + 1) * plane)
    }

    pub fn same_axes(&self, other: &GridStack) -> bool {
        self.times == other.times && self.lats == other.lats && self.lons == other.lons
    }

    /// Moves every variable of `other` into `self`. Axes must match exactly.
    pub fn merge_vars(&mut self, other: GridStack) -> StormResult<()> {
        if !self.same_axes(&other) {
            return Err(StormError::InvalidGrid(
                "cannot merge stacks with different axes".to_string(),
            ));
        }
        for (name, data) in other.vars {
            self.vars.insert(name, data);
        }
        Ok(())
    }

    /// Concatenates stacks along the time axis, sorted by time.
    ///
    /// Every stack must carry the same variables and spatial axes. Duplicate
    /// time stamps keep the copy from the later stack in sort order.
    pub fn merge_time(stacks: Vec<GridStack>) -> StormResult<GridStack> {
        let mut iter = stacks.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| StormError::MissingData("no stacks to merge".to_string()))?;

        let plane = first.plane_len();
        let names: Vec<String> = first.vars.keys().cloned().collect();
        let lats = first.lats.clone();
        let lons = first.lons.clone();

        // Time stamp to per-variable planes; later stacks overwrite earlier
        // ones on duplicate stamps.
        let mut records: BTreeMap<DateTime<Utc>, Vec<Vec<f32>>> = BTreeMap::new();
        for stack in std::iter::once(first).chain(iter) {
            if stack.lats != lats || stack.lons != lons {
                return Err(StormError::InvalidGrid(
                    "cannot concatenate stacks with different spatial axes".to_string(),
                ));
            }
            for (step, time) in stack.times.iter().enumerate() {
                let mut planes = Vec::with_capacity(names.len());
                for name in &names {
                    let data = stack.plane(name, step).ok_or_else(|| {
                        StormError::MissingData(format!("variable {} missing from stack", name))
                    })?;
                    planes.push(data.to_vec());
                }
                records.insert(*time, planes);
            }
        }

        let times: Vec<DateTime<Utc>> = records.keys().copied().collect();
        let mut merged = GridStack::new(times, lats, lons);
        for (i, name) in names.iter().enumerate() {
            let mut data = Vec::with_capacity(records.len() * plane);
            for planes in records.values() {
                data.extend_from_slice(&planes[i]);
            }
            merged.add_var(name.clone(), data)?;
        }
        Ok(merged)
    }

    /// Linearly interpolates every variable onto a new time axis.
    ///
    /// Target times outside the source range clamp to the nearest end step.
    /// A missing value at either bracket makes the interpolated cell missing.
    pub fn interp_time(&self, new_times: &[DateTime<Utc>]) -> StormResult<GridStack> {
        if self.times.is_empty() {
            return Err(StormError::MissingData(
                "cannot interpolate an empty time axis".to_string(),
            ));
        }
        let plane = self.plane_len();
        let mut out = GridStack::new(new_times.to_vec(), self.lats.clone(), self.lons.clone());

        // Bracket indices and weights for each target time.
        let mut brackets = Vec::with_capacity(new_times.len());
        for target in new_times {
            let pos = self.times.partition_point(|t| t <= target);
            let (i0, i1, w) = if pos == 0 {
                (0, 0, 0.0)
            } else if pos >= self.times.len() {
                let last = self.times.len() - 1;
                (last, last, 0.0)
            } else {
                let t0 = self.times[pos - 1];
                let t1 = self.times[pos];
                let span = (t1 - t0).num_seconds() as f64;
                let off = (*target - t0).num_seconds() as f64;
                (pos - 1, pos, if span > 0.0 { off / span } else { 0.0 })
            };
            brackets.push((i0, i1, w as f32));
        }

        for (name, data) in &self.vars {
            let mut interp = Vec::with_capacity(new_times.len() * plane);
            for &(i0, i1, w) in &brackets {
                let p0 = &data[i0 * plane..(i0 + 1) * plane];
                let p1 = &data[i1 * plane..(i1 + 1) * plane];
                if w == 0.0 {
                    interp.extend_from_slice(p0);
                } else {
                    interp.extend(
                        p0.iter()
                            .zip(p1.iter())
                            .map(|(a, b)| a * (1.0 - w) + b * w),
                    );
                }
            }
            out.add_var(name.clone(), interp)?;
        }
        Ok(out)
    }

    /// Rewrites the time axis to `start`, `start + step`, `start + 2*step`,
    /// and so on, keeping the data untouched.
    pub fn relabel_time(&mut self, start: DateTime<Utc>, step: Duration) {
        self.times = (0..self.times.len() as i64)
            .map(|i| start + step * i as i32)
            .collect();
    }

    /// Replaces every value inside `[lo, hi]` with NaN.
    pub fn range_to_missing(&mut self, lo: f32, hi: f32) {
        for data in self.vars.values_mut() {
            for v in data.iter_mut() {
                if *v >= lo && *v <= hi {
                    *v = f32::NAN;
                }
            }
        }
    }

    /// Replaces every NaN with `value`.
    pub fn missing_to(&mut self, value: f32) {
        for data in self.vars.values_mut() {
            for v in data.iter_mut() {
                if v.is_nan() {
                    *v = value;
                }
            }
        }
    }

    /// Applies `f` to every value of one variable.
    pub fn map_var<F: Fn(f32) -> f32>(&mut self, name: &str, f: F) -> StormResult<()> {
        let data = self
            .vars
            .get_mut(name)
            .ok_or_else(|| StormError::MissingData(format!("no variable named {}", name)))?;
        for v in data.iter_mut() {
            *v = f(*v);
        }
        Ok(())
    }

    /// Removes a variable, returning its data if it was present.
    pub fn remove_var(&mut self, name: &str) -> Option<Vec<f32>> {
        self.vars.remove(name)
    }
}
