//! Per-run diagnostic report files under `data_info/`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StormResult;

/// Append-only diagnostic logs shared by the orchestrator and the deferred
/// background job. At most one writer appends at a time by construction, so
/// no locking is performed.
#[derive(Debug, Clone)]
pub struct DataInfo {
    dir: PathBuf,
}

impl DataInfo {
    /// Open the report directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StormResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Discard any previous run's reports and start fresh.
    pub fn reset(dir: impl Into<PathBuf>) -> StormResult<Self> {
        let dir = dir.into();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn warning(&self, line: &str) -> StormResult<()> {
        self.append("warnings.txt", line)
    }

    pub fn retry(&self, line: &str) -> StormResult<()> {
        self.append("retries.txt", line)
    }

    pub fn timing(&self, line: &str) -> StormResult<()> {
        self.append("timings.txt", line)
    }

    pub fn instance(&self, line: &str) -> StormResult<()> {
        self.append("instances.txt", line)
    }

    fn append(&self, name: &str, line: &str) -> StormResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(name))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Sort the instance log and put the rule banner first.
    pub fn finalize_instances(&self, rule_line: &str) -> StormResult<()> {
        let path = self.dir.join("instances.txt");
        let body = fs::read_to_string(&path).unwrap_or_default();
        let mut lines: Vec<&str> = body.lines().collect();
        lines.sort_unstable();
        let mut out = String::with_capacity(body.len() + rule_line.len() + 1);
        out.push_str(rule_line);
        out.push('\n');
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
        fs::write(&path, out)?;
        Ok(())
    }
}

/// Render the labeling-rule banner placed at the head of `instances.txt`.
pub fn rule_line(ref_dbz: f32, cape: f32, cin: f32, touch: usize) -> String {
    format!(
        "Rule: At least {} dBz reflectivity and {} j/kg of MUCAPE and at most {} j/kg of MUCIN and touching at least {} other point(s)",
        ref_dbz, cape, cin, touch
    )
}
