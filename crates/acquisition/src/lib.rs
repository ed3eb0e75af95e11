//! Remote data acquisition.
//!
//! Everything between the public NOAA archives and the local sample
//! directory lives here: the S3 clients, the availability and viability
//! probes, the four source fetchers, the nearest-neighbor resampler, and
//! the merge step that assembles the predictor store.

use std::path::{Path, PathBuf};

pub mod archive;
pub mod fetch;
pub mod grib2;
pub mod idx;
pub mod merge;
pub mod probe;
pub mod projection;
pub mod resample;
pub mod stage;

pub use archive::{Archives, RemoteArchive, S3Archive};
pub use resample::{Resampler, SourceGrid};
pub use stage::{StageOutcome, TaskGroup};

/// Filesystem layout of one sample directory.
///
/// Raw downloads and netcdf intermediates live under `backup/`, which is
/// purged after the sample finishes unless the run keeps backups. The zarr
/// stores sit at the sample root and always survive.
#[derive(Debug, Clone)]
pub struct SamplePaths {
    pub sample_dir: PathBuf,
}

impl SamplePaths {
    pub fn new(sample_dir: impl Into<PathBuf>) -> Self {
        Self {
            sample_dir: sample_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.sample_dir.join("backup")
    }

    /// Scratch directory for one fetcher's raw downloads.
    pub fn scratch_dir(&self, fetcher: &str) -> PathBuf {
        self.backup_dir().join(fetcher)
    }

    /// A netcdf intermediate under `backup/`.
    pub fn intermediate(&self, file: &str) -> PathBuf {
        self.backup_dir().join(file)
    }

    /// A zarr store at the sample root.
    pub fn store(&self, name: &str) -> PathBuf {
        self.sample_dir.join(name)
    }

    /// Creates the sample directory tree, wiping any previous attempt.
    pub fn reset(&self) -> std::io::Result<()> {
        if self.sample_dir.exists() {
            std::fs::remove_dir_all(&self.sample_dir)?;
        }
        for fetcher in ["goes", "hrrr", "rf-10", "elev"] {
            std::fs::create_dir_all(self.scratch_dir(fetcher))?;
        }
        Ok(())
    }

    /// Removes `backup/` with its scratch dirs and intermediates.
    pub fn purge_backup(&self) -> std::io::Result<()> {
        let backup = self.backup_dir();
        if backup.exists() {
            std::fs::remove_dir_all(&backup)?;
        }
        Ok(())
    }
}

/// Writes raw downloaded bytes into a scratch directory so `--backup` runs
/// can keep them for inspection. Failures are not fatal to the fetch.
pub(crate) fn stash_raw(dir: &Path, name: &str, data: &[u8]) {
    let path = dir.join(name);
    if let Err(e) = std::fs::write(&path, data) {
        tracing::debug!("could not stash {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_builds_scratch_tree_and_wipes_old_content() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SamplePaths::new(dir.path().join("20230601_1200"));

        paths.reset().unwrap();
        std::fs::write(paths.sample_dir.join("stale.txt"), b"x").unwrap();

        paths.reset().unwrap();
        assert!(!paths.sample_dir.join("stale.txt").exists());
        for fetcher in ["goes", "hrrr", "rf-10", "elev"] {
            assert!(paths.scratch_dir(fetcher).is_dir());
        }
    }

    #[test]
    fn purge_backup_keeps_the_sample_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SamplePaths::new(dir.path().join("20230601_1200"));
        paths.reset().unwrap();
        std::fs::write(paths.intermediate("hrrr.nc"), b"x").unwrap();

        paths.purge_backup().unwrap();
        assert!(!paths.backup_dir().exists());
        assert!(paths.sample_dir.is_dir());
    }
}
