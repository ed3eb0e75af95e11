//! Source fetchers.
//!
//! One fetcher per upstream source. Each runs as its own stage: it pulls
//! raw files for one sample window, decodes them, resamples onto the
//! sample grid, aligns the result on its time axis, and drops a netcdf
//! intermediate under `backup/`. The radar fetcher additionally writes the
//! label store directly, since nothing downstream merges it.

mod model;
mod radar;
mod satellite;
mod terrain;

pub use model::ModelFetcher;
pub use radar::RadarFetcher;
pub use satellite::SatelliteFetcher;
pub use terrain::TerrainFetcher;

use async_trait::async_trait;

use storm_common::{GridSpec, SampleWindow, StormResult};

use crate::SamplePaths;

/// Stage name of the radar fetcher; it is collected after the merge while
/// the other three feed into it.
pub const RADAR_STAGE: &str = "rf-10";
/// Stage name of the model fetcher.
pub const MODEL_STAGE: &str = "hrrr";
/// Stage name of the satellite fetcher.
pub const SATELLITE_STAGE: &str = "goes";
/// Stage name of the terrain fetcher.
pub const TERRAIN_STAGE: &str = "elev";

/// One upstream source of a training sample.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Stage name, also the scratch directory under `backup/`.
    fn name(&self) -> &'static str;

    /// Fetches, decodes, and aligns this source for one sample.
    async fn run(
        &self,
        window: SampleWindow,
        grid: GridSpec,
        paths: SamplePaths,
    ) -> StormResult<()>;
}
