//! Remote archive access (NOAA open-data S3 buckets).

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore};
use tracing::debug;

use storm_common::{StormError, StormResult};

/// MRMS mosaic archive.
pub const RADAR_BUCKET: &str = "noaa-mrms-pds";
/// HRRR model output archive.
pub const MODEL_BUCKET: &str = "noaa-hrrr-bdp-pds";
/// GOES-16 imagery archive.
pub const SATELLITE_BUCKET: &str = "noaa-goes16";

/// All NOAA open-data buckets serve from us-east-1.
const AWS_REGION: &str = "us-east-1";

/// Read access to one remote archive.
///
/// Fetchers and probes speak this trait so tests can stand in a local fake;
/// production uses [`S3Archive`].
#[async_trait]
pub trait RemoteArchive: Send + Sync {
    /// Lists object keys under a prefix.
    async fn list(&self, prefix: &str) -> StormResult<Vec<String>>;

    /// Downloads an entire object.
    async fn get(&self, key: &str) -> StormResult<Bytes>;

    /// Downloads a byte range of an object.
    async fn get_range(&self, key: &str, range: Range<usize>) -> StormResult<Bytes>;

    /// Size of an object in bytes.
    async fn size(&self, key: &str) -> StormResult<usize>;
}

/// Anonymous client for one public S3 bucket.
pub struct S3Archive {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl S3Archive {
    /// Opens a public bucket with unsigned requests.
    pub fn open(bucket: &str) -> StormResult<Self> {
        let store = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(AWS_REGION)
            .with_skip_signature(true)
            .build()?;

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl RemoteArchive for S3Archive {
    async fn list(&self, prefix: &str) -> StormResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(prefix);
        let mut keys = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream.try_next().await.map_err(StormError::Storage)? {
            keys.push(meta.location.to_string());
        }

        debug!(bucket = %self.bucket, prefix = %prefix, count = keys.len(), "Listed archive prefix");
        Ok(keys)
    }

    async fn get(&self, key: &str) -> StormResult<Bytes> {
        let location = Path::from(key);

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StormError::NotFound(format!("{}/{}", self.bucket, key)))
            }
            Err(e) => return Err(e.into()),
        };

        result.bytes().await.map_err(StormError::Storage)
    }

    async fn get_range(&self, key: &str, range: Range<usize>) -> StormResult<Bytes> {
        let location = Path::from(key);

        self.store
            .get_range(&location, range)
            .await
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => {
                    StormError::NotFound(format!("{}/{}", self.bucket, key))
                }
                e => e.into(),
            })
    }

    async fn size(&self, key: &str) -> StormResult<usize> {
        let location = Path::from(key);

        let meta = self.store.head(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                StormError::NotFound(format!("{}/{}", self.bucket, key))
            }
            e => e.into(),
        })?;
        Ok(meta.size)
    }
}

/// The three remote archives a run talks to, built once and shared.
#[derive(Clone)]
pub struct Archives {
    pub radar: Arc<dyn RemoteArchive>,
    pub model: Arc<dyn RemoteArchive>,
    pub satellite: Arc<dyn RemoteArchive>,
}

impl Archives {
    /// Clients for the production NOAA buckets.
    pub fn open_noaa() -> StormResult<Self> {
        Ok(Self {
            radar: Arc::new(S3Archive::open(RADAR_BUCKET)?),
            model: Arc::new(S3Archive::open(MODEL_BUCKET)?),
            satellite: Arc::new(S3Archive::open(SATELLITE_BUCKET)?),
        })
    }
}

/// Key builders for the archive layouts.
pub struct ArchiveKeys;

impl ArchiveKeys {
    /// MRMS day prefix.
    /// Format: CONUS/{product}/{YYYYMMDD}
    pub fn mrms_day(product: &str, day: NaiveDate) -> String {
        format!("CONUS/{}/{}", product, day.format("%Y%m%d"))
    }

    /// HRRR day prefix (analysis files for every cycle of the day).
    pub fn hrrr_day(day: NaiveDate) -> String {
        format!("hrrr.{}/conus", day.format("%Y%m%d"))
    }

    /// HRRR analysis file for one cycle.
    /// Format: hrrr.{YYYYMMDD}/conus/hrrr.t{HH}z.wrfsfcf00.grib2
    pub fn hrrr_analysis(cycle: DateTime<Utc>) -> String {
        format!(
            "hrrr.{}/conus/hrrr.t{:02}z.wrfsfcf00.grib2",
            cycle.format("%Y%m%d"),
            cycle.hour()
        )
    }

    /// Sidecar index for an analysis file.
    pub fn hrrr_index(cycle: DateTime<Utc>) -> String {
        format!("{}.idx", Self::hrrr_analysis(cycle))
    }

    /// GOES hour prefix.
    /// Format: {product}/{year}/{doy:03}/{HH:02}
    pub fn goes_hour(product: &str, time: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{:03}/{:02}",
            product,
            time.year(),
            time.ordinal(),
            time.hour()
        )
    }
}

/// True when an MRMS file name carries the given day and wall-clock minute
/// (names embed `_{YYYYMMDD}-{HHMMSS}`).
pub fn mrms_name_matches(name: &str, time: DateTime<Utc>) -> bool {
    name.contains(&format!(
        "{}-{:02}{:02}",
        time.format("%Y%m%d"),
        time.hour(),
        time.minute()
    ))
}

/// True when a GOES file name's scan-start stamp (`_G16_s{YYYY}{DOY}{HH}{MM}...`)
/// lands on the given hour and minute.
pub fn goes_name_matches(name: &str, time: DateTime<Utc>) -> bool {
    let Some(pos) = name.find("_G16_s") else {
        return false;
    };
    let stamp = &name[pos + "_G16_s".len()..];
    match stamp.get(7..11) {
        Some(hhmm) => hhmm == format!("{:02}{:02}", time.hour(), time.minute()),
        None => false,
    }
}
