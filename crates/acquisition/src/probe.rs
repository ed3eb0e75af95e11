//! Cheap archive probes run before a candidate is accepted.
//!
//! The availability probe checks that day prefixes exist at all in the
//! three archives; the viability probe downloads one composite reflectivity
//! mosaic and demands real convection inside the candidate grid. Both are
//! deliberately forgiving about transport errors: a probe that cannot reach
//! the archive treats the candidate as unusable and moves on rather than
//! failing the run.

use std::sync::Arc;

use chrono::{Duration, NaiveTime, TimeZone, Timelike, Utc};
use tracing::debug;

use storm_common::{GridSpec, SampleWindow};

use crate::archive::{mrms_name_matches, Archives, ArchiveKeys, RemoteArchive};
use crate::grib2;
use crate::resample::Resampler;

/// MRMS product the radar fetcher and target labels draw from.
pub const RADAR_PRODUCT: &str = "Reflectivity_-10C_00.50";
/// MRMS product the viability probe samples.
pub const CREF_PRODUCT: &str = "CREF_1HR_MAX_00.50";
/// GOES product the availability probe lists (sparse prefix, cheap to list).
pub const GOES_PROBE_PRODUCT: &str = "ABI-L1b-RadC";
/// GOES product the satellite fetcher downloads.
pub const GOES_FETCH_PRODUCT: &str = "ABI-L2-MCMIPC";

/// Reflectivity a cell must reach to count as convective.
pub const VIABLE_DBZ: f32 = 40.0;
/// Cells at or above [`VIABLE_DBZ`] a candidate grid must hold.
pub const VIABLE_CELLS: usize = 40;

/// Outcome of the availability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    /// Day prefixes that came back empty or unreachable.
    pub missing: usize,
    /// Whether the probed window straddled a UTC midnight, doubling the
    /// listings checked.
    pub straddled: bool,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        self.missing == 0
    }

    /// Warning line recorded when a candidate's archive data is absent.
    /// Straddled probes count each listing as half a piece.
    pub fn warning_line(&self, dir_name: &str) -> String {
        if self.straddled {
            format!(
                "{} doesn't exist on AWS ({:.1} pieces missing)",
                dir_name,
                self.missing as f64 / 2.0
            )
        } else {
            format!("{} doesn't exist on AWS ({} pieces missing)", dir_name, self.missing)
        }
    }
}

async fn listing_missing(archive: &Arc<dyn RemoteArchive>, prefix: &str) -> bool {
    match archive.list(prefix).await {
        Ok(keys) => keys.is_empty(),
        Err(e) => {
            debug!(prefix = prefix, error = %e, "Availability listing failed");
            true
        }
    }
}

/// Checks that the archives hold anything at all for the sample's span.
///
/// The probe is anchored 55 minutes before the sample anchor, the midpoint
/// of the data the fetchers will ask for, and looks one hour to either
/// side. When both ends share a UTC day, one listing per archive suffices;
/// when they straddle midnight, both days are listed and each listing
/// counts as half a piece.
pub async fn check_availability(archives: &Archives, window: &SampleWindow) -> Availability {
    let mid = window.anchor - Duration::minutes(55);
    let early = mid - Duration::hours(1);
    let late = mid + Duration::hours(1);

    let early_day = early.date_naive();
    let late_day = late.date_naive();
    let straddled = early_day != late_day;

    let mut missing = 0usize;
    for day in [early_day, late_day] {
        // The GOES check lists the hour of the day the span actually
        // touches: the final hour of the earlier day on a straddle, the
        // first hour otherwise.
        let mut goes_time = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        if straddled && day == early_day {
            goes_time += Duration::hours(23);
        }

        if listing_missing(&archives.radar, &ArchiveKeys::mrms_day(RADAR_PRODUCT, day)).await {
            missing += 1;
        }
        if listing_missing(&archives.model, &ArchiveKeys::hrrr_day(day)).await {
            missing += 1;
        }
        if listing_missing(
            &archives.satellite,
            &ArchiveKeys::goes_hour(GOES_PROBE_PRODUCT, goes_time),
        )
        .await
        {
            missing += 1;
        }

        if !straddled {
            break;
        }
    }

    Availability { missing, straddled }
}

/// Checks that the candidate grid saw convection in the hour after the
/// anchor.
///
/// Samples the hourly composite-reflectivity-maximum mosaic at the top of
/// the hour after the label window opens (pushed one hour further when the
/// anchor minute is 30 or later, so the mosaic's lookback covers the
/// window). Any failure along the way makes the candidate not viable.
pub async fn check_viability(
    radar: &Arc<dyn RemoteArchive>,
    window: &SampleWindow,
    grid: &GridSpec,
    resampler: &Resampler,
) -> bool {
    let mut probe_time = window.anchor + Duration::hours(1);
    if window.anchor.minute() >= 30 {
        probe_time += Duration::hours(1);
    }
    probe_time -= Duration::minutes(i64::from(probe_time.minute()));

    let prefix = ArchiveKeys::mrms_day(CREF_PRODUCT, probe_time.date_naive());
    let listing = match radar.list(&prefix).await {
        Ok(keys) => keys,
        Err(e) => {
            debug!(prefix = %prefix, error = %e, "Viability listing failed");
            return false;
        }
    };
    let Some(key) = listing.iter().find(|name| mrms_name_matches(name, probe_time)) else {
        debug!(prefix = %prefix, "No composite mosaic at the probe minute");
        return false;
    };

    let raw = match radar.get(key).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(key = %key, error = %e, "Viability download failed");
            return false;
        }
    };
    let (values, source) = match grib2::decode_mrms(&raw) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(key = %key, error = %e, "Viability decode failed");
            return false;
        }
    };
    let plane = match resampler.plane(&source, &values, grid) {
        Ok(plane) => plane,
        Err(e) => {
            debug!(error = %e, "Viability resample failed");
            return false;
        }
    };

    let active = plane.iter().filter(|v| **v >= VIABLE_DBZ).count();
    debug!(active = active, "Viability probe sampled the grid");
    active >= VIABLE_CELLS
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::ops::Range;
    use storm_common::{StormError, StormResult};

    /// In-memory archive keyed by prefix.
    struct FakeArchive {
        listings: HashMap<String, Vec<String>>,
        objects: HashMap<String, Bytes>,
        fail_lists: bool,
    }

    impl FakeArchive {
        fn empty() -> Arc<dyn RemoteArchive> {
            Arc::new(Self {
                listings: HashMap::new(),
                objects: HashMap::new(),
                fail_lists: false,
            })
        }

        fn with_listings(listings: &[(&str, &[&str])]) -> Arc<dyn RemoteArchive> {
            Arc::new(Self {
                listings: listings
                    .iter()
                    .map(|(p, keys)| {
                        (p.to_string(), keys.iter().map(|k| k.to_string()).collect())
                    })
                    .collect(),
                objects: HashMap::new(),
                fail_lists: false,
            })
        }

        fn failing() -> Arc<dyn RemoteArchive> {
            Arc::new(Self {
                listings: HashMap::new(),
                objects: HashMap::new(),
                fail_lists: true,
            })
        }
    }

    #[async_trait]
    impl RemoteArchive for FakeArchive {
        async fn list(&self, prefix: &str) -> StormResult<Vec<String>> {
            if self.fail_lists {
                return Err(StormError::Storage(object_store::Error::Generic {
                    store: "fake",
                    source: "listing refused".into(),
                }));
            }
            Ok(self.listings.get(prefix).cloned().unwrap_or_default())
        }

        async fn get(&self, key: &str) -> StormResult<Bytes> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| StormError::NotFound(key.to_string()))
        }

        async fn get_range(&self, key: &str, range: Range<usize>) -> StormResult<Bytes> {
            let data = self.get(key).await?;
            Ok(data.slice(range))
        }

        async fn size(&self, key: &str) -> StormResult<usize> {
            Ok(self.get(key).await?.len())
        }
    }

    fn window_at(h: u32, m: u32) -> SampleWindow {
        SampleWindow::new(Utc.with_ymd_and_hms(2023, 6, 1, h, m, 0).unwrap())
    }

    #[tokio::test]
    async fn empty_archives_report_three_pieces_missing() {
        let archives = Archives {
            radar: FakeArchive::empty(),
            model: FakeArchive::empty(),
            satellite: FakeArchive::empty(),
        };
        let avail = check_availability(&archives, &window_at(12, 0)).await;
        assert!(!avail.is_available());
        assert_eq!(avail.missing, 3);
        assert!(!avail.straddled);
        assert_eq!(
            avail.warning_line("20230601_1200"),
            "20230601_1200 doesn't exist on AWS (3 pieces missing)"
        );
    }

    #[tokio::test]
    async fn present_prefixes_are_available() {
        let archives = Archives {
            radar: FakeArchive::with_listings(&[(
                "CONUS/Reflectivity_-10C_00.50/20230601",
                &["CONUS/Reflectivity_-10C_00.50/20230601/a.grib2.gz"],
            )]),
            model: FakeArchive::with_listings(&[(
                "hrrr.20230601/conus",
                &["hrrr.20230601/conus/hrrr.t10z.wrfsfcf00.grib2"],
            )]),
            satellite: FakeArchive::with_listings(&[(
                "ABI-L1b-RadC/2023/152/00",
                &["ABI-L1b-RadC/2023/152/00/a.nc"],
            )]),
        };
        let avail = check_availability(&archives, &window_at(12, 0)).await;
        assert!(avail.is_available());
    }

    #[tokio::test]
    async fn midnight_straddle_probes_both_days_and_halves_pieces() {
        // Anchor 00:30 puts the probe midpoint at 23:35 the previous day;
        // one hour either side spans two UTC days.
        let archives = Archives {
            radar: FakeArchive::empty(),
            model: FakeArchive::empty(),
            satellite: FakeArchive::empty(),
        };
        let avail = check_availability(&archives, &window_at(0, 30)).await;
        assert!(avail.straddled);
        assert_eq!(avail.missing, 6);
        assert_eq!(
            avail.warning_line("20230601_0030"),
            "20230601_0030 doesn't exist on AWS (3.0 pieces missing)"
        );
    }

    #[tokio::test]
    async fn straddle_with_one_day_present_is_fractional() {
        let day2 = [
            ("CONUS/CREF_1HR_MAX_00.50/20230601", &[][..]),
            (
                "CONUS/Reflectivity_-10C_00.50/20230601",
                &["CONUS/Reflectivity_-10C_00.50/20230601/a"][..],
            ),
        ];
        let radar = FakeArchive::with_listings(&day2);
        let model = FakeArchive::with_listings(&[(
            "hrrr.20230601/conus",
            &["hrrr.20230601/conus/f"][..],
        )]);
        let satellite = FakeArchive::with_listings(&[(
            "ABI-L1b-RadC/2023/152/00",
            &["ABI-L1b-RadC/2023/152/00/a.nc"][..],
        )]);
        let archives = Archives {
            radar,
            model,
            satellite,
        };
        let avail = check_availability(&archives, &window_at(0, 30)).await;
        // Day one (May 31) contributes three missing listings.
        assert_eq!(avail.missing, 3);
        assert_eq!(
            avail.warning_line("20230601_0030"),
            "20230601_0030 doesn't exist on AWS (1.5 pieces missing)"
        );
    }

    #[tokio::test]
    async fn straddle_probes_the_earlier_days_final_goes_hour() {
        // May 31 is day-of-year 151. Hour 00 of both days present but hour
        // 23 of May 31 absent is exactly the gap the satellite fetcher
        // would walk into, so that listing is the one that must be probed.
        let radar = FakeArchive::with_listings(&[
            (
                "CONUS/Reflectivity_-10C_00.50/20230531",
                &["CONUS/Reflectivity_-10C_00.50/20230531/a.grib2.gz"][..],
            ),
            (
                "CONUS/Reflectivity_-10C_00.50/20230601",
                &["CONUS/Reflectivity_-10C_00.50/20230601/a.grib2.gz"][..],
            ),
        ]);
        let model = FakeArchive::with_listings(&[
            ("hrrr.20230531/conus", &["hrrr.20230531/conus/f"][..]),
            ("hrrr.20230601/conus", &["hrrr.20230601/conus/f"][..]),
        ]);
        let satellite = FakeArchive::with_listings(&[
            (
                "ABI-L1b-RadC/2023/151/00",
                &["ABI-L1b-RadC/2023/151/00/a.nc"][..],
            ),
            (
                "ABI-L1b-RadC/2023/152/00",
                &["ABI-L1b-RadC/2023/152/00/a.nc"][..],
            ),
        ]);
        let archives = Archives {
            radar,
            model,
            satellite,
        };
        let avail = check_availability(&archives, &window_at(0, 30)).await;
        assert!(avail.straddled);
        assert_eq!(avail.missing, 1);

        // With hour 23 of the earlier day listed, the probe is satisfied.
        let archives = Archives {
            satellite: FakeArchive::with_listings(&[
                (
                    "ABI-L1b-RadC/2023/151/23",
                    &["ABI-L1b-RadC/2023/151/23/a.nc"][..],
                ),
                (
                    "ABI-L1b-RadC/2023/152/00",
                    &["ABI-L1b-RadC/2023/152/00/a.nc"][..],
                ),
            ]),
            ..archives
        };
        let avail = check_availability(&archives, &window_at(0, 30)).await;
        assert!(avail.is_available());
    }

    #[tokio::test]
    async fn listing_errors_count_as_missing() {
        let archives = Archives {
            radar: FakeArchive::failing(),
            model: FakeArchive::failing(),
            satellite: FakeArchive::failing(),
        };
        let avail = check_availability(&archives, &window_at(12, 0)).await;
        assert_eq!(avail.missing, 3);
    }

    #[tokio::test]
    async fn viability_is_false_when_no_mosaic_matches() {
        let radar = FakeArchive::with_listings(&[(
            "CONUS/CREF_1HR_MAX_00.50/20230601",
            &["CONUS/CREF_1HR_MAX_00.50/20230601/MRMS_CREF_1HR_MAX_00.50_20230601-170039.grib2.gz"][..],
        )]);
        let window = window_at(12, 0);
        let grid = GridSpec::sample_default(-100.0, 35.0);
        // Probe minute is 13:00; only a 17:00 mosaic is listed.
        assert!(!check_viability(&radar, &window, &grid, &Resampler::new(false)).await);
    }

    #[tokio::test]
    async fn viability_is_false_on_listing_errors() {
        let radar = FakeArchive::failing();
        let window = window_at(12, 0);
        let grid = GridSpec::sample_default(-100.0, 35.0);
        assert!(!check_viability(&radar, &window, &grid, &Resampler::new(false)).await);
    }

    #[tokio::test]
    async fn viability_is_false_when_the_mosaic_does_not_decode() {
        let mut objects = HashMap::new();
        let key =
            "CONUS/CREF_1HR_MAX_00.50/20230601/MRMS_CREF_1HR_MAX_00.50_20230601-130039.grib2.gz";
        objects.insert(key.to_string(), Bytes::from_static(b"not a grib file"));
        let radar: Arc<dyn RemoteArchive> = Arc::new(FakeArchive {
            listings: [(
                "CONUS/CREF_1HR_MAX_00.50/20230601".to_string(),
                vec![key.to_string()],
            )]
            .into_iter()
            .collect(),
            objects,
            fail_lists: false,
        });
        let window = window_at(12, 0);
        let grid = GridSpec::sample_default(-100.0, 35.0);
        assert!(!check_viability(&radar, &window, &grid, &Resampler::new(false)).await);
    }

    #[test]
    fn late_anchor_minutes_push_the_probe_an_extra_hour() {
        // Mirrors the probe-time arithmetic in check_viability.
        for (minute, want_hour) in [(0u32, 13u32), (25, 13), (30, 14), (55, 14)] {
            let w = window_at(12, minute);
            let mut t = w.anchor + Duration::hours(1);
            if w.anchor.minute() >= 30 {
                t += Duration::hours(1);
            }
            t -= Duration::minutes(i64::from(t.minute()));
            assert_eq!(t.format("%H%M").to_string(), format!("{:02}00", want_hour));
        }
    }
}
