use std::collections::{BTreeMap, HashSet};
use std::fmt;

use abstutil::prettyprint_usize;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use geom::Pt2D;
use serde::{Deserialize, Serialize};

use gtfs::mercator;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripID(String);

impl TripID {
    pub fn new<I: Into<String>>(id: I) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TripID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One raw ping from a vehicle, as it appears in the source data.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionRecord {
    pub trip_id: TripID,
    pub time: DateTime<Utc>,
    pub lon: f64,
    pub lat: f64,
}

/// The first position of a trip observed within one minute, in planar meters.
#[derive(Clone, Debug, PartialEq)]
pub struct SampledPosition {
    pub trip_id: TripID,
    /// Start of the minute, expressed in the display offset
    pub time: DateTime<FixedOffset>,
    pub pos: Pt2D,
}

/// A fixed number of hours away from UTC. There's no daylight saving logic; pick the offset in
/// effect for the data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct DisplayOffset(i32);

impl DisplayOffset {
    pub const UTC: DisplayOffset = DisplayOffset(0);

    pub fn hours(hours: i32) -> Result<Self> {
        if !(-23..=23).contains(&hours) {
            bail!("A UTC offset of {hours} hours doesn't exist");
        }
        Ok(Self(hours))
    }

    /// For offsets known ahead of time. Out-of-range values fail to compile when this is used for
    /// a constant.
    pub const fn const_hours(hours: i32) -> Self {
        assert!(hours >= -23 && hours <= 23);
        Self(hours)
    }

    pub fn to_fixed(self) -> FixedOffset {
        FixedOffset::east_opt(self.0 * 3600)
            .expect("DisplayOffset is validated on construction")
    }
}

impl TryFrom<i32> for DisplayOffset {
    type Error = anyhow::Error;

    fn try_from(hours: i32) -> Result<Self> {
        Self::hours(hours)
    }
}

impl From<DisplayOffset> for i32 {
    fn from(offset: DisplayOffset) -> i32 {
        offset.0
    }
}

/// Reads raw positions. Rows that don't parse, including ones with a bad `update_time`, are
/// skipped with a warning rather than failing everything.
pub fn load<R: std::io::Read>(reader: R) -> Result<Vec<PositionRecord>> {
    let mut records = Vec::new();
    let mut skipped = 0;
    for (idx, rec) in csv::Reader::from_reader(reader).deserialize().enumerate() {
        let rec: Record = match rec {
            Ok(rec) => rec,
            Err(err) => {
                if err.is_io_error() {
                    return Err(err.into());
                }
                warn!("Skipping position on row {}: {err}", idx + 1);
                skipped += 1;
                continue;
            }
        };
        match parse_unix_time(&rec.update_time) {
            Ok(time) => records.push(PositionRecord {
                trip_id: rec.trip_id,
                time,
                lon: rec.longitude,
                lat: rec.latitude,
            }),
            Err(err) => {
                warn!("Skipping position on row {}: {err}", idx + 1);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!(
            "Skipped {} malformed positions, kept {}",
            prettyprint_usize(skipped),
            prettyprint_usize(records.len())
        );
    }
    Ok(records)
}

/// Unix seconds, either whole or fractional
pub fn parse_unix_time(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    let (secs, nanos) = if let Ok(secs) = raw.parse::<i64>() {
        (secs, 0)
    } else {
        let x: f64 = raw
            .parse()
            .map_err(|_| anyhow!("update_time {raw:?} isn't a Unix timestamp"))?;
        if !x.is_finite() {
            bail!("update_time {raw:?} isn't a Unix timestamp");
        }
        let secs = x.floor();
        let nanos = (((x - secs) * 1e9).round() as u32).min(999_999_999);
        (secs as i64, nanos)
    };
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| anyhow!("update_time {raw} is out of range"))
}

/// The start of the minute containing this time. Buckets line up with the epoch, not with the
/// start of any trip.
pub fn minute_bucket(time: DateTime<Utc>) -> DateTime<Utc> {
    let secs = time.timestamp().div_euclid(60) * 60;
    // Rounding down a valid time can't leave chrono's range in practice
    DateTime::from_timestamp(secs, 0).unwrap_or(time)
}

/// Turns irregular pings into at most one position per trip per minute, sorted by time.
///
/// Minutes where a trip wasn't observed produce nothing for that trip; positions aren't carried
/// forward or interpolated.
pub fn normalize(records: Vec<PositionRecord>, offset: DisplayOffset) -> Vec<SampledPosition> {
    let tz = offset.to_fixed();

    let mut seen = HashSet::new();
    let mut duplicates = 0;
    let mut per_trip: BTreeMap<TripID, Vec<(DateTime<Utc>, Pt2D)>> = BTreeMap::new();
    for rec in records {
        if !seen.insert((
            rec.trip_id.clone(),
            rec.time,
            rec.lon.to_bits(),
            rec.lat.to_bits(),
        )) {
            duplicates += 1;
            continue;
        }
        match mercator::project(rec.lon, rec.lat) {
            Ok(pos) => per_trip
                .entry(rec.trip_id)
                .or_insert_with(Vec::new)
                .push((rec.time, pos)),
            Err(err) => warn!(
                "Dropping position for trip {} at {}: {err}",
                rec.trip_id, rec.time
            ),
        }
    }
    if duplicates > 0 {
        info!("Ignored {} duplicate positions", prettyprint_usize(duplicates));
    }

    let mut results = Vec::new();
    for (trip_id, pts) in per_trip {
        results.extend(resample_trip(trip_id, pts, &tz));
    }
    // Stable, so within one minute, trips stay in ID order
    results.sort_by_key(|s| s.time);
    results
}

fn resample_trip(
    trip_id: TripID,
    mut pts: Vec<(DateTime<Utc>, Pt2D)>,
    tz: &FixedOffset,
) -> Vec<SampledPosition> {
    // Stable, so equal times keep input order and the first one wins
    pts.sort_by_key(|(time, _)| *time);

    let mut results: Vec<SampledPosition> = Vec::new();
    let mut last_bucket = None;
    for (time, pos) in pts {
        let bucket = minute_bucket(time);
        if last_bucket == Some(bucket) {
            continue;
        }
        last_bucket = Some(bucket);
        results.push(SampledPosition {
            trip_id: trip_id.clone(),
            time: bucket.with_timezone(tz),
            pos,
        });
    }
    results
}

#[derive(Deserialize)]
struct Record {
    trip_id: TripID,
    // Parsed by hand, so a bad timestamp can be reported separately
    update_time: String,
    longitude: f64,
    latitude: f64,
}
