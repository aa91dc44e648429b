#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

pub mod avl;

use std::collections::BTreeSet;

use abstutil::{prettyprint_usize, Timer};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};

use gtfs::RouteNetwork;

pub use self::avl::{DisplayOffset, PositionRecord, SampledPosition, TripID};

/// Everything needed to draw a time-lapse: per-minute vehicle positions and the route network
/// they move along.
pub struct Model {
    /// Sorted by time
    pub positions: Vec<SampledPosition>,
    pub routes: RouteNetwork,
}

impl Model {
    pub fn import(
        positions_path: &str,
        shapes_path: &str,
        offset: DisplayOffset,
        timer: &mut Timer,
    ) -> Result<Self> {
        timer.start("load positions");
        let records = avl::load(fs_err::File::open(positions_path)?)
            .with_context(|| format!("loading positions from {positions_path}"))?;
        timer.stop("load positions");

        timer.start("resample positions");
        let raw = records.len();
        let positions = avl::normalize(records, offset);
        info!(
            "Resampled {} raw positions into {}",
            prettyprint_usize(raw),
            prettyprint_usize(positions.len())
        );
        timer.stop("resample positions");

        timer.start("build route shapes");
        let routes = gtfs::load_shapes(shapes_path)?;
        timer.stop("build route shapes");

        Ok(Self { positions, routes })
    }

    pub fn timestamps(&self) -> Vec<DateTime<FixedOffset>> {
        timestamps(&self.positions)
    }
}

/// The distinct sample times, ascending. Each one becomes a frame.
pub fn timestamps(positions: &[SampledPosition]) -> Vec<DateTime<FixedOffset>> {
    positions
        .iter()
        .map(|s| s.time)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
