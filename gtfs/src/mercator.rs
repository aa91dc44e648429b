//! Spherical Mercator (EPSG:3857). Everything drawn is expressed in these meters, so positions and
//! shapes must go through the same transform.

use std::f64::consts::PI;

use anyhow::Result;
use geom::Pt2D;
use proj4rs::Proj;

/// Radius of the sphere used by web maps, in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// Beyond this latitude the projection runs off to infinity. Web maps clip here, making the world
/// square.
pub const MAX_LATITUDE: f64 = 85.051_128_78;
/// Half the width of the projected world, in meters.
pub const HALF_WORLD: f64 = PI * EARTH_RADIUS;

// Both sides use the web map sphere, so there's no datum shift.
const WGS84: &str = "+proj=longlat +a=6378137 +b=6378137 +no_defs";
const WEB_MERCATOR: &str = "+proj=merc +a=6378137 +b=6378137 +units=m +no_defs";

thread_local! {
    static PROJECTIONS: (Proj, Proj) = (
        Proj::from_proj_string(WGS84).expect("WGS84 definition is valid"),
        Proj::from_proj_string(WEB_MERCATOR).expect("Web Mercator definition is valid"),
    );
}

/// Projects WGS84 degrees into meters.
pub fn project(lon: f64, lat: f64) -> Result<Pt2D> {
    if !(-180.0..=180.0).contains(&lon) || !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat) {
        bail!("{lon}, {lat} can't be projected");
    }
    let mut pt = (lon.to_radians(), lat.to_radians(), 0.0);
    PROJECTIONS
        .with(|(wgs84, merc)| proj4rs::transform::transform(wgs84, merc, &mut pt))
        .map_err(|err| anyhow!("projecting {lon}, {lat}: {err:?}"))?;
    Ok(Pt2D::new(pt.0, pt.1))
}

/// Returns (longitude, latitude) in degrees.
pub fn unproject(pt: Pt2D) -> Result<(f64, f64)> {
    let mut xy = (pt.x(), pt.y(), 0.0);
    PROJECTIONS
        .with(|(wgs84, merc)| proj4rs::transform::transform(merc, wgs84, &mut xy))
        .map_err(|err| anyhow!("unprojecting {}, {}: {err:?}", pt.x(), pt.y()))?;
    Ok((xy.0.to_degrees(), xy.1.to_degrees()))
}
