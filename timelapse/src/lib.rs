//! Renders a time-lapse of vehicles moving along their routes. Positions are resampled to one per
//! trip per minute, every minute becomes a map frame, and the frames become an animated GIF.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod compositor;
mod config;
pub mod render;
mod view;

use std::path::Path;

use abstutil::Timer;
use anyhow::Result;
use geom::Pt2D;

use model::Model;

pub use self::compositor::compose;
pub use self::config::{Config, ExtentPreset, TileServer};
pub use self::render::{frame_key, frame_path, Basemap, FrameRenderer, RenderReport};
pub use self::view::{Extent, View};

/// Renders and composes every preset, or just one if `only` is set. A preset that fails doesn't
/// stop the others, but still makes the whole run fail.
pub fn run(
    model: &Model,
    config: &Config,
    only: Option<&str>,
    skip_render: bool,
    timer: &mut Timer,
) -> Result<()> {
    let presets = match only {
        Some(name) => vec![config.preset(name)?],
        None => config.extents.iter().collect(),
    };
    if model.positions.is_empty() {
        bail!("No vehicle positions survived loading, so there's nothing to animate");
    }

    let mut basemap = match config.basemap {
        Some(ref server) if !skip_render => Some(Basemap::from_server(server)?),
        _ => None,
    };

    let mut failures = Vec::new();
    for preset in presets {
        timer.start(format!("time-lapse for {}", preset.name));
        let result = run_preset(model, config, preset, skip_render, basemap.as_mut(), timer);
        timer.stop(format!("time-lapse for {}", preset.name));
        if let Err(err) = result {
            error!("Time-lapse for {} failed: {err:#}", preset.name);
            failures.push(preset.name.clone());
        }
    }
    if !failures.is_empty() {
        bail!("Time-lapses failed for {}", failures.join(", "));
    }
    Ok(())
}

fn run_preset(
    model: &Model,
    config: &Config,
    preset: &ExtentPreset,
    skip_render: bool,
    basemap: Option<&mut Basemap>,
    timer: &mut Timer,
) -> Result<()> {
    dump_extent(preset)?;
    let frame_dir = Path::new(&preset.frame_dir);
    if !skip_render {
        let view = View::new(preset.extent, config.frame_size)?;
        let renderer = FrameRenderer::new(&model.routes, &model.positions, view);
        let report = renderer.render_all(frame_dir, basemap, timer)?;
        if !report.failed.is_empty() {
            let times: Vec<String> = report
                .failed
                .iter()
                .map(|(time, _)| time.format("%H:%M").to_string())
                .collect();
            bail!(
                "{} frames couldn't be rendered: {}",
                times.len(),
                times.join(", ")
            );
        }
    }
    compose(
        frame_dir,
        &model.timestamps(),
        Path::new(&preset.animation),
        config.frames_per_second,
    )
}

fn dump_extent(preset: &ExtentPreset) -> Result<()> {
    use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};

    let e = &preset.extent;
    let ring: Vec<Vec<f64>> = [
        (e.x_min, e.y_min),
        (e.x_max, e.y_min),
        (e.x_max, e.y_max),
        (e.x_min, e.y_max),
        (e.x_min, e.y_min),
    ]
    .into_iter()
    .map(|(x, y)| {
        let (lon, lat) = gtfs::mercator::unproject(Pt2D::new(x, y))?;
        Ok(vec![lon, lat])
    })
    .collect::<Result<_>>()?;
    let feature = Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
        id: None,
        properties: None,
        foreign_members: None,
    };
    let gj = GeoJson::FeatureCollection(FeatureCollection {
        features: vec![feature],
        bbox: None,
        foreign_members: None,
    });
    info!("GeoJSON covering the {} extent: {}", preset.name, gj);
    Ok(())
}
