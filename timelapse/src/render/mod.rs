mod basemap;
mod label;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use abstutil::{prettyprint_usize, Timer};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use image::imageops;
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use gtfs::RouteNetwork;
use model::{SampledPosition, TripID};

use crate::View;

pub use self::basemap::{
    pick_zoom, Basemap, Downloader, HttpTileSource, TileID, TileSource, TILE_SIZE,
};
pub use self::label::draw_clock;

const BACKGROUND: Rgba<u8> = Rgba([242, 240, 235, 255]);
const ROUTE_COLOR: Rgba<u8> = Rgba([30, 60, 140, 90]);
const MARKER_ALPHA: u8 = 230;

/// Frames are named by their clock time, like `1423`.
pub fn frame_key(time: &DateTime<FixedOffset>) -> String {
    time.format("%H%M").to_string()
}

pub fn frame_path(dir: &Path, time: &DateTime<FixedOffset>) -> PathBuf {
    dir.join(format!("{}.png", frame_key(time)))
}

/// What happened while rendering all frames
#[derive(Debug, Default)]
pub struct RenderReport {
    pub written: Vec<(DateTime<FixedOffset>, PathBuf)>,
    pub failed: Vec<(DateTime<FixedOffset>, String)>,
}

/// Draws one frame per distinct sample time. The route layer doesn't change, so it's drawn once
/// up-front; frames don't otherwise depend on each other.
pub struct FrameRenderer<'a> {
    view: View,
    routes_layer: RgbaImage,
    // Not assuming the positions are sorted
    snapshots: BTreeMap<DateTime<FixedOffset>, Vec<&'a SampledPosition>>,
    trip_colors: BTreeMap<&'a TripID, Rgba<u8>>,
}

impl<'a> FrameRenderer<'a> {
    pub fn new(routes: &RouteNetwork, positions: &'a [SampledPosition], view: View) -> Self {
        let mut snapshots: BTreeMap<DateTime<FixedOffset>, Vec<&'a SampledPosition>> =
            BTreeMap::new();
        let mut trips = BTreeSet::new();
        for pos in positions {
            snapshots.entry(pos.time).or_insert_with(Vec::new).push(pos);
            trips.insert(&pos.trip_id);
        }
        // Each trip keeps its color for the whole animation
        let trip_colors = trips
            .into_iter()
            .enumerate()
            .map(|(idx, trip)| {
                let c = colorous::TABLEAU10[idx % colorous::TABLEAU10.len()];
                (trip, Rgba([c.r, c.g, c.b, MARKER_ALPHA]))
            })
            .collect();

        let routes_layer = draw_routes(routes, &view);
        Self {
            view,
            routes_layer,
            snapshots,
            trip_colors,
        }
    }

    pub fn timestamps(&self) -> Vec<DateTime<FixedOffset>> {
        self.snapshots.keys().cloned().collect()
    }

    /// Produces the frame for one time. Fails if the basemap can't be fetched.
    pub fn render(
        &self,
        time: &DateTime<FixedOffset>,
        basemap: Option<&mut Basemap>,
    ) -> Result<RgbaImage> {
        let mut frame = match basemap {
            Some(basemap) => basemap.draw(&self.view)?,
            None => RgbaImage::from_pixel(self.view.size, self.view.size, BACKGROUND),
        };
        imageops::overlay(&mut frame, &self.routes_layer, 0, 0);

        let mut markers = self.blank_layer();
        let radius = (self.view.size as i32 / 150).max(2);
        for pos in self.snapshots.get(time).into_iter().flatten() {
            let (x, y) = self.view.to_pixels(pos.pos);
            if !self.on_canvas(x, y, radius as f32) {
                continue;
            }
            draw_filled_circle_mut(
                &mut markers,
                (x.round() as i32, y.round() as i32),
                radius,
                self.trip_colors[&pos.trip_id],
            );
        }
        imageops::overlay(&mut frame, &markers, 0, 0);

        let mut label = self.blank_layer();
        draw_clock(&mut label, time)?;
        imageops::overlay(&mut frame, &label, 0, 0);

        Ok(frame)
    }

    /// Writes every frame into `dir`, replacing whatever's there. A frame that can't be rendered
    /// is logged and listed in the report, and any older file for that time is removed so it
    /// can't stand in for the missing frame.
    pub fn render_all(
        &self,
        dir: &Path,
        mut basemap: Option<&mut Basemap>,
        timer: &mut Timer,
    ) -> Result<RenderReport> {
        fs_err::create_dir_all(dir)?;

        let mut report = RenderReport::default();
        let mut keys: BTreeMap<String, DateTime<FixedOffset>> = BTreeMap::new();
        timer.start_iter("render frames", self.snapshots.len());
        for time in self.snapshots.keys() {
            timer.next();
            let key = frame_key(time);
            if let Some(prev) = keys.insert(key.clone(), *time) {
                warn!("{prev} and {time} are both frame {key}; the later one wins");
            }

            let path = frame_path(dir, time);
            let result = self.render(time, basemap.as_deref_mut()).and_then(|frame| {
                frame
                    .save_with_format(&path, ImageFormat::Png)
                    .with_context(|| format!("writing {}", path.display()))
            });
            match result {
                Ok(()) => report.written.push((*time, path)),
                Err(err) => {
                    error!("Frame {key} ({time}) failed: {err:#}");
                    report.failed.push((*time, format!("{err:#}")));
                    if path.exists() {
                        fs_err::remove_file(&path)?;
                    }
                }
            }
        }

        info!(
            "Wrote {} frames to {}",
            prettyprint_usize(report.written.len()),
            dir.display()
        );
        if !report.failed.is_empty() {
            warn!(
                "{} frames failed, so the animation can't be built until they're rendered",
                prettyprint_usize(report.failed.len())
            );
        }
        Ok(report)
    }

    fn blank_layer(&self) -> RgbaImage {
        RgbaImage::new(self.view.size, self.view.size)
    }

    fn on_canvas(&self, x: f32, y: f32, slack: f32) -> bool {
        let max = self.view.size as f32 + slack;
        x >= -slack && y >= -slack && x <= max && y <= max
    }
}

/// All route shapes at one uniform, faint opacity
fn draw_routes(routes: &RouteNetwork, view: &View) -> RgbaImage {
    let mut layer = RgbaImage::new(view.size, view.size);
    let width = (view.size as f32 / 400.0).max(1.0);
    for route in routes.iter() {
        let pts: Vec<(f32, f32)> = route
            .path
            .points()
            .iter()
            .map(|pt| view.to_pixels(*pt))
            .collect();
        for pair in pts.windows(2) {
            draw_thick_line(&mut layer, pair[0], pair[1], width, ROUTE_COLOR);
        }
    }
    layer
}

fn draw_thick_line(
    layer: &mut RgbaImage,
    from: (f32, f32),
    to: (f32, f32),
    width: f32,
    color: Rgba<u8>,
) {
    // Skip segments entirely off the canvas
    let size = layer.width().max(layer.height()) as f32;
    let (min_x, max_x) = (from.0.min(to.0), from.0.max(to.0));
    let (min_y, max_y) = (from.1.min(to.1), from.1.max(to.1));
    if max_x < -width || max_y < -width || min_x > size + width || min_y > size + width {
        return;
    }

    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    if width <= 1.0 || length < 0.5 {
        draw_line_segment_mut(layer, from, to, color);
        return;
    }

    let half = width / 2.0;
    let (nx, ny) = (-dy / length * half, dx / length * half);
    let corner = |x: f32, y: f32| Point::new(x.round() as i32, y.round() as i32);
    let quad = [
        corner(from.0 + nx, from.1 + ny),
        corner(to.0 + nx, to.1 + ny),
        corner(to.0 - nx, to.1 - ny),
        corner(from.0 - nx, from.1 - ny),
    ];
    if quad[0] == quad[3] {
        draw_line_segment_mut(layer, from, to, color);
        return;
    }
    draw_polygon_mut(layer, &quad, color);
    // Round off the joint with the next segment
    draw_filled_circle_mut(
        layer,
        (to.0.round() as i32, to.1.round() as i32),
        half.round() as i32,
        color,
    );
}
