//! Background map tiles from a slippy map server.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use gtfs::mercator::HALF_WORLD;

use crate::{TileServer, View};

pub const TILE_SIZE: u32 = 256;
const BACKOFF: Duration = Duration::from_millis(500);
/// Shows through wherever a view extends beyond the tiled world
const OFF_MAP: Rgba<u8> = Rgba([200, 200, 200, 255]);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileID {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// Anything that can produce a 256x256 tile.
pub trait TileSource {
    fn fetch(&mut self, id: TileID) -> Result<RgbaImage>;
}

/// Fetches the raw bytes behind a URL.
pub trait Downloader {
    fn download(&self, url: &str) -> Result<Vec<u8>>;
}

impl Downloader for reqwest::blocking::Client {
    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = reqwest::blocking::Client::get(self, url)
            .send()?
            .error_for_status()?;
        Ok(resp.bytes()?.to_vec())
    }
}

/// Downloads tiles over HTTP. Each frame asks for the same tiles, so successes are kept in
/// memory.
pub struct HttpTileSource<D = reqwest::blocking::Client> {
    downloader: D,
    url: String,
    retries: usize,
    backoff: Duration,
    cache: BTreeMap<TileID, RgbaImage>,
}

impl HttpTileSource {
    pub fn new(server: &TileServer) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("bus-timelapse/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_downloader(server, client))
    }
}

impl<D: Downloader> HttpTileSource<D> {
    pub fn with_downloader(server: &TileServer, downloader: D) -> Self {
        Self {
            downloader,
            url: server.url.clone(),
            retries: server.retries,
            backoff: BACKOFF,
            cache: BTreeMap::new(),
        }
    }

    fn url(&self, id: TileID) -> String {
        self.url
            .replace("{z}", &id.z.to_string())
            .replace("{x}", &id.x.to_string())
            .replace("{y}", &id.y.to_string())
    }

    fn download(&self, id: TileID) -> Result<RgbaImage> {
        let bytes = self.downloader.download(&self.url(id))?;
        Ok(image::load_from_memory(&bytes)?.to_rgba8())
    }
}

impl<D: Downloader> TileSource for HttpTileSource<D> {
    fn fetch(&mut self, id: TileID) -> Result<RgbaImage> {
        if let Some(tile) = self.cache.get(&id) {
            return Ok(tile.clone());
        }
        let mut attempt = 0;
        loop {
            match self.download(id) {
                Ok(tile) => {
                    self.cache.insert(id, tile.clone());
                    return Ok(tile);
                }
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    warn!("Fetching {} failed ({err}), retry {attempt}", self.url(id));
                    std::thread::sleep(self.backoff * attempt as u32);
                }
                Err(err) => {
                    return Err(err.context(format!("fetching {}", self.url(id))));
                }
            }
        }
    }
}

pub struct Basemap {
    source: Box<dyn TileSource>,
    max_zoom: u8,
}

impl Basemap {
    pub fn new(source: Box<dyn TileSource>, max_zoom: u8) -> Self {
        Self { source, max_zoom }
    }

    pub fn from_server(server: &TileServer) -> Result<Self> {
        Ok(Self::new(
            Box::new(HttpTileSource::new(server)?),
            server.max_zoom,
        ))
    }

    /// Stitches together the tiles covering the view and scales them to the canvas.
    pub fn draw(&mut self, view: &View) -> Result<RgbaImage> {
        let zoom = pick_zoom(view.meters_per_pixel(), self.max_zoom);
        let num_tiles = 1i64 << zoom;
        let px_per_meter = (TILE_SIZE as f64) * (num_tiles as f64) / (2.0 * HALF_WORLD);

        // In pixels of the whole world at this zoom, y pointing down
        let left = (view.extent.x_min + HALF_WORLD) * px_per_meter;
        let right = (view.extent.x_max + HALF_WORLD) * px_per_meter;
        let top = (HALF_WORLD - view.extent.y_max) * px_per_meter;
        let bottom = (HALF_WORLD - view.extent.y_min) * px_per_meter;

        // Only the tiles that exist; anything past the edge of the world stays OFF_MAP
        let tile_range = |lo: f64, hi: f64| {
            let first = ((lo / TILE_SIZE as f64).floor() as i64).max(0);
            let last = ((hi / TILE_SIZE as f64).ceil() as i64 - 1).min(num_tiles - 1);
            first..=last
        };

        let (origin_x, origin_y) = (left.round() as i64, top.round() as i64);
        let mut canvas = RgbaImage::from_pixel(
            ((right - left).round() as u32).max(1),
            ((bottom - top).round() as u32).max(1),
            OFF_MAP,
        );
        for tile_y in tile_range(top, bottom) {
            for tile_x in tile_range(left, right) {
                let id = TileID {
                    z: zoom,
                    x: tile_x as u32,
                    y: tile_y as u32,
                };
                let mut tile = self.source.fetch(id)?;
                if tile.dimensions() != (TILE_SIZE, TILE_SIZE) {
                    tile = imageops::resize(&tile, TILE_SIZE, TILE_SIZE, FilterType::Triangle);
                }
                imageops::replace(
                    &mut canvas,
                    &tile,
                    tile_x * TILE_SIZE as i64 - origin_x,
                    tile_y * TILE_SIZE as i64 - origin_y,
                );
            }
        }

        Ok(imageops::resize(
            &canvas,
            view.size,
            view.size,
            FilterType::Triangle,
        ))
    }
}

/// The coarsest zoom level with at least as much detail as the canvas.
pub fn pick_zoom(meters_per_pixel: f64, max_zoom: u8) -> u8 {
    for zoom in 0..=max_zoom {
        let tile_meters_per_pixel = 2.0 * HALF_WORLD / (TILE_SIZE as f64 * (1u64 << zoom) as f64);
        if tile_meters_per_pixel <= meters_per_pixel {
            return zoom;
        }
    }
    max_zoom
}
