use anyhow::Result;
use geom::Pt2D;
use serde::{Deserialize, Serialize};

/// A rectangle in planar (EPSG:3857) meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Extent {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Result<Self> {
        let extent = Self {
            x_min,
            x_max,
            y_min,
            y_max,
        };
        extent.validate()?;
        Ok(extent)
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.x_min, self.x_max, self.y_min, self.y_max];
        if values.iter().any(|x| !x.is_finite()) {
            bail!("{:?} has non-finite bounds", self);
        }
        if self.x_min >= self.x_max || self.y_min >= self.y_max {
            bail!("{:?} is empty", self);
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Grows the shorter side equally in both directions, keeping the center.
    pub fn squared(&self) -> Self {
        let side = self.width().max(self.height());
        let pad_x = (side - self.width()) / 2.0;
        let pad_y = (side - self.height()) / 2.0;
        Self {
            x_min: self.x_min - pad_x,
            x_max: self.x_max + pad_x,
            y_min: self.y_min - pad_y,
            y_max: self.y_max + pad_y,
        }
    }
}

/// Maps planar meters onto a square canvas. Every frame of one animation uses the same View, so
/// the frames line up pixel for pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct View {
    /// Already squared
    pub extent: Extent,
    pub size: u32,
}

impl View {
    pub fn new(extent: Extent, size: u32) -> Result<Self> {
        extent.validate()?;
        if size == 0 {
            bail!("Frames need at least 1 pixel");
        }
        Ok(Self {
            extent: extent.squared(),
            size,
        })
    }

    pub fn meters_per_pixel(&self) -> f64 {
        self.extent.width() / (self.size as f64)
    }

    /// Pixel coordinates, with y pointing down. Points outside the extent land off-canvas.
    pub fn to_pixels(&self, pt: Pt2D) -> (f32, f32) {
        let scale = 1.0 / self.meters_per_pixel();
        let x = (pt.x() - self.extent.x_min) * scale;
        let y = (self.extent.y_max - pt.y()) * scale;
        (x as f32, y as f32)
    }
}
