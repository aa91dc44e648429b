use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use model::DisplayOffset;

use crate::Extent;

/// Everything about a run that isn't input data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Whole hours from UTC used for the clock label and frame names
    pub utc_offset_hours: DisplayOffset,
    /// Frames are square, this many pixels on a side
    pub frame_size: u32,
    pub frames_per_second: u16,
    pub extents: Vec<ExtentPreset>,
    /// If missing, frames get a flat background instead of map tiles
    pub basemap: Option<TileServer>,
}

/// One named area to animate, with where its frames and animation go.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtentPreset {
    pub name: String,
    pub extent: Extent,
    pub frame_dir: String,
    pub animation: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileServer {
    /// Containing `{z}`, `{x}`, and `{y}`
    pub url: String,
    /// How many more times to try a tile after the first failure
    pub retries: usize,
    pub max_zoom: u8,
}

const PORTLAND_SUMMER: DisplayOffset = DisplayOffset::const_hours(-7);

impl Default for Config {
    /// The Portland presets
    fn default() -> Self {
        Self {
            utc_offset_hours: PORTLAND_SUMMER,
            frame_size: 1000,
            frames_per_second: 10,
            extents: vec![
                ExtentPreset {
                    name: "regional".to_string(),
                    extent: Extent {
                        x_min: -13_686_000.0,
                        x_max: -13_626_000.0,
                        y_min: 5_674_000.0,
                        y_max: 5_734_000.0,
                    },
                    frame_dir: "output/frames/regional".to_string(),
                    animation: "output/regional.gif".to_string(),
                },
                ExtentPreset {
                    name: "downtown".to_string(),
                    extent: Extent {
                        x_min: -13_660_000.0,
                        x_max: -13_652_000.0,
                        y_min: 5_700_000.0,
                        y_max: 5_708_000.0,
                    },
                    frame_dir: "output/frames/downtown".to_string(),
                    animation: "output/downtown.gif".to_string(),
                },
            ],
            basemap: Some(TileServer {
                url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
                retries: 3,
                max_zoom: 18,
            }),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs_err::read_to_string(path)?;
        let config: Config =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("checking {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // The clock label needs some room
        if self.frame_size < 64 {
            bail!("frame_size {} is too small", self.frame_size);
        }
        if self.frames_per_second == 0 {
            bail!("frames_per_second must be positive");
        }
        if self.extents.is_empty() {
            bail!("No extents defined");
        }
        for (idx, preset) in self.extents.iter().enumerate() {
            preset
                .extent
                .validate()
                .with_context(|| format!("extent {}", preset.name))?;
            if self.extents[..idx].iter().any(|x| x.name == preset.name) {
                bail!("Extent {} is defined twice", preset.name);
            }
        }
        if let Some(ref server) = self.basemap {
            for part in ["{z}", "{x}", "{y}"] {
                if !server.url.contains(part) {
                    bail!("Tile URL {} is missing {part}", server.url);
                }
            }
            if server.max_zoom > 22 {
                bail!("max_zoom {} is beyond any tile server", server.max_zoom);
            }
        }
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Result<&ExtentPreset> {
        match self.extents.iter().find(|x| x.name == name) {
            Some(x) => Ok(x),
            None => bail!(
                "No extent called {name}; try one of {:?}",
                self.extents.iter().map(|x| &x.name).collect::<Vec<_>>()
            ),
        }
    }
}
