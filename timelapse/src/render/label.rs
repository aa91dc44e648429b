//! The large clock in the corner of every frame.

use ab_glyph::{FontRef, PxScale};
use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};

const COLOR: Rgba<u8> = Rgba([20, 20, 20, 130]);
static FONT: &[u8] = include_bytes!("../../assets/DejaVuSansMono-Bold.ttf");

fn font() -> Result<FontRef<'static>> {
    FontRef::try_from_slice(FONT).map_err(|err| anyhow!("embedded clock font: {err}"))
}

/// Draws HH:MM into the bottom right corner of a transparent layer.
pub fn draw_clock(layer: &mut RgbaImage, time: &DateTime<FixedOffset>) -> Result<()> {
    let font = font()?;
    let text = time.format("%H:%M").to_string();
    let scale = PxScale::from(layer.width().min(layer.height()) as f32 / 6.0);

    let (width, height) = text_size(scale, &font, &text);
    let margin = scale.y as i32 / 4;
    let x = layer.width() as i32 - margin - width as i32;
    let y = layer.height() as i32 - margin - height as i32;
    draw_text_mut(layer, COLOR, x, y, scale, &font, &text);
    Ok(())
}
