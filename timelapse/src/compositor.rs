use std::collections::BTreeSet;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame};

use crate::render::frame_path;

/// Encodes the frames for every timestamp, in time order, into one looping GIF.
///
/// Every frame must already exist in `frame_dir`. A gap would make the animation lie about time,
/// so a missing frame is an error rather than something to skip.
pub fn compose(
    frame_dir: &Path,
    timestamps: &[DateTime<FixedOffset>],
    output: &Path,
    frames_per_second: u16,
) -> Result<()> {
    if frames_per_second == 0 {
        bail!("frames_per_second must be positive");
    }
    let times: BTreeSet<DateTime<FixedOffset>> = timestamps.iter().cloned().collect();
    if times.is_empty() {
        bail!("No frames to put in {}", output.display());
    }

    // Check everything is there before touching the output
    for time in &times {
        let path = frame_path(frame_dir, time);
        if !path.exists() {
            bail!(
                "Frame for {} ({}) is missing: {}",
                time.format("%H:%M"),
                time,
                path.display()
            );
        }
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }
    // Encode next to the output and only move it into place once every frame made it in, so a
    // failure never leaves a truncated animation behind.
    let name = output
        .file_name()
        .ok_or_else(|| anyhow!("{} isn't a file path", output.display()))?;
    let partial = output.with_file_name(format!(".{}.partial", name.to_string_lossy()));
    let delay = Delay::from_numer_denom_ms(1000, frames_per_second as u32);
    if let Err(err) = encode(frame_dir, &times, &partial, delay) {
        if partial.exists() {
            fs_err::remove_file(&partial)?;
        }
        return Err(err);
    }
    fs_err::rename(&partial, output)?;

    info!(
        "Wrote {} frames to {} at {} fps",
        times.len(),
        output.display(),
        frames_per_second
    );
    Ok(())
}

fn encode(
    frame_dir: &Path,
    times: &BTreeSet<DateTime<FixedOffset>>,
    path: &Path,
    delay: Delay,
) -> Result<()> {
    let file = BufWriter::new(fs_err::File::create(path)?);
    let mut encoder = GifEncoder::new_with_speed(file, 10);
    encoder.set_repeat(Repeat::Infinite)?;

    let mut dims = None;
    for time in times {
        let frame = frame_path(frame_dir, time);
        let img = image::open(&frame)
            .with_context(|| format!("reading frame for {time} from {}", frame.display()))?
            .to_rgba8();
        match dims {
            None => dims = Some(img.dimensions()),
            Some(expected) if expected != img.dimensions() => bail!(
                "{} is {:?}, but earlier frames are {:?}",
                frame.display(),
                img.dimensions(),
                expected
            ),
            Some(_) => {}
        }
        encoder.encode_frame(Frame::from_parts(img, 0, 0, delay))?;
    }
    Ok(())
}
