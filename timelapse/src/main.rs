use abstutil::Timer;
use anyhow::Result;
use structopt::StructOpt;

use model::Model;
use timelapse::Config;

#[derive(StructOpt)]
struct Args {
    /// The path to a CSV file with trip_id, update_time, longitude, and latitude
    #[structopt(long)]
    positions: String,
    /// The path to a GTFS shapes.txt, or a GTFS .zip containing one
    #[structopt(long)]
    shapes: String,
    /// The path to a JSON config. Without this, the Portland presets are used.
    #[structopt(long)]
    config: Option<String>,
    /// Only make the time-lapse for the extent with this name
    #[structopt(long)]
    extent: Option<String>,
    /// Don't render anything; build the animations from frames already on disk
    #[structopt(long)]
    skip_render: bool,
}

fn main() -> Result<()> {
    abstutil::logger::setup();

    let args = Args::from_iter(abstutil::cli_args());
    let config = match args.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut timer = Timer::new("bus time-lapse");
    let model = Model::import(
        &args.positions,
        &args.shapes,
        config.utc_offset_hours,
        &mut timer,
    )?;
    timelapse::run(
        &model,
        &config,
        args.extent.as_deref(),
        args.skip_render,
        &mut timer,
    )
}
