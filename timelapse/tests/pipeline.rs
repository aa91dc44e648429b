use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use abstutil::Timer;
use chrono::{DateTime, FixedOffset, Utc};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Rgba, RgbaImage};

use gtfs::{ShapeID, ShapePoint};
use model::{avl, DisplayOffset, Model, PositionRecord, TripID};
use timelapse::{
    compose, frame_key, Config, Extent, ExtentPreset, FrameRenderer, TileServer, View,
};

// 2022-06-01 21:00:00 UTC
const T0: i64 = 1_654_117_200;

fn time(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(&format!("2022-06-01T{hour:02}:{minute:02}:00-07:00")).unwrap()
}

fn ping(trip: &str, secs: i64, lon: f64, lat: f64) -> PositionRecord {
    PositionRecord {
        trip_id: TripID::new(trip),
        time: DateTime::<Utc>::from_timestamp(T0 + secs, 0).unwrap(),
        lon,
        lat,
    }
}

/// Two trips spread over three minutes near downtown Portland
fn model() -> Model {
    let positions = avl::normalize(
        vec![
            ping("a", 5, -122.680, 45.520),
            ping("a", 20, -122.679, 45.521),
            ping("a", 65, -122.677, 45.522),
            ping("b", 70, -122.670, 45.515),
            ping("b", 130, -122.672, 45.517),
        ],
        DisplayOffset::hours(-7).unwrap(),
    );
    let shape = |lon: f64, lat: f64| ShapePoint {
        shape_id: ShapeID::new("100"),
        shape_pt_lon: lon,
        shape_pt_lat: lat,
    };
    let routes = gtfs::build_shapes(vec![
        shape(-122.685, 45.518),
        shape(-122.675, 45.522),
        shape(-122.665, 45.516),
    ]);
    Model { positions, routes }
}

fn downtown() -> Extent {
    Extent::new(-13_660_000.0, -13_652_000.0, 5_700_000.0, 5_708_000.0).unwrap()
}

fn pngs_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.ends_with(".png"))
        .collect();
    names.sort();
    names
}

fn decode_gif(path: &Path) -> Vec<image::Frame> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path).unwrap())).unwrap();
    decoder.into_frames().collect_frames().unwrap()
}

#[test]
fn one_frame_per_minute() {
    let model = model();
    assert_eq!(model.timestamps(), vec![time(14, 0), time(14, 1), time(14, 2)]);

    let dir = tempfile::tempdir().unwrap();
    let view = View::new(downtown(), 128).unwrap();
    let renderer = FrameRenderer::new(&model.routes, &model.positions, view);
    let report = renderer
        .render_all(dir.path(), None, &mut Timer::throwaway())
        .unwrap();
    assert_eq!(report.written.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(pngs_in(dir.path()), vec!["1400.png", "1401.png", "1402.png"]);
}

#[test]
fn rerendering_is_byte_identical() {
    let model = model();
    let dir = tempfile::tempdir().unwrap();
    let view = View::new(downtown(), 128).unwrap();
    let renderer = FrameRenderer::new(&model.routes, &model.positions, view);

    renderer
        .render_all(dir.path(), None, &mut Timer::throwaway())
        .unwrap();
    let first = std::fs::read(dir.path().join("1401.png")).unwrap();
    renderer
        .render_all(dir.path(), None, &mut Timer::throwaway())
        .unwrap();
    let second = std::fs::read(dir.path().join("1401.png")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn compose_sorts_frames_by_time() {
    let dir = tempfile::tempdir().unwrap();
    let (t1, t2, t3) = (time(9, 58), time(9, 59), time(10, 0));
    let colors = [
        (t2, Rgba([0, 255, 0, 255])),
        (t1, Rgba([255, 0, 0, 255])),
        (t3, Rgba([0, 0, 255, 255])),
    ];
    for (t, color) in colors {
        RgbaImage::from_pixel(32, 32, color)
            .save(dir.path().join(format!("{}.png", frame_key(&t))))
            .unwrap();
    }

    let output = dir.path().join("out").join("animation.gif");
    compose(dir.path(), &[t2, t1, t3], &output, 10).unwrap();

    let frames = decode_gif(&output);
    assert_eq!(frames.len(), 3);
    let dominant: Vec<usize> = frames
        .iter()
        .map(|frame| {
            let p = frame.buffer().get_pixel(16, 16);
            (0..3).max_by_key(|c| p[*c]).unwrap()
        })
        .collect();
    assert_eq!(dominant, vec![0, 1, 2]);

    // 10 fps
    let (numer, denom) = frames[0].delay().numer_denom_ms();
    assert_eq!(numer as f64 / denom as f64, 100.0);
}

#[test]
fn compose_refuses_gaps() {
    let dir = tempfile::tempdir().unwrap();
    RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]))
        .save(dir.path().join("1400.png"))
        .unwrap();

    let output = dir.path().join("animation.gif");
    let err = compose(dir.path(), &[time(14, 0), time(14, 1)], &output, 10).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("14:01"), "{msg}");
    assert!(msg.contains("1401.png"), "{msg}");
    assert!(!output.exists());
}

#[test]
fn compose_rejects_mismatched_frame_sizes() {
    let dir = tempfile::tempdir().unwrap();
    RgbaImage::from_pixel(32, 32, Rgba([255, 0, 0, 255]))
        .save(dir.path().join("1400.png"))
        .unwrap();
    RgbaImage::from_pixel(48, 32, Rgba([0, 255, 0, 255]))
        .save(dir.path().join("1401.png"))
        .unwrap();

    // An animation from an earlier run stays untouched
    let output = dir.path().join("animation.gif");
    std::fs::write(&output, b"previous").unwrap();

    let err = compose(dir.path(), &[time(14, 0), time(14, 1)], &output, 10).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("1401.png"), "{msg}");
    assert!(msg.contains("(48, 32)"), "{msg}");
    assert_eq!(std::fs::read(&output).unwrap(), b"previous");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

/// Two-preset config writing everything under `dir`
fn config_in(dir: &Path) -> Config {
    let preset = |name: &str, extent: Extent| ExtentPreset {
        name: name.to_string(),
        extent,
        frame_dir: dir.join(name).display().to_string(),
        animation: dir.join(format!("{name}.gif")).display().to_string(),
    };
    Config {
        utc_offset_hours: DisplayOffset::hours(-7).unwrap(),
        frame_size: 96,
        frames_per_second: 10,
        extents: vec![
            preset(
                "regional",
                Extent::new(-13_686_000.0, -13_626_000.0, 5_674_000.0, 5_734_000.0).unwrap(),
            ),
            preset("downtown", downtown()),
        ],
        basemap: None,
    }
}

#[test]
fn failed_frames_fail_the_run_despite_old_frames() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    // Nothing listens on the discard port, so every tile fails straight away
    config.basemap = Some(TileServer {
        url: "http://127.0.0.1:9/{z}/{x}/{y}.png".to_string(),
        retries: 0,
        max_zoom: 18,
    });
    config.validate().unwrap();

    // Frames left over from an earlier run
    let frame_dir = dir.path().join("downtown");
    std::fs::create_dir_all(&frame_dir).unwrap();
    for name in ["1400.png", "1401.png"] {
        RgbaImage::from_pixel(96, 96, Rgba([255, 0, 0, 255]))
            .save(frame_dir.join(name))
            .unwrap();
    }

    let err = timelapse::run(
        &model(),
        &config,
        Some("downtown"),
        false,
        &mut Timer::throwaway(),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("downtown"));
    assert!(!dir.path().join("downtown.gif").exists());
    assert!(pngs_in(&frame_dir).is_empty());
}

#[test]
fn run_every_preset_without_a_basemap() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    config.validate().unwrap();

    let model = model();
    timelapse::run(&model, &config, None, false, &mut Timer::throwaway()).unwrap();
    for name in ["regional", "downtown"] {
        assert_eq!(pngs_in(&dir.path().join(name)).len(), 3);
        let frames = decode_gif(&dir.path().join(format!("{name}.gif")));
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].buffer().dimensions(), (96, 96));
    }

    // Composing again from what's on disk works too
    std::fs::remove_file(dir.path().join("downtown.gif")).unwrap();
    timelapse::run(
        &model,
        &config,
        Some("downtown"),
        true,
        &mut Timer::throwaway(),
    )
    .unwrap();
    assert!(dir.path().join("downtown.gif").exists());
    assert!(
        timelapse::run(&model, &config, Some("uptown"), true, &mut Timer::throwaway()).is_err()
    );
}
