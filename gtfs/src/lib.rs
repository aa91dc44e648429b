#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod ids;
pub mod mercator;
mod shapes;

use std::path::Path;

use anyhow::{Context, Result};
use zip::ZipArchive;

pub use ids::ShapeID;
pub use shapes::{Record as ShapePoint, RouteGeometry, RouteNetwork};

/// Loads route shapes from either a plain `shapes.txt` or a zipped GTFS feed containing one.
pub fn load_shapes<P: AsRef<Path>>(path: P) -> Result<RouteNetwork> {
    let path = path.as_ref();
    let file = fs_err::File::open(path)?;
    let network = if path.extension().map_or(false, |ext| ext == "zip") {
        let mut archive = ZipArchive::new(file)?;
        shapes::load(get_zip_file(&mut archive, "shapes.txt")?)
    } else {
        shapes::load(file)
    }
    .with_context(|| format!("loading shapes from {}", path.display()))?;

    info!(
        "Built {} route shapes from {}, rejected {}",
        network.len(),
        path.display(),
        network.rejected.len()
    );
    Ok(network)
}

/// Builds route shapes from already-parsed points.
pub fn build_shapes(points: Vec<ShapePoint>) -> RouteNetwork {
    shapes::build(points)
}

// Adds the path in the error message
pub fn get_zip_file<'a, R: std::io::Read + std::io::Seek>(
    archive: &'a mut ZipArchive<R>,
    path: &str,
) -> Result<zip::read::ZipFile<'a>> {
    archive
        .by_name(path)
        .map_err(|err| anyhow!("{path}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::*;

    const SHAPES: &str = "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence
100,45.52,-122.68,1
100,45.53,-122.67,2
200,45.50,-122.60,1
";

    fn zipped(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut zip = ZipWriter::new(std::fs::File::create(dir.path().join("feed.zip")).unwrap());
        for (name, contents) in files {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        dir
    }

    #[test]
    fn load_from_zipped_feed() {
        let dir = zipped(&[("agency.txt", "agency_id\n1\n"), ("shapes.txt", SHAPES)]);
        let network = load_shapes(dir.path().join("feed.zip")).unwrap();
        assert_eq!(network.len(), 1);
        assert_eq!(network.rejected, vec![ShapeID::new("200")]);
        let route = network.iter().next().unwrap();
        assert_eq!(route.shape_id, ShapeID::new("100"));
        assert_eq!(route.path.points()[0], mercator::project(-122.68, 45.52).unwrap());
    }

    #[test]
    fn zipped_feed_without_shapes() {
        let dir = zipped(&[("stops.txt", "stop_id\n1\n")]);
        let err = load_shapes(dir.path().join("feed.zip")).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("shapes.txt"), "{msg}");
    }

    #[test]
    fn plain_shapes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shapes.txt");
        std::fs::write(&path, SHAPES).unwrap();
        assert_eq!(load_shapes(&path).unwrap().len(), 1);
    }
}
