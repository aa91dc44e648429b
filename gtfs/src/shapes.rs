use std::collections::BTreeMap;

use anyhow::Result;
use geom::{PolyLine, Pt2D};
use serde::Deserialize;

use crate::{mercator, ShapeID};

/// One route shape in planar meters. Vertices keep the order of the input file, including any
/// repeated points.
#[derive(Clone, Debug)]
pub struct RouteGeometry {
    pub shape_id: ShapeID,
    pub path: PolyLine,
}

/// Every shape that could be turned into a path. Built once and shared by all frames.
#[derive(Clone, Debug, Default)]
pub struct RouteNetwork {
    pub shapes: BTreeMap<ShapeID, RouteGeometry>,
    /// Shapes with fewer than 2 usable points
    pub rejected: Vec<ShapeID>,
}

impl RouteNetwork {
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteGeometry> {
        self.shapes.values()
    }
}

/// Reads shape points from a GTFS `shapes.txt`. Rows are assumed to already be in path order;
/// `shape_pt_sequence` isn't consulted.
pub fn load<R: std::io::Read>(reader: R) -> Result<RouteNetwork> {
    let mut points = Vec::new();
    for (idx, rec) in csv::Reader::from_reader(reader).deserialize().enumerate() {
        let rec: Record = match rec {
            Ok(rec) => rec,
            Err(err) => {
                warn!("Skipping shape point on row {}: {err}", idx + 1);
                continue;
            }
        };
        points.push(rec);
    }
    Ok(build(points))
}

/// Groups points by shape, keeping first-seen order within each shape, and projects them.
pub fn build(points: Vec<Record>) -> RouteNetwork {
    let mut pts_per_shape: BTreeMap<ShapeID, Vec<Pt2D>> = BTreeMap::new();
    for rec in points {
        // Make sure a shape whose points all fail to project still gets reported
        let pts = pts_per_shape.entry(rec.shape_id.clone()).or_insert_with(Vec::new);
        match mercator::project(rec.shape_pt_lon, rec.shape_pt_lat) {
            Ok(pt) => pts.push(pt),
            Err(err) => warn!("Dropping point from shape {}: {err}", rec.shape_id),
        }
    }

    let mut network = RouteNetwork::default();
    for (shape_id, pts) in pts_per_shape {
        if pts.len() < 2 {
            warn!(
                "Shape {shape_id} only has {} usable point(s), so it can't form a path",
                pts.len()
            );
            network.rejected.push(shape_id);
            continue;
        }
        // PolyLine::new rejects repeated points, but the vertices must be kept as-is
        let path = PolyLine::unchecked_new(pts);
        network
            .shapes
            .insert(shape_id.clone(), RouteGeometry { shape_id, path });
    }
    network
}

#[derive(Clone, Debug, Deserialize)]
pub struct Record {
    pub shape_id: ShapeID,
    pub shape_pt_lon: f64,
    pub shape_pt_lat: f64,
}
