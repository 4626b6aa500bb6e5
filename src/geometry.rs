//! Spatial helpers for waypoint insertion and view fitting.
//!
//! All coordinates are WGS84 degrees. Distances returned in meters use the
//! haversine formula; the coarse segment comparison works directly in
//! degree space.

use crate::Point;
use serde_json::Value;

/// Earth radius in meters (WGS84 mean).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Zoom used when centering the map on a single point
pub const SINGLE_POINT_ZOOM: f64 = 15.0;

/// Padding in pixels around a fitted bounding box
pub const FIT_PADDING_PX: u32 = 50;

/// Zoom ceiling when fitting a bounding box, so short routes don't over-zoom
pub const FIT_MAX_ZOOM: f64 = 16.0;

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Distance from the point to the nearest point on the line, in meters.
    pub perpendicular_distance: f64,
    /// Distance along the line from its start to the projected point, in meters.
    pub distance_along_path: f64,
    /// Index of the segment the projection landed on.
    pub segment_index: usize,
}

/// How the map view should be positioned to show a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewFit {
    /// Center on one point with a fixed zoom
    Center {
        /// The point to center on
        center: Point,
        /// The zoom level
        zoom: f64,
    },
    /// Fit a bounding box
    Bounds {
        /// South-west corner
        south_west: Point,
        /// North-east corner
        north_east: Point,
        /// Padding in pixels
        padding: u32,
        /// Never zoom in further than this
        max_zoom: f64,
    },
}

/// Haversine distance between two points in meters.
pub fn haversine_distance(a: &Point, b: &Point) -> f64 {
    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let dlat = (b.lat() - a.lat()).to_radians();
    let dlon = (b.lon() - a.lon()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Planar distance from a point to a segment, in degrees.
///
/// Good enough to compare which of several segments a point is closest to;
/// not meant as a real-world distance.
pub fn distance_point_to_segment(point: &Point, seg_start: &Point, seg_end: &Point) -> f64 {
    let t = segment_parameter(point, seg_start, seg_end);
    let x = seg_start.lon() + t * (seg_end.lon() - seg_start.lon());
    let y = seg_start.lat() + t * (seg_end.lat() - seg_start.lat());
    ((point.lon() - x).powi(2) + (point.lat() - y).powi(2)).sqrt()
}

/// Flatten GeoJSON coordinates of any nesting depth into one ordered sequence.
///
/// Accepts the `coordinates` member of a LineString, a MultiLineString, or
/// anything nested deeper. A leaf is an array starting with two numbers
/// `[lon, lat, ...]`.
pub fn flatten_polyline_coordinates(raw: &Value) -> Vec<Point> {
    let mut out = Vec::new();
    flatten_into(raw, &mut out);
    out
}

fn flatten_into(raw: &Value, out: &mut Vec<Point>) {
    let Some(items) = raw.as_array() else {
        return;
    };

    if let (Some(lon), Some(lat)) = (
        items.first().and_then(Value::as_f64),
        items.get(1).and_then(Value::as_f64),
    ) {
        out.push(Point::new(lat, lon));
        return;
    }

    for item in items {
        flatten_into(item, out);
    }
}

/// Running path length at every coordinate, starting at 0.
pub fn cumulative_distances(coords: &[Point]) -> Vec<f64> {
    let mut total = 0.0;
    let mut out = Vec::with_capacity(coords.len());
    for (i, p) in coords.iter().enumerate() {
        if i > 0 {
            total += haversine_distance(&coords[i - 1], p);
        }
        out.push(total);
    }
    out
}

/// Project a point onto the nearest segment of a polyline.
///
/// `cumulative` must come from [`cumulative_distances`] for the same
/// coordinates. Returns `None` for fewer than two coordinates.
pub fn project_point_onto_polyline(
    point: &Point,
    coords: &[Point],
    cumulative: &[f64],
) -> Option<Projection> {
    if coords.len() < 2 || cumulative.len() != coords.len() {
        return None;
    }

    let total = cumulative[cumulative.len() - 1];
    let mut best: Option<Projection> = None;

    for (i, segment) in coords.windows(2).enumerate() {
        let a = &segment[0];
        let b = &segment[1];

        let t = segment_parameter(point, a, b);
        let projected = Point::new(
            a.lat() + t * (b.lat() - a.lat()),
            a.lon() + t * (b.lon() - a.lon()),
        );
        let dist = haversine_distance(point, &projected);

        if best.map_or(true, |prev| dist < prev.perpendicular_distance) {
            let along = cumulative[i] + haversine_distance(a, &projected);
            best = Some(Projection {
                perpendicular_distance: dist,
                distance_along_path: along.clamp(0.0, total),
                segment_index: i,
            });
        }
    }

    best
}

/// Work out how to show the given points on the map.
pub fn fit_view(points: &[Point]) -> Option<ViewFit> {
    match points {
        [] => None,
        [only] => Some(ViewFit::Center {
            center: *only,
            zoom: SINGLE_POINT_ZOOM,
        }),
        [first, rest @ ..] => {
            let (mut min_lat, mut max_lat) = (first.lat(), first.lat());
            let (mut min_lon, mut max_lon) = (first.lon(), first.lon());
            for p in rest {
                min_lat = min_lat.min(p.lat());
                max_lat = max_lat.max(p.lat());
                min_lon = min_lon.min(p.lon());
                max_lon = max_lon.max(p.lon());
            }
            Some(ViewFit::Bounds {
                south_west: Point::new(min_lat, min_lon),
                north_east: Point::new(max_lat, max_lon),
                padding: FIT_PADDING_PX,
                max_zoom: FIT_MAX_ZOOM,
            })
        }
    }
}

// Clamped projection parameter of `p` onto segment a-b, in degree space.
fn segment_parameter(p: &Point, a: &Point, b: &Point) -> f64 {
    let dx = b.lon() - a.lon();
    let dy = b.lat() - a.lat();
    let len_sq = dx * dx + dy * dy;

    if len_sq == 0.0 {
        return 0.0;
    }

    (((p.lon() - a.lon()) * dx + (p.lat() - a.lat()) * dy) / len_sq).clamp(0.0, 1.0)
}
