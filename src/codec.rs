//! GPX import and export.
//!
//! Exported tracks are simplified with Ramer-Douglas-Peucker to keep files
//! small. Imports are simplified until they fit in a single routing request.

use crate::{Error, Point};
use geo::{Coord, LineString, Simplify};
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use log::{debug, warn};

/// First threshold tried when an import has too many points, in degrees
pub const INITIAL_SIMPLIFY_THRESHOLD: f64 = 0.00001;

/// Largest threshold an import is simplified with, in degrees
pub const MAX_SIMPLIFY_THRESHOLD: f64 = 0.01;

/// Name given to imports that don't carry one
pub const DEFAULT_IMPORT_NAME: &str = "Imported route";

const CREATOR: &str = "route-planner";

/// One route to export.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GpxRoute {
    /// Track name
    pub name: String,
    /// The waypoints the route was planned through
    pub waypoints: Vec<Point>,
    /// The computed path
    pub geometry: Vec<Point>,
}

/// Points read from a GPX file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGpx {
    /// Waypoints, route points and track points, in that order
    pub points: Vec<Point>,
    /// A name to offer when saving the import
    pub name: String,
}

/// Simplify a path, keeping its first and last points.
///
/// `threshold` is in degrees; zero or less returns the path unchanged.
pub fn simplify(points: &[Point], threshold: f64) -> Vec<Point> {
    if threshold <= 0.0 || points.len() < 3 {
        return points.to_vec();
    }

    let line = LineString::from(points.iter().map(|p| Coord::from(*p)).collect::<Vec<_>>());
    line.simplify(&threshold)
        .into_inner()
        .into_iter()
        .map(Point::from)
        .collect()
}

/// Write routes as a GPX 1.1 document with one track per route.
///
/// The document is read back before it is returned; anything that doesn't
/// survive that is an error rather than a corrupt export.
pub fn encode(routes: &[GpxRoute], include_waypoints: bool, threshold: f64) -> Result<String, Error> {
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.into()),
        ..Default::default()
    };

    for route in routes {
        if include_waypoints {
            for (i, p) in route.waypoints.iter().enumerate() {
                let mut waypoint = to_waypoint(p)?;
                waypoint.name = Some((i + 1).to_string());
                gpx.waypoints.push(waypoint);
            }
        }

        let mut segment = TrackSegment::new();
        for p in simplify(&route.geometry, threshold) {
            segment.points.push(to_waypoint(&p)?);
        }

        let mut track = Track::new();
        if !route.name.is_empty() {
            track.name = Some(route.name.clone());
        }
        track.segments.push(segment);
        gpx.tracks.push(track);
    }

    let mut buffer = Vec::new();
    gpx::write(&gpx, &mut buffer).map_err(|e| Error::InvalidGpx(e.to_string()))?;
    let text = String::from_utf8(buffer).map_err(|e| Error::InvalidGpx(e.to_string()))?;

    let check = gpx::read(text.as_bytes()).map_err(|e| Error::InvalidGpx(e.to_string()))?;
    if check.tracks.len() != routes.len() {
        return Err(Error::InvalidGpx(format!(
            "wrote {} tracks but read back {}",
            routes.len(),
            check.tracks.len()
        )));
    }

    Ok(text)
}

/// Read the points of a GPX document, simplifying until at most
/// `max_points` remain or the largest threshold has been tried.
pub fn decode(text: &str, max_points: usize) -> Result<DecodedGpx, Error> {
    let gpx = gpx::read(text.as_bytes()).map_err(|e| Error::InvalidGpx(e.to_string()))?;

    let raw: Vec<Point> = gpx
        .waypoints
        .iter()
        .chain(gpx.routes.iter().flat_map(|r| r.points.iter()))
        .chain(
            gpx.tracks
                .iter()
                .flat_map(|t| t.segments.iter())
                .flat_map(|s| s.points.iter()),
        )
        .map(|wp| Point::from(wp.point()))
        .collect();

    let mut points = raw.clone();
    let mut threshold = INITIAL_SIMPLIFY_THRESHOLD;
    while points.len() > max_points {
        points = simplify(&raw, threshold);
        debug!(
            "Simplified {} points to {} at {}",
            raw.len(),
            points.len(),
            threshold
        );
        if points.len() <= max_points || threshold >= MAX_SIMPLIFY_THRESHOLD {
            break;
        }
        threshold = (threshold * 2.0).min(MAX_SIMPLIFY_THRESHOLD);
    }

    if points.len() > max_points {
        warn!(
            "GPX still has {} points after simplification, limit is {}",
            points.len(),
            max_points
        );
    }

    let name = gpx
        .metadata
        .as_ref()
        .and_then(|m| m.name.clone())
        .or_else(|| gpx.tracks.first().and_then(|t| t.name.clone()))
        .or_else(|| gpx.routes.first().and_then(|r| r.name.clone()))
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_IMPORT_NAME.to_string());

    Ok(DecodedGpx { points, name })
}

fn to_waypoint(p: &Point) -> Result<Waypoint, Error> {
    if !p.is_finite() || p.lat().abs() > 90.0 || p.lon().abs() > 180.0 {
        return Err(Error::InvalidGpx(format!("coordinate out of range: {:?}", p)));
    }
    Ok(Waypoint::new((*p).into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="48.2082" lon="16.3738"><name>Start</name></wpt>
  <trk>
    <name>Danube ride</name>
    <trkseg>
      <trkpt lat="48.2090" lon="16.3750"></trkpt>
      <trkpt lat="48.2100" lon="16.3760"></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="48.2200" lon="16.3800"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    fn wiggly_track(n: usize) -> String {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
"#,
        );
        for i in 0..n {
            let lat = 48.0 + 0.001 * i as f64;
            let lon = 16.0 + 0.0005 * (i as f64 * 0.05).sin();
            out.push_str(&format!("    <trkpt lat=\"{}\" lon=\"{}\"></trkpt>\n", lat, lon));
        }
        out.push_str("  </trkseg></trk>\n</gpx>\n");
        out
    }

    #[test]
    fn test_decode_collects_points_in_order() {
        let decoded = decode(MINIMAL_GPX, 250).unwrap();
        assert_eq!(decoded.name, "Danube ride");
        assert_eq!(
            decoded.points,
            vec![
                Point::new(48.2082, 16.3738),
                Point::new(48.2090, 16.3750),
                Point::new(48.2100, 16.3760),
                Point::new(48.2200, 16.3800),
            ]
        );
    }

    #[test]
    fn test_decode_default_name() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <rte><rtept lat="1.0" lon="2.0"></rtept></rte>
</gpx>"#;
        let decoded = decode(gpx, 250).unwrap();
        assert_eq!(decoded.name, DEFAULT_IMPORT_NAME);
        assert_eq!(decoded.points, vec![Point::new(1.0, 2.0)]);
    }

    #[test]
    fn test_decode_simplifies_instead_of_truncating() {
        let text = wiggly_track(600);
        let decoded = decode(&text, 250).unwrap();

        assert!(decoded.points.len() <= 250, "got {}", decoded.points.len());
        assert!(decoded.points.len() >= 2);
        assert_eq!(decoded.points[0], Point::new(48.0, 16.0));
        let last = decoded.points.last().unwrap();
        assert!((last.lat() - (48.0 + 0.001 * 599.0)).abs() < 1e-9);
    }

    #[test]
    fn test_decode_under_limit_is_untouched() {
        let text = wiggly_track(100);
        assert_eq!(decode(&text, 250).unwrap().points.len(), 100);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(
            decode("not xml at all", 250),
            Err(Error::InvalidGpx(_))
        ));
    }

    #[test]
    fn test_simplify() {
        let line: Vec<Point> = (0..10).map(|i| Point::new(0.0, i as f64)).collect();
        assert_eq!(simplify(&line, 0.0).len(), 10);
        assert_eq!(
            simplify(&line, 0.001),
            vec![Point::new(0.0, 0.0), Point::new(0.0, 9.0)]
        );
    }

    #[test]
    fn test_encode_reads_back() {
        let routes = vec![GpxRoute {
            name: "Loop".to_string(),
            waypoints: vec![Point::new(48.0, 16.0), Point::new(48.1, 16.0)],
            geometry: vec![
                Point::new(48.0, 16.0),
                Point::new(48.05, 16.0),
                Point::new(48.1, 16.0),
            ],
        }];

        let text = encode(&routes, true, 0.0).unwrap();
        let gpx = gpx::read(text.as_bytes()).unwrap();

        assert_eq!(gpx.tracks.len(), 1);
        assert_eq!(gpx.tracks[0].name.as_deref(), Some("Loop"));
        assert_eq!(gpx.tracks[0].segments[0].points.len(), 3);
        assert_eq!(gpx.waypoints.len(), 2);
        assert_eq!(gpx.waypoints[1].name.as_deref(), Some("2"));
    }

    #[test]
    fn test_encode_simplifies_and_skips_waypoints() {
        let routes = vec![
            GpxRoute {
                name: "A".to_string(),
                waypoints: vec![Point::new(48.0, 16.0)],
                geometry: (0..50).map(|i| Point::new(48.0, 16.0 + 0.001 * i as f64)).collect(),
            },
            GpxRoute {
                name: "B".to_string(),
                ..Default::default()
            },
        ];

        let text = encode(&routes, false, 0.0001).unwrap();
        let gpx = gpx::read(text.as_bytes()).unwrap();

        assert_eq!(gpx.tracks.len(), 2);
        assert_eq!(gpx.tracks[0].segments[0].points.len(), 2);
        assert!(gpx.waypoints.is_empty());
    }

    #[test]
    fn test_encode_rejects_bad_coordinates() {
        let routes = vec![GpxRoute {
            name: "Broken".to_string(),
            waypoints: vec![],
            geometry: vec![Point::new(95.0, 16.0), Point::new(f64::NAN, 16.0)],
        }];
        assert!(matches!(
            encode(&routes, false, 0.0),
            Err(Error::InvalidGpx(_))
        ));
    }
}
