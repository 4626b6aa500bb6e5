//! Test doubles shared by the unit tests.

use crate::osrm::{route_coordinates, RouteGeometry, RoutingBackend};
use crate::{Error, Point};
use std::cell::{Cell, RefCell};

/// Routes in straight lines through the requested coordinates and records
/// every call.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub(crate) snap_shift: Option<f64>,
    pub(crate) fail: Cell<bool>,
    pub(crate) snaps: RefCell<Vec<Point>>,
    pub(crate) routes: RefCell<Vec<Vec<Point>>>,
}

impl FakeBackend {
    /// Snaps every point `shift` degrees north
    pub(crate) fn snapping(shift: f64) -> Self {
        FakeBackend {
            snap_shift: Some(shift),
            ..Default::default()
        }
    }

    pub(crate) fn route_calls(&self) -> usize {
        self.routes.borrow().len()
    }
}

impl RoutingBackend for FakeBackend {
    fn snap_to_nearest_road(&self, point: &Point) -> Option<Point> {
        self.snaps.borrow_mut().push(*point);
        self.snap_shift
            .map(|s| Point::new(point.lat() + s, point.lon()))
    }

    fn compute_route(&self, points: &[Point], round_trip: bool) -> Result<RouteGeometry, Error> {
        let coordinates = route_coordinates(points, round_trip);
        self.routes.borrow_mut().push(coordinates.clone());
        if self.fail.get() {
            return Err(Error::NoRouteFound);
        }
        Ok(RouteGeometry {
            distance_meters: 1000.0 * (coordinates.len() - 1) as f64,
            coordinates,
        })
    }
}
