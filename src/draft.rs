//! The route being edited: an ordered list of waypoints and the route
//! computed through them.
//!
//! Every change to the waypoint list bumps a generation counter. A route
//! request remembers the generation it was built for, and its response is
//! only applied if nothing changed in the meantime, so a slow response can
//! never overwrite the route of a newer waypoint list.

use crate::geometry::{
    cumulative_distances, distance_point_to_segment, fit_view, project_point_onto_polyline,
    ViewFit,
};
use crate::osrm::{RouteGeometry, RoutingBackend};
use crate::store::SavedRoute;
use crate::{Error, Point};
use log::{debug, warn};

/// Where a draft is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// No points
    Empty,
    /// One point; nothing to route yet
    Incomplete,
    /// Geometry and distance match the current points
    Routed,
    /// The points changed since the last successful route
    Stale,
}

/// A numbered marker for one waypoint.
///
/// Labels are 1-based positions, not stable ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// 1-based position in the route
    pub label: usize,
    /// Where the marker sits
    pub point: Point,
}

/// Receives updates whenever a [`RouteDraft`] changes.
pub trait DraftObserver {
    /// The waypoint list changed; markers are renumbered.
    fn on_points_changed(&mut self, markers: &[Marker]);

    /// A route computation finished or the route was cleared.
    fn on_route_updated(&mut self, geometry: Option<&RouteGeometry>, distance_meters: f64);

    /// The map should move to show the route.
    fn on_view_fit(&mut self, _fit: &ViewFit) {}
}

/// A route request captured from a draft at a given generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    /// Generation of the draft when the request was built
    pub generation: u64,
    /// Points to route through, all finite, at least two
    pub points: Vec<Point>,
    /// Whether the route returns to the first point
    pub round_trip: bool,
}

/// The single route under construction.
#[derive(Default)]
pub struct RouteDraft {
    points: Vec<Point>,
    is_round_trip: bool,
    distance_meters: f64,
    loaded_route_id: Option<String>,
    is_modified: bool,
    geometry: Option<RouteGeometry>,
    generation: u64,
    routed_generation: Option<u64>,
    observers: Vec<Box<dyn DraftObserver>>,
}

impl std::fmt::Debug for RouteDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDraft")
            .field("points", &self.points)
            .field("is_round_trip", &self.is_round_trip)
            .field("distance_meters", &self.distance_meters)
            .field("loaded_route_id", &self.loaded_route_id)
            .field("is_modified", &self.is_modified)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .finish()
    }
}

impl RouteDraft {
    /// Create an empty draft
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for point and route updates
    pub fn subscribe(&mut self, observer: Box<dyn DraftObserver>) {
        self.observers.push(observer);
    }

    /// The waypoints in visit order
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Whether the route returns to its first point
    pub fn is_round_trip(&self) -> bool {
        self.is_round_trip
    }

    /// Length of the last computed route in meters
    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    /// Id of the saved route this draft came from
    pub fn loaded_route_id(&self) -> Option<&str> {
        self.loaded_route_id.as_deref()
    }

    /// Whether the draft changed since it was loaded, saved or reset
    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    /// The displayed route geometry, possibly from before the last change
    pub fn geometry(&self) -> Option<&RouteGeometry> {
        self.geometry.as_ref()
    }

    /// The mutation counter
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current lifecycle state
    pub fn state(&self) -> RouteState {
        match self.points.len() {
            0 => RouteState::Empty,
            1 => RouteState::Incomplete,
            _ if self.routed_generation == Some(self.generation) => RouteState::Routed,
            _ => RouteState::Stale,
        }
    }

    /// One marker per waypoint, numbered from 1
    pub fn markers(&self) -> Vec<Marker> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, point)| Marker {
                label: i + 1,
                point: *point,
            })
            .collect()
    }

    /// Append a point, snapped to the road network when possible.
    pub fn add_point<B: RoutingBackend + ?Sized>(&mut self, backend: &B, raw: Point) {
        let point = snap_or_raw(backend, raw);
        self.points.push(point);
        self.points_changed();
        self.recompute(backend);
    }

    /// Remove the point at `index`. Out of range is a no-op returning false.
    pub fn remove_point<B: RoutingBackend + ?Sized>(&mut self, backend: &B, index: usize) -> bool {
        if index >= self.points.len() {
            return false;
        }
        self.points.remove(index);
        self.points_changed();
        self.recompute(backend);
        true
    }

    /// Replace the point at `index` with `raw`, snapped when possible.
    pub fn move_point<B: RoutingBackend + ?Sized>(
        &mut self,
        backend: &B,
        index: usize,
        raw: Point,
    ) -> bool {
        if index >= self.points.len() {
            return false;
        }
        self.points[index] = snap_or_raw(backend, raw);
        self.points_changed();
        self.recompute(backend);
        true
    }

    /// Insert `drop` where `anchor` sits along the route.
    ///
    /// `anchor` is where a drag out of the route line started and only picks
    /// the position; the inserted coordinate is `drop`, snapped when
    /// possible. Needs at least two points. Returns the insertion index.
    pub fn insert_at_best_position<B: RoutingBackend + ?Sized>(
        &mut self,
        backend: &B,
        drop: Point,
        anchor: Point,
        geometry: Option<&[Point]>,
    ) -> Option<usize> {
        if self.points.len() < 2 {
            return None;
        }
        let index = best_insert_index(&self.points, &anchor, geometry, self.is_round_trip);
        self.insert_at(backend, index, drop);
        Some(index)
    }

    /// Like [`RouteDraft::insert_at_best_position`], using the geometry
    /// currently displayed.
    pub fn insert_on_current_route<B: RoutingBackend + ?Sized>(
        &mut self,
        backend: &B,
        drop: Point,
        anchor: Point,
    ) -> Option<usize> {
        if self.points.len() < 2 {
            return None;
        }
        let geometry = self.geometry.as_ref().map(|g| g.coordinates.as_slice());
        let index = best_insert_index(&self.points, &anchor, geometry, self.is_round_trip);
        self.insert_at(backend, index, drop);
        Some(index)
    }

    fn insert_at<B: RoutingBackend + ?Sized>(&mut self, backend: &B, index: usize, drop: Point) {
        let point = snap_or_raw(backend, drop);
        self.points.insert(index, point);
        self.points_changed();
        self.recompute(backend);
    }

    /// Forget everything, including which saved route this was.
    pub fn reset_route(&mut self) {
        self.points.clear();
        self.loaded_route_id = None;
        self.is_modified = false;
        self.generation += 1;
        self.notify_points();
        self.clear_route();
    }

    /// Replace the draft with a copy of a saved route and recompute it.
    pub fn load_route<B: RoutingBackend + ?Sized>(&mut self, backend: &B, saved: &SavedRoute) {
        self.points = saved.points.clone();
        self.distance_meters = saved.distance_meters;
        self.is_round_trip = saved.is_round_trip;
        self.loaded_route_id = Some(saved.id.clone());
        self.geometry = None;
        self.routed_generation = None;
        self.generation += 1;
        self.notify_points();
        self.emit_view_fit();

        self.recompute(backend);
        self.is_modified = false;
    }

    /// Replace the points with `points` as they are, e.g. from an imported
    /// file, and recompute.
    ///
    /// The result is a new, unsaved route.
    pub fn replace_points<B: RoutingBackend + ?Sized>(&mut self, backend: &B, points: Vec<Point>) {
        self.points = points;
        self.loaded_route_id = None;
        self.geometry = None;
        self.routed_generation = None;
        self.points_changed();
        self.emit_view_fit();
        self.recompute(backend);
    }

    /// Switch between a one-way route and a round trip.
    pub fn toggle_round_trip<B: RoutingBackend + ?Sized>(&mut self, backend: &B) {
        self.is_round_trip = !self.is_round_trip;
        self.generation += 1;
        self.is_modified = true;
        self.recompute(backend);
    }

    /// Record that the draft was written to the store under `id`.
    pub fn mark_saved(&mut self, id: &str) {
        self.loaded_route_id = Some(id.to_string());
        self.is_modified = false;
    }

    /// Build the route request for the current points.
    ///
    /// Returns `None`, and clears the route, when fewer than two finite
    /// points remain.
    pub fn begin_recompute(&mut self) -> Option<RouteRequest> {
        let points: Vec<Point> = self.points.iter().copied().filter(Point::is_finite).collect();
        if points.len() < 2 {
            self.clear_route();
            return None;
        }

        Some(RouteRequest {
            generation: self.generation,
            points,
            round_trip: self.is_round_trip,
        })
    }

    /// Apply the outcome of a route request.
    ///
    /// Returns false if the draft changed after the request was built, in
    /// which case the outcome is dropped.
    pub fn finish_recompute(
        &mut self,
        generation: u64,
        result: Result<RouteGeometry, Error>,
    ) -> bool {
        if generation != self.generation {
            debug!(
                "Ignoring route for generation {}, draft is at {}",
                generation, self.generation
            );
            return false;
        }

        match result {
            Ok(geometry) => {
                self.distance_meters = geometry.distance_meters;
                self.geometry = Some(geometry);
                self.routed_generation = Some(generation);
                self.notify_route();
            }
            Err(e) => {
                warn!("Route computation failed: {}", e);
                self.clear_route();
            }
        }
        true
    }

    /// Recompute the route synchronously.
    pub fn recompute<B: RoutingBackend + ?Sized>(&mut self, backend: &B) {
        if let Some(request) = self.begin_recompute() {
            let result = backend.compute_route(&request.points, request.round_trip);
            self.finish_recompute(request.generation, result);
        }
    }

    fn emit_view_fit(&mut self) {
        if let Some(fit) = fit_view(&self.points) {
            for observer in self.observers.iter_mut() {
                observer.on_view_fit(&fit);
            }
        }
    }

    fn points_changed(&mut self) {
        self.generation += 1;
        self.is_modified = true;
        self.notify_points();
    }

    fn clear_route(&mut self) {
        self.geometry = None;
        self.distance_meters = 0.0;
        self.routed_generation = None;
        self.notify_route();
    }

    fn notify_points(&mut self) {
        let markers = self.markers();
        for observer in self.observers.iter_mut() {
            observer.on_points_changed(&markers);
        }
    }

    fn notify_route(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.on_route_updated(self.geometry.as_ref(), self.distance_meters);
        }
    }
}

fn snap_or_raw<B: RoutingBackend + ?Sized>(backend: &B, raw: Point) -> Point {
    backend.snap_to_nearest_road(&raw).unwrap_or(raw)
}

/// Index at which a point grabbed at `anchor` belongs in `points`.
///
/// With a route geometry of at least two coordinates, every waypoint and the
/// anchor are placed by their distance along the route, and the anchor goes
/// into the gap between consecutive waypoints that contains it (the gap
/// after the last waypoint wraps to the first). This follows the drawn path
/// even where it loops back near itself. Without geometry the anchor goes
/// after the start of the nearest straight segment between waypoints.
pub fn best_insert_index(
    points: &[Point],
    anchor: &Point,
    geometry: Option<&[Point]>,
    round_trip: bool,
) -> usize {
    if let Some(coords) = geometry.filter(|c| c.len() >= 2) {
        if let Some(index) = insert_index_along_polyline(points, anchor, coords) {
            return index;
        }
    }
    insert_index_nearest_segment(points, anchor, round_trip)
}

fn insert_index_along_polyline(points: &[Point], anchor: &Point, coords: &[Point]) -> Option<usize> {
    let cumulative = cumulative_distances(coords);
    let total = *cumulative.last()?;

    let positions = points
        .iter()
        .map(|p| project_point_onto_polyline(p, coords, &cumulative).map(|r| r.distance_along_path))
        .collect::<Option<Vec<f64>>>()?;
    let target = project_point_onto_polyline(anchor, coords, &cumulative)?.distance_along_path;

    let m = positions.len();
    if m == 0 {
        return None;
    }

    let mut shortest: Option<(usize, f64)> = None;
    for i in 0..m {
        let start = positions[i];
        let end = positions[(i + 1) % m];

        let (length, contains) = if start <= end {
            (end - start, start < target && target < end)
        } else {
            (total - start + end, target > start || target < end)
        };

        if contains {
            return Some(i + 1);
        }
        if shortest.map_or(true, |(_, l)| length < l) {
            shortest = Some((i, length));
        }
    }

    shortest.map(|(i, _)| i + 1)
}

fn insert_index_nearest_segment(points: &[Point], anchor: &Point, round_trip: bool) -> usize {
    let m = points.len();
    let pairs = if round_trip { m } else { m.saturating_sub(1) };

    (0..pairs)
        .map(|i| {
            let d = distance_point_to_segment(anchor, &points[i], &points[(i + 1) % m]);
            (i, d)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map_or(m, |(i, _)| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osrm::route_coordinates;
    use crate::testing::FakeBackend;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn pt(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon)
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Points(Vec<usize>),
        Route(Option<usize>, f64),
        Fit(ViewFit),
    }

    struct Recorder(Rc<RefCell<Vec<Event>>>);

    impl DraftObserver for Recorder {
        fn on_points_changed(&mut self, markers: &[Marker]) {
            self.0
                .borrow_mut()
                .push(Event::Points(markers.iter().map(|m| m.label).collect()));
        }

        fn on_route_updated(&mut self, geometry: Option<&RouteGeometry>, distance_meters: f64) {
            self.0.borrow_mut().push(Event::Route(
                geometry.map(|g| g.coordinates.len()),
                distance_meters,
            ));
        }

        fn on_view_fit(&mut self, fit: &ViewFit) {
            self.0.borrow_mut().push(Event::Fit(*fit));
        }
    }

    fn draft_with(backend: &FakeBackend, points: &[Point]) -> RouteDraft {
        let mut draft = RouteDraft::new();
        for p in points {
            draft.add_point(backend, *p);
        }
        draft
    }

    fn saved(points: Vec<Point>, round_trip: bool) -> SavedRoute {
        SavedRoute {
            id: "saved-1".to_string(),
            name: "Loop".to_string(),
            description: String::new(),
            points,
            distance_meters: 4321.0,
            is_round_trip: round_trip,
            created_timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_single_point_is_incomplete() {
        let backend = FakeBackend::default();
        let mut draft = RouteDraft::new();
        assert_eq!(draft.state(), RouteState::Empty);

        draft.add_point(&backend, pt(0.0, 0.0));

        assert_eq!(draft.state(), RouteState::Incomplete);
        assert_eq!(draft.distance_meters(), 0.0);
        assert_eq!(backend.snaps.borrow().len(), 1);
        assert_eq!(backend.route_calls(), 0);
    }

    #[test]
    fn test_two_points_are_routed() {
        let backend = FakeBackend::default();
        let draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0)]);

        assert_eq!(backend.route_calls(), 1);
        assert_eq!(backend.routes.borrow()[0], vec![pt(0.0, 0.0), pt(0.0, 1.0)]);
        assert_eq!(draft.state(), RouteState::Routed);
        assert_eq!(draft.distance_meters(), 1000.0);
        assert_eq!(
            draft.geometry().unwrap().coordinates,
            vec![pt(0.0, 0.0), pt(0.0, 1.0)]
        );
    }

    #[test]
    fn test_round_trip_keeps_order_and_returns_to_start() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0), pt(1.0, 1.0)]);
        draft.toggle_round_trip(&backend);

        assert!(draft.is_round_trip());
        assert_eq!(
            backend.routes.borrow().last().unwrap(),
            &vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(1.0, 1.0), pt(0.0, 0.0)]
        );
        assert_eq!(draft.distance_meters(), 3000.0);
    }

    #[test]
    fn test_snapped_point_is_stored() {
        let backend = FakeBackend::snapping(0.5);
        let draft = draft_with(&backend, &[pt(0.0, 0.0)]);
        assert_eq!(draft.points(), &[pt(0.5, 0.0)]);
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0), pt(0.0, 2.0)]);
        let generation = draft.generation();

        assert!(!draft.remove_point(&backend, 5));
        assert_eq!(draft.points().len(), 3);
        assert_eq!(draft.generation(), generation);
    }

    #[test]
    fn test_remove_renumbers_markers() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0), pt(0.0, 2.0)]);
        let events = Rc::new(RefCell::new(Vec::new()));
        draft.subscribe(Box::new(Recorder(events.clone())));

        assert!(draft.remove_point(&backend, 0));

        let markers = draft.markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].label, 1);
        assert_eq!(markers[0].point, pt(0.0, 1.0));
        assert_eq!(
            *events.borrow(),
            vec![Event::Points(vec![1, 2]), Event::Route(Some(2), 1000.0)]
        );
    }

    #[test]
    fn test_removing_down_to_one_point_clears_route() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0)]);
        draft.remove_point(&backend, 1);

        assert_eq!(draft.state(), RouteState::Incomplete);
        assert_eq!(draft.distance_meters(), 0.0);
        assert!(draft.geometry().is_none());
    }

    #[test]
    fn test_move_point_snaps_and_recomputes() {
        let backend = FakeBackend::snapping(0.25);
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0)]);

        assert!(draft.move_point(&backend, 1, pt(2.0, 2.0)));
        assert_eq!(draft.points()[1], pt(2.25, 2.0));
        assert_eq!(backend.route_calls(), 2);
        assert!(!draft.move_point(&backend, 9, pt(2.0, 2.0)));
    }

    #[test]
    fn test_failed_route_clears_geometry() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0)]);
        assert_eq!(draft.state(), RouteState::Routed);

        backend.fail.set(true);
        draft.add_point(&backend, pt(0.0, 2.0));

        assert_eq!(draft.state(), RouteState::Stale);
        assert_eq!(draft.distance_meters(), 0.0);
        assert!(draft.geometry().is_none());
        assert_eq!(draft.points().len(), 3);
    }

    #[test]
    fn test_late_response_is_ignored() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0), pt(0.0, 2.0)]);

        let request = draft.begin_recompute().unwrap();
        // A newer change lands before the first response
        draft.remove_point(&backend, 2);
        let current = draft.geometry().cloned();

        let late = RouteGeometry {
            coordinates: request.points.clone(),
            distance_meters: 99.0,
        };
        assert!(!draft.finish_recompute(request.generation, Ok(late)));
        assert_eq!(draft.geometry().cloned(), current);
        assert_eq!(draft.distance_meters(), 1000.0);
        assert_eq!(draft.state(), RouteState::Routed);
    }

    #[test]
    fn test_mutation_marks_stale_until_finished() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 1.0)]);
        draft.points.push(pt(0.0, 2.0));
        draft.points_changed();
        assert_eq!(draft.state(), RouteState::Stale);

        let request = draft.begin_recompute().unwrap();
        let result = backend.compute_route(&request.points, request.round_trip);
        assert!(draft.finish_recompute(request.generation, result));
        assert_eq!(draft.state(), RouteState::Routed);
    }

    #[test]
    fn test_request_skips_non_finite_points() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0)]);
        draft.add_point(&backend, pt(f64::NAN, 1.0));
        assert_eq!(backend.route_calls(), 0);

        draft.add_point(&backend, pt(0.0, 2.0));
        assert_eq!(backend.routes.borrow()[0], vec![pt(0.0, 0.0), pt(0.0, 2.0)]);
    }

    #[test]
    fn test_insert_follows_route_geometry() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(1.0, 0.0), pt(2.0, 0.0)]);

        // After the second waypoint the path swings east and comes back
        // close to the first leg before heading to the third waypoint.
        let geometry = vec![
            pt(0.0, 0.0),
            pt(1.0, 0.0),
            pt(1.0, 3.0),
            pt(0.5, 3.0),
            pt(0.5, 0.2),
            pt(2.0, 0.2),
            pt(2.0, 0.0),
        ];
        let anchor = pt(0.5, 1.5);

        // Straight-line distance alone would pick the first leg
        assert_eq!(best_insert_index(draft.points(), &anchor, None, false), 1);

        let index = draft
            .insert_at_best_position(&backend, pt(0.7, 1.6), anchor, Some(&geometry))
            .unwrap();
        assert_eq!(index, 2);
        assert_eq!(draft.points()[2], pt(0.7, 1.6));
        assert_eq!(draft.points().len(), 4);
    }

    #[test]
    fn test_insert_uses_snapped_drop_not_anchor() {
        let backend = FakeBackend::snapping(0.01);
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0), pt(0.0, 2.0), pt(0.0, 4.0)]);

        let index = draft
            .insert_on_current_route(&backend, pt(1.0, 3.0), pt(0.0, 3.0))
            .unwrap();
        assert_eq!(index, 2);
        assert_eq!(draft.points()[2], pt(1.01, 3.0));
        assert!(!draft.points().contains(&pt(0.0, 3.0)));
    }

    #[test]
    fn test_insert_needs_two_points() {
        let backend = FakeBackend::default();
        let mut draft = draft_with(&backend, &[pt(0.0, 0.0)]);
        assert_eq!(
            draft.insert_at_best_position(&backend, pt(1.0, 1.0), pt(1.0, 1.0), None),
            None
        );
        assert_eq!(draft.points().len(), 1);
    }

    #[test]
    fn test_insert_on_return_leg_of_round_trip() {
        let points = vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(1.0, 1.0)];
        let geometry = route_coordinates(&points, true);
        // Halfway back from the last point to the start
        let anchor = pt(0.5, 0.5);
        assert_eq!(best_insert_index(&points, &anchor, Some(&geometry), true), 3);
    }

    #[test]
    fn test_nearest_segment_wraps_only_for_round_trip() {
        let points = vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(1.0, 1.0)];
        let anchor = pt(0.6, 0.45);
        assert_eq!(best_insert_index(&points, &anchor, None, true), 3);
        assert_eq!(best_insert_index(&points, &anchor, None, false), 2);
    }

    #[test]
    fn test_degenerate_geometry_falls_back_to_shortest_gap() {
        let points = vec![pt(0.0, 0.0), pt(0.0, 0.0)];
        let geometry = vec![pt(0.0, 0.0), pt(0.0, 1.0)];
        assert_eq!(
            best_insert_index(&points, &pt(0.0, 0.0), Some(&geometry), false),
            1
        );
    }

    #[test]
    fn test_short_geometry_uses_nearest_segment() {
        let points = vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(0.0, 2.0)];
        let geometry = vec![pt(0.0, 0.0)];
        assert_eq!(
            best_insert_index(&points, &pt(0.1, 1.5), Some(&geometry), false),
            2
        );
    }

    #[test]
    fn test_load_route_copies_and_recomputes() {
        let backend = FakeBackend::default();
        let mut draft = RouteDraft::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        draft.subscribe(Box::new(Recorder(events.clone())));

        let route = saved(vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(1.0, 1.0)], true);
        draft.load_route(&backend, &route);

        assert_eq!(draft.points(), route.points.as_slice());
        assert_eq!(draft.loaded_route_id(), Some("saved-1"));
        assert!(!draft.is_modified());
        assert!(draft.is_round_trip());
        assert_eq!(draft.distance_meters(), 3000.0);
        assert_eq!(backend.route_calls(), 1);

        let events = events.borrow();
        assert_eq!(events[0], Event::Points(vec![1, 2, 3]));
        assert!(matches!(
            events[1],
            Event::Fit(ViewFit::Bounds { .. })
        ));
        assert_eq!(events[2], Event::Route(Some(4), 3000.0));
    }

    #[test]
    fn test_load_single_point_centers_view() {
        let backend = FakeBackend::default();
        let mut draft = RouteDraft::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        draft.subscribe(Box::new(Recorder(events.clone())));

        draft.load_route(&backend, &saved(vec![pt(3.0, 4.0)], false));

        assert!(events.borrow().iter().any(|e| matches!(
            e,
            Event::Fit(ViewFit::Center { .. })
        )));
        assert_eq!(backend.route_calls(), 0);
        assert_eq!(draft.state(), RouteState::Incomplete);
    }

    #[test]
    fn test_edits_after_load_mark_modified() {
        let backend = FakeBackend::default();
        let mut draft = RouteDraft::new();
        draft.load_route(&backend, &saved(vec![pt(0.0, 0.0), pt(0.0, 1.0)], false));
        assert!(!draft.is_modified());

        draft.add_point(&backend, pt(0.0, 2.0));
        assert!(draft.is_modified());

        draft.mark_saved("saved-2");
        assert!(!draft.is_modified());
        assert_eq!(draft.loaded_route_id(), Some("saved-2"));
    }

    #[test]
    fn test_replace_points_keeps_raw_points() {
        let backend = FakeBackend::snapping(0.5);
        let mut draft = RouteDraft::new();
        draft.load_route(&backend, &saved(vec![pt(0.0, 0.0), pt(0.0, 1.0)], false));
        let events = Rc::new(RefCell::new(Vec::new()));
        draft.subscribe(Box::new(Recorder(events.clone())));

        draft.replace_points(&backend, vec![pt(5.0, 5.0), pt(5.0, 6.0), pt(6.0, 6.0)]);

        assert_eq!(draft.points(), &[pt(5.0, 5.0), pt(5.0, 6.0), pt(6.0, 6.0)]);
        assert!(backend.snaps.borrow().is_empty());
        assert_eq!(draft.loaded_route_id(), None);
        assert!(draft.is_modified());
        assert_eq!(draft.state(), RouteState::Routed);
        assert!(events
            .borrow()
            .iter()
            .any(|e| matches!(e, Event::Fit(ViewFit::Bounds { .. }))));
    }

    #[test]
    fn test_round_trip_set_up_before_points_routes_once() {
        let backend = FakeBackend::default();
        let mut draft = RouteDraft::new();

        draft.toggle_round_trip(&backend);
        assert_eq!(backend.route_calls(), 0);

        draft.replace_points(&backend, vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(1.0, 1.0)]);

        assert_eq!(backend.route_calls(), 1);
        assert_eq!(
            backend.routes.borrow()[0],
            vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(1.0, 1.0), pt(0.0, 0.0)]
        );
        assert_eq!(draft.state(), RouteState::Routed);
    }

    #[test]
    fn test_reset_route() {
        let backend = FakeBackend::default();
        let mut draft = RouteDraft::new();
        draft.load_route(&backend, &saved(vec![pt(0.0, 0.0), pt(0.0, 1.0)], false));
        draft.add_point(&backend, pt(0.0, 2.0));

        draft.reset_route();

        assert_eq!(draft.state(), RouteState::Empty);
        assert!(draft.points().is_empty());
        assert!(draft.geometry().is_none());
        assert_eq!(draft.distance_meters(), 0.0);
        assert_eq!(draft.loaded_route_id(), None);
        assert!(!draft.is_modified());
    }

    #[test]
    fn test_toggle_round_trip_marks_modified() {
        let backend = FakeBackend::default();
        let mut draft = RouteDraft::new();
        draft.load_route(&backend, &saved(vec![pt(0.0, 0.0), pt(0.0, 1.0)], false));

        draft.toggle_round_trip(&backend);

        assert!(draft.is_modified());
        // Two points: routed as given, nothing appended
        assert_eq!(
            backend.routes.borrow().last().unwrap(),
            &vec![pt(0.0, 0.0), pt(0.0, 1.0)]
        );
    }
}
