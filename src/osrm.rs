//! Client for OSRM-compatible routing servers.
//!
//! Only the `nearest` and `route` services are used. Round trips go through
//! `route` with the start appended, as `trip` reorders waypoints.

use crate::geometry::flatten_polyline_coordinates;
use crate::{Error, Point};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

/// Routing profile used for every request
pub const PROFILE: &str = "cycling";

/// Default per-request waypoint ceiling
pub const DEFAULT_MAX_WAYPOINTS: usize = 250;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A computed route, as returned by the routing server.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeometry {
    /// The rideable path, in order
    pub coordinates: Vec<Point>,

    /// Total length in meters
    pub distance_meters: f64,
}

/// Something that can snap points to roads and route between them.
pub trait RoutingBackend {
    /// Find the nearest routable point, or `None` if that is not possible
    /// for any reason.
    fn snap_to_nearest_road(&self, point: &Point) -> Option<Point>;

    /// Route through `points` in the given order.
    ///
    /// With `round_trip` the route returns to the first point afterwards.
    fn compute_route(&self, points: &[Point], round_trip: bool) -> Result<RouteGeometry, Error>;
}

#[derive(Debug, Deserialize)]
struct NearestResponse {
    code: String,
    #[serde(default)]
    waypoints: Vec<NearestWaypoint>,
}

#[derive(Debug, Deserialize)]
struct NearestWaypoint {
    location: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: serde_json::Value,
}

/// A client for an OSRM server
pub struct Osrm {
    client: Client,
    base_url: Url,
    max_waypoints: usize,
    timeout: Duration,
}

impl Osrm {
    /// Create a new OSRM client with the given base URL
    pub fn new(base_url: &str) -> Result<Self, Error> {
        // Url::join replaces the last path segment unless there is a trailing slash
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("invalid routing base URL {:?}: {}", base_url, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "routing base URL {} cannot hold a path",
                base_url
            )));
        }

        Ok(Osrm {
            client: Client::new(),
            base_url,
            max_waypoints: DEFAULT_MAX_WAYPOINTS,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Create a client from the routing section of the configuration
    pub fn from_config(config: &crate::config::RoutingConfig) -> Result<Self, Error> {
        Ok(Self::new(&config.base_url)?
            .with_max_waypoints(config.max_waypoints)
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    /// Set the per-request waypoint ceiling
    pub fn with_max_waypoints(mut self, max_waypoints: usize) -> Self {
        self.max_waypoints = max_waypoints;
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The per-request waypoint ceiling
    pub fn max_waypoints(&self) -> usize {
        self.max_waypoints
    }

    /// URL of the nearest-road query for `point`
    pub fn nearest_url(&self, point: &Point) -> Url {
        let mut url = self
            .base_url
            .join(&format!(
                "nearest/v1/{}/{},{}",
                PROFILE,
                point.lon(),
                point.lat()
            ))
            .expect("coordinates always form a valid relative URL");
        url.query_pairs_mut().append_pair("number", "1");
        url
    }

    /// URL of the route query through `coordinates`
    pub fn route_url(&self, coordinates: &[Point]) -> Url {
        let lon_lat_strings: Vec<String> = coordinates
            .iter()
            .map(|p| format!("{},{}", p.lon(), p.lat()))
            .collect();

        let mut url = self
            .base_url
            .join(&format!("route/v1/{}/{}", PROFILE, lon_lat_strings.join(";")))
            .expect("coordinates always form a valid relative URL");

        url.query_pairs_mut()
            .append_pair("overview", "full")
            .append_pair("geometries", "geojson")
            .append_pair("steps", "false");
        url
    }

    fn fetch_nearest(&self, point: &Point) -> Result<Option<Point>, Error> {
        let url = self.nearest_url(point);
        debug!("Snapping {:?} via {}", point, url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()?
            .error_for_status()?;

        Ok(parse_nearest_response(&response.text()?))
    }
}

impl RoutingBackend for Osrm {
    fn snap_to_nearest_road(&self, point: &Point) -> Option<Point> {
        if !point.is_finite() {
            return None;
        }

        match self.fetch_nearest(point) {
            Ok(snapped) => snapped,
            Err(e) => {
                warn!("Snapping {:?} failed, using it unsnapped: {}", point, e);
                None
            }
        }
    }

    fn compute_route(&self, points: &[Point], round_trip: bool) -> Result<RouteGeometry, Error> {
        if points.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "need at least 2 points to route, got {}",
                points.len()
            )));
        }

        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "non-finite coordinate {:?}",
                bad
            )));
        }

        let coordinates = route_coordinates(points, round_trip);
        if coordinates.len() > self.max_waypoints {
            return Err(Error::InvalidInput(format!(
                "{} waypoints exceed the server limit of {}",
                coordinates.len(),
                self.max_waypoints
            )));
        }

        info!("Planning route along {:?}", coordinates);

        let url = self.route_url(&coordinates);
        debug!("Requesting {}", url);

        let response = self.client.get(url).timeout(self.timeout).send()?;
        let success = response.status().is_success();
        let text = response.text()?;

        parse_route_response(success, &text)
    }
}

/// The coordinate list sent to the server for `points`.
///
/// Round trips with at least three points get the first point appended, so
/// the ordinary route service returns to the start without reordering. With
/// fewer points the list is sent unchanged.
pub fn route_coordinates(points: &[Point], round_trip: bool) -> Vec<Point> {
    let mut coordinates = points.to_vec();
    if round_trip && points.len() >= 3 {
        coordinates.push(points[0]);
    }
    coordinates
}

/// Extract the snapped location from a `nearest` response body.
pub fn parse_nearest_response(body: &str) -> Option<Point> {
    let response: NearestResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            debug!("Malformed nearest response: {}", e);
            return None;
        }
    };

    if response.code != "Ok" {
        debug!("Nearest query answered {}", response.code);
        return None;
    }

    let location = &response.waypoints.first()?.location;
    match location.as_slice() {
        [lon, lat, ..] if lon.is_finite() && lat.is_finite() => Some(Point::new(*lat, *lon)),
        _ => None,
    }
}

/// Turn a `route` response body into a [`RouteGeometry`].
///
/// `success` is whether the HTTP status was 2xx.
pub fn parse_route_response(success: bool, body: &str) -> Result<RouteGeometry, Error> {
    let response: RouteResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(_) if !success => {
            return Err(Error::Routing {
                code: "HTTP".to_string(),
                message: body.chars().take(200).collect(),
            })
        }
        Err(e) => return Err(Error::InvalidResponse(e.to_string())),
    };

    match response.code.as_str() {
        "Ok" if success => {}
        "NoRoute" => return Err(Error::NoRouteFound),
        _ => {
            return Err(Error::Routing {
                code: response.code,
                message: response.message.unwrap_or_default(),
            })
        }
    }

    let route = response.routes.into_iter().next().ok_or(Error::NoRouteFound)?;

    let coordinates = flatten_polyline_coordinates(&route.geometry.coordinates);
    if coordinates.len() < 2 {
        return Err(Error::InvalidResponse(format!(
            "route geometry has {} coordinates",
            coordinates.len()
        )));
    }

    if !route.distance.is_finite() || route.distance < 0.0 {
        return Err(Error::InvalidResponse(format!(
            "route distance {} is not usable",
            route.distance
        )));
    }

    Ok(RouteGeometry {
        coordinates,
        distance_meters: route.distance,
    })
}
