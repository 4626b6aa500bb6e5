#![deny(missing_docs)]
//! Route planning core for OSRM-compatible cycle routing.
//!
//! The crate keeps an ordered list of user-placed waypoints, asks an OSRM
//! server for a rideable path through them, and persists or exchanges the
//! result as saved routes or GPX.
//!
//! Example usage:
//!
//! ```rust,no_run
//! use route_planner::{Osrm, Point, RouteDraft};
//!
//! let osrm = Osrm::new("https://router.project-osrm.org/").unwrap();
//! let mut draft = RouteDraft::new();
//!
//! draft.add_point(&osrm, Point::new(52.5200, 13.4050));
//! draft.add_point(&osrm, Point::new(52.5163, 13.3777));
//!
//! println!("{} m", draft.distance_meters());
//! ```

use serde::{Deserialize, Serialize};

pub mod codec;
pub mod config;
pub mod drag;
pub mod draft;
pub mod geometry;
pub mod osrm;
pub mod storage;
pub mod store;
pub mod tile_cache;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use drag::Editor;
pub use draft::{DraftObserver, Marker, RouteDraft, RouteState};
pub use osrm::{Osrm, RouteGeometry, RoutingBackend};
pub use storage::{MemoryStorage, Storage};
pub use store::{RouteStore, SavedRoute};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// A point with latitude and longitude
pub struct Point {
    /// Latitude
    lat: f64,

    /// Longitude
    lon: f64,
}

impl From<geo_types::Point> for Point {
    fn from(p: geo_types::Point<f64>) -> Self {
        Point {
            lat: p.y(),
            lon: p.x(),
        }
    }
}

impl From<Point> for geo_types::Point<f64> {
    fn from(p: Point) -> Self {
        geo_types::Point::new(p.lon, p.lat)
    }
}

impl From<Point> for geo_types::Coord<f64> {
    fn from(p: Point) -> Self {
        geo_types::Coord { x: p.lon, y: p.lat }
    }
}

impl From<geo_types::Coord<f64>> for Point {
    fn from(c: geo_types::Coord<f64>) -> Self {
        Point { lat: c.y, lon: c.x }
    }
}

impl Point {
    /// Create a new point with the given latitude and longitude
    pub fn new(lat: f64, lon: f64) -> Self {
        Point { lat, lon }
    }

    /// Return the latitude of the point
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Return the longitude of the point
    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Whether both coordinates are finite numbers
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

#[derive(Debug)]
/// An error that can occur while planning, storing or exchanging routes
pub enum Error {
    /// The input to an operation was rejected before anything was changed
    InvalidInput(String),

    /// An error that occurs when the HTTP request fails
    Http(reqwest::Error),

    /// The routing server answered with an error
    Routing {
        /// The OSRM status code, e.g. `NoSegment`
        code: String,

        /// Human readable message from the server
        message: String,
    },

    /// The routing server found no route between the points
    NoRouteFound,

    /// The routing server sent something we could not understand
    InvalidResponse(String),

    /// An error that occurs when the GPX file is invalid
    InvalidGpx(String),

    /// The configuration is missing fields or still holds placeholders
    Config(String),

    /// Reading or writing durable storage failed
    Storage(String),

    /// No saved route with the given id exists
    RouteNotFound(String),

    /// Another saved route already uses this name
    DuplicateName(String),

    /// An import document could not be read at all
    InvalidImport(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidInput(s) => write!(f, "Invalid input: {}", s),
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Routing { code, message } => write!(f, "Routing error {}: {}", code, message),
            Error::NoRouteFound => write!(f, "No route found"),
            Error::InvalidResponse(s) => write!(f, "Invalid response: {}", s),
            Error::InvalidGpx(s) => write!(f, "Invalid GPX: {}", s),
            Error::Config(s) => write!(f, "Configuration error: {}", s),
            Error::Storage(s) => write!(f, "Storage error: {}", s),
            Error::RouteNotFound(id) => write!(f, "No saved route with id {}", id),
            Error::DuplicateName(name) => write!(f, "A route named {:?} already exists", name),
            Error::InvalidImport(s) => write!(f, "Invalid import: {}", s),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}
