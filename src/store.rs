//! Named routes kept in durable storage.
//!
//! All records live as one JSON array under [`SAVED_ROUTES_KEY`]; every
//! operation reads the whole list, changes it and writes it back.

use crate::draft::RouteDraft;
use crate::storage::Storage;
use crate::{Error, Point};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Storage key holding every saved route
pub const SAVED_ROUTES_KEY: &str = "route-planner.saved-routes";

/// A route the user saved under a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRoute {
    /// Unique id, assigned on creation
    pub id: String,

    /// Unique name
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// The waypoints, not the computed path
    pub points: Vec<Point>,

    /// Length when it was saved, in meters
    #[serde(default)]
    pub distance_meters: f64,

    /// Whether the route returns to its first point
    #[serde(default)]
    pub is_round_trip: bool,

    /// When the record was created
    pub created_timestamp: DateTime<Utc>,
}

/// Everything about a route except its identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteDetails {
    /// Name to save under
    pub name: String,
    /// Free-form description
    pub description: String,
    /// The waypoints
    pub points: Vec<Point>,
    /// Length in meters
    pub distance_meters: f64,
    /// Whether the route returns to its first point
    pub is_round_trip: bool,
}

impl RouteDetails {
    /// Capture the current state of a draft
    pub fn from_draft(draft: &RouteDraft, name: &str, description: &str) -> Self {
        RouteDetails {
            name: name.to_string(),
            description: description.to_string(),
            points: draft.points().to_vec(),
            distance_meters: draft.distance_meters(),
            is_round_trip: draft.is_round_trip(),
        }
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    /// Records added to the store
    pub imported: usize,
    /// Records that were invalid or whose name clash was not confirmed
    pub skipped: usize,
}

/// Saved routes on top of a [`Storage`].
#[derive(Debug)]
pub struct RouteStore<S: Storage> {
    storage: S,
}

impl<S: Storage> RouteStore<S> {
    /// Use `storage` for saved routes
    pub fn new(storage: S) -> Self {
        RouteStore { storage }
    }

    /// The underlying storage
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// All saved routes, oldest first. Unreadable data counts as empty.
    pub fn list(&self) -> Vec<SavedRoute> {
        let raw = match self.storage.get(SAVED_ROUTES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Could not read saved routes: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(routes) => routes,
            Err(e) => {
                warn!("Saved routes are corrupt, ignoring them: {}", e);
                Vec::new()
            }
        }
    }

    /// The saved route with the given id
    pub fn get(&self, id: &str) -> Option<SavedRoute> {
        self.list().into_iter().find(|r| r.id == id)
    }

    /// Save a new route.
    ///
    /// If the name is taken, `confirm_overwrite` is asked with the existing
    /// record; on yes that record is replaced by the new one (which gets a
    /// new id), on no nothing changes and [`Error::DuplicateName`] is
    /// returned.
    pub fn save<F>(&mut self, details: RouteDetails, confirm_overwrite: F) -> Result<SavedRoute, Error>
    where
        F: FnOnce(&SavedRoute) -> bool,
    {
        let name = validate_name(&details.name)?;
        let mut routes = self.list();

        if let Some(pos) = routes.iter().position(|r| r.name == name) {
            if !confirm_overwrite(&routes[pos]) {
                return Err(Error::DuplicateName(name));
            }
            routes.remove(pos);
        }

        let route = SavedRoute {
            id: Uuid::new_v4().to_string(),
            name,
            description: details.description,
            points: details.points,
            distance_meters: details.distance_meters,
            is_round_trip: details.is_round_trip,
            created_timestamp: Utc::now(),
        };
        routes.push(route.clone());
        self.write(&routes)?;

        info!("Saved route {:?} as {}", route.name, route.id);
        Ok(route)
    }

    /// Overwrite the fields of an existing route, keeping its id.
    pub fn update(&mut self, id: &str, details: RouteDetails) -> Result<SavedRoute, Error> {
        let name = validate_name(&details.name)?;
        let mut routes = self.list();
        let pos = find(&routes, id)?;
        ensure_name_free(&routes, &name, id)?;

        let route = &mut routes[pos];
        route.name = name;
        route.description = details.description;
        route.points = details.points;
        route.distance_meters = details.distance_meters;
        route.is_round_trip = details.is_round_trip;
        let updated = route.clone();

        self.write(&routes)?;
        Ok(updated)
    }

    /// Give a route a new name.
    ///
    /// If another route already has the name, `confirm_overwrite` is asked
    /// with that route; on yes it is deleted, on no nothing changes and
    /// [`Error::DuplicateName`] is returned.
    pub fn rename<F>(&mut self, id: &str, new_name: &str, confirm_overwrite: F) -> Result<SavedRoute, Error>
    where
        F: FnOnce(&SavedRoute) -> bool,
    {
        let name = validate_name(new_name)?;
        let mut routes = self.list();
        find(&routes, id)?;

        if let Some(other) = routes.iter().position(|r| r.name == name && r.id != id) {
            if !confirm_overwrite(&routes[other]) {
                return Err(Error::DuplicateName(name));
            }
            let replaced = routes.remove(other);
            info!("Replacing route {:?} ({})", replaced.name, replaced.id);
        }

        let pos = find(&routes, id)?;
        routes[pos].name = name;
        let renamed = routes[pos].clone();

        self.write(&routes)?;
        Ok(renamed)
    }

    /// Delete a route.
    pub fn delete(&mut self, id: &str) -> Result<SavedRoute, Error> {
        let mut routes = self.list();
        let pos = find(&routes, id)?;
        let removed = routes.remove(pos);
        self.write(&routes)?;
        info!("Deleted route {:?}", removed.name);
        Ok(removed)
    }

    /// Pretty-printed JSON array of the routes with the given ids.
    ///
    /// Unknown ids are left out.
    pub fn export_selected(&self, ids: &[&str]) -> Result<String, Error> {
        let selected: Vec<SavedRoute> = self
            .list()
            .into_iter()
            .filter(|r| ids.contains(&r.id.as_str()))
            .collect();

        serde_json::to_string_pretty(&selected)
            .map_err(|e| Error::Storage(format!("could not serialize routes: {}", e)))
    }

    /// Add the routes from an exported JSON document.
    ///
    /// Every imported route gets a fresh id. Entries without a name or a
    /// list of points are skipped. Name clashes are handled like
    /// [`RouteStore::save`], except that a refused overwrite skips the entry.
    pub fn import_from<F>(&mut self, document: &str, mut confirm_overwrite: F) -> Result<ImportSummary, Error>
    where
        F: FnMut(&SavedRoute) -> bool,
    {
        let entries: Vec<Value> = match serde_json::from_str(document) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => return Err(Error::InvalidImport("expected a JSON array".to_string())),
            Err(e) => return Err(Error::InvalidImport(e.to_string())),
        };

        let mut routes = self.list();
        let mut summary = ImportSummary::default();

        for entry in &entries {
            let Some(route) = parse_import_entry(entry) else {
                warn!("Skipping malformed route in import");
                summary.skipped += 1;
                continue;
            };

            if let Some(pos) = routes.iter().position(|r| r.name == route.name) {
                if !confirm_overwrite(&routes[pos]) {
                    summary.skipped += 1;
                    continue;
                }
                routes.remove(pos);
            }

            routes.push(route);
            summary.imported += 1;
        }

        if summary.imported > 0 {
            self.write(&routes)?;
        }

        info!(
            "Imported {} routes, skipped {}",
            summary.imported, summary.skipped
        );
        Ok(summary)
    }

    fn write(&mut self, routes: &[SavedRoute]) -> Result<(), Error> {
        let json = serde_json::to_string(routes)
            .map_err(|e| Error::Storage(format!("could not serialize routes: {}", e)))?;

        self.storage.set(SAVED_ROUTES_KEY, &json).map_err(|e| {
            error!("Could not write saved routes: {}", e);
            e
        })
    }
}

fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("route name is empty".to_string()));
    }
    Ok(name.to_string())
}

fn find(routes: &[SavedRoute], id: &str) -> Result<usize, Error> {
    routes
        .iter()
        .position(|r| r.id == id)
        .ok_or_else(|| Error::RouteNotFound(id.to_string()))
}

fn ensure_name_free(routes: &[SavedRoute], name: &str, id: &str) -> Result<(), Error> {
    if routes.iter().any(|r| r.name == name && r.id != id) {
        return Err(Error::DuplicateName(name.to_string()));
    }
    Ok(())
}

// Foreign ids are never trusted; missing optional fields get defaults.
fn parse_import_entry(entry: &Value) -> Option<SavedRoute> {
    let name = entry.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let points = entry
        .get("points")?
        .as_array()?
        .iter()
        .map(|p| {
            serde_json::from_value::<Point>(p.clone())
                .ok()
                .filter(Point::is_finite)
        })
        .collect::<Option<Vec<Point>>>()?;

    let created_timestamp = entry
        .get("createdTimestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(SavedRoute {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        points,
        distance_meters: entry
            .get("distanceMeters")
            .and_then(Value::as_f64)
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(0.0),
        is_round_trip: entry
            .get("isRoundTrip")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        created_timestamp,
    })
}
