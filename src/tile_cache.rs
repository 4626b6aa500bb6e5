//! Cache of map tile images in durable storage.
//!
//! Tiles are stored as data URLs keyed by their request URL, all in one JSON
//! object under [`TILE_CACHE_KEY`]. Entries expire after a maximum age, and
//! when the stored data grows past a size ceiling the oldest fifth of the
//! entries is dropped. A cache that can't be read or written behaves as if
//! it were empty.

use crate::storage::Storage;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage key holding the tile cache
pub const TILE_CACHE_KEY: &str = "route-planner.tile-cache";

/// Default lifetime of a cached tile, in days
pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// Default ceiling on stored data URL bytes
pub const DEFAULT_MAX_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedTile {
    data_url: String,
    // Milliseconds since the Unix epoch
    timestamp: i64,
}

type Entries = BTreeMap<String, CachedTile>;

/// Tile images cached on top of a [`Storage`].
#[derive(Debug)]
pub struct TileCache<S: Storage> {
    storage: S,
    max_age: Duration,
    max_bytes: usize,
}

impl<S: Storage> TileCache<S> {
    /// Cache tiles in `storage` with the default limits
    pub fn new(storage: S) -> Self {
        TileCache {
            storage,
            max_age: Duration::days(DEFAULT_MAX_AGE_DAYS),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Set how long a tile stays valid
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the ceiling on stored bytes
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Number of cached tiles, including expired ones not yet dropped
    pub fn len(&self) -> usize {
        self.load().len()
    }

    /// Whether the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cached data URL for `url`, if present and not expired
    pub fn get(&mut self, url: &str) -> Option<String> {
        self.get_at(url, Utc::now())
    }

    /// Cache `data_url` as the image for `url`
    pub fn put(&mut self, url: &str, data_url: &str) {
        self.put_at(url, data_url, Utc::now())
    }

    /// Drop every cached tile
    pub fn clear(&mut self) {
        if let Err(e) = self.storage.remove(TILE_CACHE_KEY) {
            warn!("Could not clear tile cache: {}", e);
        }
    }

    fn get_at(&mut self, url: &str, now: DateTime<Utc>) -> Option<String> {
        let mut entries = self.load();
        let tile = entries.get(url)?;

        if now.timestamp_millis() - tile.timestamp > self.max_age.num_milliseconds() {
            debug!("Tile {} expired", url);
            entries.remove(url);
            self.store(&entries);
            return None;
        }

        Some(tile.data_url.clone())
    }

    fn put_at(&mut self, url: &str, data_url: &str, now: DateTime<Utc>) {
        let mut entries = self.load();
        entries.insert(
            url.to_string(),
            CachedTile {
                data_url: data_url.to_string(),
                timestamp: now.timestamp_millis(),
            },
        );

        let total: usize = entries.values().map(|t| t.data_url.len()).sum();
        if total > self.max_bytes {
            evict_oldest(&mut entries);
        }

        self.store(&entries);
    }

    fn load(&self) -> Entries {
        match self.storage.get(TILE_CACHE_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Tile cache is corrupt, starting over: {}", e);
                Entries::new()
            }),
            Ok(None) => Entries::new(),
            Err(e) => {
                warn!("Could not read tile cache: {}", e);
                Entries::new()
            }
        }
    }

    fn store(&mut self, entries: &Entries) {
        let json = match serde_json::to_string(entries) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize tile cache: {}", e);
                return;
            }
        };

        if let Err(e) = self.storage.set(TILE_CACHE_KEY, &json) {
            warn!("Could not write tile cache: {}", e);
        }
    }
}

// Removes the oldest 20% of entries, at least one.
fn evict_oldest(entries: &mut Entries) {
    let mut by_age: Vec<(i64, String)> = entries
        .iter()
        .map(|(url, tile)| (tile.timestamp, url.clone()))
        .collect();
    by_age.sort();

    let count = (entries.len() / 5).max(1);
    debug!("Evicting {} of {} cached tiles", count, entries.len());
    for (_, url) in by_age.into_iter().take(count) {
        entries.remove(&url);
    }
}
