//! Configuration: where to route and where map tiles come from.
//!
//! ```json
//! {
//!   "routing": { "baseUrl": "https://router.project-osrm.org/" },
//!   "tiles": { "kind": "hosted", "apiKey": "0123abcd" }
//! }
//! ```
//!
//! Nothing works without a usable configuration, so every problem is
//! reported as [`Error::Config`] before anything else starts.

use crate::osrm::{DEFAULT_MAX_WAYPOINTS, DEFAULT_TIMEOUT};
use crate::Error;
use lazy_regex::regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Map style used by the hosted tile source when none is configured
pub const DEFAULT_HOSTED_STYLE: &str = "cycle";

/// The whole configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// The routing server
    pub routing: RoutingConfig,

    /// The tile image source
    pub tiles: TileSource,
}

/// Routing server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    /// Base URL of the OSRM server
    pub base_url: String,

    /// Most coordinates the server accepts in one request
    #[serde(default = "default_max_waypoints")]
    pub max_waypoints: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_waypoints() -> usize {
    DEFAULT_MAX_WAYPOINTS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Where map tiles are loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TileSource {
    /// A hosted tile service that needs an API key
    Hosted {
        /// The API key
        #[serde(rename = "apiKey")]
        api_key: String,

        /// Map style, e.g. `cycle` or `outdoors`
        #[serde(default)]
        style: Option<String>,
    },

    /// A tile server of our own
    SelfHosted {
        /// URL template with `{z}`, `{x}` and `{y}`
        url: String,
    },
}

impl TileSource {
    /// The tile URL template with `{z}`, `{x}` and `{y}` placeholders
    pub fn url_template(&self) -> String {
        match self {
            TileSource::Hosted { api_key, style } => format!(
                "https://tile.thunderforest.com/{}/{{z}}/{{x}}/{{y}}.png?apikey={}",
                style.as_deref().unwrap_or(DEFAULT_HOSTED_STYLE),
                api_key
            ),
            TileSource::SelfHosted { url } => url.clone(),
        }
    }

    /// URL of one tile
    pub fn tile_url(&self, z: u32, x: u32, y: u32) -> String {
        self.url_template()
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

impl Config {
    /// Parse and validate a configuration document
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let config: Config =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// The tile URL template of the configured source
    pub fn tile_url_template(&self) -> String {
        self.tiles.url_template()
    }

    /// Check for missing, placeholder or unusable values
    pub fn validate(&self) -> Result<(), Error> {
        check_not_placeholder("routing.baseUrl", &self.routing.base_url)?;
        crate::osrm::Osrm::new(&self.routing.base_url)?;

        if self.routing.max_waypoints < 2 {
            return Err(Error::Config(format!(
                "routing.maxWaypoints must be at least 2, got {}",
                self.routing.max_waypoints
            )));
        }

        match &self.tiles {
            TileSource::Hosted { api_key, .. } => check_not_placeholder("tiles.apiKey", api_key),
            TileSource::SelfHosted { url } => {
                check_not_placeholder("tiles.url", url)?;
                if !(url.contains("{z}") && url.contains("{x}") && url.contains("{y}")) {
                    return Err(Error::Config(format!(
                        "tiles.url {:?} needs {{z}}, {{x}} and {{y}}",
                        url
                    )));
                }
                Ok(())
            }
        }
    }
}

fn check_not_placeholder(field: &str, value: &str) -> Result<(), Error> {
    if regex!(r"^\s*$|^<.*>$|your[_\-\s]?(api[_\-\s]?)?(key|url|server)|changeme|placeholder|^x{3,}$"i)
        .is_match(value)
    {
        return Err(Error::Config(format!(
            "{} is not set (found {:?})",
            field, value
        )));
    }
    Ok(())
}
