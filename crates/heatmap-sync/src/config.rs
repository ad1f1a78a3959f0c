//! Synchronization settings

use crate::geodesy::{METERS_PER_DEGREE_LATITUDE, meters_to_latitude_degrees};
use crate::{DatasetId, RadiusScaler};
use instant::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default point radius on the ground, in meters
pub const DEFAULT_POINT_RADIUS_METERS: f64 = 30.0;

/// Configuration for a [`crate::ViewportController`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Server base URL; query strings are appended to it verbatim
    pub base_url: String,

    /// Lowest zoom the map may show and the handshake covers
    pub min_zoom: u8,

    /// Highest zoom the map may show and the handshake covers
    pub max_zoom: u8,

    /// Minimum gap between two unforced fetches
    #[serde(
        rename = "rate_limit_ms",
        serialize_with = "serialize_millis",
        deserialize_with = "deserialize_millis"
    )]
    pub rate_limit: Duration,

    /// Dataset activated at startup
    pub default_dataset: DatasetId,

    /// Point radius in degrees of latitude when a payload carries none
    pub default_radius: f64,

    pub radius: RadiusScaler,

    /// Fit the map to the first data of each activated dataset
    pub auto_center: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            min_zoom: 5,
            max_zoom: 14,
            rate_limit: Duration::from_millis(500),
            default_dataset: DatasetId::Ro,
            default_radius: meters_to_latitude_degrees(DEFAULT_POINT_RADIUS_METERS),
            radius: RadiusScaler::default(),
            auto_center: true,
        }
    }
}

impl SyncConfig {
    /// Bound `zoom` to `[min_zoom, max_zoom]`
    #[inline]
    pub fn clamp_zoom(&self, zoom: u8) -> u8 {
        zoom.clamp(self.min_zoom, self.max_zoom.max(self.min_zoom))
    }

    /// Zoom levels covered by the initialization handshake, ascending
    pub fn zoom_levels(&self) -> impl Iterator<Item = u8> {
        self.min_zoom..=self.max_zoom
    }

    /// Default radius converted back to meters
    pub fn default_radius_meters(&self) -> f64 {
        self.default_radius * METERS_PER_DEGREE_LATITUDE
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}
