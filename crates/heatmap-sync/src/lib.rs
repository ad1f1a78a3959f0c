//! Heatmap Sync - Viewport-Driven Synchronization of Density Overlays
//!
//! This library keeps a heatmap overlay on an interactive map in sync with a remote raster
//! service. It decides when a pan, zoom or dataset change should hit the network, throttles and
//! deduplicates those fetches, runs the server's cold-cache initialization handshake and turns
//! raw responses into display-ready, zoom-stable point clouds.
//!
//! # Architecture
//!
//! - **[`geodesy`]**: Projection conversions, extents, bounding boxes and distances
//! - **[`PointCloud`]** / [`decode`]: Wire payload decoding with zoom-dependent weight scaling
//! - **[`RadiusScaler`]**: On-screen point radius from viewport span and zoom
//! - **[`RequestScheduler`]**: Throttling/deduplication state machine
//! - **[`InitializationHandshake`]**: Zoom-by-zoom bounding-box negotiation for cold caches
//! - **[`protocol`]**: Request URLs and JSONP response parsing
//! - **[`ViewportController`]**: Owns all of the above and reacts to viewport events
//!
//! Everything is single-threaded and driven by the caller: time is passed in as a monotonic
//! [`instant::Instant`], network I/O goes through the [`Transport`] trait and drawing through
//! the [`Overlay`] trait.

mod cloud;
mod config;
mod controller;
mod dataset;
pub mod geodesy;
mod handshake;
pub mod protocol;
mod radius;
mod scheduler;

// Public API exports
pub use cloud::{Datapoints, PointCloud, PointSample, RasterPayload, Scalar, decode, weight_scale};
pub use config::SyncConfig;
pub use controller::{
    ControllerStats, Overlay, OverlayUpdate, Transport, ViewportController, ViewportEvent,
    ViewportEventSource, ViewportState,
};
pub use dataset::{DatasetId, DatasetSelection};
pub use geodesy::{Extent, Projection};
pub use handshake::{InitializationHandshake, InitializationRequest};
pub use protocol::{ColdCacheSignal, DatasetBounds, OutgoingRequest, ServerMessage};
pub use radius::RadiusScaler;
pub use scheduler::{
    Decision, FetchRequest, RejectReason, RequestKey, RequestScheduler, SchedulerState,
    SchedulerStats,
};

/// Error types for the synchronization core
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
