//! Cold-cache initialization handshake
//!
//! When the server answers a raster fetch with a cold-cache signal, the client
//! tells it which bounding box every zoom level will show for the dataset, so
//! the server can precompute its rasters. The handshake runs at most once at a
//! time per dataset; completion is acknowledged by the server.

use crate::geodesy::extent_at_zoom;
use crate::{DatasetId, Extent, RequestScheduler, SyncConfig};
use std::collections::BTreeSet;
use std::fmt::Write;

/// The `(zoom, bbox)` list sent to warm the server caches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializationRequest {
    pub dataset: DatasetId,
    /// One entry per zoom level, ascending
    pub levels: Vec<(u8, String)>,
}

impl InitializationRequest {
    /// Flatten into `"z,w,s,e,n,z,w,s,e,n,...,"`; every pair ends with a comma
    pub fn to_query_value(&self) -> String {
        let mut out = String::new();
        for (zoom, bbox) in &self.levels {
            // Writing to a String cannot fail
            let _ = write!(out, "{zoom},{bbox},");
        }
        out
    }
}

/// Tracks which datasets have a handshake outstanding
#[derive(Debug, Clone, Default)]
pub struct InitializationHandshake {
    outstanding: BTreeSet<DatasetId>,
}

impl InitializationHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_outstanding(&self, dataset: DatasetId) -> bool {
        self.outstanding.contains(&dataset)
    }

    /// Build the initialization request for `dataset`
    ///
    /// Scheduling is suspended while the per-zoom extents are computed and
    /// resumed before returning. Returns `None` without touching the scheduler
    /// when a handshake for the same dataset is still outstanding.
    pub fn begin(
        &mut self,
        dataset: DatasetId,
        bounds: &Extent,
        viewport_px: (f64, f64),
        scheduler: &mut RequestScheduler,
        config: &SyncConfig,
    ) -> Option<InitializationRequest> {
        if self.outstanding.contains(&dataset) {
            tracing::debug!(
                "Initialization for {} already outstanding, ignoring cold-cache signal",
                dataset
            );
            return None;
        }

        scheduler.suspend();

        let center = bounds.to_data_projection().center();
        let levels = config
            .zoom_levels()
            .map(|zoom| (zoom, extent_at_zoom(center, zoom, viewport_px).to_bbox_string()))
            .collect::<Vec<_>>();

        scheduler.resume();

        self.outstanding.insert(dataset);
        tracing::info!(
            "Starting initialization of {} over {} zoom levels",
            dataset,
            levels.len()
        );
        Some(InitializationRequest { dataset, levels })
    }

    /// Record the server's acknowledgment; returns whether one was outstanding
    pub fn complete(&mut self, dataset: DatasetId) -> bool {
        let was_outstanding = self.outstanding.remove(&dataset);
        if was_outstanding {
            tracing::info!("Initialization of {} complete", dataset);
        } else {
            tracing::debug!("Unexpected initialization acknowledgment for {}", dataset);
        }
        was_outstanding
    }

    /// Give up on an outstanding handshake, e.g. after a transport failure
    pub fn abandon(&mut self, dataset: DatasetId) {
        if self.outstanding.remove(&dataset) {
            tracing::warn!("Initialization of {} abandoned", dataset);
        }
    }
}
