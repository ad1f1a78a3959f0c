//! Turns per-frame map measurements into move-end events
//!
//! The map widget is measured every frame. A viewport only counts as changed once the
//! user has stopped interacting and two consecutive frames agree, which is the
//! equivalent of a move-end/zoom-end event.

use heatmap_sync::{DatasetId, ViewportEvent, ViewportEventSource, ViewportState};
use std::collections::VecDeque;

/// Relative tolerance when comparing extents between frames
const EXTENT_EPSILON: f64 = 1e-9;

/// Result of feeding one measurement to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The view came to rest somewhere new and an event was queued
    Settled,
    /// The view is still moving (or the user is still interacting)
    Moving,
    /// Nothing changed since the last reported viewport
    Unchanged,
}

/// Event queue fed by the map plugin and drained by the controller
#[derive(Debug, Default)]
pub struct ViewportTracker {
    events: VecDeque<ViewportEvent>,
    previous: Option<ViewportState>,
    reported: Option<ViewportState>,
}

impl ViewportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the viewport measured this frame
    pub fn observe(&mut self, state: ViewportState, interacting: bool) -> Observation {
        let previous = self.previous.replace(state);
        if interacting {
            return Observation::Moving;
        }
        if !previous.is_some_and(|p| same_viewport(&p, &state)) {
            return Observation::Moving;
        }
        if self.reported.is_some_and(|r| same_viewport(&r, &state)) {
            return Observation::Unchanged;
        }
        self.reported = Some(state);
        self.events.push_back(ViewportEvent::ViewportChanged(state));
        Observation::Settled
    }

    /// Queue a dataset switch chosen in the UI
    pub fn dataset_changed(&mut self, dataset: DatasetId) {
        self.events.push_back(ViewportEvent::DatasetChanged(dataset));
    }
}

impl ViewportEventSource for ViewportTracker {
    fn poll_event(&mut self) -> Option<ViewportEvent> {
        self.events.pop_front()
    }
}

fn same_viewport(a: &ViewportState, b: &ViewportState) -> bool {
    let close = |x: f64, y: f64| (x - y).abs() <= EXTENT_EPSILON * x.abs().max(y.abs()).max(1.0);
    a.extent.zoom == b.extent.zoom
        && a.extent.projection == b.extent.projection
        && close(a.extent.west, b.extent.west)
        && close(a.extent.south, b.extent.south)
        && close(a.extent.east, b.extent.east)
        && close(a.extent.north, b.extent.north)
        && a.pixel_size == b.pixel_size
}
