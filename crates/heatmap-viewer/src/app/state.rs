//! Application state management
//!
//! This module owns the viewport controller together with the pieces it talks to:
//! the HTTP transport, the heatmap layer and the viewport tracker.

use crate::app::overlay::HeatmapLayer;
use crate::app::settings::Settings;
use crate::app::transport::HttpTransport;
use crate::app::viewport::ViewportTracker;
use heatmap_sync::{DatasetId, ViewportController};
use instant::Instant;

/// Default heatmap opacity
pub const DEFAULT_OPACITY: f32 = 0.7;

/// Main application state
pub struct AppState {
    /// Single owner of all synchronization state
    pub controller: ViewportController,

    /// Sends requests and collects their responses
    pub transport: HttpTransport,

    /// What the map plugin draws
    pub layer: HeatmapLayer,

    /// Move-end detection and event queue
    pub tracker: ViewportTracker,

    /// Current UI settings
    pub ui_settings: UiSettings,

    /// Whether the initial fetch has been issued
    pub started: bool,

    /// Last failure worth showing to the user
    pub last_error: Option<String>,
}

/// UI-specific settings that can be adjusted at runtime
#[derive(Clone)]
pub struct UiSettings {
    /// Heatmap opacity (0.0-1.0)
    pub opacity: f32,

    /// Whether sidebar is open
    pub sidebar_open: bool,

    /// Current active tab in sidebar
    pub active_tab: SidebarTab,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            opacity: DEFAULT_OPACITY,
            sidebar_open: true,
            active_tab: SidebarTab::Data,
        }
    }
}

/// Sidebar tabs
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SidebarTab {
    Data,
    Settings,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        settings: &Settings,
        dataset: DatasetId,
        ui_settings: UiSettings,
        repaint: Option<egui::Context>,
    ) -> Self {
        let config = settings.to_sync_config(dataset);
        let transport = HttpTransport::new(config.base_url.clone(), repaint);
        tracing::info!(
            "Using server {} with dataset {}, zoom {}..={}",
            config.base_url,
            dataset,
            config.min_zoom,
            config.max_zoom
        );

        Self {
            controller: ViewportController::new(config),
            transport,
            layer: HeatmapLayer::new(),
            tracker: ViewportTracker::new(),
            ui_settings,
            started: false,
            last_error: None,
        }
    }

    /// Issue the initial fetch once
    pub fn start(&mut self, now: Instant) {
        if !self.started {
            self.started = true;
            self.controller.start(&mut self.transport, now);
        }
    }

    /// Handle every response that arrived since the last frame, in arrival order
    pub fn process_responses(&mut self, now: Instant) {
        for completion in self.transport.drain() {
            match completion.result {
                Ok(body) => {
                    if let Err(e) = self.controller.handle_response(
                        &completion.request,
                        &body,
                        &mut self.transport,
                        &mut self.layer,
                        now,
                    ) {
                        self.last_error = Some(format!(
                            "Bad {} response: {}",
                            completion.request.kind(),
                            e
                        ));
                    }
                }
                Err(e) => {
                    tracing::warn!("{} request failed: {}", completion.request.kind(), e);
                    self.controller.handle_request_failure(&completion.request);
                    self.last_error =
                        Some(format!("{} request failed: {}", completion.request.kind(), e));
                }
            }
        }
    }

    /// Hand queued viewport and dataset events to the controller
    pub fn pump(&mut self, now: Instant) {
        self.controller
            .pump(&mut self.tracker, &mut self.transport, now);
    }

    /// Switch the displayed dataset
    pub fn select_dataset(&mut self, dataset: DatasetId) {
        if dataset == self.controller.active_dataset() {
            return;
        }
        tracing::info!("Switching dataset to {}", dataset.label());
        self.layer.clear();
        self.last_error = None;
        self.tracker.dataset_changed(dataset);
    }

    /// Re-fetch the visible area, bypassing throttling once
    pub fn refresh(&mut self, now: Instant) {
        self.controller.refresh(&mut self.transport, now);
    }

    /// Whether any request is still waiting for an answer
    pub fn is_loading(&self) -> bool {
        self.transport.in_flight() > 0
    }
}
