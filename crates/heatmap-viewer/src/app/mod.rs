//! Application module
//!
//! This module provides the main application structure:
//! - Full-screen map view with the heatmap drawn as a plugin
//! - Toggleable sidebar with tabs (Data and Settings)
//! - Viewport tracking that feeds the synchronization controller
//! - Responsive layout (sidebar from bottom on portrait displays)

mod overlay;
mod plugin;
pub(crate) mod settings;
mod state;
mod transport;
mod ui_panels;
mod viewport;

use crate::app::plugin::{HeatmapPlugin, MeasuredViewport};
use crate::app::settings::Settings;
use crate::app::state::{AppState, SidebarTab, UiSettings};
use crate::app::viewport::Observation;
use eframe::egui;
use heatmap_sync::{DatasetId, SyncConfig};
use std::sync::Arc;
use tokio::sync::RwLock;
use walkers::{HttpTiles, Map, MapMemory, sources::OpenStreetMap};

/// Zoom shown before the server tells us where the data is
const INITIAL_MAP_ZOOM: f64 = 6.0;

/// Persisted settings (lightweight, no heatmap data)
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct PersistedSettings {
    dataset: DatasetId,
    opacity: f32,
    sidebar_open: bool,
    active_tab: String,
}

impl PersistedSettings {
    fn ui_settings(&self) -> UiSettings {
        UiSettings {
            opacity: self.opacity.clamp(0.05, 1.0),
            sidebar_open: self.sidebar_open,
            active_tab: match self.active_tab.as_str() {
                "Settings" => SidebarTab::Settings,
                _ => SidebarTab::Data,
            },
        }
    }
}

/// Main application structure
pub struct HeatmapViewerApp {
    /// Controller, transport and UI settings
    state: AppState,

    /// Map tiles provider (OpenStreetMap)
    tiles: HttpTiles,

    /// Map state (camera position, zoom, etc.)
    map_memory: MapMemory,

    /// Show help overlay
    show_help: bool,

    /// Viewport measured by the plugin during the last frame
    probe: Arc<RwLock<Option<MeasuredViewport>>>,
}

impl HeatmapViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let cli_args = Settings::from_cli();

        let persisted = if cli_args.ignore_persisted {
            tracing::info!("Ignoring persisted state (--ignore-persisted flag)");
            None
        } else {
            cc.storage.and_then(Self::load_persisted_settings)
        };

        // Command line options take priority over persisted ones
        let mut ui_settings = persisted
            .as_ref()
            .map(PersistedSettings::ui_settings)
            .unwrap_or_default();
        if let Some(opacity) = cli_args.opacity {
            ui_settings.opacity = opacity.clamp(0.05, 1.0);
        }
        let dataset = cli_args
            .dataset
            .or(persisted.as_ref().map(|p| p.dataset))
            .unwrap_or_else(|| SyncConfig::default().default_dataset);

        let state = AppState::new(&cli_args, dataset, ui_settings, Some(cc.egui_ctx.clone()));
        let tiles = HttpTiles::new(OpenStreetMap, cc.egui_ctx.clone());

        let mut map_memory = MapMemory::default();
        let _ = map_memory.set_zoom(INITIAL_MAP_ZOOM);

        Self {
            state,
            tiles,
            map_memory,
            show_help: false,
            probe: Arc::new(RwLock::new(None)),
        }
    }

    /// Load persisted settings from storage
    fn load_persisted_settings(storage: &dyn eframe::Storage) -> Option<PersistedSettings> {
        let json = storage.get_string("persisted_settings")?;
        match serde_json::from_str::<PersistedSettings>(&json) {
            Ok(settings) => {
                tracing::info!("Restored settings, dataset {}", settings.dataset);
                Some(settings)
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable persisted settings: {}", e);
                None
            }
        }
    }

    /// Move the camera to an extent requested by the controller
    fn apply_pending_fit(&mut self) {
        if let Some((extent, zoom)) = self.state.layer.take_fit() {
            let center = extent.to_data_projection().center();
            self.map_memory
                .center_at(walkers::lat_lon(center.y(), center.x()));
            let _ = self.map_memory.set_zoom(zoom as f64);
            tracing::debug!(
                "Moved map to ({:.4}, {:.4}) at zoom {}",
                center.y(),
                center.x(),
                zoom
            );
        }
    }

    /// Keep the camera inside the configured zoom range
    fn clamp_map_zoom(&mut self) {
        let config = self.state.controller.config();
        let (min, max) = (config.min_zoom as f64, config.max_zoom as f64);
        let zoom = self.map_memory.zoom();
        if zoom < min {
            let _ = self.map_memory.set_zoom(min);
        } else if zoom > max + 0.5 {
            let _ = self.map_memory.set_zoom(max);
        }
    }
}

#[profiling::all_functions]
impl eframe::App for HeatmapViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = instant::Instant::now();

        // Handle keyboard shortcuts
        ctx.input(|i| {
            if i.key_pressed(egui::Key::F1) {
                self.show_help = !self.show_help;
            }
            if i.key_pressed(egui::Key::H) && i.modifiers.ctrl {
                self.show_help = !self.show_help;
            }
        });
        if ctx.input(|i| i.key_pressed(egui::Key::F5)) {
            self.state.refresh(now);
        }

        // Responses first, so a fit requested by them is applied this frame
        self.state.process_responses(now);
        self.apply_pending_fit();

        if self.show_help {
            ui_panels::help_overlay(ctx, &mut self.show_help);
        }

        ui_panels::render_sidebar(ctx, &mut self.state);

        let plugin = HeatmapPlugin::new(
            self.state.layer.current(),
            self.state.ui_settings.opacity,
            self.probe.clone(),
        );

        // Central panel: Map view (full screen)
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                profiling::scope!("map_panel");

                let map = Map::new(
                    Some(&mut self.tiles),
                    &mut self.map_memory,
                    walkers::lat_lon(45.9, 24.9),
                )
                .with_plugin(plugin);
                ui.add(map);

                ui_panels::sidebar_toggle_button(ui, &mut self.state);

                let painter = ui.painter();
                let screen_rect = ui.max_rect();
                painter.text(
                    screen_rect.center_bottom() + egui::vec2(0.0, -5.0),
                    egui::Align2::CENTER_BOTTOM,
                    "© OpenStreetMap contributors",
                    egui::FontId::proportional(10.0),
                    egui::Color32::from_black_alpha(180),
                );
            });

        self.clamp_map_zoom();

        // Use try_read for non-blocking UI polling.
        let measured = self.probe.try_read().ok().and_then(|probe| *probe);
        if let Some(measured) = measured {
            let observation = self
                .state
                .tracker
                .observe(measured.state, measured.interacting);
            if observation == Observation::Moving {
                // Keep frames coming until the view settles
                ctx.request_repaint();
            }
        }

        self.state.start(now);
        self.state.pump(now);
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let settings = PersistedSettings {
            dataset: self.state.controller.active_dataset(),
            opacity: self.state.ui_settings.opacity,
            sidebar_open: self.state.ui_settings.sidebar_open,
            active_tab: format!("{:?}", self.state.ui_settings.active_tab),
        };

        if let Ok(json) = serde_json::to_string(&settings) {
            storage.set_string("persisted_settings", json);
            tracing::debug!("Saved settings on exit");
        }
    }
}
