//! Heatmap Viewer - Application Library
//!
//! Hosts the synchronization core from `heatmap-sync` in an eframe window: a slippy map,
//! a heatmap overlay drawn as a map plugin, an HTTP transport and a sidebar for datasets,
//! statistics and settings.

mod app;
mod entrypoints;

pub use app::HeatmapViewerApp;
pub use entrypoints::APP_NAME;

#[cfg(not(target_arch = "wasm32"))]
pub use entrypoints::run_native;

#[cfg(target_arch = "wasm32")]
pub use entrypoints::web::WebHandle;
