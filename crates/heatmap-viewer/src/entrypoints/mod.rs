//! Platform entry points: CLI/URL parsing, logging and the native/web launchers

pub(crate) mod cli;
pub(crate) mod logging;

#[cfg(target_arch = "wasm32")]
pub mod web;

/// Application name, used for the window title and logs
pub const APP_NAME: &str = "Heatmap Viewer";

/// Run the application on native (desktop) platforms.
///
/// Network requests are spawned on the tokio runtime entered here, so the
/// eframe event loop runs inside `block_on`.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_native() -> eframe::Result {
    logging::setup_logging();
    tracing::info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    rt.block_on(async {
        let native_options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([1280.0, 720.0])
                .with_title(APP_NAME),
            ..Default::default()
        };

        eframe::run_native(
            APP_NAME,
            native_options,
            Box::new(|cc| Ok(Box::new(crate::app::HeatmapViewerApp::new(cc)))),
        )
    })
}
