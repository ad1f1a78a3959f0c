use crate::entrypoints::cli::parse_args;
use clap::Parser;
use heatmap_sync::{DatasetId, SyncConfig};
use instant::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Heatmap Viewer - An interactive map that keeps a heatmap in sync with the visible area
pub struct Settings {
    /// Base URL of the heatmap server
    #[clap(short, long, default_value = "http://localhost:8080/")]
    pub server: String,

    /// Dataset shown on startup (ro, de, at, ch)
    #[clap(short, long)]
    pub dataset: Option<DatasetId>,

    /// Lowest zoom level requested from the server
    #[clap(long, default_value = "5")]
    pub min_zoom: u8,

    /// Highest zoom level requested from the server
    #[clap(long, default_value = "14")]
    pub max_zoom: u8,

    /// Minimum time between two viewport fetches, in milliseconds
    #[clap(long, default_value = "500")]
    pub rate_limit_ms: u64,

    /// Heatmap opacity (0.0-1.0)
    #[clap(long)]
    pub opacity: Option<f32>,

    /// Do not re-center the map on the first data of a dataset
    #[clap(long, default_value = "false")]
    pub no_auto_center: bool,

    /// Ignore previously persisted state and start fresh
    #[clap(long, default_value = "false")]
    pub ignore_persisted: bool,
}

impl Settings {
    /// Parse settings from the command line (or GET parameters on web)
    pub fn from_cli() -> Self {
        match parse_args::<Settings>() {
            Ok(args) => args,
            Err(e) => {
                #[cfg(not(target_arch = "wasm32"))]
                e.exit();
                #[cfg(target_arch = "wasm32")]
                {
                    let user_msg = format!(
                        "Error parsing CLI:\n{}\n
    You should change the GET params, using the cli prefix.\n
    Starting anyway without args.",
                        e
                    );
                    if let Some(window) = web_sys::window() {
                        window.alert_with_message(&user_msg).unwrap_or(());
                    } else {
                        tracing::error!(user_msg);
                    }
                    Settings::parse_from(Vec::<String>::new())
                }
            }
        }
    }

    /// Build the synchronization config, with `dataset` as the startup dataset
    pub fn to_sync_config(&self, dataset: DatasetId) -> SyncConfig {
        SyncConfig {
            base_url: self.server.clone(),
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom.max(self.min_zoom),
            rate_limit: Duration::from_millis(self.rate_limit_ms),
            default_dataset: dataset,
            auto_center: !self.no_auto_center,
            ..Default::default()
        }
    }
}
