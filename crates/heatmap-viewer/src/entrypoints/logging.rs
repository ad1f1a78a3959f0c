//! Logging setup for native and web builds
//!
//! Native builds log through a `tracing-subscriber` fmt layer filtered by `RUST_LOG`
//! (with a sensible default). Web builds log to the browser console through `tracing-wasm`,
//! with the level taken from the `envLOG_LEVEL` GET parameter.

/// Default filter when `RUST_LOG` is not set
#[cfg(not(target_arch = "wasm32"))]
fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug,eframe::native=warn,hyper_util=info,walkers=info,egui::context=warn,reqwest::connect=info"
    } else {
        "info,eframe::native=warn,egui::context=warn"
    }
}

/// Initialize the global tracing subscriber for desktop builds.
#[cfg(not(target_arch = "wasm32"))]
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));
    let result = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    if result.is_ok() && std::env::var("RUST_LOG").is_err() {
        tracing::info!("RUST_LOG not set, using default filter: {}", default_filter());
    }
}

/// Initialize the browser console subscriber and panic hook for web builds.
#[cfg(target_arch = "wasm32")]
pub fn setup_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_wasm::WASMLayerConfigBuilder;

    let max_level = super::cli::get_env::<String>("LOG_LEVEL")
        .and_then(|level| parse_level(&level))
        .unwrap_or_else(default_level);

    let mut builder = WASMLayerConfigBuilder::new();
    builder.set_max_level(max_level);
    let _ = tracing_subscriber::registry()
        .with(tracing_wasm::WASMLayer::new(builder.build()))
        .try_init();

    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
}

/// Level used when none is configured
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub fn default_level() -> tracing::Level {
    if cfg!(debug_assertions) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    }
}

/// Parse a case-insensitive level name
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub fn parse_level(level: &str) -> Option<tracing::Level> {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level(" Warn "), Some(tracing::Level::WARN));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    #[cfg(not(target_arch = "wasm32"))]
    fn test_default_filter_mentions_noisy_crates() {
        assert!(default_filter().contains("egui::context=warn"));
    }
}
