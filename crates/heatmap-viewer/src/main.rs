#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result {
    heatmap_viewer::run_native()
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // On web the app is started from JavaScript through `WebHandle`
}
