//! UI panels for the application
//!
//! Sidebar with a Data tab (dataset choice, loading state, synchronization statistics)
//! and a Settings tab, plus the overlaid toggle button and the help window.

use crate::app::state::{AppState, SidebarTab};
use egui::{Color32, RichText, Ui};
use heatmap_sync::DatasetId;
use heatmap_sync::geodesy::latitude_degrees_to_meters;

/// Render the sidebar toggle button (overlaid on top-right of map)
pub fn sidebar_toggle_button(ui: &mut Ui, state: &mut AppState) {
    let button_size = egui::vec2(40.0, 40.0);
    let margin = 10.0;

    let rect = ui.max_rect();
    let button_pos = rect.right_top() + egui::vec2(-button_size.x - margin, margin);
    let button_rect = egui::Rect::from_min_size(button_pos, button_size);

    let response = ui.allocate_rect(button_rect, egui::Sense::click());
    if response.clicked() {
        state.ui_settings.sidebar_open = !state.ui_settings.sidebar_open;
    }

    let bg_color = if response.hovered() {
        ui.visuals().widgets.hovered.bg_fill
    } else {
        ui.visuals().widgets.inactive.bg_fill
    };
    ui.painter().rect_filled(button_rect, 5.0, bg_color);

    let icon = if state.ui_settings.sidebar_open {
        "✕"
    } else {
        "☰"
    };
    ui.painter().text(
        button_rect.center(),
        egui::Align2::CENTER_CENTER,
        icon,
        egui::FontId::proportional(20.0),
        ui.visuals().text_color(),
    );
}

/// Render the main sidebar (responsive: side on landscape, bottom on portrait)
pub fn render_sidebar(ctx: &egui::Context, state: &mut AppState) {
    if !state.ui_settings.sidebar_open {
        return;
    }

    let screen_size = ctx.viewport_rect().size();
    if screen_size.y > screen_size.x {
        egui::TopBottomPanel::bottom("main_sidebar")
            .default_height(260.0)
            .min_height(160.0)
            .max_height(ctx.viewport_rect().height() * 0.6)
            .resizable(true)
            .show(ctx, |ui| render_sidebar_content(ui, state));
    } else {
        egui::SidePanel::right("main_sidebar")
            .default_width(280.0)
            .min_width(240.0)
            .max_width(420.0)
            .resizable(true)
            .show(ctx, |ui| render_sidebar_content(ui, state));
    }
}

fn render_sidebar_content(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui| {
        ui.selectable_value(
            &mut state.ui_settings.active_tab,
            SidebarTab::Data,
            "🔥 Data",
        );
        ui.selectable_value(
            &mut state.ui_settings.active_tab,
            SidebarTab::Settings,
            "⚙ Settings",
        );
    });

    ui.separator();

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui| match state.ui_settings.active_tab {
            SidebarTab::Data => render_data_tab(ui, state),
            SidebarTab::Settings => render_settings_tab(ui, state),
        });
}

/// Render the Data tab
fn render_data_tab(ui: &mut Ui, state: &mut AppState) {
    ui.label(RichText::new("🗺 Dataset").strong());
    ui.add_space(4.0);

    let active = state.controller.active_dataset();
    let mut chosen = None;
    ui.horizontal_wrapped(|ui| {
        for &dataset in DatasetId::all() {
            if ui
                .selectable_label(dataset == active, dataset.label())
                .clicked()
            {
                chosen = Some(dataset);
            }
        }
    });
    if let Some(dataset) = chosen {
        state.select_dataset(dataset);
    }

    ui.add_space(8.0);
    ui.horizontal(|ui| {
        if ui
            .button("🔄 Refresh")
            .on_hover_text("Fetch the visible area again")
            .clicked()
        {
            state.refresh(instant::Instant::now());
        }
        if state.is_loading() {
            ui.spinner();
            ui.label(
                RichText::new(format!("Loading ({})", state.transport.in_flight()))
                    .color(ui.visuals().warn_fg_color),
            );
        }
    });

    if state.controller.is_initializing(active) {
        ui.label(
            RichText::new("⏳ Server is preparing this dataset...")
                .strong()
                .color(ui.visuals().warn_fg_color),
        );
    }

    ui.add_space(8.0);
    ui.separator();

    render_stats_section(ui, state);

    if let Some(error) = &state.last_error {
        ui.add_space(8.0);
        ui.separator();
        ui.label(RichText::new(format!("⚠ {}", error)).color(Color32::RED));
    }
}

/// Render statistics section (used in Data tab)
fn render_stats_section(ui: &mut Ui, state: &AppState) {
    let stats = state.controller.stats();

    ui.label(RichText::new("📊 Statistics").strong());
    ui.add_space(4.0);

    egui::Grid::new("stats_grid")
        .num_columns(2)
        .spacing([12.0, 4.0])
        .show(ui, |ui| {
            ui.label("Samples:");
            let samples = state
                .layer
                .current()
                .map(|update| update.cloud.len())
                .unwrap_or_default();
            ui.label(RichText::new(format!("{}", samples)).strong());
            ui.end_row();

            if let Some(viewport) = state.controller.viewport() {
                ui.label("Zoom:");
                ui.label(RichText::new(format!("{}", viewport.extent.zoom)).strong());
                ui.end_row();
            }

            if let Some(update) = state.layer.current() {
                ui.label("Point radius:");
                ui.label(format!(
                    "{:.0} m ({} px)",
                    latitude_degrees_to_meters(update.cloud.suggested_radius),
                    update.radius_px
                ));
                ui.end_row();
            }

            ui.label("Last request:");
            let last_key = stats
                .last_key
                .as_ref()
                .map(|key| key.to_string())
                .unwrap_or_else(|| "-".to_string());
            ui.label(RichText::new(last_key).monospace());
            ui.end_row();

            ui.separator();
            ui.separator();
            ui.end_row();

            ui.label("Fetches:");
            ui.label(
                RichText::new(format!(
                    "{} ({} forced)",
                    stats.scheduler.accepted, stats.scheduler.forced
                ))
                .strong(),
            );
            ui.end_row();

            ui.label("Skipped:");
            ui.label(format!(
                "{} duplicate, {} throttled, {} paused",
                stats.scheduler.duplicates, stats.scheduler.rate_limited, stats.scheduler.suspended
            ));
            ui.end_row();

            ui.label("Applied:");
            ui.label(format!("{} ({} empty)", stats.applied, stats.empty));
            ui.end_row();

            ui.label("Dropped:");
            let dropped = stats.stale + stats.malformed + stats.transport_failures;
            let color = if dropped == 0 {
                Color32::GREEN
            } else {
                ui.visuals().warn_fg_color
            };
            ui.label(
                RichText::new(format!(
                    "{} stale, {} malformed, {} failed",
                    stats.stale, stats.malformed, stats.transport_failures
                ))
                .color(color),
            );
            ui.end_row();

            ui.label("Cache warm-ups:");
            ui.label(format!("{}", stats.handshakes));
            ui.end_row();
        });
}

/// Render the Settings tab
fn render_settings_tab(ui: &mut Ui, state: &mut AppState) {
    ui.label(RichText::new("🎨 Appearance").strong());
    ui.add_space(4.0);

    egui::Grid::new("appearance_grid")
        .num_columns(2)
        .spacing([12.0, 6.0])
        .show(ui, |ui| {
            ui.label("Opacity:");
            ui.add(egui::Slider::new(
                &mut state.ui_settings.opacity,
                0.05..=1.0,
            ));
            ui.end_row();
        });

    ui.add_space(12.0);
    ui.separator();

    ui.label(RichText::new("🔌 Server").strong());
    ui.add_space(4.0);

    let config = state.controller.config();
    egui::Grid::new("server_grid")
        .num_columns(2)
        .spacing([12.0, 4.0])
        .show(ui, |ui| {
            ui.label("URL:");
            ui.label(RichText::new(&config.base_url).monospace());
            ui.end_row();

            ui.label("Zoom range:");
            ui.label(format!("{}..={}", config.min_zoom, config.max_zoom));
            ui.end_row();

            ui.label("Rate limit:");
            ui.label(format!("{} ms", config.rate_limit.as_millis()));
            ui.end_row();

            ui.label("Default radius:");
            ui.label(format!("{:.0} m", config.default_radius_meters()));
            ui.end_row();

            ui.label("Auto-center:");
            ui.label(if config.auto_center { "on" } else { "off" });
            ui.end_row();
        });
    ui.label(
        RichText::new("Server options are set with command line flags")
            .small()
            .weak(),
    );

    ui.add_space(12.0);
    ui.separator();

    ui.label(RichText::new("ℹ About").strong());
    ui.label(format!(
        "{} v{}",
        crate::entrypoints::APP_NAME,
        env!("CARGO_PKG_VERSION")
    ));
    ui.label(RichText::new("  F1 / Ctrl+H - Toggle help").small().weak());
}

/// Show the help window
pub fn help_overlay(ctx: &egui::Context, show_help: &mut bool) {
    egui::Window::new("Help")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.heading(crate::entrypoints::APP_NAME);
            ui.add_space(8.0);

            ui.label("A heatmap that follows the map: pan or zoom and the visible area is fetched again.");
            ui.add_space(12.0);

            ui.label(RichText::new("Datasets").strong());
            ui.label("• Pick a dataset in the sidebar");
            ui.label("• The map moves to its bounds and centers on the first data");
            ui.add_space(8.0);

            ui.label(RichText::new("Navigation").strong());
            ui.label("• Scroll wheel to zoom");
            ui.label("• Click and drag to pan");
            ui.label("• 'Refresh' fetches the visible area again");
            ui.add_space(8.0);

            ui.label(RichText::new("Keyboard Shortcuts").strong());
            ui.label("• F1 or Ctrl+H - Toggle this help");
            ui.label("• F5 - Refresh");
            ui.add_space(12.0);

            if ui.button("Close").clicked() {
                *show_help = false;
            }
        });
}
