//! Walkers plugin that measures the visible area and draws the heatmap
//!
//! Every frame the plugin unprojects the map corners into a [`ViewportState`] for the
//! viewport tracker, then paints the current point cloud as weighted circles.

use egui::Color32;
use heatmap_sync::{Extent, OverlayUpdate, Projection, ViewportState};
use std::sync::Arc;
use tokio::sync::RwLock;
use walkers::{Plugin, Projector};

/// Color ramp from cold to hot
const HEAT_STOPS: [(u8, u8, u8); 5] = [
    (0, 0, 255),
    (0, 255, 255),
    (0, 255, 0),
    (255, 255, 0),
    (255, 0, 0),
];

/// Highest zoom level walkers can display
const MAX_MAP_ZOOM: f64 = 26.0;

/// What the plugin measured during the last frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredViewport {
    pub state: ViewportState,
    /// Whether the user was dragging, scrolling or pinching
    pub interacting: bool,
}

/// Plugin for rendering the heatmap on the map
pub struct HeatmapPlugin {
    update: Option<Arc<OverlayUpdate>>,
    opacity: f32,
    /// Written by the plugin, read by the app after the map is drawn
    probe: Arc<RwLock<Option<MeasuredViewport>>>,
}

impl HeatmapPlugin {
    pub fn new(
        update: Option<Arc<OverlayUpdate>>,
        opacity: f32,
        probe: Arc<RwLock<Option<MeasuredViewport>>>,
    ) -> Self {
        Self {
            update,
            opacity,
            probe,
        }
    }

    fn measure(
        ui: &egui::Ui,
        response: &egui::Response,
        projector: &Projector,
        map_memory: &walkers::MapMemory,
    ) -> Option<MeasuredViewport> {
        let rect = response.rect;
        let top_left = projector.unproject(egui::Vec2::new(rect.min.x, rect.min.y));
        let bottom_right = projector.unproject(egui::Vec2::new(rect.max.x, rect.max.y));

        let zoom = map_memory.zoom().round().clamp(0.0, MAX_MAP_ZOOM) as u8;
        let extent = Extent::new(
            top_left.x().min(bottom_right.x()),
            top_left.y().min(bottom_right.y()),
            top_left.x().max(bottom_right.x()),
            top_left.y().max(bottom_right.y()),
            Projection::Geographic,
            zoom,
        )
        .ok()?;

        let interacting = response.dragged()
            || ui.input(|i| {
                i.pointer.any_down()
                    || i.smooth_scroll_delta != egui::Vec2::ZERO
                    || i.zoom_delta() != 1.0
            });

        Some(MeasuredViewport {
            state: ViewportState {
                extent,
                pixel_size: (rect.width() as f64, rect.height() as f64),
            },
            interacting,
        })
    }

    fn render(&self, update: &OverlayUpdate, projector: &Projector, painter: &egui::Painter) {
        let radius = update.radius_px.max(1) as f32;
        let visible = painter.clip_rect().expand(radius);
        let max = if update.displayed_max > 0.0 {
            update.displayed_max
        } else {
            1.0
        };

        for sample in &update.cloud.samples {
            let screen = projector.project(walkers::lat_lon(sample.lat, sample.lon));
            let center = egui::Pos2::new(screen.x, screen.y);
            if !visible.contains(center) {
                continue;
            }
            let t = (sample.weight / max) as f32;
            painter.circle_filled(center, radius, heat_color(t, self.opacity));
        }
    }
}

impl Plugin for HeatmapPlugin {
    fn run(
        self: Box<Self>,
        ui: &mut egui::Ui,
        response: &egui::Response,
        projector: &Projector,
        map_memory: &walkers::MapMemory,
    ) {
        profiling::scope!("HeatmapPlugin::run");

        let measured = Self::measure(ui, response, projector, map_memory);
        // Use try_write so a slow reader never stalls the frame
        if let Ok(mut probe) = self.probe.try_write() {
            *probe = measured;
        }

        if let Some(update) = &self.update {
            profiling::scope!("render_samples");
            self.render(update, projector, ui.painter());
        }
    }
}

/// Map a normalized weight to a translucent heat color
pub fn heat_color(t: f32, opacity: f32) -> Color32 {
    let t = normalize(t);
    let (r, g, b) = heat_rgb(t);
    // Weak samples fade out so dense areas dominate
    let alpha = opacity.clamp(0.0, 1.0) * (0.35 + 0.65 * t);
    Color32::from_rgba_unmultiplied(r, g, b, (alpha * 255.0).round() as u8)
}

fn normalize(t: f32) -> f32 {
    if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 }
}

/// Opaque ramp color for a weight in `0.0..=1.0`
fn heat_rgb(t: f32) -> (u8, u8, u8) {
    let scaled = normalize(t) * (HEAT_STOPS.len() - 1) as f32;
    let index = (scaled.floor() as usize).min(HEAT_STOPS.len() - 2);
    let frac = scaled - index as f32;

    let (r0, g0, b0) = HEAT_STOPS[index];
    let (r1, g1, b1) = HEAT_STOPS[index + 1];
    let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * frac).round() as u8;
    (lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}
