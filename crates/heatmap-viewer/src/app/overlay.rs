//! Heatmap layer state shared between the controller and the map plugin

use heatmap_sync::{Extent, Overlay, OverlayUpdate};
use std::sync::Arc;

/// Latest point cloud plus any pending camera move requested by the controller
#[derive(Debug, Default)]
pub struct HeatmapLayer {
    current: Option<Arc<OverlayUpdate>>,
    pending_fit: Option<(Extent, u8)>,
}

impl HeatmapLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloud to draw this frame, cheap to hand to the plugin
    pub fn current(&self) -> Option<Arc<OverlayUpdate>> {
        self.current.clone()
    }

    /// Camera move requested since the last call
    pub fn take_fit(&mut self) -> Option<(Extent, u8)> {
        self.pending_fit.take()
    }

    /// Drop the displayed cloud, e.g. on dataset switch
    pub fn clear(&mut self) {
        self.current = None;
    }
}

impl Overlay for HeatmapLayer {
    fn apply(&mut self, update: OverlayUpdate) {
        tracing::trace!(
            "Overlay now shows {} samples of {} (radius {} px)",
            update.cloud.len(),
            update.dataset,
            update.radius_px
        );
        self.current = Some(Arc::new(update));
    }

    fn fit_to(&mut self, extent: &Extent, zoom: u8) {
        // Only the most recent camera request matters
        self.pending_fit = Some((*extent, zoom));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatmap_sync::{DatasetId, PointCloud, PointSample, Projection};

    fn update(weight: f64) -> OverlayUpdate {
        OverlayUpdate {
            dataset: DatasetId::Ro,
            cloud: PointCloud {
                maximum_weight: weight,
                samples: vec![PointSample {
                    lat: 45.0,
                    lon: 25.0,
                    weight,
                }],
                suggested_radius: 0.001,
            },
            radius_px: 4,
            displayed_max: weight,
        }
    }

    #[test]
    fn test_latest_update_replaces_previous() {
        let mut layer = HeatmapLayer::new();
        assert!(layer.current().is_none());
        layer.apply(update(1.0));
        layer.apply(update(2.0));
        assert_eq!(layer.current().unwrap().displayed_max, 2.0);
        layer.clear();
        assert!(layer.current().is_none());
    }

    #[test]
    fn test_fit_is_taken_once() {
        let mut layer = HeatmapLayer::new();
        let first = Extent::new(20.0, 43.0, 30.0, 48.0, Projection::Geographic, 6).unwrap();
        let second = Extent::new(5.9, 45.8, 10.5, 47.8, Projection::Geographic, 8).unwrap();
        layer.fit_to(&first, 6);
        layer.fit_to(&second, 8);
        assert_eq!(layer.take_fit(), Some((second, 8)));
        assert_eq!(layer.take_fit(), None);
    }
}
