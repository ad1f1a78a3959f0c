//! On-screen point radius for heatmap samples
//!
//! The server suggests a radius in degrees of latitude. The pixel radius
//! follows from how many degrees the viewport currently spans vertically,
//! plus a zoom-dependent stabilization term that keeps points from shrinking
//! to nothing when zoomed out.

use serde::{Deserialize, Serialize};

/// Pixel-radius scaling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusScaler {
    /// Zoom at which the stabilization term starts growing
    pub baseline_zoom: u8,
    /// Below this zoom the term is `zoom - 1` instead of the clamped value
    pub low_zoom_threshold: u8,
    /// Upper bound of the stabilization term
    pub max_stabilization: f64,
    pub multiplier: f64,
}

impl Default for RadiusScaler {
    fn default() -> Self {
        Self {
            baseline_zoom: 6,
            low_zoom_threshold: 6,
            max_stabilization: 7.0,
            multiplier: 1.5,
        }
    }
}

impl RadiusScaler {
    /// Stabilization term for `zoom`
    ///
    /// `clamp(zoom - baseline, 0, max)`, overridden by `zoom - 1` at low zoom.
    /// May be negative for zoom 0; [`RadiusScaler::scale`] floors it at zero.
    pub fn stabilization(&self, zoom: u8) -> f64 {
        let zoom = zoom as f64;
        if zoom < self.low_zoom_threshold as f64 {
            zoom - 1.0
        } else {
            (zoom - self.baseline_zoom as f64).clamp(0.0, self.max_stabilization)
        }
    }

    /// Pixel radius for a target radius given in data units (degrees latitude)
    ///
    /// `ceil(base + sqrt(s / 2) - 1) * multiplier` with
    /// `base = target / vertical_span * pixel_height`, rounded to an integer >= 1.
    pub fn scale(
        &self,
        target_radius: f64,
        viewport_vertical_span: f64,
        viewport_pixel_height: f64,
        zoom: u8,
    ) -> u32 {
        if !(viewport_vertical_span > 0.0) || !viewport_vertical_span.is_finite() {
            tracing::trace!(
                "Degenerate viewport span {}, using minimum radius",
                viewport_vertical_span
            );
            return 1;
        }
        let base = target_radius / viewport_vertical_span * viewport_pixel_height;
        let stabilization = self.stabilization(zoom).max(0.0);
        let raw = (base + (stabilization / 2.0).sqrt() - 1.0).ceil() * self.multiplier;
        if !raw.is_finite() {
            return 1;
        }
        raw.round().max(1.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stabilization_below_threshold_is_zoom_minus_one() {
        let scaler = RadiusScaler::default();
        for zoom in 0..6u8 {
            assert_eq!(scaler.stabilization(zoom), zoom as f64 - 1.0);
        }
    }

    #[test]
    fn test_stabilization_is_clamped() {
        let scaler = RadiusScaler::default();
        assert_eq!(scaler.stabilization(6), 0.0);
        assert_eq!(scaler.stabilization(10), 4.0);
        assert_eq!(scaler.stabilization(13), 7.0);
        assert_eq!(scaler.stabilization(20), 7.0);
    }

    #[test]
    fn test_scale_examples() {
        let scaler = RadiusScaler::default();
        // base = 0.001 / 0.1 * 800 = 8
        assert_eq!(scaler.scale(0.001, 0.1, 800.0, 6), 11);
        assert_eq!(scaler.scale(0.001, 0.1, 800.0, 10), 14);
        assert_eq!(scaler.scale(0.001, 0.1, 800.0, 13), 14);
    }

    #[test]
    fn test_scale_never_below_one() {
        let scaler = RadiusScaler::default();
        for zoom in 0..=20u8 {
            assert!(scaler.scale(1e-9, 10.0, 600.0, zoom) >= 1);
        }
        assert_eq!(scaler.scale(1e-9, 10.0, 600.0, 0), 1);
        assert_eq!(scaler.scale(0.001, 0.0, 600.0, 8), 1);
        assert_eq!(scaler.scale(0.001, f64::NAN, 600.0, 8), 1);
    }

    #[test]
    fn test_low_zoom_keeps_points_visible() {
        let scaler = RadiusScaler::default();
        // Zoom 5 gets sqrt(4 / 2) added instead of nothing
        assert_eq!(scaler.scale(1e-9, 10.0, 600.0, 5), 2);
    }

    #[test]
    fn test_scale_grows_with_pixel_height() {
        let scaler = RadiusScaler::default();
        let small = scaler.scale(0.001, 0.1, 400.0, 10);
        let large = scaler.scale(0.001, 0.1, 1600.0, 10);
        assert!(large > small);
    }
}
