// End-to-end tests on rendered diffraction patterns with known geometry.
// Each pattern is a Gaussian star plus three spikes drawn as lines with a
// Gaussian cross-section, so every ground-truth quantity (center, angles,
// central spike offset) is known exactly.

use crate::config::{AnalysisConfig, DetectorKind};
use crate::geometry::angular_difference_180;
use crate::raster::RasterImage;
use crate::spike_selection::Provenance;
use crate::{analyze, AnalysisResult};

struct SyntheticPattern {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl SyntheticPattern {
    fn new(width: usize, height: usize, background: f64) -> Self {
        SyntheticPattern {
            width,
            height,
            data: vec![background; width * height],
        }
    }

    /// Additive Gaussian star profile.
    fn add_star(&mut self, x: f64, y: f64, sigma: f64, peak: f64) {
        for py in 0..self.height {
            for px in 0..self.width {
                let dx = px as f64 - x;
                let dy = py as f64 - y;
                let d_sq = dx * dx + dy * dy;
                self.data[py * self.width + px] += peak * (-d_sq / (2.0 * sigma * sigma)).exp();
            }
        }
    }

    /// Full-frame spike line at `angle_degrees`, displaced perpendicular to
    /// itself by `offset` pixels from (cx, cy), with a Gaussian cross-section.
    fn add_spike(&mut self, cx: f64, cy: f64, angle_degrees: f64, offset: f64, sigma: f64, peak: f64) {
        let theta = angle_degrees.to_radians();
        let (nx, ny) = (-theta.sin(), theta.cos());
        let base_x = cx + nx * offset;
        let base_y = cy + ny * offset;

        for py in 0..self.height {
            for px in 0..self.width {
                let d = (px as f64 - base_x) * nx + (py as f64 - base_y) * ny;
                self.data[py * self.width + px] += peak * (-(d * d) / (2.0 * sigma * sigma)).exp();
            }
        }
    }

    fn into_image(self) -> RasterImage {
        let pixels = self
            .data
            .into_iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        RasterImage::from_luma8(self.width, self.height, pixels).unwrap()
    }
}

/// Standard test pattern: star at (cx, cy), outer spikes through the star at
/// central_angle +/- 34 degrees, central spike displaced by `offset` pixels.
fn bathinov_image(cx: f64, cy: f64, central_angle: f64, offset: f64) -> RasterImage {
    let mut pattern = SyntheticPattern::new(240, 240, 12.0);
    pattern.add_spike(cx, cy, central_angle - 34.0, 0.0, 1.8, 150.0);
    pattern.add_spike(cx, cy, central_angle + 34.0, 0.0, 1.8, 150.0);
    pattern.add_spike(cx, cy, central_angle, offset, 1.8, 170.0);
    pattern.add_star(cx, cy, 3.0, 230.0);
    pattern.into_image()
}

fn assert_geometry(result: &AnalysisResult, cx: f64, cy: f64, central_angle: f64) {
    assert_eq!(result.triplet.provenance, Provenance::Measured);
    assert!(
        (result.center.x - cx).abs() < 2.0 && (result.center.y - cy).abs() < 2.0,
        "center ({:.2}, {:.2}) too far from ({:.1}, {:.1})",
        result.center.x,
        result.center.y,
        cx,
        cy
    );
    assert!(
        (result.metrics.mask_angle_measured_degrees - 34.0).abs() < 2.0,
        "measured mask angle {:.2} not within 2 degrees of 34",
        result.metrics.mask_angle_measured_degrees
    );
    let central_error =
        angular_difference_180(result.triplet.central.line.angle_degrees, central_angle);
    assert!(
        central_error < 2.0,
        "central spike at {:.2}, expected {:.1}",
        result.triplet.central.line.angle_degrees,
        central_angle
    );
}

#[test]
fn test_roundtrip_recovers_central_offset() {
    let image = bathinov_image(120.0, 120.0, 90.0, 2.3);
    let result = analyze(&image, &AnalysisConfig::default()).unwrap();

    assert_geometry(&result, 120.0, 120.0, 90.0);
    assert!(
        (result.metrics.focus_error_pixels - 2.3).abs() < 0.3,
        "focus error {:.3} px, drew 2.3",
        result.metrics.focus_error_pixels
    );
    assert!(!result.metrics.in_focus);
    assert!(result.metrics.focus_error_microns > 0.0);
}

#[test]
fn test_aligned_pattern_reports_in_focus() {
    let image = bathinov_image(120.0, 120.0, 90.0, 0.0);
    let result = analyze(&image, &AnalysisConfig::default()).unwrap();

    assert_geometry(&result, 120.0, 120.0, 90.0);
    assert!(
        result.metrics.focus_error_pixels < 1.0,
        "focus error {:.3} px on an aligned pattern",
        result.metrics.focus_error_pixels
    );
    assert!(result.metrics.in_focus);
    assert!(result.metrics.confidence_percent > 0.0);
}

#[test]
fn test_rotation_leaves_focus_error_unchanged() {
    let config = AnalysisConfig::default();
    let upright = analyze(&bathinov_image(120.0, 120.0, 90.0, 2.3), &config).unwrap();
    let rotated = analyze(&bathinov_image(120.0, 120.0, 65.0, 2.3), &config).unwrap();

    assert_geometry(&upright, 120.0, 120.0, 90.0);
    assert_geometry(&rotated, 120.0, 120.0, 65.0);
    assert!(
        (upright.metrics.focus_error_pixels - rotated.metrics.focus_error_pixels).abs() < 0.3,
        "focus error changed under rotation: {:.3} vs {:.3}",
        upright.metrics.focus_error_pixels,
        rotated.metrics.focus_error_pixels
    );
    assert!(
        (upright.metrics.mask_angle_measured_degrees - rotated.metrics.mask_angle_measured_degrees)
            .abs()
            < 1.5
    );
}

#[test]
fn test_off_center_star() {
    let image = bathinov_image(95.0, 140.0, 110.0, 0.0);
    let result = analyze(&image, &AnalysisConfig::default()).unwrap();

    assert_geometry(&result, 95.0, 140.0, 110.0);
    assert!(result.metrics.focus_error_pixels < 1.0);
}

#[test]
fn test_hough_detector_roundtrip() {
    let config = AnalysisConfig {
        detector: DetectorKind::Hough,
        ..AnalysisConfig::default()
    };
    let image = bathinov_image(120.0, 120.0, 90.0, 0.0);
    let result = analyze(&image, &config).unwrap();

    assert_eq!(result.triplet.provenance, Provenance::Measured);
    assert!(
        (result.metrics.mask_angle_measured_degrees - 34.0).abs() < 3.0,
        "measured mask angle {:.2}",
        result.metrics.mask_angle_measured_degrees
    );
    assert!(
        result.metrics.focus_error_pixels < 1.0,
        "focus error {:.3} px on an aligned pattern",
        result.metrics.focus_error_pixels
    );
}
