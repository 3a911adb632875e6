/// Focus metric calculation.
///
/// Pure arithmetic over an already-selected spike triplet: intersect the two
/// outer spikes, measure the perpendicular distance from that intersection to
/// the central spike (the focus error), convert to physical units via the
/// plate scale, and derive the in-focus verdict and confidence. All
/// degeneracy resolves to defined sentinel values; this stage never errors.
use serde::Serialize;

use crate::config::{AnalysisConfig, ARCSEC_PER_RADIAN};
use crate::geometry::{angular_difference_180, Point2D};
use crate::spike_selection::SpikeTriplet;

#[derive(Debug, Clone, Serialize)]
pub struct FocusMetrics {
    pub focus_error_pixels: f64,
    pub focus_error_microns: f64,
    pub plate_scale_arcsec_per_pixel: f64,
    pub mask_angle_measured_degrees: f64,
    pub in_focus: bool,
    pub confidence_percent: f64,
}

/// Intersection of the outer spikes, or the defined sentinel (the left
/// line's start point) when they are parallel or near-parallel. Valid
/// Bathinov geometry never produces parallel outer spikes, but the case must
/// not divide by zero.
pub fn outer_intersection(triplet: &SpikeTriplet) -> Point2D {
    triplet
        .left
        .line
        .intersection(&triplet.right.line)
        .unwrap_or(triplet.left.line.p1)
}

pub fn compute_focus_metrics(triplet: &SpikeTriplet, config: &AnalysisConfig) -> FocusMetrics {
    let intersection = outer_intersection(triplet);
    let mut focus_error_pixels = triplet.central.line.distance_to_point(&intersection);
    if !focus_error_pixels.is_finite() {
        focus_error_pixels = 0.0;
    }

    let focus_error_microns =
        focus_error_pixels * config.pixel_size_microns * config.focal_length_mm / ARCSEC_PER_RADIAN;

    // Measured half-angle between the outer spikes, independent of the
    // configured nominal value.
    let mask_angle_measured_degrees = angular_difference_180(
        triplet.left.line.angle_degrees,
        triplet.right.line.angle_degrees,
    ) / 2.0;

    let average_strength = triplet.average_strength().clamp(0.0, 1.0);

    // A geometrically perfect but low-confidence detection is not in focus.
    let in_focus = focus_error_pixels < config.in_focus_threshold_pixels
        && average_strength >= config.min_confidence_strength
        && triplet.is_measured();

    let angle_agreement = 1.0
        - ((mask_angle_measured_degrees - config.mask_angle_degrees).abs()
            / config.mask_angle_degrees)
            .min(1.0);
    let confidence_percent = if triplet.is_measured() {
        100.0 * (0.5 * average_strength + 0.5 * angle_agreement)
    } else {
        0.0
    };

    FocusMetrics {
        focus_error_pixels,
        focus_error_microns,
        plate_scale_arcsec_per_pixel: config.plate_scale_arcsec_per_pixel(),
        mask_angle_measured_degrees,
        in_focus,
        confidence_percent,
    }
}
