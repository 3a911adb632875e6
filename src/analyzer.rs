/// Pipeline orchestration.
///
/// One synchronous, stateless pass per image: locate the star, preprocess,
/// detect candidate spike lines with the configured strategy, select the
/// triplet, compute the focus metrics. No stage holds cross-call state, so
/// concurrent analyses of different images (or the same image under different
/// configs) need no synchronization.
use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::focus_metrics::{compute_focus_metrics, FocusMetrics};
use crate::geometry::{Point2D, CHORD_RADIUS_FACTOR};
use crate::line_detection::detector_from_config;
use crate::preprocess::preprocess;
use crate::raster::{RasterImage, Roi};
use crate::spike_selection::{refine_offsets, select, SpikeTriplet};
use crate::star_locator::{locate, StarCenter};

/// Full analysis output: plain values, JSON-serializable, no handles.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub center: StarCenter,
    pub triplet: SpikeTriplet,
    pub metrics: FocusMetrics,
}

/// Analyze one star image. Input and configuration errors fail fast here;
/// everything downstream degrades to flagged fallback values instead of
/// erroring.
pub fn analyze(image: &RasterImage, config: &AnalysisConfig) -> Result<AnalysisResult> {
    config.validate()?;

    let center = locate(image);
    let pre = preprocess(image, config);

    let detector = detector_from_config(config);
    let candidates = detector.detect(&pre, &center);
    debug!("{} spike candidates detected", candidates.len());

    let diagonal =
        ((image.width() * image.width() + image.height() * image.height()) as f64).sqrt();
    let chord_radius = CHORD_RADIUS_FACTOR * diagonal;

    let center_point = Point2D::new(center.x, center.y);
    let mut triplet = select(&candidates, center_point, chord_radius, config);
    refine_offsets(&mut triplet, &pre.enhanced, center_point, config);
    let metrics = compute_focus_metrics(&triplet, config);

    debug!(
        "focus error {:.3} px ({:.3} um), in_focus={}, provenance={:?}",
        metrics.focus_error_pixels,
        metrics.focus_error_microns,
        metrics.in_focus,
        triplet.provenance
    );

    Ok(AnalysisResult {
        center,
        triplet,
        metrics,
    })
}

/// Analyze a sub-region. Returned coordinates are relative to the ROI
/// origin; the caller translates back to full-image space by adding the ROI
/// offset.
pub fn analyze_roi(image: &RasterImage, roi: &Roi, config: &AnalysisConfig) -> Result<AnalysisResult> {
    let cropped = image.crop(roi)?;
    analyze(&cropped, config)
}
