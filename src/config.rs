/// Analysis configuration.
///
/// Every empirically-tuned weight and threshold in the pipeline lives here
/// rather than in module-level constants, so a caller can adjust against real
/// Bathinov images and two concurrent analyses can never fight over shared
/// tuning state.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Arcseconds per radian, the standard astronomical plate-scale constant.
pub const ARCSEC_PER_RADIAN: f64 = 206_265.0;

/// Which line-detection strategy the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Radial intensity-profile scan around the star center.
    Radial,
    /// Canny edge map plus Hough transform accumulation.
    Hough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    // Optics
    pub mask_angle_degrees: f64,  // Nominal Bathinov spike half-angle
    pub pixel_size_microns: f64,  // Sensor pixel pitch
    pub focal_length_mm: f64,     // Telescope focal length

    // Preprocessing
    pub grayscale_weights: [f64; 3], // R,G,B weights, must sum to ~1.0
    pub gaussian_sigma: f64,
    pub contrast_window: usize, // Local contrast window edge length (odd)
    pub contrast_gain: f64,     // Push away from local mean by this factor
    pub unsharp_amount: f64,
    pub threshold_percentile: f64, // High percentile blended into the threshold
    pub threshold_mean_weight: f64, // Weight of global mean in the blend

    // Edge detection (Hough path)
    pub canny_low_threshold: f64,
    pub canny_high_threshold: f64,

    // Radial scan detector
    pub radial_samples: usize,        // Angular samples over 0-360 degrees
    pub inner_radius_fraction: f64,   // Exclusion radius around the star core
    pub profile_smoothing_window: usize, // Circular moving-average width (odd)
    pub profile_gamma: f64,           // Contrast boost exponent, < 1 sharpens peaks
    pub min_peak_separation_degrees: f64,

    // Hough detector
    pub hough_max_radius_fraction: f64, // Vote only within this radius of center
    pub hough_min_votes: usize,
    pub hough_top_k: usize,

    // Spike selection
    pub offset_search_range_pixels: f64, // Perpendicular spike-offset refinement range
    pub grouping_threshold_degrees: f64,
    pub max_candidate_groups: usize, // Top-K groups fed to triplet enumeration
    pub min_triplet_score: f64,
    pub min_strength_floor: f64,
    pub gap_symmetry_degrees: f64, // Central spike gap-symmetry tolerance

    // Verdict
    pub in_focus_threshold_pixels: f64,
    pub min_confidence_strength: f64, // Strength floor for a trusted verdict

    // Strategy
    pub detector: DetectorKind,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mask_angle_degrees: 34.0,
            pixel_size_microns: 3.8,
            focal_length_mm: 800.0,

            grayscale_weights: [0.5, 0.3, 0.2], // Spikes tend brightest in red
            gaussian_sigma: 1.0,
            contrast_window: 15,
            contrast_gain: 1.5,
            unsharp_amount: 0.6,
            threshold_percentile: 0.80,
            threshold_mean_weight: 0.5,

            canny_low_threshold: 50.0,
            canny_high_threshold: 150.0,

            radial_samples: 720,
            inner_radius_fraction: 0.04,
            profile_smoothing_window: 5,
            profile_gamma: 0.7,
            min_peak_separation_degrees: 8.0,

            hough_max_radius_fraction: 0.45,
            hough_min_votes: 20,
            hough_top_k: 12,

            offset_search_range_pixels: 12.0,
            grouping_threshold_degrees: 10.0,
            max_candidate_groups: 8,
            min_triplet_score: 0.35,
            min_strength_floor: 0.05,
            gap_symmetry_degrees: 5.0,

            in_focus_threshold_pixels: 1.0,
            min_confidence_strength: 0.15,

            detector: DetectorKind::Radial,
        }
    }
}

impl AnalysisConfig {
    /// Reject caller errors at the boundary. Degenerate signal conditions are
    /// handled inside the pipeline; malformed configuration is not.
    pub fn validate(&self) -> Result<()> {
        if !(self.mask_angle_degrees > 0.0 && self.mask_angle_degrees < 90.0) {
            bail!(
                "mask angle must be in (0, 90) degrees, got {}",
                self.mask_angle_degrees
            );
        }
        if self.pixel_size_microns <= 0.0 {
            bail!("pixel size must be positive, got {}", self.pixel_size_microns);
        }
        if self.focal_length_mm <= 0.0 {
            bail!("focal length must be positive, got {}", self.focal_length_mm);
        }
        if self.gaussian_sigma <= 0.0 {
            bail!("gaussian sigma must be positive, got {}", self.gaussian_sigma);
        }
        let weight_sum: f64 = self.grayscale_weights.iter().sum();
        if (weight_sum - 1.0).abs() > 0.05 || self.grayscale_weights.iter().any(|&w| w < 0.0) {
            bail!(
                "grayscale weights must be non-negative and sum to 1.0, got {:?}",
                self.grayscale_weights
            );
        }
        if self.canny_low_threshold >= self.canny_high_threshold {
            bail!(
                "canny low threshold ({}) must be below high threshold ({})",
                self.canny_low_threshold,
                self.canny_high_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.threshold_percentile) {
            bail!(
                "threshold percentile must be in [0, 1], got {}",
                self.threshold_percentile
            );
        }
        if self.radial_samples < 90 {
            bail!(
                "radial sample count too small for peak separation: {}",
                self.radial_samples
            );
        }
        if self.max_candidate_groups < 3 {
            bail!(
                "need at least 3 candidate groups to form a triplet, got {}",
                self.max_candidate_groups
            );
        }
        if self.contrast_window < 3 || self.contrast_window % 2 == 0 {
            bail!(
                "contrast window must be odd and >= 3, got {}",
                self.contrast_window
            );
        }
        Ok(())
    }

    /// Arcseconds of sky per pixel for the configured optics.
    pub fn plate_scale_arcsec_per_pixel(&self) -> f64 {
        ARCSEC_PER_RADIAN * self.pixel_size_microns / (self.focal_length_mm * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_mask_angle() {
        let mut config = AnalysisConfig::default();
        config.mask_angle_degrees = 0.0;
        assert!(config.validate().is_err());
        config.mask_angle_degrees = 95.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_canny_thresholds() {
        let mut config = AnalysisConfig::default();
        config.canny_low_threshold = 200.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_sigma() {
        let mut config = AnalysisConfig::default();
        config.gaussian_sigma = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unnormalized_grayscale_weights() {
        let mut config = AnalysisConfig::default();
        config.grayscale_weights = [0.9, 0.9, 0.9];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plate_scale() {
        let config = AnalysisConfig::default();
        // 206265 * 3.8 / 800000 ~= 0.9798 arcsec/px
        assert!((config.plate_scale_arcsec_per_pixel() - 0.9798).abs() < 0.001);
    }
}
