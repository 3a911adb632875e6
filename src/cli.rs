use clap::{Parser, Subcommand};

use crate::config::{AnalysisConfig, DetectorKind};

#[derive(Parser)]
#[command(name = "bathinov-focus")]
#[command(about = "Analyze Bathinov mask star images for focus error", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a star image and report focus metrics
    Analyze {
        /// Path to the star image (PNG, JPEG, TIFF)
        image: String,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Region of interest as x,y,width,height (full-image coordinates)
        #[arg(long)]
        roi: Option<String>,

        #[command(flatten)]
        options: AnalysisOptions,
    },

    /// Write an annotated PNG with the detected spikes overlaid
    Annotate {
        /// Path to the star image (PNG, JPEG, TIFF)
        image: String,

        /// Output PNG path
        output: String,

        /// Smallest on-screen central-line offset worth drawing; smaller
        /// true errors are exaggerated up to it
        #[arg(long, default_value = "8.0")]
        min_visible_offset: f64,

        #[command(flatten)]
        options: AnalysisOptions,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct AnalysisOptions {
    /// Bathinov mask spike half-angle in degrees
    #[arg(long, default_value = "34.0")]
    pub mask_angle: f64,

    /// Sensor pixel size in microns
    #[arg(long, default_value = "3.8")]
    pub pixel_size: f64,

    /// Telescope focal length in millimeters
    #[arg(long, default_value = "800.0")]
    pub focal_length: f64,

    /// Gaussian blur sigma for preprocessing
    #[arg(long, default_value = "1.0")]
    pub gaussian_sigma: f64,

    /// Line detection strategy (radial, hough)
    #[arg(long, default_value = "radial")]
    pub detector: String,

    /// Canny low threshold (hough detector only)
    #[arg(long, default_value = "50.0")]
    pub canny_low: f64,

    /// Canny high threshold (hough detector only)
    #[arg(long, default_value = "150.0")]
    pub canny_high: f64,
}

impl AnalysisOptions {
    pub fn to_config(&self) -> anyhow::Result<AnalysisConfig> {
        let detector = match self.detector.to_lowercase().as_str() {
            "radial" => DetectorKind::Radial,
            "hough" => DetectorKind::Hough,
            other => anyhow::bail!("invalid detector: {}. Use radial or hough", other),
        };

        let config = AnalysisConfig {
            mask_angle_degrees: self.mask_angle,
            pixel_size_microns: self.pixel_size,
            focal_length_mm: self.focal_length,
            gaussian_sigma: self.gaussian_sigma,
            canny_low_threshold: self.canny_low,
            canny_high_threshold: self.canny_high,
            detector,
            ..AnalysisConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_options() -> AnalysisOptions {
        AnalysisOptions {
            mask_angle: 34.0,
            pixel_size: 3.8,
            focal_length: 800.0,
            gaussian_sigma: 1.0,
            detector: "radial".to_string(),
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }

    #[test]
    fn test_default_options_build_valid_config() {
        let config = default_options().to_config().unwrap();
        assert_eq!(config.detector, DetectorKind::Radial);
        assert_eq!(config.mask_angle_degrees, 34.0);
    }

    #[test]
    fn test_unknown_detector_rejected() {
        let mut options = default_options();
        options.detector = "sobel".to_string();
        assert!(options.to_config().is_err());
    }

    #[test]
    fn test_invalid_optics_rejected() {
        let mut options = default_options();
        options.focal_length = 0.0;
        assert!(options.to_config().is_err());
    }
}
