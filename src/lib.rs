pub mod analyzer;
pub mod cli;
pub mod commands;
pub mod config;
pub mod edge_detection;
pub mod focus_metrics;
pub mod geometry;
pub mod line_detection;
pub mod preprocess;
pub mod raster;
pub mod spike_selection;
pub mod star_locator;
pub mod visualization;

#[cfg(test)]
mod test_synthetic;

// Re-export commonly used items
pub use analyzer::{analyze, analyze_roi, AnalysisResult};
pub use config::AnalysisConfig;
pub use raster::{RasterImage, Roi};
