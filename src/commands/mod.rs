pub mod analyze;
pub mod annotate;

pub use analyze::analyze_image;
pub use annotate::annotate_image;
