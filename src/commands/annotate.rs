use anyhow::{Context, Result};

use crate::analyzer::analyze;
use crate::cli::AnalysisOptions;
use crate::commands::analyze::load_raster;
use crate::visualization::render_annotated;

pub fn annotate_image(
    image_path: &str,
    output_path: &str,
    min_visible_offset: f64,
    options: &AnalysisOptions,
) -> Result<()> {
    let config = options.to_config()?;
    let image = load_raster(image_path)?;

    let result = analyze(&image, &config)?;
    let annotated = render_annotated(&image, &result, min_visible_offset);

    annotated
        .save(output_path)
        .with_context(|| format!("Failed to write annotated image: {}", output_path))?;

    println!(
        "Wrote {} (focus error {:.3} px, in focus: {})",
        output_path,
        result.metrics.focus_error_pixels,
        if result.metrics.in_focus { "yes" } else { "no" }
    );

    Ok(())
}
