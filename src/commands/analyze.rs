use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::analyzer::{analyze, analyze_roi, AnalysisResult};
use crate::cli::AnalysisOptions;
use crate::raster::{RasterImage, Roi};
use crate::spike_selection::Provenance;

pub fn analyze_image(
    image_path: &str,
    format: &str,
    roi: Option<&str>,
    options: &AnalysisOptions,
) -> Result<()> {
    let config = options.to_config()?;
    let image = load_raster(image_path)?;

    let (mut result, offset) = match roi {
        Some(spec) => {
            let roi = parse_roi(spec)?;
            let result = analyze_roi(&image, &roi, &config)?;
            (result, (roi.x as f64, roi.y as f64))
        }
        None => (analyze(&image, &config)?, (0.0, 0.0)),
    };

    // ROI analysis reports ROI-relative coordinates; translate back into
    // full-image space for display.
    translate_result(&mut result, offset.0, offset.1);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "table" => print_table(&result),
        other => bail!("invalid format: {}. Use json or table", other),
    }

    Ok(())
}

pub(crate) fn load_raster(path: &str) -> Result<RasterImage> {
    let decoded = image::open(Path::new(path))
        .with_context(|| format!("Failed to open image: {}", path))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = (rgba.width() as usize, rgba.height() as usize);
    RasterImage::from_rgba8(width, height, rgba.into_raw())
}

fn parse_roi(spec: &str) -> Result<Roi> {
    let parts: Vec<usize> = spec
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("Invalid ROI '{}', expected x,y,width,height", spec))?;
    if parts.len() != 4 {
        bail!("Invalid ROI '{}', expected x,y,width,height", spec);
    }
    Ok(Roi {
        x: parts[0],
        y: parts[1],
        width: parts[2],
        height: parts[3],
    })
}

fn translate_result(result: &mut AnalysisResult, dx: f64, dy: f64) {
    if dx == 0.0 && dy == 0.0 {
        return;
    }
    result.center.x += dx;
    result.center.y += dy;
    for spike in [
        &mut result.triplet.central,
        &mut result.triplet.left,
        &mut result.triplet.right,
    ] {
        spike.line.p1.x += dx;
        spike.line.p1.y += dy;
        spike.line.p2.x += dx;
        spike.line.p2.y += dy;
    }
}

fn print_table(result: &AnalysisResult) {
    let metrics = &result.metrics;
    let provenance = match result.triplet.provenance {
        Provenance::Measured => "measured",
        Provenance::Fallback => "fallback (insufficient signal)",
    };

    println!("Star center:        ({:.2}, {:.2})", result.center.x, result.center.y);
    println!(
        "Spike angles:       central {:.1}°, left {:.1}°, right {:.1}°",
        result.triplet.central.line.angle_degrees,
        result.triplet.left.line.angle_degrees,
        result.triplet.right.line.angle_degrees
    );
    println!("Detection:          {}", provenance);
    println!("Mask angle:         {:.2}° measured", metrics.mask_angle_measured_degrees);
    println!("Focus error:        {:.3} px ({:.3} µm)", metrics.focus_error_pixels, metrics.focus_error_microns);
    println!("Plate scale:        {:.3} arcsec/px", metrics.plate_scale_arcsec_per_pixel);
    println!("Confidence:         {:.0}%", metrics.confidence_percent);
    println!("In focus:           {}", if metrics.in_focus { "yes" } else { "no" });
}
