/// Visualization projection of an analysis result.
///
/// A thin, pure mapping from the analysis result into renderable line
/// segments and markers. The central line can be shifted by an exaggerated
/// perpendicular offset so a sub-pixel focus error stays visible on screen;
/// the exaggeration factor rides along so consumers can label it honestly.
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use serde::Serialize;

use crate::analyzer::AnalysisResult;
use crate::focus_metrics::outer_intersection;
use crate::geometry::{Line, Point2D};
use crate::raster::RasterImage;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Segment {
    pub p1: Point2D,
    pub p2: Point2D,
}

impl Segment {
    fn from_line(line: &Line) -> Self {
        Self {
            p1: line.p1,
            p2: line.p2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpikeOverlay {
    pub central: Segment,
    pub left: Segment,
    pub right: Segment,
    /// Central line shifted by the exaggerated offset for display.
    pub central_display: Segment,
    pub intersection: Point2D,
    /// Multiplier applied to the true offset for `central_display`; 1.0 when
    /// the error is already visible.
    pub offset_exaggeration: f64,
}

/// Project an analysis result into overlay geometry. `min_visible_offset`
/// is the smallest on-screen offset (in pixels) worth drawing distinctly;
/// smaller true errors get scaled up to it.
pub fn project(result: &AnalysisResult, min_visible_offset: f64) -> SpikeOverlay {
    let triplet = &result.triplet;
    let intersection = outer_intersection(triplet);
    let error = result.metrics.focus_error_pixels;

    let exaggeration = if error > 1e-9 && error < min_visible_offset {
        min_visible_offset / error
    } else {
        1.0
    };

    // Shift the central line away from the intersection by the extra
    // distance. The perpendicular sign is ambiguous, so take whichever
    // direction increases the gap.
    let central_display = if exaggeration > 1.0 {
        let extra = (exaggeration - 1.0) * error;
        let a = triplet.central.line.offset_perpendicular(extra);
        let b = triplet.central.line.offset_perpendicular(-extra);
        if a.distance_to_point(&intersection) >= b.distance_to_point(&intersection) {
            a
        } else {
            b
        }
    } else {
        triplet.central.line
    };

    SpikeOverlay {
        central: Segment::from_line(&triplet.central.line),
        left: Segment::from_line(&triplet.left.line),
        right: Segment::from_line(&triplet.right.line),
        central_display: Segment::from_line(&central_display),
        intersection,
        offset_exaggeration: exaggeration,
    }
}

/// Render the analysis over a grayscale copy of the input image: outer
/// spikes in green, the (display-offset) central spike in red, the
/// intersection marker in yellow.
pub fn render_annotated(
    image: &RasterImage,
    result: &AnalysisResult,
    min_visible_offset: f64,
) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let overlay = project(result, min_visible_offset);
    let (width, height) = (image.width(), image.height());

    let mut rgb_image = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(width as u32, height as u32);
    for (x, y, pixel) in rgb_image.enumerate_pixels_mut() {
        let value = image.brightness_at(x as usize, y as usize).round() as u8;
        *pixel = Rgb([value, value, value]);
    }

    let green = Rgb([0u8, 220u8, 0u8]);
    let red = Rgb([255u8, 60u8, 60u8]);
    let yellow = Rgb([255u8, 220u8, 0u8]);

    let draw_segment = |img: &mut ImageBuffer<Rgb<u8>, Vec<u8>>, s: &Segment, color: Rgb<u8>| {
        draw_line_segment_mut(
            img,
            (s.p1.x as f32, s.p1.y as f32),
            (s.p2.x as f32, s.p2.y as f32),
            color,
        );
    };

    draw_segment(&mut rgb_image, &overlay.left, green);
    draw_segment(&mut rgb_image, &overlay.right, green);
    draw_segment(&mut rgb_image, &overlay.central_display, red);

    let marker = (overlay.intersection.x as i32, overlay.intersection.y as i32);
    draw_hollow_circle_mut(&mut rgb_image, marker, 6, yellow);
    draw_filled_circle_mut(&mut rgb_image, marker, 1, yellow);

    rgb_image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::config::AnalysisConfig;

    fn blank_result() -> AnalysisResult {
        let image = RasterImage::from_luma8(120, 120, vec![0; 120 * 120]).unwrap();
        analyze(&image, &AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_project_zero_error_no_exaggeration() {
        // The blank-image fallback has zero focus error.
        let result = blank_result();
        let overlay = project(&result, 8.0);
        assert_eq!(overlay.offset_exaggeration, 1.0);
        assert_eq!(overlay.central.p1.x, overlay.central_display.p1.x);
    }

    #[test]
    fn test_project_exaggerates_small_offset() {
        let mut result = blank_result();
        result.metrics.focus_error_pixels = 0.5;
        let overlay = project(&result, 8.0);
        assert!((overlay.offset_exaggeration - 16.0).abs() < 1e-9);
        // The display line moved off the true central line.
        assert!(
            (overlay.central.p1.x - overlay.central_display.p1.x).abs()
                + (overlay.central.p1.y - overlay.central_display.p1.y).abs()
                > 1.0
        );
    }

    #[test]
    fn test_render_annotated_dimensions() {
        let image = RasterImage::from_luma8(120, 120, vec![0; 120 * 120]).unwrap();
        let result = analyze(&image, &AnalysisConfig::default()).unwrap();
        let rendered = render_annotated(&image, &result, 8.0);
        assert_eq!(rendered.width(), 120);
        assert_eq!(rendered.height(), 120);
    }
}
