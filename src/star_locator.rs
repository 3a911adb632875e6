/// Star center localization.
///
/// A coarse strided scan finds the brightest neighborhood, then an iterated
/// intensity-weighted centroid over a recentered window refines it to
/// sub-pixel accuracy. The centroid is preferred over the raw per-pixel
/// maximum because it shrugs off hot pixels and sits stable on a saturated
/// core plateau. This stage never fails: a fully dark frame falls back to
/// the image center.
use serde::Serialize;
use tracing::debug;

use crate::raster::RasterImage;

/// Stride of the coarse brightness scan.
const COARSE_STRIDE: usize = 4;

/// Fraction of the local peak a pixel must exceed to contribute to the
/// centroid. High enough that only the star core qualifies; diffraction
/// spikes radiating through the window must not add centroid mass.
const CENTROID_CUTOFF: f64 = 0.90;

/// Centroid refinement passes. The coarse scan can land on the corner of a
/// saturated plateau, so the window is recentered on each pass.
const CENTROID_ITERATIONS: usize = 5;

/// Recentering movement below which iteration stops early.
const CONVERGENCE_PIXELS: f64 = 0.05;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StarCenter {
    pub x: f64,
    pub y: f64,
    pub brightness: f64,
}

/// Locate the dominant star in the image.
pub fn locate(image: &RasterImage) -> StarCenter {
    let width = image.width();
    let height = image.height();

    // Coarse pass: track the brightest strided sample, first-found wins ties.
    let mut best_x = width / 2;
    let mut best_y = height / 2;
    let mut best_brightness = 0.0f64;
    for y in (0..height).step_by(COARSE_STRIDE) {
        for x in (0..width).step_by(COARSE_STRIDE) {
            let b = image.brightness_at(x, y);
            if b > best_brightness {
                best_brightness = b;
                best_x = x;
                best_y = y;
            }
        }
    }

    if best_brightness <= 0.0 {
        debug!("no signal above zero, defaulting star center to image center");
        return StarCenter {
            x: width as f64 / 2.0,
            y: height as f64 / 2.0,
            brightness: 0.0,
        };
    }

    // Refinement window scaled to image size, kept within 10..=50 px.
    let radius = (width.max(height) / 40).clamp(10, 50) as i64;

    // Iterated centroid: each pass recenters the window on the previous
    // estimate, so a coarse hit on the corner of a saturated plateau walks
    // onto the plateau's true center instead of freezing where it landed.
    let mut cx = best_x as f64;
    let mut cy = best_y as f64;
    let mut peak = best_brightness;
    for _ in 0..CENTROID_ITERATIONS {
        let x_min = (cx.round() as i64 - radius).max(0) as usize;
        let y_min = (cy.round() as i64 - radius).max(0) as usize;
        let x_max = ((cx.round() as i64 + radius + 1) as usize).min(width);
        let y_max = ((cy.round() as i64 + radius + 1) as usize).min(height);

        // Local true peak inside the current window.
        peak = 0.0;
        for y in y_min..y_max {
            for x in x_min..x_max {
                peak = peak.max(image.brightness_at(x, y));
            }
        }
        if peak <= 0.0 {
            break;
        }

        // Intensity-weighted centroid over core pixels only.
        let cutoff = peak * CENTROID_CUTOFF;
        let mut sum_w = 0.0;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        for y in y_min..y_max {
            for x in x_min..x_max {
                let b = image.brightness_at(x, y);
                if b > cutoff {
                    sum_w += b;
                    sum_x += x as f64 * b;
                    sum_y += y as f64 * b;
                }
            }
        }
        if sum_w <= 0.0 {
            break;
        }

        let next_x = sum_x / sum_w;
        let next_y = sum_y / sum_w;
        let moved = ((next_x - cx).powi(2) + (next_y - cy).powi(2)).sqrt();
        cx = next_x;
        cy = next_y;
        if moved < CONVERGENCE_PIXELS {
            break;
        }
    }

    let center = StarCenter {
        x: cx,
        y: cy,
        brightness: peak,
    };

    debug!(
        "star center at ({:.2}, {:.2}), peak brightness {:.1}",
        center.x, center.y, center.brightness
    );
    center
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RasterImage;

    fn luma_image(width: usize, height: usize, painter: impl Fn(usize, usize) -> u8) -> RasterImage {
        let mut pixels = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                pixels[y * width + x] = painter(x, y);
            }
        }
        RasterImage::from_luma8(width, height, pixels).unwrap()
    }

    #[test]
    fn test_dark_image_defaults_to_center() {
        let img = luma_image(100, 80, |_, _| 0);
        let center = locate(&img);
        assert_eq!(center.x, 50.0);
        assert_eq!(center.y, 40.0);
        assert_eq!(center.brightness, 0.0);
    }

    #[test]
    fn test_locates_gaussian_star() {
        let (sx, sy) = (61.3, 42.7);
        let img = luma_image(128, 96, |x, y| {
            let d2 = (x as f64 - sx).powi(2) + (y as f64 - sy).powi(2);
            (255.0 * (-d2 / 18.0).exp()) as u8
        });
        let center = locate(&img);
        assert!((center.x - sx).abs() < 1.0, "x = {}", center.x);
        assert!((center.y - sy).abs() < 1.0, "y = {}", center.y);
        assert!(center.brightness > 200.0);
    }

    #[test]
    fn test_saturated_core_with_spikes_stays_centered() {
        // A star bright enough to clip into a 255 plateau, with three
        // diffraction spikes radiating through the refinement window. The
        // coarse scan lands somewhere on the plateau; the iterated core
        // centroid must still settle on the star, not on spike mass or the
        // plateau corner.
        let (sx, sy) = (120.4, 119.6);
        let spike_angles = [56.0f64, 90.0, 124.0];
        let img = luma_image(240, 240, |x, y| {
            let dx = x as f64 - sx;
            let dy = y as f64 - sy;
            let mut v = 12.0 + 400.0 * (-(dx * dx + dy * dy) / 18.0).exp();
            for angle in spike_angles {
                let theta = angle.to_radians();
                let d = -dx * theta.sin() + dy * theta.cos();
                v += 170.0 * (-d * d / 6.48).exp();
            }
            v.min(255.0) as u8
        });
        let center = locate(&img);
        assert!((center.x - sx).abs() < 2.0, "x = {}", center.x);
        assert!((center.y - sy).abs() < 2.0, "y = {}", center.y);
        assert_eq!(center.brightness, 255.0);
    }

    #[test]
    fn test_centroid_ignores_hot_pixel_offset() {
        // A star plus a single hot pixel nearby; the centroid should stay
        // close to the star, not snap to the midpoint.
        let (sx, sy) = (40.0, 40.0);
        let img = luma_image(100, 100, |x, y| {
            if x == 44 && y == 40 {
                return 255;
            }
            let d2 = (x as f64 - sx).powi(2) + (y as f64 - sy).powi(2);
            (250.0 * (-d2 / 12.0).exp()) as u8
        });
        let center = locate(&img);
        assert!((center.x - sx).abs() < 1.5, "x = {}", center.x);
        assert!((center.y - sy).abs() < 0.5, "y = {}", center.y);
    }
}
