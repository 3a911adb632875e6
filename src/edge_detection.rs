/// Canny-style edge detection for the Hough line-detection path.
///
/// Sobel gradients, non-maximum suppression with the gradient direction
/// quantized into four bins, double thresholding into strong/weak pixels,
/// then 8-connected hysteresis linking that promotes weak pixels reachable
/// from a strong one. A blank input degenerates to an all-zero map.
use crate::preprocess::IntensityField;

/// Binary edge map, one bool per pixel.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    pub width: usize,
    pub height: usize,
    pub edges: Vec<bool>,
}

impl EdgeMap {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> bool {
        self.edges[y * self.width + x]
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|&&e| e).count()
    }
}

pub struct EdgeDetector {
    low_threshold: f64,
    high_threshold: f64,
}

impl EdgeDetector {
    pub fn new(low_threshold: f64, high_threshold: f64) -> Self {
        Self {
            low_threshold,
            high_threshold,
        }
    }

    pub fn detect(&self, field: &IntensityField) -> EdgeMap {
        let (magnitudes, orientations) = sobel_gradients(field);
        let suppressed = non_maximum_suppression(&magnitudes, &orientations, field.width, field.height);
        hysteresis(
            &suppressed,
            field.width,
            field.height,
            self.low_threshold,
            self.high_threshold,
        )
    }
}

/// Sobel gradient magnitude and orientation. Border pixels stay zero.
fn sobel_gradients(field: &IntensityField) -> (Vec<f64>, Vec<f64>) {
    let (width, height) = (field.width, field.height);
    let mut magnitudes = vec![0.0; width * height];
    let mut orientations = vec![0.0; width * height];

    if width < 3 || height < 3 {
        return (magnitudes, orientations);
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let p = |dx: i64, dy: i64| -> f64 {
                field.at((x as i64 + dx) as usize, (y as i64 + dy) as usize) as f64
            };
            let gx = -p(-1, -1) + p(1, -1) - 2.0 * p(-1, 0) + 2.0 * p(1, 0) - p(-1, 1) + p(1, 1);
            let gy = -p(-1, -1) - 2.0 * p(0, -1) - p(1, -1) + p(-1, 1) + 2.0 * p(0, 1) + p(1, 1);

            let idx = y * width + x;
            magnitudes[idx] = (gx * gx + gy * gy).sqrt();
            orientations[idx] = gy.atan2(gx);
        }
    }

    (magnitudes, orientations)
}

/// Keep only pixels that are local maxima along their gradient direction,
/// quantized to 0/45/90/135 degrees.
fn non_maximum_suppression(
    magnitudes: &[f64],
    orientations: &[f64],
    width: usize,
    height: usize,
) -> Vec<f64> {
    let mut result = vec![0.0; width * height];
    if width < 3 || height < 3 {
        return result;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let mag = magnitudes[idx];
            if mag <= 0.0 {
                continue;
            }

            let angle = orientations[idx].to_degrees().abs();
            let (dx, dy): (i64, i64) = if !(22.5..157.5).contains(&angle) {
                (1, 0) // horizontal gradient
            } else if angle < 67.5 {
                (1, 1)
            } else if angle < 112.5 {
                (0, 1)
            } else {
                (1, -1)
            };

            let n1 = magnitudes[((y as i64 + dy) as usize) * width + (x as i64 + dx) as usize];
            let n2 = magnitudes[((y as i64 - dy) as usize) * width + (x as i64 - dx) as usize];
            if mag >= n1 && mag >= n2 {
                result[idx] = mag;
            }
        }
    }

    result
}

/// Double threshold plus 8-connected flood-fill from every strong pixel.
/// Weak pixels unreachable from a strong one are discarded.
fn hysteresis(suppressed: &[f64], width: usize, height: usize, low: f64, high: f64) -> EdgeMap {
    let mut edges = vec![false; width * height];
    let mut stack = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if suppressed[idx] >= high && !edges[idx] {
                edges[idx] = true;
                stack.push((x, y));
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let nidx = (ny as usize) * width + nx as usize;
                if !edges[nidx] && suppressed[nidx] >= low {
                    edges[nidx] = true;
                    stack.push((nx as usize, ny as usize));
                }
            }
        }
    }

    EdgeMap {
        width,
        height,
        edges,
    }
}
