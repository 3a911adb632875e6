/// Analytic 2-D line geometry for diffraction spike analysis.
///
/// All spike lines are represented as long chords through a common center so
/// that every line in a pattern is comparable in length, plus the angle they
/// were detected at. Intersections are solved with a small nalgebra system so
/// the degenerate (near-parallel) case is an explicit determinant check.
use nalgebra::{Matrix2, Vector2};
use serde::Serialize;

/// Half-length of a spike chord relative to the image diagonal. Long enough
/// that any two non-parallel spikes cross inside or near the frame.
pub const CHORD_RADIUS_FACTOR: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A spike line: a chord of fixed radius through a center point at a given
/// angle. `p1` and `p2` are symmetric about that center.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Line {
    pub angle_degrees: f64,
    pub p1: Point2D,
    pub p2: Point2D,
}

impl Line {
    /// Build a chord through `center` at `angle_degrees`, extending `radius`
    /// pixels in both directions.
    pub fn through_center(center: Point2D, angle_degrees: f64, radius: f64) -> Self {
        let theta = angle_degrees.to_radians();
        let (dx, dy) = (theta.cos(), theta.sin());
        Line {
            angle_degrees,
            p1: Point2D::new(center.x - dx * radius, center.y - dy * radius),
            p2: Point2D::new(center.x + dx * radius, center.y + dy * radius),
        }
    }

    /// Convert a Hough (rho, theta) pair into a chord. The line is
    /// perpendicular to the (cos theta, sin theta) normal through
    /// (rho cos theta, rho sin theta).
    pub fn from_hough(rho: f64, theta_radians: f64, radius: f64) -> Self {
        let (sin_t, cos_t) = theta_radians.sin_cos();
        let x0 = rho * cos_t;
        let y0 = rho * sin_t;
        // Direction along the line is perpendicular to the normal.
        let (dx, dy) = (-sin_t, cos_t);
        let angle_degrees = normalize_angle_180(dy.atan2(dx).to_degrees());
        Line {
            angle_degrees,
            p1: Point2D::new(x0 - dx * radius, y0 - dy * radius),
            p2: Point2D::new(x0 + dx * radius, y0 + dy * radius),
        }
    }

    /// Coefficients of the general form `a*x + b*y = c`.
    fn general_form(&self) -> (f64, f64, f64) {
        let a = self.p2.y - self.p1.y;
        let b = self.p1.x - self.p2.x;
        let c = a * self.p1.x + b * self.p1.y;
        (a, b, c)
    }

    /// Intersection of two lines via the standard determinant solve.
    /// Returns `None` when the lines are parallel or near-parallel.
    pub fn intersection(&self, other: &Line) -> Option<Point2D> {
        let (a1, b1, c1) = self.general_form();
        let (a2, b2, c2) = other.general_form();

        let m = Matrix2::new(a1, b1, a2, b2);
        if m.determinant().abs() < 1e-9 {
            return None;
        }
        let solution = m.try_inverse()? * Vector2::new(c1, c2);
        Some(Point2D::new(solution.x, solution.y))
    }

    /// Perpendicular distance from a point to this line,
    /// `|a*x0 + b*y0 - c| / sqrt(a^2 + b^2)`.
    pub fn distance_to_point(&self, point: &Point2D) -> f64 {
        let (a, b, c) = self.general_form();
        let norm = (a * a + b * b).sqrt();
        if norm < 1e-12 {
            // Degenerate zero-length chord.
            return self.p1.distance_to(point);
        }
        (a * point.x + b * point.y - c).abs() / norm
    }

    /// Shift the line perpendicular to its direction by `offset` pixels.
    pub fn offset_perpendicular(&self, offset: f64) -> Line {
        let theta = self.angle_degrees.to_radians();
        let (nx, ny) = (-theta.sin(), theta.cos());
        Line {
            angle_degrees: self.angle_degrees,
            p1: Point2D::new(self.p1.x + nx * offset, self.p1.y + ny * offset),
            p2: Point2D::new(self.p2.x + nx * offset, self.p2.y + ny * offset),
        }
    }
}

/// Normalize an angle to the bidirectional [0, 180) range. A spike and its
/// 180-degree opposite ray are the same physical line.
pub fn normalize_angle_180(angle_degrees: f64) -> f64 {
    let mut a = angle_degrees % 180.0;
    if a < 0.0 {
        a += 180.0;
    }
    a
}

/// Smallest separation between two bidirectional angles, in [0, 90].
pub fn angular_difference_180(a: f64, b: f64) -> f64 {
    let diff = (normalize_angle_180(a) - normalize_angle_180(b)).abs();
    diff.min(180.0 - diff)
}
