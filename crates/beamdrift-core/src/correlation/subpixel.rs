use ndarray::Array2;

use crate::consts::EPSILON;
use crate::geometry::Position;

/// Vertex offset of the parabola through three equally spaced samples,
/// or 0 when the samples are (nearly) collinear.
fn parabola_vertex(prev: f64, curr: f64, next: f64) -> f64 {
    let curvature = prev - 2.0 * curr + next;
    if curvature.abs() > EPSILON {
        (prev - next) / (2.0 * curvature)
    } else {
        0.0
    }
}

/// Sub-pixel offset of a peak from separable parabola fits through its
/// 3x3 neighbourhood, clamped to half a pixel.
///
/// Peaks on the border are not refined.
pub fn refine_peak_paraboloid(values: &Array2<f64>, row: usize, col: usize) -> Position {
    let (h, w) = values.dim();
    if row == 0 || row + 1 >= h || col == 0 || col + 1 >= w {
        return Position::ZERO;
    }

    let centre = values[[row, col]];
    let dy = parabola_vertex(values[[row - 1, col]], centre, values[[row + 1, col]]);
    let dx = parabola_vertex(values[[row, col - 1]], centre, values[[row, col + 1]]);

    Position::new(dx.clamp(-0.5, 0.5), dy.clamp(-0.5, 0.5))
}
