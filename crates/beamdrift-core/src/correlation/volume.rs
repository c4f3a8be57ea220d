use ndarray::Array2;

use crate::geometry::Position;

use super::subpixel::refine_peak_paraboloid;

/// Cross-correlation score as a function of a candidate 2-D shift.
///
/// The zero shift sits at `(h / 2, w / 2)`. Lookups outside the sampled
/// window are clamped to the border.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationVolume {
    data: Array2<f64>,
}

/// Interpolation cell along one axis: lower index, upper index, fraction,
/// and whether the coordinate fell inside the window (zero slope otherwise).
struct AxisCell {
    lo: usize,
    hi: usize,
    frac: f64,
    inside: bool,
}

fn axis_cell(coord: f64, n: usize) -> AxisCell {
    if n < 2 {
        return AxisCell { lo: 0, hi: 0, frac: 0.0, inside: false };
    }
    let max = (n - 1) as f64;
    let inside = (0.0..=max).contains(&coord);
    let c = coord.clamp(0.0, max);
    let lo = (c.floor() as usize).min(n - 2);
    AxisCell { lo, hi: lo + 1, frac: c - lo as f64, inside }
}

impl CorrelationVolume {
    pub fn new(data: Array2<f64>) -> Self {
        Self { data }
    }

    /// A volume of the given size filled with zeros.
    pub fn zeros(height: usize, width: usize) -> Self {
        Self::new(Array2::zeros((height, width)))
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Array index `(row, col)` of the zero shift.
    pub fn origin(&self) -> (usize, usize) {
        let (h, w) = self.data.dim();
        (h / 2, w / 2)
    }

    /// Bilinear lookup at a sub-pixel shift.
    pub fn sample(&self, shift: Position) -> f64 {
        self.sample_with_gradient(shift).0
    }

    /// Bilinear lookup and its gradient with respect to the shift.
    pub fn sample_with_gradient(&self, shift: Position) -> (f64, Position) {
        let (h, w) = self.data.dim();
        if h == 0 || w == 0 {
            return (0.0, Position::ZERO);
        }
        let (oy, ox) = self.origin();
        let cx = axis_cell(shift.x + ox as f64, w);
        let cy = axis_cell(shift.y + oy as f64, h);

        let v00 = self.data[[cy.lo, cx.lo]];
        let v01 = self.data[[cy.lo, cx.hi]];
        let v10 = self.data[[cy.hi, cx.lo]];
        let v11 = self.data[[cy.hi, cx.hi]];

        let (fx, fy) = (cx.frac, cy.frac);
        let value = v00 * (1.0 - fx) * (1.0 - fy)
            + v01 * fx * (1.0 - fy)
            + v10 * (1.0 - fx) * fy
            + v11 * fx * fy;

        let dx = if cx.inside {
            (v01 - v00) * (1.0 - fy) + (v11 - v10) * fy
        } else {
            0.0
        };
        let dy = if cy.inside {
            (v10 - v00) * (1.0 - fx) + (v11 - v01) * fx
        } else {
            0.0
        };

        (value, Position::new(dx, dy))
    }

    /// Integer shift with the highest score (first one on ties).
    pub fn argmax(&self) -> (usize, usize, f64) {
        let mut best = (0, 0, f64::NEG_INFINITY);
        for ((row, col), &v) in self.data.indexed_iter() {
            if v > best.2 {
                best = (row, col, v);
            }
        }
        best
    }

    /// Sub-pixel shift of the highest score.
    pub fn peak_shift(&self) -> Position {
        let (row, col, _) = self.argmax();
        let (oy, ox) = self.origin();
        let refined = refine_peak_paraboloid(&self.data, row, col);
        Position::new(
            col as f64 - ox as f64 + refined.x,
            row as f64 - oy as f64 + refined.y,
        )
    }

    /// Elementwise accumulation of another volume of the same size.
    pub fn add_assign(&mut self, other: &CorrelationVolume) {
        self.data += &other.data;
    }
}
