use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use tracing::warn;

use crate::consts::{GRID_CELLS, GRID_CENTER, QUADRATIC_FIT_TOLERANCE};

use super::grid::Candidate;

/// Index of the first maximal score.
fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

/// Refine the optimum of a bracketed 3x3 grid by fitting a quadratic surface.
///
/// Cells are in row-major order. If the best sample is not the centre cell,
/// the raw best sample is returned. A degenerate fit falls back to the centre
/// sample.
pub fn interpolate_max(
    samples: &[Candidate; GRID_CELLS],
    scores: &[f64; GRID_CELLS],
) -> Candidate {
    let best = argmax(scores);

    if best != GRID_CENTER {
        warn!(best_cell = best, "TSC not maximal at the centre of the grid, skipping interpolation");
        return samples[best];
    }

    fit_stationary_point(samples, scores).unwrap_or_else(|| {
        warn!("Quadratic fit is degenerate, keeping the grid centre");
        samples[GRID_CENTER]
    })
}

/// Least-squares fit of `f(v, d) = A v^2 + 2B vd + 2C v + D d^2 + 2E d + F`
/// and its stationary point `-[[A, B], [B, D]]^-1 [C, E]`.
///
/// The fit runs in coordinates centred on the middle sample and scaled by
/// the sample spread, which keeps the design matrix well conditioned when
/// the two sigmas differ by orders of magnitude.
pub fn fit_stationary_point(samples: &[Candidate], scores: &[f64]) -> Option<Candidate> {
    if samples.is_empty() || samples.len() != scores.len() {
        return None;
    }
    let centre = samples[samples.len() / 2];
    let spread = |f: fn(&Candidate) -> f64| {
        let s = samples
            .iter()
            .map(|c| (f(c) - f(&centre)).abs())
            .fold(0.0, f64::max);
        if s > 0.0 {
            s
        } else {
            1.0
        }
    };
    let scale_v = spread(|c| c.sig_vel);
    let scale_d = spread(|c| c.sig_div);

    let a = DMatrix::from_fn(samples.len(), 6, |i, j| {
        let v = (samples[i].sig_vel - centre.sig_vel) / scale_v;
        let d = (samples[i].sig_div - centre.sig_div) / scale_d;
        match j {
            0 => v * v,
            1 => 2.0 * v * d,
            2 => 2.0 * v,
            3 => d * d,
            4 => 2.0 * d,
            _ => 1.0,
        }
    });
    let b = DVector::from_column_slice(scores);

    let x = a.svd(true, true).solve(&b, QUADRATIC_FIT_TOLERANCE).ok()?;

    let hessian = Matrix2::new(x[0], x[1], x[1], x[3]);
    let linear = Vector2::new(x[2], x[4]);
    let stationary = -(hessian.try_inverse()? * linear);

    if !stationary.iter().all(|v| v.is_finite()) {
        return None;
    }

    Some(Candidate {
        sig_vel: centre.sig_vel + stationary[0] * scale_v,
        sig_div: centre.sig_div + stationary[1] * scale_d,
    })
}
