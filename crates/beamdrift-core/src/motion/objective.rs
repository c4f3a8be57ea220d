use rayon::prelude::*;

use crate::correlation::CorrelationVolume;
use crate::error::{DriftError, Result};
use crate::geometry::{Position, Track};

use super::descent::DifferentiableObjective;
use super::prior::PriorWeights;

/// Length of the flattened parameter vector for `pc` particles and `fc` frames.
pub fn parameter_count(particle_count: usize, frame_count: usize) -> usize {
    2 * (particle_count + particle_count * frame_count.saturating_sub(1))
}

/// Index of the x coordinate of the `step`-th frame delta of particle `p`.
fn delta_index(particle_count: usize, steps: usize, p: usize, step: usize) -> usize {
    2 * (particle_count + p * steps + step)
}

/// Flatten tracks into first-frame offsets followed by per-frame deltas.
pub fn tracks_to_params(tracks: &[Track]) -> Vec<f64> {
    let pc = tracks.len();
    let fc = tracks.first().map_or(0, Vec::len);
    let steps = fc.saturating_sub(1);
    let mut params = vec![0.0; parameter_count(pc, fc)];

    for (p, track) in tracks.iter().enumerate() {
        if let Some(first) = track.first() {
            params[2 * p] = first.x;
            params[2 * p + 1] = first.y;
        }
        for k in 0..steps {
            let d = track[k + 1] - track[k];
            let i = delta_index(pc, steps, p, k);
            params[i] = d.x;
            params[i + 1] = d.y;
        }
    }

    params
}

/// Inverse of [`tracks_to_params`].
pub fn params_to_tracks(params: &[f64], particle_count: usize, frame_count: usize) -> Vec<Track> {
    let steps = frame_count.saturating_sub(1);

    (0..particle_count)
        .map(|p| {
            let mut track = Vec::with_capacity(frame_count);
            if frame_count == 0 {
                return track;
            }
            let mut pos = Position::new(params[2 * p], params[2 * p + 1]);
            track.push(pos);
            for k in 0..steps {
                let i = delta_index(particle_count, steps, p, k);
                pos += Position::new(params[i], params[i + 1]);
                track.push(pos);
            }
            track
        })
        .collect()
}

/// Negative correlation evidence plus smoothness prior, as a function of the
/// flattened track parameters.
pub struct TrajectoryObjective<'a> {
    correlations: &'a [Vec<CorrelationVolume>],
    weights: PriorWeights,
    global: &'a [Position],
    particle_count: usize,
    frame_count: usize,
}

impl<'a> TrajectoryObjective<'a> {
    /// `global` is the per-frame drift shared by all particles; it shifts the
    /// correlation lookup but is not penalized by the prior.
    pub fn new(
        correlations: &'a [Vec<CorrelationVolume>],
        weights: PriorWeights,
        global: &'a [Position],
    ) -> Result<Self> {
        let particle_count = correlations.len();
        let frame_count = global.len();

        if weights.particle_count() != particle_count {
            return Err(DriftError::DimensionMismatch {
                expected: particle_count,
                actual: weights.particle_count(),
            });
        }
        if weights.frame_count() != frame_count {
            return Err(DriftError::DimensionMismatch {
                expected: frame_count,
                actual: weights.frame_count(),
            });
        }
        if let Some(bad) = correlations.iter().find(|f| f.len() != frame_count) {
            return Err(DriftError::DimensionMismatch {
                expected: frame_count,
                actual: bad.len(),
            });
        }

        Ok(Self {
            correlations,
            weights,
            global,
            particle_count,
            frame_count,
        })
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn weights(&self) -> &PriorWeights {
        &self.weights
    }

    fn tracks(&self, params: &[f64]) -> Vec<Track> {
        params_to_tracks(params, self.particle_count, self.frame_count)
    }

    /// Correlation score of one particle along its track.
    fn particle_score(&self, p: usize, track: &[Position]) -> f64 {
        self.correlations[p]
            .iter()
            .zip(track)
            .zip(self.global)
            .map(|((volume, &pos), &g)| volume.sample(pos + g))
            .sum()
    }
}

impl DifferentiableObjective for TrajectoryObjective<'_> {
    fn dimension(&self) -> usize {
        parameter_count(self.particle_count, self.frame_count)
    }

    fn cost(&self, params: &[f64]) -> f64 {
        let tracks = self.tracks(params);

        // Collected in particle order so the sum is independent of the pool.
        let per_particle: Vec<f64> = tracks
            .par_iter()
            .enumerate()
            .map(|(p, track)| self.weights.track_cost(track) - self.particle_score(p, track))
            .collect();

        per_particle.iter().sum::<f64>() + self.weights.divergence_cost(&tracks)
    }

    fn gradient(&self, params: &[f64], grad: &mut [f64]) {
        let tracks = self.tracks(params);
        let pc = self.particle_count;
        let steps = self.frame_count.saturating_sub(1);

        let position_grads: Vec<Vec<Position>> = tracks
            .par_iter()
            .enumerate()
            .map(|(p, track)| {
                let mut g: Vec<Position> = self.correlations[p]
                    .iter()
                    .zip(track)
                    .zip(self.global)
                    .map(|((volume, &pos), &shift)| -volume.sample_with_gradient(pos + shift).1)
                    .collect();
                self.weights.add_track_gradient(track, &mut g);
                g
            })
            .collect();

        let divergence = self.weights.divergence_gradient(&tracks);

        grad.iter_mut().for_each(|v| *v = 0.0);

        for (p, g) in position_grads.iter().enumerate() {
            // Position f depends on the offset and on every delta before f,
            // so each delta collects the suffix sum of position gradients.
            let mut suffix = Position::ZERO;
            for k in (0..steps).rev() {
                suffix += g[k + 1];
                let d = suffix + divergence[p][k];
                let i = delta_index(pc, steps, p, k);
                grad[i] = d.x;
                grad[i + 1] = d.y;
            }
            if let Some(&first) = g.first() {
                let total = suffix + first;
                grad[2 * p] = total.x;
                grad[2 * p + 1] = total.y;
            }
        }
    }

    /// Step each particle in position space rather than parameter space.
    ///
    /// The offset/delta parametrization couples every delta to all later
    /// frames, which stalls plain descent on the kinks of bilinear sampling.
    /// Undoing the suffix sums recovers one gradient per frame; the direction
    /// then moves frame `f` by exactly that gradient.
    fn precondition(&self, grad: &mut [f64]) {
        let pc = self.particle_count;
        let fc = self.frame_count;
        let steps = fc.saturating_sub(1);
        if steps == 0 {
            return;
        }

        let mut per_frame = vec![Position::ZERO; fc];

        for p in 0..pc {
            {
                let view: &[f64] = grad;
                let at = |i: usize| Position::new(view[i], view[i + 1]);
                for (f, g) in per_frame.iter_mut().enumerate() {
                    let before = if f == 0 {
                        at(2 * p)
                    } else {
                        at(delta_index(pc, steps, p, f - 1))
                    };
                    let after = if f == steps {
                        Position::ZERO
                    } else {
                        at(delta_index(pc, steps, p, f))
                    };
                    *g = before - after;
                }
            }

            grad[2 * p] = per_frame[0].x;
            grad[2 * p + 1] = per_frame[0].y;
            for k in 0..steps {
                let d = per_frame[k + 1] - per_frame[k];
                let i = delta_index(pc, steps, p, k);
                grad[i] = d.x;
                grad[i + 1] = d.y;
            }
        }
    }
}
