use crate::error::{DriftError, Result};
use crate::geometry::{Position, Track};
use crate::spectrum::Spectrum;

/// Particle data of one micrograph, already in Fourier space.
#[derive(Clone, Debug)]
pub struct Micrograph {
    pub name: String,
    /// Edge length of the square particle boxes (pixels).
    pub box_size: usize,
    pub positions: Vec<Position>,
    /// Observed frames, indexed `[particle][frame]`.
    pub movie: Vec<Vec<Spectrum>>,
    /// Predicted (reference) spectrum of each particle.
    pub references: Vec<Spectrum>,
    /// Previously estimated shifts, if the input carries them.
    pub shifts: Option<MetadataShifts>,
}

/// Per-frame shifts persisted alongside a micrograph.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataShifts {
    /// Whole-micrograph drift, one entry per frame.
    pub global: Track,
    /// Total shift of every particle, `[particle][frame]`.
    pub particles: Vec<Track>,
}

impl Micrograph {
    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    pub fn frame_count(&self) -> usize {
        self.movie.first().map_or(0, Vec::len)
    }

    /// Check that every array agrees with the declared particle count,
    /// frame count and box size.
    pub fn validate(&self) -> Result<()> {
        let pc = self.particle_count();
        let fc = self.frame_count();
        let shape = (self.box_size, self.box_size);

        check_len(pc, self.movie.len())?;
        check_len(pc, self.references.len())?;
        for (frames, reference) in self.movie.iter().zip(&self.references) {
            check_len(fc, frames.len())?;
            for spectrum in frames.iter().chain(std::iter::once(reference)) {
                if spectrum.dim() != shape {
                    return Err(DriftError::DimensionMismatch {
                        expected: self.box_size,
                        actual: spectrum.nrows().max(spectrum.ncols()),
                    });
                }
            }
        }

        if let Some(shifts) = &self.shifts {
            check_len(fc, shifts.global.len())?;
            check_len(pc, shifts.particles.len())?;
            for track in &shifts.particles {
                check_len(fc, track.len())?;
            }
        }
        Ok(())
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(DriftError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Random access to the micrographs of a dataset.
pub trait MicrographSource: Sync {
    fn micrograph_count(&self) -> usize;

    /// Load micrograph `index`. Failures for a single micrograph should be
    /// reported as [`DriftError::InputUnavailable`] so that the run can
    /// continue without it.
    fn load(&self, index: usize) -> Result<Micrograph>;
}
