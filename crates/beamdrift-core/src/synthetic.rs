//! Noise-free synthetic datasets with known particle motion.
//!
//! Every particle is a small cluster of Gaussian blobs; each frame is the
//! reference shifted by the particle's true track.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{DriftError, Result};
use crate::geometry::{mean_track, Position, Track};
use crate::pipeline::{MetadataShifts, Micrograph, MicrographSource};
use crate::spectrum::{fft2d, shift_spectrum, Spectrum};

// (dx, dy, sigma, amplitude) of the blobs making up one particle.
const BLOBS: [(f64, f64, f64, f64); 3] = [
    (0.0, 0.0, 2.0, 1.0),
    (4.0, 1.0, 1.5, 0.7),
    (-3.0, 3.0, 1.2, 0.5),
];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub micrographs: usize,
    pub particles: usize,
    pub frames: usize,
    pub box_size: usize,
    /// Whole-micrograph drift per frame (pixels).
    pub drift: Position,
    /// Amplitude of the smooth per-particle deviation from the drift.
    pub wobble: f64,
    /// Static offset amplitude of each particle.
    pub offset: f64,
    /// Spacing of the particle grid (pixels).
    pub spacing: f64,
    /// Micrographs that fail to load.
    #[serde(default)]
    pub unavailable: Vec<usize>,
    /// Attach the true shifts as stored metadata.
    #[serde(default)]
    pub with_metadata: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            micrographs: 2,
            particles: 6,
            frames: 8,
            box_size: 32,
            drift: Position::new(0.4, -0.25),
            wobble: 0.3,
            offset: 0.5,
            spacing: 150.0,
            unavailable: Vec::new(),
            with_metadata: false,
        }
    }
}

pub struct SyntheticDataset {
    config: SyntheticConfig,
}

impl SyntheticDataset {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.box_size < 8 {
            return Err(DriftError::InvalidConfig(format!(
                "synthetic box size must be at least 8, got {}",
                config.box_size
            )));
        }
        if config.frames == 0 {
            return Err(DriftError::EmptySequence);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub fn name(index: usize) -> String {
        format!("synthetic_{index:03}")
    }

    /// Micrograph coordinates of the particles, on a square grid.
    pub fn positions(&self) -> Vec<Position> {
        let n = self.config.particles;
        let cols = (n as f64).sqrt().ceil().max(1.0) as usize;
        (0..n)
            .map(|p| {
                Position::new(
                    self.config.spacing * (1 + p % cols) as f64,
                    self.config.spacing * (1 + p / cols) as f64,
                )
            })
            .collect()
    }

    /// The shift of every particle in every frame of micrograph `index`.
    pub fn true_tracks(&self, index: usize) -> Vec<Track> {
        let c = &self.config;
        (0..c.particles)
            .map(|p| {
                let phase = 1.7 * p as f64 + 0.9 * index as f64;
                let offset = Position::new((2.3 * phase).sin(), (1.3 * phase).cos()) * c.offset;
                (0..c.frames)
                    .map(|f| {
                        let a = phase + 0.4 * f as f64;
                        let wobble =
                            Position::new(a.sin() - phase.sin(), a.cos() - phase.cos()) * c.wobble;
                        offset + c.drift * f as f64 + wobble
                    })
                    .collect()
            })
            .collect()
    }

    /// Real-space image of particle `p`, centred in the box.
    pub fn particle_image(&self, p: usize) -> Array2<f64> {
        let n = self.config.box_size;
        let center = (n / 2) as f64;
        let angle = 0.9 * p as f64;
        let (sin, cos) = angle.sin_cos();

        Array2::from_shape_fn((n, n), |(row, col)| {
            BLOBS
                .iter()
                .map(|&(dx, dy, sigma, amp)| {
                    let bx = center + cos * dx - sin * dy;
                    let by = center + sin * dx + cos * dy;
                    let r2 = (col as f64 - bx).powi(2) + (row as f64 - by).powi(2);
                    amp * (-0.5 * r2 / (sigma * sigma)).exp()
                })
                .sum()
        })
    }
}

impl MicrographSource for SyntheticDataset {
    fn micrograph_count(&self) -> usize {
        self.config.micrographs
    }

    fn load(&self, index: usize) -> Result<Micrograph> {
        if index >= self.config.micrographs || self.config.unavailable.contains(&index) {
            return Err(DriftError::InputUnavailable {
                index,
                reason: "no such micrograph".into(),
            });
        }

        let tracks = self.true_tracks(index);
        let references: Vec<Spectrum> = (0..self.config.particles)
            .map(|p| fft2d(&self.particle_image(p)))
            .collect();
        let movie = references
            .iter()
            .zip(&tracks)
            .map(|(reference, track)| {
                track
                    .iter()
                    .map(|&shift| shift_spectrum(reference, shift))
                    .collect()
            })
            .collect();

        let shifts = self.config.with_metadata.then(|| MetadataShifts {
            global: mean_track(&tracks),
            particles: tracks.clone(),
        });

        Ok(Micrograph {
            name: Self::name(index),
            box_size: self.config.box_size,
            positions: self.positions(),
            movie,
            references,
            shifts,
        })
    }
}
