//! Starting point of the trajectory optimization.

use tracing::{debug, warn};

use crate::correlation::global::{global_offsets, global_track, sum_over_particles};
use crate::correlation::{CorrelationSet, CorrelationVolume};
use crate::geometry::{Position, Track};

use super::config::{InitConfig, InitialTrackSource};
use super::micrograph::{MetadataShifts, Micrograph};

/// Initial tracks and the fixed global component added to every lookup.
#[derive(Clone, Debug)]
pub struct InitialMotion {
    pub tracks: Vec<Track>,
    pub global: Track,
    /// Particle-summed correlations, when they were needed to build the tracks.
    pub correlation_sums: Option<Vec<CorrelationVolume>>,
}

pub fn initial_motion(
    correlations: &CorrelationSet,
    micrograph: &Micrograph,
    init: &InitConfig,
) -> InitialMotion {
    match (init.source, &micrograph.shifts) {
        (InitialTrackSource::Metadata, Some(shifts)) => from_metadata(shifts, init),
        (InitialTrackSource::Metadata, None) => {
            warn!(
                micrograph = %micrograph.name,
                "No stored shifts, falling back to the global track"
            );
            from_global(correlations, micrograph.box_size, init)
        }
        (InitialTrackSource::Global, _) => from_global(correlations, micrograph.box_size, init),
    }
}

fn from_global(correlations: &CorrelationSet, box_size: usize, init: &InitConfig) -> InitialMotion {
    let sums = sum_over_particles(correlations);
    let glob = global_track(&sums);
    let fc = glob.len();

    let offsets = if init.global_offsets {
        let radius = init.offset_radius_fraction * box_size as f64;
        global_offsets(correlations, &glob, radius)
    } else {
        vec![Position::ZERO; correlations.len()]
    };
    debug!(
        frames = fc,
        particles = offsets.len(),
        "Initial tracks from global motion"
    );

    let (tracks, global) = if init.unregularized_global {
        let tracks = offsets.iter().map(|&o| vec![o; fc]).collect();
        (tracks, glob)
    } else {
        let tracks = offsets
            .iter()
            .map(|&o| glob.iter().map(|&g| g + o).collect())
            .collect();
        (tracks, vec![Position::ZERO; fc])
    };

    InitialMotion {
        tracks,
        global,
        correlation_sums: Some(sums),
    }
}

fn from_metadata(shifts: &MetadataShifts, init: &InitConfig) -> InitialMotion {
    let fc = shifts.global.len();
    let global = if init.unregularized_global {
        shifts.global.clone()
    } else {
        vec![Position::ZERO; fc]
    };

    let tracks = shifts
        .particles
        .iter()
        .map(|track| track.iter().zip(&global).map(|(&s, &g)| s - g).collect())
        .collect();

    InitialMotion {
        tracks,
        global,
        correlation_sums: None,
    }
}
