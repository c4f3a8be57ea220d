//! Plain-text track files.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::consts::{TRACK_VIS_SCALE, TRACK_VIS_SHORT_FRAMES};
use crate::error::{DriftError, Result};
use crate::geometry::{Position, Track};

/// Write one block per particle: a `#<index>` line followed by one `x y`
/// line per frame, blocks separated by a blank line.
pub fn write_tracks(path: &Path, tracks: &[Track]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for (p, track) in tracks.iter().enumerate() {
        writeln!(w, "#{p}")?;
        for pos in track {
            writeln!(w, "{} {}", pos.x, pos.y)?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// Read a file written by [`write_tracks`].
pub fn read_tracks(path: &Path) -> Result<Vec<Track>> {
    let reader = BufReader::new(File::open(path)?);
    let mut tracks: Vec<Track> = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            tracks.push(Track::new());
            continue;
        }

        let mut fields = line.split_whitespace().map(str::parse::<f64>);
        let (Some(Ok(x)), Some(Ok(y)), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(DriftError::InvalidTrackFile(format!(
                "{}: malformed line {}",
                path.display(),
                number + 1
            )));
        };
        match tracks.last_mut() {
            Some(track) => track.push(Position::new(x, y)),
            None => tracks.push(vec![Position::new(x, y)]),
        }
    }
    Ok(tracks)
}

/// Tracks drawn on the micrograph: particle position plus the exaggerated
/// shift, one block per particle, then the same for the first frames only.
pub fn write_visual_tracks(path: &Path, positions: &[Position], tracks: &[Track]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for (pos, track) in positions.iter().zip(tracks) {
        for &t in track {
            let p = *pos + t * TRACK_VIS_SCALE;
            writeln!(w, "{} {}", p.x, p.y)?;
        }
        writeln!(w)?;
    }
    for (pos, track) in positions.iter().zip(tracks) {
        for &t in track.iter().take(TRACK_VIS_SHORT_FRAMES) {
            let p = *pos + t * TRACK_VIS_SCALE;
            writeln!(w, "{} {}", p.x, p.y)?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// A single track shared by all particles, one `x y` line per frame.
pub fn write_global_track(path: &Path, track: &[Position]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for pos in track {
        writeln!(w, "{} {}", pos.x, pos.y)?;
    }
    w.flush()?;
    Ok(())
}
