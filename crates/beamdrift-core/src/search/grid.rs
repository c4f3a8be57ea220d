use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::consts::{GRID_CELLS, GRID_CENTER};
use crate::error::{DriftError, Result};

use super::quadratic::interpolate_max;

/// A `(sig_vel, sig_div)` hyperparameter pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub sig_vel: f64,
    pub sig_div: f64,
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.sig_vel, self.sig_div)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    /// Scoring the cells that are not known yet.
    Evaluating,
    /// Picking the best of the nine cells.
    Ranking,
    /// Moving the window onto the given best cell.
    Shifting { best: usize },
    /// The centre cell is the best one.
    Converged,
    /// The iteration budget ran out before the optimum was bracketed.
    Unbracketed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchOutcome {
    Converged {
        best: Candidate,
        tsc: f64,
        /// Quadratic-surface estimate inside the bracketing window.
        refined: Candidate,
        rounds: usize,
    },
    /// Best cell of the last window; the optimum may lie further out.
    Unbracketed {
        best: Candidate,
        tsc: f64,
        rounds: usize,
    },
}

impl SearchOutcome {
    /// Refined pair when converged, best grid point otherwise.
    pub fn estimate(&self) -> Candidate {
        match self {
            Self::Converged { refined, .. } => *refined,
            Self::Unbracketed { best, .. } => *best,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// Number of evaluation rounds.
    pub fn rounds(&self) -> usize {
        match self {
            Self::Converged { rounds, .. } | Self::Unbracketed { rounds, .. } => *rounds,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Cell {
    candidate: Candidate,
    tsc: Option<f64>,
}

/// Row-major offsets `(velocity, divergence)` of a cell, each in `-1..=1`.
fn cell_offset(index: usize) -> (i64, i64) {
    ((index % 3) as i64 - 1, (index / 3) as i64 - 1)
}

fn cell_index(vi: i64, di: i64) -> Option<usize> {
    if (-1..=1).contains(&vi) && (-1..=1).contains(&di) {
        Some(((vi + 1) + 3 * (di + 1)) as usize)
    } else {
        None
    }
}

/// 3x3 neighbourhood search over `(sig_vel, sig_div)` that follows the best
/// cell until the centre wins.
#[derive(Clone, Debug)]
pub struct GridSearch {
    origin: Candidate,
    step_vel: f64,
    step_div: f64,
    /// Total grid shift of the window centre from `origin`, in steps.
    shift: (i64, i64),
    cells: [Cell; GRID_CELLS],
    state: SearchState,
}

impl GridSearch {
    pub fn new(origin: Candidate, step_vel: f64, step_div: f64) -> Self {
        let mut search = Self {
            origin,
            step_vel,
            step_div,
            shift: (0, 0),
            cells: [Cell {
                candidate: origin,
                tsc: None,
            }; GRID_CELLS],
            state: SearchState::Evaluating,
        };
        for i in 0..GRID_CELLS {
            search.cells[i].candidate = search.candidate_for(i);
        }
        search
    }

    fn candidate_for(&self, index: usize) -> Candidate {
        let (vi, di) = cell_offset(index);
        Candidate {
            sig_vel: self.origin.sig_vel + (self.shift.0 + vi) as f64 * self.step_vel,
            sig_div: self.origin.sig_div + (self.shift.1 + di) as f64 * self.step_div,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn center(&self) -> Candidate {
        self.cells[GRID_CENTER].candidate
    }

    pub fn candidates(&self) -> [Candidate; GRID_CELLS] {
        self.cells.map(|c| c.candidate)
    }

    pub fn scores(&self) -> [Option<f64>; GRID_CELLS] {
        self.cells.map(|c| c.tsc)
    }

    /// Cells that still need a score, in row-major order.
    pub fn pending(&self) -> Vec<(usize, Candidate)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.tsc.is_none())
            .map(|(i, c)| (i, c.candidate))
            .collect()
    }

    /// Store scores for the cells returned by [`Self::pending`], in order.
    pub fn record(&mut self, scores: &[f64]) -> Result<()> {
        let pending = self.pending();
        if pending.len() != scores.len() {
            return Err(DriftError::DimensionMismatch {
                expected: pending.len(),
                actual: scores.len(),
            });
        }
        for ((index, _), &tsc) in pending.iter().zip(scores) {
            self.cells[*index].tsc = Some(tsc);
        }
        self.state = SearchState::Ranking;
        Ok(())
    }

    /// First cell with the strictly highest score among the known cells.
    pub fn best(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, cell) in self.cells.iter().enumerate() {
            if let Some(tsc) = cell.tsc {
                let better = match best {
                    None => true,
                    Some((_, b)) => tsc > b,
                };
                if better {
                    best = Some((i, tsc));
                }
            }
        }
        best
    }

    /// Move the window so that cell `best` becomes the centre. Cells still
    /// inside the new window keep their scores; the rest become pending.
    pub fn recenter(&mut self, best: usize) {
        self.state = SearchState::Shifting { best };
        let (sv, sd) = cell_offset(best);
        let old = self.cells;
        self.shift = (self.shift.0 + sv, self.shift.1 + sd);

        for i in 0..GRID_CELLS {
            self.cells[i] = Cell {
                candidate: self.candidate_for(i),
                tsc: None,
            };
        }
        for (i, cell) in old.iter().enumerate() {
            let (vi, di) = cell_offset(i);
            if let Some(next) = cell_index(vi - sv, di - sd) {
                self.cells[next] = *cell;
            }
        }
        self.state = SearchState::Evaluating;
    }

    /// Run the search, calling `evaluate` with the pending candidates of each
    /// round. At most `max_rounds` rounds are evaluated; zero is treated as
    /// one, since the first window always has to be scored.
    pub fn run<F>(mut self, max_rounds: usize, mut evaluate: F) -> Result<SearchOutcome>
    where
        F: FnMut(&[Candidate]) -> Result<Vec<f64>>,
    {
        let max_rounds = max_rounds.max(1);
        let mut rounds = 0;

        loop {
            self.state = SearchState::Evaluating;
            let pending: Vec<Candidate> = self.pending().into_iter().map(|(_, c)| c).collect();
            info!(
                round = rounds + 1,
                pending = pending.len(),
                center = %self.center(),
                "Evaluating hyperparameter grid"
            );
            let scores = if pending.is_empty() {
                Vec::new()
            } else {
                evaluate(&pending)?
            };
            self.record(&scores)?;
            rounds += 1;

            let (best, tsc) = self.best().ok_or(DriftError::EmptySequence)?;
            let best_candidate = self.cells[best].candidate;
            info!(best_cell = best, tsc, best = %best_candidate, "Ranked hyperparameter grid");

            if best == GRID_CENTER {
                self.state = SearchState::Converged;
                let samples = self.candidates();
                let scores = self.cells.map(|c| c.tsc.unwrap_or(f64::NEG_INFINITY));
                let refined = interpolate_max(&samples, &scores);
                return Ok(SearchOutcome::Converged {
                    best: best_candidate,
                    tsc,
                    refined,
                    rounds,
                });
            }

            if rounds >= max_rounds {
                self.state = SearchState::Unbracketed;
                warn!(
                    rounds,
                    best = %best_candidate,
                    "Hyperparameter search did not bracket an optimum"
                );
                return Ok(SearchOutcome::Unbracketed {
                    best: best_candidate,
                    tsc,
                    rounds,
                });
            }

            self.recenter(best);
        }
    }
}
