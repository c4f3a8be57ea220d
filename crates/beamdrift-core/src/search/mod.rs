mod grid;
mod quadratic;

pub use grid::{Candidate, GridSearch, SearchOutcome, SearchState};
pub use quadratic::{fit_stationary_point, interpolate_max};
