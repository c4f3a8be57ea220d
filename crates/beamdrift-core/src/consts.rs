/// Lower bound for the velocity and divergence sigmas (in pixels). Smaller
/// values are clamped to this with a warning.
pub const SIGMA_FLOOR: f64 = 1e-20;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-12;

/// Tolerance passed to the SVD least-squares solve of the quadratic fit.
pub const QUADRATIC_FIT_TOLERANCE: f64 = 1e-20;

/// Number of cells in the hyperparameter search neighbourhood (3x3).
pub const GRID_CELLS: usize = 9;

/// Row-major index of the centre cell of the 3x3 search grid.
pub const GRID_CENTER: usize = 4;

/// Default velocity sigma in Angstrom per unit dose.
pub const DEFAULT_SIG_VEL: f64 = 1.6;

/// Default divergence sigma in Angstrom.
pub const DEFAULT_SIG_DIV: f64 = 500.0;

/// Default acceleration sigma. Non-positive values disable the term.
pub const DEFAULT_SIG_ACC: f64 = -1.0;

/// Default initial step size of the gradient descent.
pub const DEFAULT_MAX_STEP: f64 = 0.05;

/// Default lower bound on the step size before the descent stops.
pub const DEFAULT_MIN_STEP: f64 = 1e-9;

/// Default minimum cost improvement of an accepted step.
pub const DEFAULT_MIN_DIFF: f64 = 1e-9;

/// Default iteration cap of the gradient descent.
pub const DEFAULT_MAX_ITERS: usize = 10_000;

/// Search radius for per-particle global offsets, as a fraction of the box size.
pub const GLOBAL_OFFSET_RADIUS_FRACTION: f64 = 0.25;

/// Damage model defaults: critical dose N_e(k) = a * k^b + c (k in 1/A).
pub const DAMAGE_A: f64 = 3.40;
pub const DAMAGE_B: f64 = -1.06;
pub const DAMAGE_C: f64 = -0.54;

/// Relative search steps of the parameter estimation (s +/- r * s).
pub const DEFAULT_R_VEL: f64 = 0.5;
pub const DEFAULT_R_DIV: f64 = 0.2;

/// Maximum number of evaluation rounds of the parameter estimation.
pub const DEFAULT_SEARCH_ITERS: usize = 10;

/// Scale applied to track deviations in the visualised track diagnostics.
pub const TRACK_VIS_SCALE: f64 = 30.0;

/// Number of leading frames written to the short visualised track file.
pub const TRACK_VIS_SHORT_FRAMES: usize = 15;
