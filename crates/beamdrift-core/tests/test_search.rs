use approx::assert_abs_diff_eq;
use beamdrift_core::error::DriftError;
use beamdrift_core::search::{Candidate, GridSearch, SearchOutcome, SearchState};

const ORIGIN: Candidate = Candidate {
    sig_vel: 1.6,
    sig_div: 500.0,
};
const STEP_VEL: f64 = 0.16;
const STEP_DIV: f64 = 50.0;

fn paraboloid(peak: Candidate) -> impl Fn(&Candidate) -> f64 {
    move |c| {
        let dv = (c.sig_vel - peak.sig_vel) / STEP_VEL;
        let dd = (c.sig_div - peak.sig_div) / STEP_DIV;
        0.9 - 0.01 * (dv * dv + 0.5 * dd * dd)
    }
}

#[test]
fn test_peak_at_origin_converges_in_one_round() {
    let score = paraboloid(ORIGIN);
    let mut calls = Vec::new();

    let outcome = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV)
        .run(10, |cands| {
            calls.push(cands.len());
            Ok(cands.iter().map(&score).collect())
        })
        .unwrap();

    assert_eq!(calls, vec![9]);
    assert!(outcome.is_converged());
    assert_eq!(outcome.rounds(), 1);
    let SearchOutcome::Converged { best, tsc, refined, .. } = outcome else {
        panic!("expected convergence");
    };
    assert_eq!(best, ORIGIN);
    assert_abs_diff_eq!(tsc, 0.9, epsilon = 1e-12);
    assert_abs_diff_eq!(refined.sig_vel, ORIGIN.sig_vel, epsilon = 1e-9);
    assert_abs_diff_eq!(refined.sig_div, ORIGIN.sig_div, epsilon = 1e-6);
}

#[test]
fn test_search_follows_the_peak_and_reuses_scores() {
    let peak = Candidate {
        sig_vel: ORIGIN.sig_vel + 2.0 * STEP_VEL,
        sig_div: ORIGIN.sig_div,
    };
    let score = paraboloid(peak);
    let mut calls = Vec::new();

    let outcome = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV)
        .run(10, |cands| {
            calls.push(cands.len());
            Ok(cands.iter().map(&score).collect())
        })
        .unwrap();

    // One full grid, then one new column per shift.
    assert_eq!(calls, vec![9, 3, 3]);
    assert_eq!(outcome.rounds(), 3);
    let estimate = outcome.estimate();
    assert_abs_diff_eq!(estimate.sig_vel, peak.sig_vel, epsilon = 1e-9);
    assert_abs_diff_eq!(estimate.sig_div, peak.sig_div, epsilon = 1e-6);
}

#[test]
fn test_round_limit_reports_unbracketed_best() {
    let peak = Candidate {
        sig_vel: ORIGIN.sig_vel + 5.0 * STEP_VEL,
        sig_div: ORIGIN.sig_div,
    };
    let score = paraboloid(peak);

    let outcome = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV)
        .run(1, |cands| Ok(cands.iter().map(&score).collect()))
        .unwrap();

    match outcome {
        SearchOutcome::Unbracketed { best, rounds, .. } => {
            assert_eq!(rounds, 1);
            assert_abs_diff_eq!(best.sig_vel, ORIGIN.sig_vel + STEP_VEL, epsilon = 1e-12);
            assert_abs_diff_eq!(best.sig_div, ORIGIN.sig_div, epsilon = 1e-12);
        }
        other => panic!("expected unbracketed outcome, got {other:?}"),
    }
}

#[test]
fn test_zero_round_limit_still_scores_the_first_window() {
    let score = paraboloid(ORIGIN);
    let mut calls = Vec::new();

    let outcome = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV)
        .run(0, |cands| {
            calls.push(cands.len());
            Ok(cands.iter().map(&score).collect())
        })
        .unwrap();

    assert_eq!(calls, vec![9]);
    assert_eq!(outcome.rounds(), 1);
}

#[test]
fn test_evaluation_errors_propagate() {
    let result = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV).run(3, |_| Err(DriftError::EmptySequence));
    assert!(matches!(result, Err(DriftError::EmptySequence)));
}

// ---

#[test]
fn test_grid_layout_is_row_major() {
    let search = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV);
    let cands = search.candidates();

    assert_eq!(search.state(), SearchState::Evaluating);
    assert_eq!(search.center(), ORIGIN);
    assert_abs_diff_eq!(cands[0].sig_vel, ORIGIN.sig_vel - STEP_VEL, epsilon = 1e-12);
    assert_abs_diff_eq!(cands[0].sig_div, ORIGIN.sig_div - STEP_DIV, epsilon = 1e-12);
    assert_abs_diff_eq!(cands[5].sig_vel, ORIGIN.sig_vel + STEP_VEL, epsilon = 1e-12);
    assert_abs_diff_eq!(cands[5].sig_div, ORIGIN.sig_div, epsilon = 1e-12);
    assert_abs_diff_eq!(cands[7].sig_div, ORIGIN.sig_div + STEP_DIV, epsilon = 1e-12);
    assert_eq!(search.pending().len(), 9);
}

#[test]
fn test_record_rejects_wrong_length() {
    let mut search = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV);
    let err = search.record(&[1.0, 2.0]).unwrap_err();
    assert!(matches!(
        err,
        DriftError::DimensionMismatch {
            expected: 9,
            actual: 2
        }
    ));
}

#[test]
fn test_best_prefers_first_of_equal_scores() {
    let mut search = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV);
    search
        .record(&[0.1, 0.5, 0.2, 0.5, 0.3, 0.1, 0.0, 0.0, 0.0])
        .unwrap();
    assert_eq!(search.state(), SearchState::Ranking);
    assert_eq!(search.best(), Some((1, 0.5)));
}

#[test]
fn test_diagonal_recenter_keeps_overlapping_cells() {
    let mut search = GridSearch::new(ORIGIN, STEP_VEL, STEP_DIV);
    let scores: Vec<f64> = (0..9).map(|i| i as f64).collect();
    search.record(&scores).unwrap();
    search.recenter(8);

    let kept = search.scores();
    // Old cells 4, 5, 7, 8 become 0, 1, 3, 4.
    assert_eq!(kept[0], Some(4.0));
    assert_eq!(kept[1], Some(5.0));
    assert_eq!(kept[3], Some(7.0));
    assert_eq!(kept[4], Some(8.0));
    assert_eq!(search.pending().len(), 5);
    assert_abs_diff_eq!(search.center().sig_vel, ORIGIN.sig_vel + STEP_VEL, epsilon = 1e-12);
    assert_abs_diff_eq!(search.center().sig_div, ORIGIN.sig_div + STEP_DIV, epsilon = 1e-12);
}

#[test]
fn test_candidate_display() {
    let c = Candidate {
        sig_vel: 1.5,
        sig_div: 800.0,
    };
    assert_eq!(c.to_string(), "[1.5000, 800.0000]");
}
