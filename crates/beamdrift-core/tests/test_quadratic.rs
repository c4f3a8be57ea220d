use approx::assert_abs_diff_eq;
use beamdrift_core::search::{fit_stationary_point, interpolate_max, Candidate};

fn grid(v0: f64, d0: f64, sv: f64, sd: f64) -> [Candidate; 9] {
    std::array::from_fn(|i| Candidate {
        sig_vel: v0 + ((i % 3) as f64 - 1.0) * sv,
        sig_div: d0 + ((i / 3) as f64 - 1.0) * sd,
    })
}

fn coupled_bowl(peak: Candidate, sv: f64, sd: f64) -> impl Fn(&Candidate) -> f64 {
    move |c| {
        let u = (c.sig_vel - peak.sig_vel) / sv;
        let w = (c.sig_div - peak.sig_div) / sd;
        -(u * u) - w * w + 0.5 * u * w
    }
}

#[test]
fn test_exact_paraboloid_recovers_off_grid_peak() {
    let samples = grid(1.0, 500.0, 0.1, 20.0);
    let peak = Candidate {
        sig_vel: 1.03,
        sig_div: 495.0,
    };
    let f = coupled_bowl(peak, 0.1, 20.0);
    let scores = samples.map(|c| f(&c));

    let refined = interpolate_max(&samples, &scores);
    assert_abs_diff_eq!(refined.sig_vel, 1.03, epsilon = 1e-9);
    assert_abs_diff_eq!(refined.sig_div, 495.0, epsilon = 1e-6);
}

#[test]
fn test_stationary_point_with_mismatched_scales() {
    // Velocity and divergence sigmas differ by four orders of magnitude.
    let samples = grid(0.5, 5000.0, 0.05, 500.0);
    let peak = Candidate {
        sig_vel: 0.48,
        sig_div: 5100.0,
    };
    let f = coupled_bowl(peak, 0.05, 500.0);
    let scores: Vec<f64> = samples.iter().map(&f).collect();

    let fit = fit_stationary_point(&samples, &scores).unwrap();
    assert_abs_diff_eq!(fit.sig_vel, 0.48, epsilon = 1e-9);
    assert_abs_diff_eq!(fit.sig_div, 5100.0, epsilon = 1e-6);
}

#[test]
fn test_off_centre_maximum_returns_raw_sample() {
    let samples = grid(1.0, 500.0, 0.1, 20.0);
    let mut scores = [0.0; 9];
    scores[2] = 1.0;
    scores[4] = 0.5;

    assert_eq!(interpolate_max(&samples, &scores), samples[2]);
}

#[test]
fn test_fit_rejects_mismatched_input() {
    let samples = grid(1.0, 500.0, 0.1, 20.0);
    assert!(fit_stationary_point(&samples, &[1.0, 2.0]).is_none());
    assert!(fit_stationary_point(&[], &[]).is_none());
}

#[test]
fn test_flat_grid_keeps_the_first_cell() {
    let samples = grid(1.0, 500.0, 0.1, 20.0);
    assert_eq!(interpolate_max(&samples, &[0.25; 9]), samples[0]);
}
