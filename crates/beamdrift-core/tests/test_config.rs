use approx::assert_abs_diff_eq;
use beamdrift_core::damage::{apply_frequency_cutoff, damage_weights, DamageModel};
use beamdrift_core::error::DriftError;
use beamdrift_core::fsc::TscMode;
use beamdrift_core::motion::prior::KernelShape;
use beamdrift_core::pipeline::config::{InitialTrackSource, MotionFitConfig};
use beamdrift_core::pipeline::RunMode;

#[test]
fn test_defaults_validate_for_motion_only() {
    let config = MotionFitConfig::default();
    assert!(config.validate(RunMode::EstimateMotion).is_ok());
    assert!(matches!(
        config.validate(RunMode::EstimateParams),
        Err(DriftError::InvalidConfig(_))
    ));
}

#[test]
fn test_params_mode_requires_positive_cutoff_and_steps() {
    let mut config = MotionFitConfig {
        k_cutoff: Some(20.0),
        ..Default::default()
    };
    assert!(config.validate(RunMode::EstimateParams).is_ok());

    config.k_cutoff = Some(0.0);
    assert!(config.validate(RunMode::EstimateParams).is_err());

    config.k_cutoff = Some(20.0);
    config.search.r_div = 0.0;
    assert!(config.validate(RunMode::EstimateParams).is_err());
    // Search steps are irrelevant when only motion is estimated.
    assert!(config.validate(RunMode::EstimateMotion).is_ok());
}

#[test]
fn test_params_mode_requires_a_search_round() {
    let mut config = MotionFitConfig {
        k_cutoff: Some(20.0),
        ..Default::default()
    };
    config.search.max_iters = 0;
    assert!(matches!(
        config.validate(RunMode::EstimateParams),
        Err(DriftError::InvalidConfig(_))
    ));
    assert!(config.validate(RunMode::EstimateMotion).is_ok());
}

#[test]
fn test_invalid_physical_values_rejected() {
    let mut config = MotionFitConfig::default();
    config.dose.angpix = -1.0;
    assert!(config.validate(RunMode::EstimateMotion).is_err());

    let mut config = MotionFitConfig::default();
    config.dose.dose_per_frame = f64::NAN;
    assert!(config.validate(RunMode::EstimateMotion).is_err());

    let mut config = MotionFitConfig::default();
    config.optimizer.max_step = 0.0;
    assert!(config.validate(RunMode::EstimateMotion).is_err());

    let config = MotionFitConfig {
        correlation_window: Some(0),
        ..Default::default()
    };
    assert!(config.validate(RunMode::EstimateMotion).is_err());
}

// ---

#[test]
fn test_toml_round_trip() {
    let mut config = MotionFitConfig {
        k_cutoff: Some(12.5),
        correlation_window: Some(24),
        threads: 3,
        diagnostics: true,
        ..Default::default()
    };
    config.prior.kernel = KernelShape::Exponential;
    config.prior.max_divergence_distance = Some(400.0);
    config.init.source = InitialTrackSource::Metadata;
    config.search.tsc_mode = TscMode::PerFrame;

    let text = toml::to_string_pretty(&config).unwrap();
    let back: MotionFitConfig = toml::from_str(&text).unwrap();

    assert_eq!(back.k_cutoff, Some(12.5));
    assert_eq!(back.correlation_window, Some(24));
    assert_eq!(back.threads, 3);
    assert!(back.diagnostics);
    assert_eq!(back.prior.kernel, KernelShape::Exponential);
    assert_eq!(back.prior.max_divergence_distance, Some(400.0));
    assert_eq!(back.init.source, InitialTrackSource::Metadata);
    assert_eq!(back.search.tsc_mode, TscMode::PerFrame);
    assert_eq!(back.dose.damage, DamageModel::default());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let text = r#"
k_cutoff = 18.0

[prior]
sig_vel = 0.9

[dose]
angpix = 1.35
"#;
    let config: MotionFitConfig = toml::from_str(text).unwrap();
    let defaults = MotionFitConfig::default();

    assert_eq!(config.k_cutoff, Some(18.0));
    assert_eq!(config.prior.sig_vel, 0.9);
    assert_eq!(config.prior.sig_div, defaults.prior.sig_div);
    assert_eq!(config.dose.angpix, 1.35);
    assert_eq!(config.dose.dose_per_frame, defaults.dose.dose_per_frame);
    assert_eq!(config.optimizer.max_iters, defaults.optimizer.max_iters);
    assert_eq!(config.min_particles, 2);
    assert_eq!(config.correlation_window, None);
}

#[test]
fn test_json_round_trip() {
    let config = MotionFitConfig {
        k_cutoff: Some(7.0),
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: MotionFitConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.k_cutoff, Some(7.0));
    assert_eq!(back.search.r_vel, config.search.r_vel);
}

#[test]
fn test_sigmas_follow_candidate() {
    let mut config = MotionFitConfig::default();
    config.dose.dose_per_frame = 2.0;
    config.dose.angpix = 0.5;

    let sigmas = config.prior.sigmas(&config.dose);
    // Velocity in A/dose becomes px/frame: 1.6 * 2 / 0.5.
    assert_abs_diff_eq!(sigmas.velocity, 6.4, epsilon = 1e-12);
    assert_abs_diff_eq!(sigmas.divergence, 500.0 * 2.0 / 0.5, epsilon = 1e-9);

    let other = config.prior.sigmas_for(
        beamdrift_core::search::Candidate {
            sig_vel: 0.4,
            sig_div: 100.0,
        },
        &config.dose,
    );
    assert_abs_diff_eq!(other.velocity, 1.6, epsilon = 1e-12);
    assert_abs_diff_eq!(other.divergence, 400.0, epsilon = 1e-9);
}

#[test]
fn test_descent_params_mirror_optimizer_section() {
    let mut config = MotionFitConfig::default();
    config.optimizer.max_iters = 42;
    config.optimizer.inertia = 0.3;
    let params = config.optimizer.descent_params();
    assert_eq!(params.max_iters, 42);
    assert_eq!(params.inertia, 0.3);
    assert_eq!(params.step, config.optimizer.max_step);
}

#[test]
fn test_display_names() {
    assert_eq!(RunMode::EstimateMotion.to_string(), "Motion");
    assert_eq!(RunMode::EstimateParams.to_string(), "Parameters");
    assert_eq!(InitialTrackSource::Global.to_string(), "Global");
    assert_eq!(TscMode::PerFrame.to_string(), "Per Frame");
}

// ---

#[test]
fn test_damage_weights_decay_with_dose_and_frequency() {
    let weights = damage_weights(32, 1.0, 0, 4, 2.0, &DamageModel::default());
    assert_eq!(weights.len(), 4);
    assert_eq!(weights[0].dim(), (32, 32));

    for w in &weights {
        assert_abs_diff_eq!(w[[0, 0]], 1.0, epsilon = 1e-12);
    }
    // Later frames have seen more dose.
    assert!(weights[3][[0, 8]] < weights[0][[0, 8]]);
    // Higher frequencies decay faster.
    assert!(weights[2][[0, 12]] < weights[2][[0, 4]]);
}

#[test]
fn test_first_frame_offsets_the_dose() {
    let model = DamageModel::default();
    let shifted = damage_weights(16, 1.2, 3, 1, 1.5, &model);
    let plain = damage_weights(16, 1.2, 0, 4, 1.5, &model);
    for (a, b) in shifted[0].iter().zip(plain[3].iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
    }
}

#[test]
fn test_frequency_cutoff_envelope() {
    let mut weights = vec![ndarray::Array2::from_elem((32, 32), 1.0)];
    apply_frequency_cutoff(&mut weights, 6.0);

    let w = &weights[0];
    assert_eq!(w[[0, 3]], 1.0);
    assert_abs_diff_eq!(w[[0, 6]], 0.5, epsilon = 1e-12);
    assert_eq!(w[[0, 9]], 0.0);
    // Negative frequencies wrap around.
    assert_eq!(w[[0, 29]], 1.0);
}
