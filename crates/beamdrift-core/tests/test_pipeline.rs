mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use beamdrift_core::error::DriftError;
use beamdrift_core::geometry::{Position, Track};
use beamdrift_core::io::{find_fsc_tables, DirectorySink, StoredShiftsSource};
use beamdrift_core::pipeline::config::InitialTrackSource;
use beamdrift_core::pipeline::{
    Micrograph, MicrographMotion, MicrographOutcome, MicrographSource, MotionEstimator,
    MotionFitConfig, MotionSink, ProgressReporter,
};
use beamdrift_core::synthetic::{SyntheticConfig, SyntheticDataset};

/// Narrow kernels so that the correlation term dominates the prior.
fn loose_prior_config() -> MotionFitConfig {
    let mut config = MotionFitConfig {
        threads: 2,
        ..Default::default()
    };
    config.prior.sig_vel = 0.3;
    config.prior.sig_div = 10.0;
    config
}

fn dataset(config: SyntheticConfig) -> SyntheticDataset {
    SyntheticDataset::new(config).unwrap()
}

fn zero_tracks(like: &[Track]) -> Vec<Track> {
    like.iter()
        .map(|t| vec![Position::ZERO; t.len()])
        .collect()
}

#[test]
fn test_recovers_synthetic_motion() {
    let data = dataset(SyntheticConfig::default());
    let estimator = MotionEstimator::new(loose_prior_config(), &data).unwrap();
    assert_eq!(estimator.thread_count(), 2);

    let mut results: Vec<MicrographMotion> = Vec::new();
    let summary = estimator.estimate_motion(&mut results).unwrap();

    assert_eq!(summary.processed(), 2);
    assert_eq!(summary.skipped(), 0);
    assert_eq!(summary.particles(), 12);
    assert_eq!(results.len(), 2);

    for motion in &results {
        let truth = data.true_tracks(motion.index);
        let estimate = motion.total_tracks();
        let rms = common::rms_track_error(&estimate, &truth);
        let baseline = common::rms_track_error(&zero_tracks(&truth), &truth);

        assert!(rms < 0.75, "micrograph {}: rms error {rms}", motion.index);
        assert!(rms < 0.5 * baseline, "rms {rms} vs baseline {baseline}");
        assert_eq!(motion.name, SyntheticDataset::name(motion.index));
        assert_eq!(motion.fsc.frame_count(), 8);
        assert_eq!(motion.fsc.shell_count(), 17);
        assert!(motion.correlation_sums.is_none());
    }
}

#[test]
fn test_unavailable_micrograph_is_skipped() {
    let data = dataset(SyntheticConfig {
        micrographs: 3,
        particles: 4,
        frames: 5,
        unavailable: vec![1],
        ..Default::default()
    });
    let estimator = MotionEstimator::new(loose_prior_config(), &data).unwrap();

    let mut results: Vec<MicrographMotion> = Vec::new();
    let summary = estimator.estimate_motion(&mut results).unwrap();

    assert_eq!(summary.processed(), 2);
    assert_eq!(summary.skipped(), 1);
    assert!(matches!(
        summary.outcomes[1],
        MicrographOutcome::Skipped { index: 1, .. }
    ));
    let indices: Vec<usize> = results.iter().map(|m| m.index).collect();
    assert_eq!(indices, vec![0, 2]);
}

#[test]
fn test_too_few_particles_are_skipped() {
    let data = dataset(SyntheticConfig {
        particles: 1,
        ..Default::default()
    });
    let estimator = MotionEstimator::new(loose_prior_config(), &data).unwrap();

    let mut results: Vec<MicrographMotion> = Vec::new();
    let summary = estimator.estimate_motion(&mut results).unwrap();

    assert_eq!(summary.processed(), 0);
    assert_eq!(summary.skipped(), 2);
    assert!(results.is_empty());
}

#[test]
fn test_invalid_config_aborts_before_work() {
    let data = dataset(SyntheticConfig::default());
    let mut config = loose_prior_config();
    config.dose.angpix = 0.0;
    let estimator = MotionEstimator::new(config, &data).unwrap();

    let mut results: Vec<MicrographMotion> = Vec::new();
    let err = estimator.estimate_motion(&mut results).unwrap_err();
    assert!(matches!(err, DriftError::InvalidConfig(_)));
    assert!(results.is_empty());
}

// ---

fn metadata_run(unregularized_global: bool) -> (SyntheticDataset, Vec<MicrographMotion>) {
    let data = dataset(SyntheticConfig {
        micrographs: 1,
        particles: 4,
        frames: 6,
        with_metadata: true,
        ..Default::default()
    });
    let mut config = loose_prior_config();
    config.init.source = InitialTrackSource::Metadata;
    config.init.unregularized_global = unregularized_global;
    config.optimizer.max_iters = 0;

    let estimator = MotionEstimator::new(config, &data).unwrap();
    let mut results: Vec<MicrographMotion> = Vec::new();
    estimator.estimate_motion(&mut results).unwrap();
    (data, results)
}

#[test]
fn test_metadata_initialization_starts_from_stored_shifts() {
    let (data, results) = metadata_run(false);
    let motion = &results[0];

    assert!(motion.global_component.iter().all(|g| *g == Position::ZERO));
    let error = common::max_track_error(&motion.total_tracks(), &data.true_tracks(0));
    assert!(error < 1e-9, "error {error}");
}

#[test]
fn test_unregularized_global_is_kept_separate() {
    let (data, results) = metadata_run(true);
    let motion = &results[0];
    let truth = data.true_tracks(0);

    let mean = beamdrift_core::geometry::mean_track(&truth);
    assert!(common::max_track_error(&[motion.global_component.clone()], &[mean]) < 1e-12);
    let error = common::max_track_error(&motion.total_tracks(), &truth);
    assert!(error < 1e-9, "error {error}");
}

#[test]
fn test_previous_run_tracks_seed_the_next_run() {
    let data = dataset(SyntheticConfig {
        micrographs: 2,
        particles: 3,
        frames: 5,
        ..Default::default()
    });
    let dir = tempfile::tempdir().unwrap();

    let mut first: Vec<MicrographMotion> = Vec::new();
    MotionEstimator::new(loose_prior_config(), &data)
        .unwrap()
        .estimate_motion(&mut first)
        .unwrap();
    // Only the first micrograph has a track file on disk.
    DirectorySink::new(dir.path(), false)
        .unwrap()
        .write(&first[0])
        .unwrap();

    let stored = StoredShiftsSource::new(&data, dir.path());
    assert!(stored.load(0).unwrap().shifts.is_some());
    assert!(stored.load(1).unwrap().shifts.is_none());

    let mut config = loose_prior_config();
    config.init.source = InitialTrackSource::Metadata;
    config.optimizer.max_iters = 0;
    let mut second: Vec<MicrographMotion> = Vec::new();
    MotionEstimator::new(config, &stored)
        .unwrap()
        .estimate_motion(&mut second)
        .unwrap();

    assert_eq!(second.len(), 2);
    let error = common::max_track_error(&second[0].total_tracks(), &first[0].total_tracks());
    assert!(error < 1e-12, "error {error}");
}

#[test]
fn test_missing_metadata_falls_back_to_global_track() {
    let data = dataset(SyntheticConfig {
        micrographs: 1,
        particles: 3,
        frames: 4,
        ..Default::default()
    });
    let mut config = loose_prior_config();
    config.init.source = InitialTrackSource::Metadata;
    config.diagnostics = true;

    let estimator = MotionEstimator::new(config, &data).unwrap();
    let mut results: Vec<MicrographMotion> = Vec::new();
    let summary = estimator.estimate_motion(&mut results).unwrap();

    assert_eq!(summary.processed(), 1);
    let sums = results[0].correlation_sums.as_ref().unwrap();
    assert_eq!(sums.len(), 4);
}

// ---

#[derive(Default)]
struct CountingReporter {
    started: AtomicUsize,
    finished: AtomicUsize,
    stages: AtomicUsize,
}

impl ProgressReporter for CountingReporter {
    fn begin_micrograph(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn begin_stage(&self, _stage: beamdrift_core::pipeline::FitStage) {
        self.stages.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_micrograph(&self, _outcome: &MicrographOutcome) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_reporter_sees_every_micrograph() {
    let data = dataset(SyntheticConfig {
        micrographs: 3,
        particles: 3,
        frames: 4,
        unavailable: vec![2],
        ..Default::default()
    });
    let reporter = Arc::new(CountingReporter::default());
    let estimator = MotionEstimator::new(loose_prior_config(), &data)
        .unwrap()
        .with_reporter(reporter.clone());

    let mut results: Vec<MicrographMotion> = Vec::new();
    estimator.estimate_motion(&mut results).unwrap();

    assert_eq!(reporter.started.load(Ordering::Relaxed), 3);
    assert_eq!(reporter.finished.load(Ordering::Relaxed), 3);
    assert!(reporter.stages.load(Ordering::Relaxed) >= 2 * 7);
}

#[test]
fn test_directory_sink_end_to_end() {
    let data = dataset(SyntheticConfig {
        particles: 4,
        frames: 5,
        ..Default::default()
    });
    let mut config = loose_prior_config();
    config.diagnostics = true;
    let dir = tempfile::tempdir().unwrap();

    let estimator = MotionEstimator::new(config, &data).unwrap();
    let mut sink = DirectorySink::new(dir.path(), true).unwrap();
    estimator.estimate_motion(&mut sink).unwrap();

    let names = find_fsc_tables(dir.path()).unwrap();
    assert_eq!(names, vec!["synthetic_000", "synthetic_001"]);
    assert!(dir.path().join("synthetic_001_tracks.dat").is_file());
    assert!(dir.path().join("synthetic_001_CCsum.png").is_file());
}

// ---

fn params_dataset() -> SyntheticDataset {
    dataset(SyntheticConfig {
        micrographs: 2,
        particles: 4,
        frames: 5,
        box_size: 24,
        unavailable: vec![1],
        ..Default::default()
    })
}

#[test]
fn test_evaluate_params_scores_every_candidate() {
    let data = params_dataset();
    let mut config = loose_prior_config();
    config.k_cutoff = Some(6.0);
    let estimator = MotionEstimator::new(config, &data).unwrap();

    let candidates = [
        beamdrift_core::search::Candidate {
            sig_vel: 0.3,
            sig_div: 10.0,
        },
        beamdrift_core::search::Candidate {
            sig_vel: 2.0,
            sig_div: 800.0,
        },
    ];
    let scores = estimator.evaluate_params(&candidates).unwrap();

    assert_eq!(scores.len(), 2);
    for s in &scores {
        assert!(s.is_finite());
        assert!(s.abs() <= 1.0 + 1e-9);
    }
}

/// Micrographs of several datasets back to back.
struct ChainedSource(Vec<SyntheticDataset>);

impl MicrographSource for ChainedSource {
    fn micrograph_count(&self) -> usize {
        self.0.iter().map(|d| d.micrograph_count()).sum()
    }

    fn load(&self, mut index: usize) -> beamdrift_core::error::Result<Micrograph> {
        for data in &self.0 {
            if index < data.micrograph_count() {
                return data.load(index);
            }
            index -= data.micrograph_count();
        }
        Err(DriftError::InputUnavailable {
            index,
            reason: "out of range".into(),
        })
    }
}

#[test]
fn test_evaluate_params_skips_micrographs_of_another_shape() {
    let shape = |frames| SyntheticConfig {
        micrographs: 1,
        particles: 4,
        frames,
        box_size: 24,
        ..Default::default()
    };
    let mixed = ChainedSource(vec![dataset(shape(5)), dataset(shape(7))]);
    let alone = dataset(shape(5));

    let mut config = loose_prior_config();
    config.k_cutoff = Some(6.0);
    let candidates = [beamdrift_core::search::Candidate {
        sig_vel: 0.3,
        sig_div: 10.0,
    }];

    let reporter = Arc::new(CountingReporter::default());
    let estimator = MotionEstimator::new(config.clone(), &mixed)
        .unwrap()
        .with_reporter(reporter.clone());
    let scores = estimator.evaluate_params(&candidates).unwrap();
    assert_eq!(reporter.finished.load(Ordering::Relaxed), 2);

    // The seven-frame micrograph contributes nothing.
    let expected = MotionEstimator::new(config, &alone)
        .unwrap()
        .evaluate_params(&candidates)
        .unwrap();
    assert!(scores[0].is_finite());
    assert!((scores[0] - expected[0]).abs() < 1e-9);
}

#[test]
fn test_evaluate_params_without_any_micrograph() {
    let data = dataset(SyntheticConfig {
        micrographs: 1,
        unavailable: vec![0],
        ..Default::default()
    });
    let mut config = loose_prior_config();
    config.k_cutoff = Some(6.0);
    let estimator = MotionEstimator::new(config, &data).unwrap();

    let candidate = beamdrift_core::search::Candidate {
        sig_vel: 1.0,
        sig_div: 100.0,
    };
    assert!(matches!(
        estimator.evaluate_params(&[candidate]),
        Err(DriftError::EmptySequence)
    ));
}

#[test]
fn test_estimate_params_requires_cutoff() {
    let data = params_dataset();
    let estimator = MotionEstimator::new(loose_prior_config(), &data).unwrap();
    assert!(matches!(
        estimator.estimate_params(),
        Err(DriftError::InvalidConfig(_))
    ));
}

#[test]
fn test_estimate_params_respects_round_limit() {
    let data = params_dataset();
    let mut config = loose_prior_config();
    config.k_cutoff = Some(6.0);
    config.search.max_iters = 2;
    config.optimizer.max_iters = 200;
    let estimator = MotionEstimator::new(config, &data).unwrap();

    let outcome = estimator.estimate_params().unwrap();
    assert!(outcome.rounds() <= 2);
    let estimate = outcome.estimate();
    assert!(estimate.sig_vel.is_finite() && estimate.sig_div.is_finite());
}

#[test]
fn test_synthetic_source_rejects_bad_input() {
    assert!(SyntheticDataset::new(SyntheticConfig {
        box_size: 4,
        ..Default::default()
    })
    .is_err());
    assert!(matches!(
        SyntheticDataset::new(SyntheticConfig {
            frames: 0,
            ..Default::default()
        }),
        Err(DriftError::EmptySequence)
    ));

    let data = dataset(SyntheticConfig::default());
    assert!(matches!(
        data.load(5),
        Err(DriftError::InputUnavailable { index: 5, .. })
    ));
}
