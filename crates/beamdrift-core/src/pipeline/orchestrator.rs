use std::sync::Arc;

use ndarray::Array2;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::correlation::global::sum_over_particles;
use crate::correlation::{
    build_correlation_set, CorrelationBuilder, CorrelationSet, FourierCorrelationBuilder,
};
use crate::damage::{apply_frequency_cutoff, damage_weights};
use crate::error::{DriftError, Result};
use crate::fsc::FscAccumulator;
use crate::geometry::{Position, Track};
use crate::motion::TrackSolver;
use crate::search::{Candidate, GridSearch, SearchOutcome};
use crate::spectrum::{normalize_movie, power_spectrum, shell_count, shift_spectrum, Spectrum};

use super::config::{MotionFitConfig, RunMode};
use super::initial::{initial_motion, InitialMotion};
use super::micrograph::MicrographSource;
use super::types::{
    FitStage, MicrographMotion, MicrographOutcome, MotionSink, MotionSummary, NoOpReporter,
    ProgressReporter,
};

/// A micrograph with noise-normalized frames, correlation volumes and
/// initial tracks; everything the optimizer needs.
pub struct PreparedMicrograph {
    pub index: usize,
    pub name: String,
    pub positions: Vec<Position>,
    pub movie: Vec<Vec<Spectrum>>,
    pub references: Vec<Spectrum>,
    pub correlations: CorrelationSet,
    pub initial: InitialMotion,
}

impl PreparedMicrograph {
    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    pub fn frame_count(&self) -> usize {
        self.movie.first().map_or(0, Vec::len)
    }

    pub fn shell_count(&self) -> usize {
        self.references
            .first()
            .map_or(0, |r| shell_count(r.nrows()))
    }
}

/// Drives motion and hyperparameter estimation over a dataset.
///
/// Micrographs are processed one at a time; the work inside each one runs
/// on the estimator's own thread pool.
pub struct MotionEstimator<'a> {
    config: MotionFitConfig,
    source: &'a dyn MicrographSource,
    builder: Box<dyn CorrelationBuilder>,
    reporter: Arc<dyn ProgressReporter>,
    pool: ThreadPool,
}

impl<'a> MotionEstimator<'a> {
    pub fn new(config: MotionFitConfig, source: &'a dyn MicrographSource) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| DriftError::InvalidConfig(format!("thread pool: {e}")))?;
        let builder = Box::new(FourierCorrelationBuilder {
            window: config.correlation_window,
        });

        Ok(Self {
            config,
            source,
            builder,
            reporter: Arc::new(NoOpReporter),
            pool,
        })
    }

    pub fn with_builder(mut self, builder: Box<dyn CorrelationBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &MotionFitConfig {
        &self.config
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Estimate the motion of every micrograph and hand each result to
    /// `sink`. Micrographs that cannot be loaded, or that hold too few
    /// particles, are skipped.
    pub fn estimate_motion(&self, sink: &mut dyn MotionSink) -> Result<MotionSummary> {
        self.config.validate(RunMode::EstimateMotion)?;

        let total = self.source.micrograph_count();
        let solver = self.solver(None);
        let mut accumulator: Option<FscAccumulator> = None;
        let mut summary = MotionSummary::default();

        info!(
            micrographs = total,
            threads = self.thread_count(),
            "Estimating motion"
        );

        for index in 0..total {
            let prepared = match self.prepare_or_skip(index, total)? {
                Ok(prepared) => prepared,
                Err(outcome) => {
                    summary.outcomes.push(outcome);
                    continue;
                }
            };

            let pc = prepared.particle_count();
            if pc < self.config.min_particles {
                let outcome = MicrographOutcome::Skipped {
                    index,
                    reason: format!(
                        "{pc} particles, at least {} required",
                        self.config.min_particles
                    ),
                };
                warn!(micrograph = %prepared.name, particles = pc, "Too few particles, skipping");
                self.reporter.finish_micrograph(&outcome);
                summary.outcomes.push(outcome);
                continue;
            }

            self.reporter.begin_stage(FitStage::Optimization);
            let solution = self.pool.install(|| {
                solver.solve(
                    &prepared.correlations,
                    &prepared.initial.tracks,
                    &prepared.positions,
                    &prepared.initial.global,
                )
            })?;
            let iterations = solution.outcome.as_ref().map_or(0, |o| o.iterations);

            self.reporter.begin_stage(FitStage::Scoring);
            let acc = self.accumulator_for(&mut accumulator, &prepared);
            acc.reset();
            self.accumulate_fsc(acc, &prepared, &solution.tracks);

            let correlation_sums = if self.config.diagnostics {
                Some(
                    prepared
                        .initial
                        .correlation_sums
                        .clone()
                        .unwrap_or_else(|| sum_over_particles(&prepared.correlations)),
                )
            } else {
                None
            };

            self.reporter.begin_stage(FitStage::Writing);
            sink.write(&MicrographMotion {
                index,
                name: prepared.name.clone(),
                positions: prepared.positions.clone(),
                tracks: solution.tracks,
                global_component: prepared.initial.global.clone(),
                fsc: acc.merged(),
                correlation_sums,
                iterations,
            })?;

            let outcome = MicrographOutcome::Processed {
                index,
                particles: pc,
                iterations,
            };
            debug!(micrograph = %prepared.name, iterations, "Micrograph done");
            self.reporter.finish_micrograph(&outcome);
            summary.outcomes.push(outcome);
        }

        info!(
            processed = summary.processed(),
            skipped = summary.skipped(),
            particles = summary.particles(),
            "Motion estimation complete"
        );
        Ok(summary)
    }

    /// Search the `(sig_vel, sig_div)` plane for the hyperparameters that
    /// maximize the high-frequency TSC.
    pub fn estimate_params(&self) -> Result<SearchOutcome> {
        self.config.validate(RunMode::EstimateParams)?;

        let prior = &self.config.prior;
        let search = &self.config.search;
        let origin = Candidate {
            sig_vel: prior.sig_vel,
            sig_div: prior.sig_div,
        };
        info!(
            origin = %origin,
            r_vel = search.r_vel,
            r_div = search.r_div,
            "Estimating motion parameters"
        );

        let outcome = GridSearch::new(
            origin,
            prior.sig_vel * search.r_vel,
            prior.sig_div * search.r_div,
        )
        .run(search.max_iters, |candidates| self.evaluate_params(candidates))?;

        info!(
            estimate = %outcome.estimate(),
            rounds = outcome.rounds(),
            converged = outcome.is_converged(),
            "Parameter estimation finished"
        );
        Ok(outcome)
    }

    /// TSC of every candidate over the whole dataset, at frequencies above
    /// the cutoff used to build the correlations.
    pub fn evaluate_params(&self, candidates: &[Candidate]) -> Result<Vec<f64>> {
        let k_cutoff = self.config.k_cutoff.ok_or_else(|| {
            DriftError::InvalidConfig(
                "parameter estimation requires a frequency cutoff (k_cutoff)".into(),
            )
        })?;
        let k_low = k_cutoff.max(0.0) as usize + 2;

        let solvers: Vec<TrackSolver> = candidates.iter().map(|&c| self.solver(Some(c))).collect();
        let mut accumulators: Vec<FscAccumulator> = Vec::new();
        let mut shells = 0;

        let total = self.source.micrograph_count();
        for index in 0..total {
            let prepared = match self.prepare_or_skip(index, total)? {
                Ok(prepared) => prepared,
                Err(_) => continue,
            };
            if prepared.particle_count() == 0 {
                continue;
            }

            if accumulators.is_empty() {
                shells = prepared.shell_count();
                accumulators = candidates
                    .iter()
                    .map(|_| self.new_accumulator(&prepared))
                    .collect();
            } else if let Err(e) = check_shape(&accumulators[0], &prepared) {
                // Scores are summed across micrographs, so every table must
                // share the first micrograph's frame and shell counts.
                warn!(
                    micrograph = %prepared.name,
                    error = %e,
                    "Shape differs from the first micrograph, skipping"
                );
                let outcome = MicrographOutcome::Skipped {
                    index,
                    reason: e.to_string(),
                };
                self.reporter.finish_micrograph(&outcome);
                continue;
            }

            self.reporter.begin_stage(FitStage::Optimization);
            for (solver, acc) in solvers.iter().zip(accumulators.iter_mut()) {
                let solution = self.pool.install(|| {
                    solver.solve(
                        &prepared.correlations,
                        &prepared.initial.tracks,
                        &prepared.positions,
                        &prepared.initial.global,
                    )
                })?;
                self.accumulate_fsc(acc, &prepared, &solution.tracks);
            }

            let outcome = MicrographOutcome::Processed {
                index,
                particles: prepared.particle_count(),
                iterations: 0,
            };
            self.reporter.finish_micrograph(&outcome);
        }

        if accumulators.is_empty() {
            return Err(DriftError::EmptySequence);
        }

        let mode = self.config.search.tsc_mode;
        let scores: Vec<f64> = accumulators
            .iter()
            .map(|acc| acc.tsc(k_low, shells, mode))
            .collect();
        for (candidate, score) in candidates.iter().zip(&scores) {
            info!(candidate = %candidate, tsc = score, "Evaluated hyperparameters");
        }
        Ok(scores)
    }

    /// Load micrograph `index` and compute everything the optimizer needs.
    pub fn prepare(&self, index: usize) -> Result<PreparedMicrograph> {
        self.reporter.begin_stage(FitStage::Loading);
        let mut micrograph = self
            .source
            .load(index)
            .and_then(|m| m.validate().map(|_| m))
            .map_err(|e| match e {
                DriftError::InputUnavailable { .. } => e,
                other => DriftError::InputUnavailable {
                    index,
                    reason: other.to_string(),
                },
            })?;

        let fc = micrograph.frame_count();
        let box_size = micrograph.box_size;

        self.reporter.begin_stage(FitStage::NoiseNormalization);
        let sigma2 = power_spectrum(&micrograph.movie, shell_count(box_size));
        self.pool
            .install(|| normalize_movie(&mut micrograph.movie, &sigma2));
        debug!(box_size, frames = fc, "Noise spectrum estimated");

        self.reporter.begin_stage(FitStage::Correlation);
        let weights = self.frame_weights(box_size, fc);
        let correlations = self.pool.install(|| {
            build_correlation_set(
                self.builder.as_ref(),
                &micrograph.movie,
                &micrograph.references,
                &weights,
            )
        })?;

        self.reporter.begin_stage(FitStage::Initialization);
        let initial = self
            .pool
            .install(|| initial_motion(&correlations, &micrograph, &self.config.init));

        Ok(PreparedMicrograph {
            index,
            name: micrograph.name,
            positions: micrograph.positions,
            movie: micrograph.movie,
            references: micrograph.references,
            correlations,
            initial,
        })
    }

    /// Outer `Err` aborts the run; inner `Err` is a skipped micrograph.
    fn prepare_or_skip(
        &self,
        index: usize,
        total: usize,
    ) -> Result<std::result::Result<PreparedMicrograph, MicrographOutcome>> {
        self.reporter.begin_micrograph(index, total);
        match self.prepare(index) {
            Ok(prepared) => {
                info!(
                    micrograph = %prepared.name,
                    index = index + 1,
                    total,
                    particles = prepared.particle_count(),
                    "Processing micrograph"
                );
                Ok(Ok(prepared))
            }
            Err(DriftError::InputUnavailable { reason, .. }) => {
                warn!(index, %reason, "Micrograph unavailable, skipping");
                let outcome = MicrographOutcome::Skipped { index, reason };
                self.reporter.finish_micrograph(&outcome);
                Ok(Err(outcome))
            }
            Err(e) => Err(e),
        }
    }

    fn solver(&self, candidate: Option<Candidate>) -> TrackSolver {
        let prior = &self.config.prior;
        let sigmas = match candidate {
            Some(c) => prior.sigmas_for(c, &self.config.dose),
            None => prior.sigmas(&self.config.dose),
        };
        TrackSolver {
            sigmas,
            kernel: prior.kernel,
            max_divergence_distance: prior.max_divergence_distance,
            descent: self.config.optimizer.descent_params(),
        }
    }

    fn frame_weights(&self, box_size: usize, frame_count: usize) -> Vec<Array2<f64>> {
        let dose = &self.config.dose;
        let mut weights = damage_weights(
            box_size,
            dose.angpix,
            dose.first_frame,
            frame_count,
            dose.dose_per_frame,
            &dose.damage,
        );
        if let Some(k) = self.config.k_cutoff {
            apply_frequency_cutoff(&mut weights, k);
        }
        weights
    }

    fn new_accumulator(&self, prepared: &PreparedMicrograph) -> FscAccumulator {
        FscAccumulator::new(
            self.thread_count(),
            prepared.frame_count(),
            prepared.shell_count(),
        )
    }

    fn accumulator_for<'b>(
        &self,
        slot: &'b mut Option<FscAccumulator>,
        prepared: &PreparedMicrograph,
    ) -> &'b mut FscAccumulator {
        let stale = slot
            .as_ref()
            .is_some_and(|acc| check_shape(acc, prepared).is_err());
        if stale {
            *slot = None;
        }
        slot.get_or_insert_with(|| self.new_accumulator(prepared))
    }

    /// Add the motion-corrected particles of one micrograph to `acc`.
    fn accumulate_fsc(&self, acc: &mut FscAccumulator, prepared: &PreparedMicrograph, tracks: &[Track]) {
        let global = &prepared.initial.global;
        self.pool.install(|| {
            acc.accumulate(prepared.particle_count(), |p, table| {
                let corrected: Vec<Spectrum> = prepared.movie[p]
                    .iter()
                    .zip(&tracks[p])
                    .zip(global)
                    .map(|((frame, &t), &g)| shift_spectrum(frame, -(t + g)))
                    .collect();
                table.update(&corrected, &prepared.references[p]);
            })
        });
    }
}

fn check_shape(acc: &FscAccumulator, prepared: &PreparedMicrograph) -> Result<()> {
    let merged = &acc.slots()[0];
    if merged.frame_count() != prepared.frame_count() {
        return Err(DriftError::DimensionMismatch {
            expected: merged.frame_count(),
            actual: prepared.frame_count(),
        });
    }
    if merged.shell_count() != prepared.shell_count() {
        return Err(DriftError::DimensionMismatch {
            expected: merged.shell_count(),
            actual: prepared.shell_count(),
        });
    }
    Ok(())
}
