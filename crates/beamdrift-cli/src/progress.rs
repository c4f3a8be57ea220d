use indicatif::{ProgressBar, ProgressStyle};

use beamdrift_core::pipeline::{FitStage, MicrographOutcome, ProgressReporter};

/// Drives an indicatif bar from motion-estimation progress events.
pub struct BarReporter {
    pb: ProgressBar,
}

impl BarReporter {
    pub fn new(total: usize) -> anyhow::Result<Self> {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg:28} [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        Ok(Self { pb })
    }

    pub fn finish(&self, message: &'static str) {
        self.pb.finish_with_message(message);
    }
}

impl ProgressReporter for BarReporter {
    fn begin_micrograph(&self, index: usize, total: usize) {
        // Parameter search revisits every micrograph once per round.
        if index == 0 {
            self.pb.set_length(total as u64);
            self.pb.set_position(0);
        }
    }

    fn begin_stage(&self, stage: FitStage) {
        self.pb.set_message(stage.to_string());
    }

    fn finish_micrograph(&self, _outcome: &MicrographOutcome) {
        self.pb.inc(1);
    }
}
