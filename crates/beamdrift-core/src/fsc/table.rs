use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::spectrum::{shell_index, Spectrum};

/// How the TSC ratio is aggregated over frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TscMode {
    /// One ratio over all frames and shells.
    #[default]
    Global,
    /// One ratio per frame, averaged over frames with signal.
    PerFrame,
}

impl std::fmt::Display for TscMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "Global"),
            Self::PerFrame => write!(f, "Per Frame"),
        }
    }
}

/// Per-(frame, shell) cross term and power accumulators.
#[derive(Clone, Debug, PartialEq)]
pub struct FscTable {
    /// Real part of observed x conj(predicted).
    pub data: Array2<f64>,
    /// Observed power.
    pub weight0: Array2<f64>,
    /// Predicted power.
    pub weight1: Array2<f64>,
}

impl FscTable {
    pub fn zeros(frames: usize, shells: usize) -> Self {
        Self {
            data: Array2::zeros((frames, shells)),
            weight0: Array2::zeros((frames, shells)),
            weight1: Array2::zeros((frames, shells)),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.data.nrows()
    }

    pub fn shell_count(&self) -> usize {
        self.data.ncols()
    }

    pub fn reset(&mut self) {
        self.data.fill(0.0);
        self.weight0.fill(0.0);
        self.weight1.fill(0.0);
    }

    /// Elementwise sum with another table of the same shape.
    pub fn accumulate(&mut self, other: &FscTable) {
        self.data += &other.data;
        self.weight0 += &other.weight0;
        self.weight1 += &other.weight1;
    }

    /// Add one particle: `observed[f]` is the motion-corrected frame `f`,
    /// `predicted` its reference.
    pub fn update(&mut self, observed: &[Spectrum], predicted: &Spectrum) {
        let shells = self.shell_count();
        let (h, w) = predicted.dim();

        for (f, obs) in observed.iter().enumerate().take(self.frame_count()) {
            for ((row, col), o) in obs.indexed_iter() {
                let k = shell_index(row, col, h, w);
                if k >= shells {
                    continue;
                }
                let p = predicted[[row, col]];
                self.data[[f, k]] += (o * p.conj()).re;
                self.weight0[[f, k]] += o.norm_sqr();
                self.weight1[[f, k]] += p.norm_sqr();
            }
        }
    }

    /// Normalized Fourier cross-correlation per frame and shell.
    pub fn fcc(&self) -> Array2<f64> {
        let mut out = Array2::zeros(self.data.dim());
        Zip::from(&mut out)
            .and(&self.data)
            .and(&self.weight0)
            .and(&self.weight1)
            .for_each(|o, &d, &w0, &w1| *o = ratio(d, w0, w1));
        out
    }

    /// Mean FCC of every frame over shells `[k_low, k_high)`.
    pub fn per_frame_mean(&self, k_low: usize, k_high: usize) -> Vec<f64> {
        let (k_low, k_high) = self.clamp_range(k_low, k_high);
        let fcc = self.fcc();
        fcc.rows()
            .into_iter()
            .map(|row| {
                if k_high > k_low {
                    row.slice(s![k_low..k_high]).sum() / (k_high - k_low) as f64
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Total signal correlation over shells `[k_low, k_high)`.
    pub fn tsc(&self, k_low: usize, k_high: usize, mode: TscMode) -> f64 {
        let (k_low, k_high) = self.clamp_range(k_low, k_high);
        let data = self.data.slice(s![.., k_low..k_high]);
        let w0 = self.weight0.slice(s![.., k_low..k_high]);
        let w1 = self.weight1.slice(s![.., k_low..k_high]);

        match mode {
            TscMode::Global => ratio(data.sum(), w0.sum(), w1.sum()),
            TscMode::PerFrame => {
                let mut total = 0.0;
                let mut frames = 0usize;
                for ((d, a), b) in data.rows().into_iter().zip(w0.rows()).zip(w1.rows()) {
                    let (sa, sb) = (a.sum(), b.sum());
                    if sa > 0.0 && sb > 0.0 {
                        total += ratio(d.sum(), sa, sb);
                        frames += 1;
                    }
                }
                if frames > 0 {
                    total / frames as f64
                } else {
                    0.0
                }
            }
        }
    }

    fn clamp_range(&self, k_low: usize, k_high: usize) -> (usize, usize) {
        let high = k_high.min(self.shell_count());
        (k_low.min(high), high)
    }
}

fn ratio(data: f64, w0: f64, w1: f64) -> f64 {
    let denom = (w0 * w1).sqrt();
    if denom > 0.0 {
        data / denom
    } else {
        0.0
    }
}
