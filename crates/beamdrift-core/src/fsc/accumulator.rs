use rayon::prelude::*;

use super::table::{FscTable, TscMode};

/// One [`FscTable`] per worker slot.
///
/// Every slot is written by exactly one task during [`Self::accumulate`], and
/// the slots are only combined afterwards by [`Self::merged`].
#[derive(Clone, Debug)]
pub struct FscAccumulator {
    slots: Vec<FscTable>,
}

impl FscAccumulator {
    pub fn new(slot_count: usize, frames: usize, shells: usize) -> Self {
        Self {
            slots: (0..slot_count.max(1))
                .map(|_| FscTable::zeros(frames, shells))
                .collect(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[FscTable] {
        &self.slots
    }

    /// Zero every slot, keeping the allocations.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(FscTable::reset);
    }

    /// Run `contribute(particle, table)` for every particle in parallel.
    ///
    /// Particles are split into contiguous chunks, one chunk per slot.
    pub fn accumulate<F>(&mut self, particle_count: usize, contribute: F)
    where
        F: Fn(usize, &mut FscTable) + Sync,
    {
        let chunk = particle_count.div_ceil(self.slots.len());
        self.slots
            .par_iter_mut()
            .enumerate()
            .for_each(|(slot, table)| {
                let start = slot * chunk;
                let end = (start + chunk).min(particle_count);
                for p in start..end {
                    contribute(p, table);
                }
            });
    }

    /// Elementwise sum of all slots.
    pub fn merged(&self) -> FscTable {
        let mut iter = self.slots.iter();
        let mut out = iter
            .next()
            .cloned()
            .unwrap_or_else(|| FscTable::zeros(0, 0));
        for table in iter {
            out.accumulate(table);
        }
        out
    }

    pub fn tsc(&self, k_low: usize, k_high: usize, mode: TscMode) -> f64 {
        self.merged().tsc(k_low, k_high, mode)
    }
}
