mod accumulator;
mod table;

pub use accumulator::FscAccumulator;
pub use table::{FscTable, TscMode};
