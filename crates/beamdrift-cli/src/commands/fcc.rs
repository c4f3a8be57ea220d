use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use beamdrift_core::fsc::{FscTable, TscMode};
use beamdrift_core::io::{find_fsc_tables, read_fsc_table};
use clap::{Args, ValueEnum};

use crate::summary::print_fcc_summary;

#[derive(Clone, Copy, ValueEnum)]
pub enum TscModeArg {
    Global,
    PerFrame,
}

impl From<TscModeArg> for TscMode {
    fn from(arg: TscModeArg) -> Self {
        match arg {
            TscModeArg::Global => TscMode::Global,
            TscModeArg::PerFrame => TscMode::PerFrame,
        }
    }
}

#[derive(Args)]
pub struct FccArgs {
    /// Directory holding *_FCC_{cc,w0,w1}.mrc tables
    pub dir: PathBuf,

    /// Lowest shell included in the score
    #[arg(long, default_value = "0")]
    pub k_low: usize,

    /// First shell excluded from the score (default: all shells)
    #[arg(long)]
    pub k_high: Option<usize>,

    /// How the frames are combined into one score
    #[arg(long, value_enum, default_value = "global")]
    pub mode: TscModeArg,
}

pub fn run(args: &FccArgs) -> Result<()> {
    let names = find_fsc_tables(&args.dir)
        .with_context(|| format!("Failed to list {}", args.dir.display()))?;
    let Some(first) = names.first() else {
        bail!("No FCC tables found in {}", args.dir.display());
    };

    let mut total: FscTable = read_fsc_table(&args.dir, first)?;
    for name in &names[1..] {
        let table = read_fsc_table(&args.dir, name)
            .with_context(|| format!("Failed to read FCC tables of {name}"))?;
        if table.data.dim() != total.data.dim() {
            bail!(
                "{name}: table shape {:?} differs from {:?}",
                table.data.dim(),
                total.data.dim()
            );
        }
        total.accumulate(&table);
    }

    let k_high = args.k_high.unwrap_or(total.shell_count());
    let per_frame = total.per_frame_mean(args.k_low, k_high);
    let tsc = total.tsc(args.k_low, k_high, args.mode.into());

    print_fcc_summary(names.len(), args.k_low, k_high, &per_frame, tsc);
    Ok(())
}
