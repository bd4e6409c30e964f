//! scsplit
#![deny(missing_docs)]

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use env_logger::{Builder, Target};
use log::{info, LevelFilter};
use scsplit::io::{load_allele_counts, write_outputs};
use scsplit::{demultiplex, ScSplitParams};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Demultiplex pooled cells by genotype from ref/alt allele count matrices.
#[derive(Debug, Parser)]
#[clap(name = "scsplit")]
struct Args {
    /// CSV of reference-supporting counts, SNVs by barcodes.
    #[clap(long = "ref", value_name = "CSV")]
    ref_counts: PathBuf,

    /// CSV of alternative-supporting counts with the same labels.
    #[clap(long = "alt", value_name = "CSV")]
    alt_counts: PathBuf,

    /// Directory for barcodes_{n}.csv, initial_{n}.csv and summary.json.
    #[clap(long, value_name = "PATH")]
    out: PathBuf,

    /// Number of pooled donors.
    #[clap(short = 'n', long, value_name = "NUM")]
    num_donors: usize,

    /// TOML file with parameter defaults; flags given here take precedence.
    #[clap(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Independent initialisation + EM runs.
    #[clap(long, value_name = "NUM")]
    restarts: Option<usize>,

    /// Worker threads.
    #[clap(long, value_name = "NUM")]
    threads: Option<usize>,

    /// Master random seed.
    #[clap(long, value_name = "NUM")]
    seed: Option<u64>,

    /// Append log records to this file instead of stderr.
    #[clap(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log EM progress per iteration.
    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn params(&self) -> Result<ScSplitParams> {
        let mut params = match &self.config {
            Some(path) => ScSplitParams::from_toml(path)?,
            None => ScSplitParams::default(),
        };
        params.num_donors = self.num_donors;
        if let Some(restarts) = self.restarts {
            params.restarts = restarts;
        }
        if let Some(threads) = self.threads {
            params.threads = threads;
        }
        if let Some(seed) = self.seed {
            params.seed = seed;
        }
        Ok(params)
    }
}

fn init_log(log_file: Option<&Path>, level: LevelFilter) -> Result<()> {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level);
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| path.display().to_string())?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    init_log(args.log_file.as_deref(), level)?;

    let params = args.params()?;
    let counts = load_allele_counts(&args.ref_counts, &args.alt_counts)?;
    info!(
        "loaded {} SNVs x {} barcodes",
        counts.num_snvs(),
        counts.num_barcodes()
    );
    let result = demultiplex(&counts, &params)?;
    write_outputs(&args.out, &result)?;
    info!("wrote results to {}", args.out.display());
    Ok(())
}
