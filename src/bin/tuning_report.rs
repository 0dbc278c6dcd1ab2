/// tuning_report: build the two-page summary of one imaging session.
///
/// Output, next to the data file:
///   <stem>/page-1.svg     metadata, luminosity responses
///   <stem>/page-2.svg     tuning summary, example cells
///   <stem>/summary.json   per-cell tuning and selectivity
///
/// With `--debug`, the figures are written on their own to the system
/// temporary directory as `<name>-<run id>.svg` and no report is composed.
use anyhow::Result;
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;

use vistuning::report::{
    generate_figs, validate_datafile, write_figures, write_report, ReportOptions,
};
use vistuning::{with_session, ImagingQuantity, Session, StoredTraces, TuningConfig};

#[derive(Parser, Debug)]
#[command(name = "tuning_report", about = "Orientation-tuning report of one imaging session")]
struct Args {
    /// Session file (.safetensors).
    datafile: PathBuf,

    /// Sub-protocol used when no grating protocol is found by name.
    #[arg(long, default_value_t = 0)]
    iprotocol: usize,

    /// Signal the responses are computed on (dFoF, rawFluo, neuropil).
    #[arg(long = "imaging_quantity", default_value_t = ImagingQuantity::DFoF)]
    imaging_quantity: ImagingQuantity,

    /// Number of example cells.
    #[arg(long = "nROIs", default_value_t = 5)]
    n_rois: usize,

    /// Draw every cell instead of a random sample.
    #[arg(long = "show_all_ROIs")]
    show_all_rois: bool,

    /// Seed of the example-cell sampling.
    #[arg(short = 's', long, default_value_t = 1)]
    seed: u64,

    /// Analyse at most this many cells.
    #[arg(long = "Nmax", alias = "nmax", default_value_t = 1_000_000)]
    nmax: usize,

    /// Write the bare figures to the temporary directory instead of the report.
    #[arg(short = 'd', long)]
    debug: bool,

    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = validate_datafile(&args.datafile) {
        eprintln!("Need to provide a datafile ({e})");
        std::process::exit(1);
    }

    let opts = ReportOptions {
        iprotocol: args.iprotocol,
        n_rois: args.n_rois,
        show_all_rois: args.show_all_rois,
        nmax: args.nmax,
        tuning: TuningConfig { quantity: args.imaging_quantity, ..TuningConfig::default() },
    };
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    println!("Reading {} …", args.datafile.display());
    let report = with_session(&args.datafile, |h| {
        let session = Session::load(h, opts.tuning.quantity, &StoredTraces::default())?;
        println!("  {} ROIs, {} episodes", session.n_rois(), session.episodes.len());
        generate_figs(&session, &opts, &mut rng)
    })?;

    if let Some(tuning) = &report.summary.tuning {
        println!(
            "  responsive ROIs: {} / {} ({:.1} %)",
            tuning.cells.len(),
            tuning.n_rois,
            100.0 * tuning.frac_resp
        );
    }

    if args.debug {
        let run_id: u32 = rand::thread_rng().gen_range(0..10_000);
        for path in write_figures(&report, &std::env::temp_dir(), run_id)? {
            println!("Written → {}", path.display());
        }
        return Ok(());
    }

    for path in write_report(&report, &args.datafile)? {
        println!("Written → {}", path.display());
    }
    Ok(())
}
