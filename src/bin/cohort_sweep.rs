/// cohort_sweep: analyse a folder of sessions under every preprocessing
/// variant and compare genotypes.
///
/// Output, in `--out` (default `<folder>/summaries`):
///   <variant>.json                    cohort bundle, reused unless --force
///   <variant>-WT-vs-<genotype>.svg    population curves + Mann-Whitney on SI
///
/// Variants: imaging quantity (rawFluo, neuropil, dFoF), neuropil factor
/// 0.6 to 0.9, inclusion factor 1.05 to 1.3.  The last two only apply to
/// sources that build ΔF/F themselves; with the traces stored in the files
/// they are skipped.
use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use vistuning::cohort::{compute_summary_responses_with, load_bundle, save_bundle, scan_folder};
use vistuning::figure::cohort_comparison_fig;
use vistuning::{
    compare_cohorts, population_curve, Averaging, CohortSummary, Genotype, PopulationOptions,
    StoredTraces, SummaryOptions, SweepPoint, GRATING_PROTOCOLS,
};

#[derive(Parser, Debug)]
#[command(
    name = "cohort_sweep",
    about = "Genotype comparison of orientation tuning over preprocessing variants"
)]
struct Args {
    /// Folder searched recursively for session files.
    folder: PathBuf,

    /// Output directory.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Analyse at most this many sessions per genotype.
    #[arg(long)]
    nmax: Option<usize>,

    /// Only run the variants whose name contains this string.
    #[arg(long)]
    only: Option<String>,

    /// Recompute bundles that already exist.
    #[arg(long)]
    force: bool,

    /// Average per session instead of pooling cells.
    #[arg(long)]
    by_session: bool,

    /// Divide each curve by its peak before averaging.
    #[arg(long)]
    normalize: bool,

    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let out = args.out.clone().unwrap_or_else(|| args.folder.join("summaries"));
    let dataset = scan_folder(&args.folder)?;
    println!("{} session files in {}", dataset.len(), args.folder.display());

    let base = SummaryOptions { nmax: args.nmax, ..SummaryOptions::default() };
    let averaging = if args.by_session { Averaging::BySession } else { Averaging::ByRoi };
    let pop = PopulationOptions { normalize_peak: args.normalize, ..PopulationOptions::default() };

    for point in SweepPoint::default_sweep() {
        let stem = point.stem();
        if args.only.as_deref().is_some_and(|s| !stem.contains(s)) {
            continue;
        }
        let opts = point.apply(&base);
        let source = StoredTraces { params: opts.dfof.clone() };
        if !point.supported_by(&source) {
            warn!("{stem}: skipped, stored traces do not depend on ΔF/F parameters");
            continue;
        }
        let path = point.bundle_path(&out);
        let summary = if path.is_file() && !args.force {
            info!("{stem}: reusing {}", path.display());
            load_bundle(&path)?
        } else {
            let mut summary = CohortSummary::init(&dataset, &GRATING_PROTOCOLS);
            compute_summary_responses_with(&mut summary, &opts, &source);
            save_bundle(&summary, &path)?;
            println!("Written → {}", path.display());
            summary
        };

        let Some(wt) = summary.cohort(Genotype::WT, 1.0) else { continue };
        let wt_curve = population_curve(&wt.tunings(), averaging, &pop);
        for g in [Genotype::GluN1, Genotype::GluN3] {
            let Some(other) = summary.cohort(g, 1.0) else { continue };
            let curve = population_curve(&other.tunings(), averaging, &pop);
            let test = compare_cohorts(&wt_curve, &curve);
            if let Some(t) = &test {
                println!("  {stem}: WT vs {g}  U={:.1}  p={:.3e}", t.u, t.pvalue);
            }
            let y_desc = if args.normalize { "norm. resp." } else { "resp." };
            let fig = cohort_comparison_fig(
                &[("WT", &wt_curve), (g.as_str(), &curve)],
                y_desc,
                test.map(|t| t.pvalue),
            )?;
            let fig_path = out.join(format!("{stem}-WT-vs-{g}.svg"));
            fig.save(&fig_path)?;
            println!("Written → {}", fig_path.display());
        }
    }
    Ok(())
}
