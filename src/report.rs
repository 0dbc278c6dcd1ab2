//! Per-session report: figures, page layout and summary file.
//!
//! Two A4 pages at 300 dpi.  Each figure has a fixed top-left position;
//! figures that were not produced leave their slot empty.
//!
//! ```text
//!   page 1                          page 2
//!   ┌──────────────────────┐        ┌──────────────────────┐
//!   │ metadata     FOV     │        │   tuning-summary     │
//!   │ raw-full             │        │ tuning-examples      │
//!   │ lum-resp             │        │                      │
//!   │ raw-0                │        │                      │
//!   └──────────────────────┘        └──────────────────────┘
//! ```
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use ndarray::Axis;
use plotters::prelude::*;
use rand::Rng;
use serde::Serialize;

use crate::config::{ProtocolSelector, TuningConfig};
use crate::episodes::{same_param, EpisodeSet};
use crate::error::TuningError;
use crate::figure::{
    font, luminosity_fig, render, tuning_examples_fig, tuning_summary_fig, ExampleCell, Figure,
};
use crate::io::has_session_extension;
use crate::luminosity::{luminosity_summary, LuminositySummary};
use crate::response::compute_summary_data;
use crate::selectivity::{curve_osi, selectivity_index, SelectivityPolicy};
use crate::session::{Session, SessionMeta};
use crate::tuning::{compute_tuning_response_per_cells, SessionTuning};

/// A4 at 300 dpi, in pixels.
pub const PAGE_SIZE: (u32, u32) = (2481, 3510);

/// Figure name and top-left corner on page 1.
pub const PAGE1_LAYOUT: [(&str, (i32, i32)); 5] = [
    ("metadata", (200, 130)),
    ("raw-full", (150, 650)),
    ("lum-resp", (150, 1600)),
    ("raw-0", (150, 2400)),
    ("FOV", (900, 130)),
];

/// Figure name and top-left corner on page 2.
pub const PAGE2_LAYOUT: [(&str, (i32, i32)); 2] = [
    ("tuning-summary", (300, 150)),
    ("tuning-examples", (200, 700)),
];

/// Marker of the drifting-grating protocol in sub-protocol names.
pub const GRATING_MARKER: &str = "8orientation";

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    /// Sub-protocol used when no grating protocol can be found by name.
    pub iprotocol: usize,
    /// Example cells drawn. Default: `5`.
    pub n_rois: usize,
    /// Draw every cell instead of a random sample.
    pub show_all_rois: bool,
    /// At most this many cells are analysed. Default: `1_000_000`.
    pub nmax: usize,
    /// Quantity, test and threshold.  The protocol is resolved per session.
    pub tuning: TuningConfig,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            iprotocol: 0,
            n_rois: 5,
            show_all_rois: false,
            nmax: 1_000_000,
            tuning: TuningConfig::default(),
        }
    }
}

/// First sub-protocol whose name contains [`GRATING_MARKER`], else
/// `iprotocol`.
pub fn grating_protocol(meta: &SessionMeta, iprotocol: usize) -> usize {
    meta.protocols
        .iter()
        .position(|p| p.contains(GRATING_MARKER))
        .unwrap_or(iprotocol)
}

/// `n` distinct cells out of `n_total`, drawn with `rng`.
pub fn sample_rois<R: Rng + ?Sized>(n_total: usize, n: usize, rng: &mut R) -> Vec<usize> {
    rand::seq::index::sample(rng, n_total, n.min(n_total)).into_vec()
}

/// Per-angle responses of the given cells at `cfg.contrast`.
pub fn example_cells(
    session: &Session,
    set: &EpisodeSet,
    cfg: &TuningConfig,
    rois: &[usize],
) -> Vec<ExampleCell> {
    rois.iter()
        .filter(|&&roi| roi < session.n_rois())
        .map(|&roi| {
            let trace = session.traces.index_axis(Axis(0), roi);
            let windows = set.response_windows(trace, &session.t, &cfg.stat_test);
            let summary = compute_summary_data(
                set,
                &windows,
                &cfg.stat_test,
                cfg.response_significance_threshold,
                None,
            );
            let at_contrast: Vec<_> = summary
                .iter()
                .filter(|r| same_param(r.contrast, cfg.contrast))
                .collect();
            let angles: Vec<f64> = at_contrast.iter().map(|r| r.angle).collect();
            let values: Vec<f64> = at_contrast.iter().map(|r| r.value).collect();
            ExampleCell {
                roi,
                si: selectivity_index(&angles, &values),
                responsive: at_contrast.iter().any(|r| r.significant),
                stds: at_contrast.iter().map(|r| r.std_value).collect(),
                angles,
                values,
            }
        })
        .collect()
}

/// Text block with the session identity.
pub fn metadata_fig(session: &Session) -> Result<Figure> {
    let lines = [
        format!("file: {}", session.label()),
        format!("subject: {}", session.meta.subject),
        format!("protocol: {}", session.meta.protocol),
        format!("quantity: {}  ({} ROIs)", session.quantity, session.n_rois()),
        session.meta.notes.clone(),
    ];
    render("metadata", 650, 450, |root| {
        for (i, line) in lines.iter().filter(|l| !l.is_empty()).enumerate() {
            root.draw(&Text::new(line.as_str(), (10, 20 + 60 * i as i32), font(30)))?;
        }
        Ok(())
    })
}

/// Numbers written next to the pages.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub datafile: PathBuf,
    pub subject: String,
    pub protocol: String,
    pub quantity: String,
    pub n_rois: usize,
    pub tuning: Option<SessionTuning>,
    /// Selectivity of each responsive cell.
    pub osi: Vec<f64>,
    pub luminosity: LuminositySummary,
    pub example_rois: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub figures: Vec<Figure>,
    pub summary: ReportSummary,
}

impl SessionReport {
    pub fn figure(&self, name: &str) -> Option<&Figure> {
        self.figures.iter().find(|f| f.name == name)
    }
}

/// Compute every figure of the report.
///
/// A session without luminosity or grating protocol still produces a
/// report; the missing figures are reported and left out.
pub fn generate_figs<R: Rng + ?Sized>(
    session: &Session,
    opts: &ReportOptions,
    rng: &mut R,
) -> Result<SessionReport> {
    let mut figures = vec![metadata_fig(session)?];

    let luminosity = luminosity_summary(session, &session.episodes);
    if !luminosity.is_empty() {
        figures.push(luminosity_fig(&luminosity)?);
    }

    let protocol_id = grating_protocol(&session.meta, opts.iprotocol);
    let cfg = TuningConfig {
        protocol: ProtocolSelector::Index(protocol_id),
        max_rois: Some(opts.nmax),
        ..opts.tuning.clone()
    };

    let mut osi = Vec::new();
    let tuning = match compute_tuning_response_per_cells(session, &cfg) {
        Ok(t) => {
            let grid = t.grid();
            osi = t
                .cells
                .iter()
                .filter_map(|c| {
                    curve_osi(&c.curve.values, &grid, SelectivityPolicy::PrefMinusOrth).ok()
                })
                .map(|v| v.clamp(0.0, 1.0))
                .collect();
            figures.push(tuning_summary_fig(&t)?);
            Some(t)
        }
        Err(e) => {
            warn!("{}: tuning skipped ({e:#})", session.label());
            None
        }
    };

    let n_analysed = session.n_rois().min(opts.nmax);
    let example_rois = if opts.show_all_rois {
        (0..n_analysed).collect()
    } else {
        sample_rois(n_analysed, opts.n_rois, rng)
    };
    if tuning.is_some() {
        let set = EpisodeSet::for_protocol(session, protocol_id);
        let cells = example_cells(session, &set, &cfg, &example_rois);
        figures.push(tuning_examples_fig(&cells)?);
    }

    Ok(SessionReport {
        figures,
        summary: ReportSummary {
            datafile: session.path.clone(),
            subject: session.meta.subject.clone(),
            protocol: session.meta.protocol.clone(),
            quantity: session.quantity.to_string(),
            n_rois: session.n_rois(),
            tuning,
            osi,
            luminosity,
            example_rois,
        },
    })
}

/// Place the figures named in `layout` on a blank A4 page.
pub fn compose_page(figures: &[Figure], layout: &[(&str, (i32, i32))]) -> String {
    let (w, h) = PAGE_SIZE;
    let mut page = format!(
        "<svg width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" xmlns=\"http://www.w3.org/2000/svg\">\n\
         <rect width=\"{w}\" height=\"{h}\" fill=\"white\"/>\n"
    );
    for (name, (x, y)) in layout {
        if let Some(fig) = figures.iter().find(|f| f.name == *name) {
            page.push_str(&format!("<g transform=\"translate({x},{y})\">\n{}\n</g>\n", fig.svg));
        }
    }
    page.push_str("</svg>\n");
    page
}

/// Check that `datafile` exists and carries the session extension.
pub fn validate_datafile(datafile: &Path) -> Result<(), TuningError> {
    if has_session_extension(datafile) && datafile.is_file() {
        Ok(())
    } else {
        Err(TuningError::NotASessionFile(datafile.to_path_buf()))
    }
}

/// `<dir>/<stem>/` next to the data file.
pub fn summary_folder(datafile: &Path) -> PathBuf {
    let stem = datafile.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    datafile.parent().unwrap_or_else(|| Path::new(".")).join(stem)
}

/// Write both pages and `summary.json` into [`summary_folder`].
pub fn write_report(report: &SessionReport, datafile: &Path) -> Result<Vec<PathBuf>> {
    let dir = summary_folder(datafile);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let pages = [
        ("page-1.svg", compose_page(&report.figures, &PAGE1_LAYOUT)),
        ("page-2.svg", compose_page(&report.figures, &PAGE2_LAYOUT)),
    ];
    let mut written = Vec::new();
    for (name, svg) in pages {
        let path = dir.join(name);
        fs::write(&path, svg).with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    let path = dir.join("summary.json");
    fs::write(&path, serde_json::to_string_pretty(&report.summary)?)
        .with_context(|| format!("writing {}", path.display()))?;
    written.push(path);
    info!("report written to {}", dir.display());
    Ok(written)
}

/// Write each figure as `<name>-<run_id>.svg` into `dir`.
pub fn write_figures(report: &SessionReport, dir: &Path, run_id: u32) -> Result<Vec<PathBuf>> {
    report
        .figures
        .iter()
        .map(|f| {
            let path = dir.join(format!("{}-{run_id}.svg", f.name));
            f.save(&path)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn sampling_is_seeded() {
        let a = sample_rois(50, 5, &mut ChaCha8Rng::seed_from_u64(1));
        let b = sample_rois(50, 5, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
        assert_eq!(sample_rois(3, 5, &mut ChaCha8Rng::seed_from_u64(1)).len(), 3);
    }

    #[test]
    fn grating_protocol_by_name() {
        let meta = SessionMeta {
            protocols: vec![
                "Luminosity-BlankFirst".into(),
                "ff-gratings-8orientation-2contrasts-10repeats".into(),
            ],
            ..SessionMeta::default()
        };
        assert_eq!(grating_protocol(&meta, 0), 1);
        assert_eq!(grating_protocol(&SessionMeta::default(), 3), 3);
    }

    #[test]
    fn pages_place_present_figures_only() {
        let fig = Figure {
            name: "tuning-summary".into(),
            width: 10,
            height: 10,
            svg: "<svg/>".into(),
        };
        let page = compose_page(&[fig], &PAGE2_LAYOUT);
        assert!(page.contains("translate(300,150)"));
        assert!(!page.contains("translate(200,700)"));
        assert!(page.starts_with("<svg width=\"2481\" height=\"3510\""));
    }

    #[test]
    fn summary_folder_next_to_file() {
        assert_eq!(
            summary_folder(Path::new("/data/2023_02_15-13-30-47.safetensors")),
            PathBuf::from("/data/2023_02_15-13-30-47")
        );
    }
}
