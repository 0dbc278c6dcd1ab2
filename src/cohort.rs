//! Genotype cohorts: sorting sessions, batch tuning, population curves.
//!
//! ```text
//!   scan_folder(dir) ─→ [DatasetEntry] ─→ CohortSummary::init
//!                                              │
//!                     compute_summary_responses (one session at a time,
//!                     failures logged and skipped)
//!                                              │
//!              ┌───────────────────────────────┴──────────────┐
//!   population_curve(ByRoi | BySession)             save_bundle(data/<point>.json)
//! ```
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{DfofParams, ImagingQuantity, ProtocolSelector, TuningConfig, GRATING_PROTOCOLS};
use crate::io::{has_session_extension, SessionHandle};
use crate::selectivity::{curve_osi, SelectivityPolicy};
use crate::session::{with_session, Session, SessionMeta, StoredTraces, TraceSource};
use crate::stats::{self, MannWhitney};
use crate::tuning::{compute_tuning_response_per_cells, SessionTuning};

// ── Genotypes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Genotype {
    WT,
    GluN1,
    GluN3,
}

impl Genotype {
    pub const ALL: [Genotype; 3] = [Genotype::WT, Genotype::GluN1, Genotype::GluN3];

    /// Sort a subject name: `NR1`/`GluN1` knock-outs, `NR3`/`GluN3`
    /// knock-outs, wild type otherwise.
    pub fn from_subject(subject: &str) -> Self {
        if subject.contains("NR1") || subject.contains("GluN1") {
            Genotype::GluN1
        } else if subject.contains("NR3") || subject.contains("GluN3") {
            Genotype::GluN3
        } else {
            Genotype::WT
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Genotype::WT => "WT",
            Genotype::GluN1 => "GluN1",
            Genotype::GluN3 => "GluN3",
        }
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a cohort: `"WT"` at full contrast, `"WT_c=0.5"` at half.
pub fn cohort_key(genotype: Genotype, contrast: f64) -> String {
    if contrast == 1.0 {
        genotype.to_string()
    } else {
        format!("{genotype}_c={contrast}")
    }
}

// ── Dataset ───────────────────────────────────────────────────────────────────

/// One session file found on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub path: PathBuf,
    pub subject: String,
    pub protocols: Vec<String>,
}

/// Recursively list the session files under `dir`, sorted by path.
///
/// Files whose header cannot be read are logged and left out.
pub fn scan_folder<P: AsRef<Path>>(dir: P) -> Result<Vec<DatasetEntry>> {
    let mut files = Vec::new();
    collect_session_files(dir.as_ref(), &mut files)?;
    files.sort();

    let mut out = Vec::with_capacity(files.len());
    for path in files {
        match SessionHandle::open(&path) {
            Ok(handle) => {
                let meta = SessionMeta::read(&handle);
                out.push(DatasetEntry { path, subject: meta.subject, protocols: meta.protocols });
            }
            Err(e) => warn!("{}: unreadable session, skipped ({e:#})", path.display()),
        }
    }
    info!("{}: {} session(s) found", dir.as_ref().display(), out.len());
    Ok(out)
}

fn collect_session_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_session_files(&path, out)?;
        } else if has_session_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

// ── Cohorts ───────────────────────────────────────────────────────────────────

/// Tuning of one session inside a cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSession {
    pub path: PathBuf,
    pub subject: String,
    pub tuning: SessionTuning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub genotype: Genotype,
    pub contrast: f64,
    pub files: Vec<PathBuf>,
    pub subjects: Vec<String>,
    /// Sessions analysed so far; a failed file leaves no entry.
    pub sessions: Vec<CohortSession>,
}

impl Cohort {
    fn new(genotype: Genotype, contrast: f64) -> Self {
        Self { genotype, contrast, files: Vec::new(), subjects: Vec::new(), sessions: Vec::new() }
    }

    pub fn tunings(&self) -> Vec<&SessionTuning> {
        self.sessions.iter().map(|s| &s.tuning).collect()
    }

    /// Number of distinct subjects among the analysed sessions.
    pub fn n_subjects(&self) -> usize {
        let mut s: Vec<&str> = self.sessions.iter().map(|s| s.subject.as_str()).collect();
        s.sort_unstable();
        s.dedup();
        s.len()
    }

    pub fn frac_resp(&self) -> Vec<f64> {
        self.sessions.iter().map(|s| s.tuning.frac_resp).collect()
    }

    /// Selectivity of every responsive cell, grouped by session.  Cells whose
    /// index is undefined are left out.
    pub fn osi(&self, policy: SelectivityPolicy) -> Vec<Vec<f64>> {
        self.sessions
            .iter()
            .map(|s| {
                let grid = s.tuning.grid();
                s.tuning
                    .cells
                    .iter()
                    .filter_map(|c| curve_osi(&c.curve.values, &grid, policy).ok())
                    .map(|v| v.clamp(0.0, 1.0))
                    .collect()
            })
            .collect()
    }
}

/// All cohorts of one analysis run plus the settings that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub quantity: ImagingQuantity,
    pub dfof: DfofParams,
    pub tuning: TuningConfig,
    pub shifted_angle: Vec<f64>,
    pub cohorts: BTreeMap<String, Cohort>,
}

impl CohortSummary {
    /// Sort the sessions holding one of `protocols` by genotype.
    ///
    /// Creates a full-contrast and a half-contrast cohort per genotype; the
    /// half-contrast ones share their genotype's file list.
    pub fn init(dataset: &[DatasetEntry], protocols: &[&str]) -> Self {
        let mut cohorts = BTreeMap::new();
        for g in Genotype::ALL {
            for c in [1.0, 0.5] {
                cohorts.insert(cohort_key(g, c), Cohort::new(g, c));
            }
        }
        for entry in dataset {
            if !entry.protocols.iter().any(|p| protocols.contains(&p.as_str())) {
                debug!("{}: no grating protocol, not in any cohort", entry.path.display());
                continue;
            }
            let g = Genotype::from_subject(&entry.subject);
            for c in [1.0, 0.5] {
                if let Some(cohort) = cohorts.get_mut(&cohort_key(g, c)) {
                    cohort.files.push(entry.path.clone());
                    cohort.subjects.push(entry.subject.clone());
                }
            }
        }
        Self {
            quantity: ImagingQuantity::DFoF,
            dfof: DfofParams::default(),
            tuning: TuningConfig::default(),
            shifted_angle: Vec::new(),
            cohorts,
        }
    }

    pub fn cohort(&self, genotype: Genotype, contrast: f64) -> Option<&Cohort> {
        self.cohorts.get(&cohort_key(genotype, contrast))
    }
}

/// Settings of [`compute_summary_responses`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryOptions {
    /// Quantity, stat test, threshold and protocol.  `contrast` is ignored:
    /// every genotype is analysed at full contrast.
    pub tuning: TuningConfig,
    pub dfof: DfofParams,
    /// At most this many files per genotype. Default: all.
    pub nmax: Option<usize>,
    /// Genotypes additionally analysed at half contrast.
    ///
    /// Default: `[WT, GluN1]`.
    pub half_contrast: Vec<Genotype>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            tuning: TuningConfig {
                protocol: ProtocolSelector::Named(
                    GRATING_PROTOCOLS.iter().map(|s| s.to_string()).collect(),
                ),
                ..TuningConfig::default()
            },
            dfof: DfofParams::default(),
            nmax: None,
            half_contrast: vec![Genotype::WT, Genotype::GluN1],
        }
    }
}

/// [`compute_summary_responses_with`] on traces stored in the files.
pub fn compute_summary_responses(summary: &mut CohortSummary, opts: &SummaryOptions) {
    let source = StoredTraces { params: opts.dfof.clone() };
    compute_summary_responses_with(summary, opts, &source)
}

/// Analyse every file of every genotype.
///
/// A file that fails to load or analyse is reported and skipped; the sweep
/// carries on with the next one.
pub fn compute_summary_responses_with(
    summary: &mut CohortSummary,
    opts: &SummaryOptions,
    source: &dyn TraceSource,
) {
    if opts.dfof != DfofParams::default() && !source.honours_dfof_params() {
        warn!("trace source ignores ΔF/F parameters {:?}", opts.dfof);
    }
    summary.quantity = opts.tuning.quantity;
    summary.dfof = opts.dfof.clone();
    summary.tuning = opts.tuning.clone();

    for g in Genotype::ALL {
        let key = cohort_key(g, 1.0);
        let Some(cohort) = summary.cohorts.get(&key) else { continue };
        let nmax = opts.nmax.unwrap_or(usize::MAX);
        let work: Vec<(PathBuf, String)> = cohort
            .files
            .iter()
            .cloned()
            .zip(cohort.subjects.iter().cloned())
            .take(nmax)
            .collect();
        let contrasts: &[f64] = if opts.half_contrast.contains(&g) { &[1.0, 0.5] } else { &[1.0] };

        for (path, subject) in work {
            info!("analyzing \"{}\" [...]", path.display());
            match analyse_file(&path, opts, source, contrasts) {
                Ok(tunings) => {
                    for (contrast, tuning) in contrasts.iter().zip(tunings) {
                        if summary.shifted_angle.is_empty() {
                            summary.shifted_angle = tuning.shifted_angle.clone();
                        }
                        if let Some(c) = summary.cohorts.get_mut(&cohort_key(g, *contrast)) {
                            c.sessions.push(CohortSession {
                                path: path.clone(),
                                subject: subject.clone(),
                                tuning,
                            });
                        }
                    }
                }
                Err(e) => warn!("{}: skipped ({e:#})", path.display()),
            }
        }
    }
}

fn analyse_file(
    path: &Path,
    opts: &SummaryOptions,
    source: &dyn TraceSource,
    contrasts: &[f64],
) -> Result<Vec<SessionTuning>> {
    let session = with_session(path, |h| Session::load(h, opts.tuning.quantity, source))?;
    contrasts
        .iter()
        .map(|&contrast| {
            let cfg = TuningConfig { contrast, ..opts.tuning.clone() };
            compute_tuning_response_per_cells(&session, &cfg)
        })
        .collect()
}

// ── Population curves ─────────────────────────────────────────────────────────

/// How cells are pooled before computing the population curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Averaging {
    /// Every responsive cell of every session is one sample.
    #[default]
    ByRoi,
    /// Cells are averaged within each session; each session is one sample.
    BySession,
}

impl Averaging {
    pub fn label(&self) -> &'static str {
        match self {
            Averaging::ByRoi => "ROIs",
            Averaging::BySession => "sessions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationOptions {
    /// Negative responses set to zero before averaging. Default: `true`.
    pub clip_negative: bool,
    /// Each sample divided by its own maximum. Default: `false`.
    pub normalize_peak: bool,
    /// Default: [`SelectivityPolicy::PrefMinusOrth`].
    pub policy: SelectivityPolicy,
}

impl Default for PopulationOptions {
    fn default() -> Self {
        Self { clip_negative: true, normalize_peak: false, policy: SelectivityPolicy::default() }
    }
}

/// Mean ± s.e.m. tuning over the shifted-angle grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationCurve {
    pub shifted_angle: Vec<f64>,
    pub mean: Vec<f64>,
    /// NaN when fewer than two samples.
    pub sem: Vec<f64>,
    /// Samples pooled: cells for [`Averaging::ByRoi`], sessions for
    /// [`Averaging::BySession`].
    pub n: usize,
    /// Per grid point, how many samples carry a measured value there.
    pub measured: Vec<usize>,
    /// Selectivity of each sample.
    pub si: Vec<f64>,
    pub averaging: Averaging,
}

/// Pool the aligned curves of `sessions` into one population curve.
///
/// Sessions whose grid differs from the first one are left out with a
/// warning; sessions without responsive cells contribute nothing.
pub fn population_curve(
    sessions: &[&SessionTuning],
    averaging: Averaging,
    opts: &PopulationOptions,
) -> PopulationCurve {
    let grid = sessions.first().map(|s| s.grid()).unwrap_or_default();
    let n_angles = grid.len();

    let mut rows: Vec<(Vec<f64>, Vec<bool>)> = Vec::new();
    for s in sessions {
        if s.shifted_angle != grid.angles {
            warn!("session grid {:?} differs from {:?}, left out", s.shifted_angle, grid.angles);
            continue;
        }
        match averaging {
            Averaging::ByRoi => rows.extend(
                s.cells
                    .iter()
                    .map(|c| (c.curve.values.clone(), c.curve.measured.clone())),
            ),
            Averaging::BySession if s.cells.is_empty() => {}
            Averaging::BySession => {
                let mut values = vec![0.0; n_angles];
                let mut measured = vec![false; n_angles];
                for c in &s.cells {
                    for i in 0..n_angles {
                        values[i] += c.curve.values[i];
                        measured[i] |= c.curve.measured[i];
                    }
                }
                values.iter_mut().for_each(|v| *v /= s.cells.len() as f64);
                rows.push((values, measured));
            }
        }
    }

    for (values, _) in rows.iter_mut() {
        if opts.clip_negative {
            values.iter_mut().for_each(|v| *v = v.max(0.0));
        }
        if opts.normalize_peak {
            let peak = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if peak > 0.0 {
                values.iter_mut().for_each(|v| *v /= peak);
            }
        }
    }

    let column = |i: usize| rows.iter().map(|(v, _)| v[i]).collect::<Vec<_>>();
    PopulationCurve {
        shifted_angle: grid.angles.clone(),
        mean: (0..n_angles).map(|i| stats::mean(&column(i))).collect(),
        sem: (0..n_angles).map(|i| stats::sem(&column(i))).collect(),
        n: rows.len(),
        measured: (0..n_angles)
            .map(|i| rows.iter().filter(|(_, m)| m[i]).count())
            .collect(),
        si: rows
            .iter()
            .filter_map(|(v, _)| curve_osi(v, &grid, opts.policy).ok())
            .map(|v| v.clamp(0.0, 1.0))
            .collect(),
        averaging,
    }
}

/// Mann–Whitney U test between the selectivity distributions of two
/// population curves.
pub fn compare_cohorts(a: &PopulationCurve, b: &PopulationCurve) -> Option<MannWhitney> {
    stats::mann_whitney_u(&a.si, &b.si)
}

// ── Sweep points and cached bundles ───────────────────────────────────────────

/// One preprocessing variant of a cohort-wide sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SweepPoint {
    Quantity(ImagingQuantity),
    NeuropilFactor(f64),
    InclusionFactor(f64),
}

impl SweepPoint {
    /// The variants analysed by a full sweep.
    pub fn default_sweep() -> Vec<SweepPoint> {
        let mut points: Vec<SweepPoint> = [
            ImagingQuantity::RawFluo,
            ImagingQuantity::Neuropil,
            ImagingQuantity::DFoF,
        ]
        .into_iter()
        .map(SweepPoint::Quantity)
        .collect();
        points.extend([0.6, 0.7, 0.8, 0.9].map(SweepPoint::NeuropilFactor));
        points.extend([1.05, 1.1, 1.15, 1.2, 1.25, 1.3].map(SweepPoint::InclusionFactor));
        points
    }

    /// File stem of the cached bundle, e.g. `factor-neuropil-0.7-ff-gratings`.
    pub fn stem(&self) -> String {
        match self {
            SweepPoint::Quantity(q) => format!("{q}-ff-gratings"),
            SweepPoint::NeuropilFactor(f) => format!("factor-neuropil-{f:.1}-ff-gratings"),
            SweepPoint::InclusionFactor(f) => {
                format!("inclusion-factor-neuropil-{f:.2}-ff-gratings")
            }
        }
    }

    /// Whether the variant changes how ΔF/F is built rather than which
    /// stored quantity is read.
    pub fn varies_dfof(&self) -> bool {
        !matches!(self, SweepPoint::Quantity(_))
    }

    /// Whether `source` can produce this variant.  ΔF/F-parameter variants
    /// need a source that builds traces from its [`DfofParams`].
    pub fn supported_by(&self, source: &dyn TraceSource) -> bool {
        !self.varies_dfof() || source.honours_dfof_params()
    }

    pub fn bundle_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.stem()))
    }

    /// `base` with this variant applied.
    pub fn apply(&self, base: &SummaryOptions) -> SummaryOptions {
        let mut opts = base.clone();
        match *self {
            SweepPoint::Quantity(q) => opts.tuning.quantity = q,
            SweepPoint::NeuropilFactor(f) => {
                opts.tuning.quantity = ImagingQuantity::DFoF;
                opts.dfof.neuropil_correction_factor = f;
            }
            SweepPoint::InclusionFactor(f) => {
                opts.tuning.quantity = ImagingQuantity::DFoF;
                opts.dfof.roi_to_neuropil_fluo_inclusion_factor = f;
            }
        }
        opts
    }
}

/// Write `summary` as pretty JSON, creating parent directories.
pub fn save_bundle(summary: &CohortSummary, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("saved {}", path.display());
    Ok(())
}

pub fn load_bundle(path: &Path) -> Result<CohortSummary> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::{CellTuning, TuningCurve};
    use approx::assert_abs_diff_eq;

    const GRID: [f64; 8] = [-22.5, 0.0, 22.5, 45.0, 67.5, 90.0, 112.5, 135.0];

    fn cell(peak: f64, orth: f64) -> CellTuning {
        let mut values = vec![0.0; 8];
        values[1] = peak;
        values[5] = orth;
        CellTuning {
            roi: 0,
            preferred_angle: 0.0,
            curve: TuningCurve { values, measured: vec![true; 8] },
        }
    }

    fn session(cells: Vec<CellTuning>) -> SessionTuning {
        SessionTuning {
            n_rois: cells.len(),
            frac_resp: 1.0,
            cells,
            shifted_angle: GRID.to_vec(),
            angle_range: 180.0,
        }
    }

    #[test]
    fn genotype_from_subject() {
        assert_eq!(Genotype::from_subject("SST-NR1-KO-3"), Genotype::GluN1);
        assert_eq!(Genotype::from_subject("GluN1-f2"), Genotype::GluN1);
        assert_eq!(Genotype::from_subject("SST-GluN3-KO"), Genotype::GluN3);
        assert_eq!(Genotype::from_subject("SST-WT-12"), Genotype::WT);
        assert_eq!(cohort_key(Genotype::GluN1, 0.5), "GluN1_c=0.5");
    }

    #[test]
    fn init_sorts_grating_sessions() {
        let entry = |p: &str, s: &str, proto: &str| DatasetEntry {
            path: p.into(),
            subject: s.into(),
            protocols: vec![proto.into()],
        };
        let ds = vec![
            entry("a", "WT-1", GRATING_PROTOCOLS[0]),
            entry("b", "NR1-2", GRATING_PROTOCOLS[1]),
            entry("c", "WT-3", "looming-stim"),
        ];
        let s = CohortSummary::init(&ds, &GRATING_PROTOCOLS);
        assert_eq!(s.cohorts.len(), 6);
        assert_eq!(s.cohort(Genotype::WT, 1.0).unwrap().files, vec![PathBuf::from("a")]);
        assert_eq!(s.cohort(Genotype::GluN1, 0.5).unwrap().files, vec![PathBuf::from("b")]);
        assert!(s.cohort(Genotype::GluN3, 1.0).unwrap().files.is_empty());
    }

    #[test]
    fn by_roi_and_by_session_pool_differently() {
        let s1 = session(vec![cell(1.0, 0.0), cell(2.0, 0.0), cell(3.0, 0.0)]);
        let s2 = session(vec![cell(10.0, 0.0), cell(20.0, 0.0)]);
        let opts = PopulationOptions::default();

        let by_roi = population_curve(&[&s1, &s2], Averaging::ByRoi, &opts);
        let by_session = population_curve(&[&s1, &s2], Averaging::BySession, &opts);
        assert_eq!(by_roi.n, 5);
        assert_eq!(by_session.n, 2);

        assert_abs_diff_eq!(by_roi.mean[1], 36.0 / 5.0, epsilon = 1e-12);
        // mean of the session means (2 and 15), not of the cells
        assert_abs_diff_eq!(by_session.mean[1], 8.5, epsilon = 1e-12);
        assert_abs_diff_eq!(by_session.sem[1], 6.5, epsilon = 1e-12);
        assert_eq!(by_roi.si.len(), 5);
        assert_eq!(by_session.measured[1], 2);
    }

    #[test]
    fn clip_and_normalize() {
        let mut c = cell(4.0, -2.0);
        c.curve.values[0] = 2.0;
        let s = session(vec![c]);
        let opts = PopulationOptions { normalize_peak: true, ..PopulationOptions::default() };
        let curve = population_curve(&[&s], Averaging::ByRoi, &opts);
        assert_eq!(curve.mean[1], 1.0);
        assert_eq!(curve.mean[0], 0.5);
        assert_eq!(curve.mean[5], 0.0);
        assert!(curve.sem[1].is_nan());
        assert_eq!(curve.si, vec![1.0]);
    }

    #[test]
    fn empty_sessions_are_skipped_by_session() {
        let s1 = session(vec![cell(1.0, 0.0)]);
        let s2 = session(vec![]);
        let opts = PopulationOptions::default();
        let curve = population_curve(&[&s1, &s2], Averaging::BySession, &opts);
        assert_eq!(curve.n, 1);
    }

    #[test]
    fn compare_identical_cohorts() {
        let s = session((1..10).map(|i| cell(1.0, i as f64 * 0.1)).collect());
        let a = population_curve(&[&s], Averaging::ByRoi, &PopulationOptions::default());
        let mw = compare_cohorts(&a, &a.clone()).unwrap();
        assert!(mw.pvalue > 0.9);
    }

    #[test]
    fn sweep_point_names() {
        assert_eq!(SweepPoint::Quantity(ImagingQuantity::RawFluo).stem(), "rawFluo-ff-gratings");
        assert_eq!(SweepPoint::NeuropilFactor(0.7).stem(), "factor-neuropil-0.7-ff-gratings");
        assert_eq!(
            SweepPoint::InclusionFactor(1.15).stem(),
            "inclusion-factor-neuropil-1.15-ff-gratings"
        );
        let opts = SweepPoint::NeuropilFactor(0.9).apply(&SummaryOptions::default());
        assert_eq!(opts.dfof.neuropil_correction_factor, 0.9);
        assert_eq!(SweepPoint::default_sweep().len(), 13);
    }

    #[test]
    fn bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = CohortSummary::init(&[], &GRATING_PROTOCOLS);
        if let Some(c) = summary.cohorts.get_mut("WT") {
            c.sessions.push(CohortSession {
                path: "x.safetensors".into(),
                subject: "WT-1".into(),
                tuning: session(vec![cell(1.0, 0.2)]),
            });
        }
        let path = dir.path().join("data").join("dFoF-ff-gratings.json");
        save_bundle(&summary, &path).unwrap();
        assert_eq!(load_bundle(&path).unwrap(), summary);
    }
}
