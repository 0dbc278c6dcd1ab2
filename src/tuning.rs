//! Preferred-angle alignment of per-cell tuning curves.
//!
//! Cells prefer different angles, so before averaging across a population
//! every curve is re-expressed on a common axis of angles *relative to the
//! cell's preferred angle*:
//!
//! ```text
//!   stimulus angle      0   22.5   45  ...  157.5      (8 orientations, period 180°)
//!   shifted grid     -22.5    0  22.5  ...  135         (start = -step)
//!   cell preferring 45°:  45 → 0,  22.5 → -22.5,  0 → 135 (wrapped)
//! ```
//!
//! Angles are matched to the grid with a small tolerance, never by exact
//! float equality.
use anyhow::Result;
use ndarray::Axis;
use serde::{Deserialize, Serialize};

use crate::config::TuningConfig;
use crate::episodes::{same_param, EpisodeSet, ResponseWindows};
use crate::error::TuningError;
use crate::response::{compute_summary_data, CellResponse};
use crate::session::Session;

/// Re-express `angle` relative to `pref_angle`, wrapped into
/// `[start_angle, start_angle + angle_range)`.
///
/// For `start_angle` in `(-angle_range, 0]` this is
/// `new = (angle - pref) mod range`, minus `range` when
/// `new >= range + start_angle`.
pub fn shift_orientation(angle: f64, pref_angle: f64, start_angle: f64, angle_range: f64) -> f64 {
    let new = start_angle + (angle - pref_angle - start_angle).rem_euclid(angle_range);
    // rem_euclid may round up to exactly `angle_range`
    if new >= start_angle + angle_range {
        new - angle_range
    } else {
        new
    }
}

/// The common shifted-angle axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AngleGrid {
    /// Ascending shifted angles; `angles[1] == 0` whenever there are at
    /// least two.
    pub angles: Vec<f64>,
    pub angle_range: f64,
}

impl AngleGrid {
    /// Build the grid for a set of stimulus angles.
    ///
    /// The step is the smallest gap between distinct angles; the grid runs
    /// from `-step` over one period.  A single angle gives the grid `[0]`.
    pub fn from_angles(stimulus_angles: &[f64], angle_range: f64) -> Self {
        let mut sorted: Vec<f64> = stimulus_angles.to_vec();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup_by(|a, b| same_param(*a, *b));
        let step = sorted
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(f64::INFINITY, f64::min);
        if !step.is_finite() || step <= 0.0 {
            return Self { angles: vec![0.0], angle_range };
        }
        let n = (angle_range / step).round().max(1.0) as usize;
        Self {
            angles: (0..n).map(|k| (k as f64 - 1.0) * step).collect(),
            angle_range,
        }
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn start_angle(&self) -> f64 {
        self.angles.first().copied().unwrap_or(0.0)
    }

    /// Index of the grid point matching `angle`.
    pub fn index_of(&self, angle: f64) -> Option<usize> {
        self.angles.iter().position(|&g| same_param(g, angle))
    }

    /// Grid index of a stimulus angle once shifted by `pref_angle`.
    pub fn shifted_index(&self, angle: f64, pref_angle: f64) -> Result<usize, TuningError> {
        let shifted = shift_orientation(angle, pref_angle, self.start_angle(), self.angle_range);
        self.index_of(shifted)
            .ok_or(TuningError::AngleNotOnGrid(shifted))
    }
}

/// A response vector on the shifted-angle grid.
///
/// Grid points without a measurement hold `0.0` in `values` and `false` in
/// `measured`; averaging code can use the mask to tell "no response" from
/// "not measured".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningCurve {
    pub values: Vec<f64>,
    pub measured: Vec<bool>,
}

impl TuningCurve {
    pub fn zeros(n: usize) -> Self {
        Self { values: vec![0.0; n], measured: vec![false; n] }
    }

    /// Place every finite `value` of `responses` at `contrast` on `grid`,
    /// shifted by `pref_angle`.
    pub fn from_responses(
        responses: &[CellResponse],
        contrast: f64,
        pref_angle: f64,
        grid: &AngleGrid,
    ) -> Result<Self, TuningError> {
        let mut curve = Self::zeros(grid.len());
        for r in responses
            .iter()
            .filter(|r| same_param(r.contrast, contrast) && r.value.is_finite())
        {
            let i = grid.shifted_index(r.angle, pref_angle)?;
            curve.values[i] = r.value;
            curve.measured[i] = true;
        }
        Ok(curve)
    }
}

/// Preferred angle of a cell at `contrast`: the angle with the largest
/// response, provided at least one angle is significant.
///
/// Ties resolve to the lowest angle.
pub fn preferred_angle(responses: &[CellResponse], contrast: f64) -> Option<f64> {
    let at_contrast = || responses.iter().filter(move |r| same_param(r.contrast, contrast));
    if !at_contrast().any(|r| r.significant) {
        return None;
    }
    at_contrast()
        .filter(|r| r.value.is_finite())
        .fold(None::<&CellResponse>, |best, r| match best {
            Some(b) if b.value >= r.value => Some(b),
            _ => Some(r),
        })
        .map(|r| r.angle)
}

/// Aligned tuning of one responsive cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTuning {
    pub roi: usize,
    pub preferred_angle: f64,
    pub curve: TuningCurve,
}

/// Tune one cell from its response windows; `None` when it has no
/// significant condition at `cfg.contrast`.
pub fn cell_tuning(
    roi: usize,
    set: &EpisodeSet,
    windows: &ResponseWindows,
    grid: &AngleGrid,
    cfg: &TuningConfig,
) -> Result<Option<CellTuning>, TuningError> {
    let summary = compute_summary_data(
        set,
        windows,
        &cfg.stat_test,
        cfg.response_significance_threshold,
        None,
    );
    let Some(pref) = preferred_angle(&summary, cfg.contrast) else {
        return Ok(None);
    };
    let curve = TuningCurve::from_responses(&summary, cfg.contrast, pref, grid)?;
    Ok(Some(CellTuning { roi, preferred_angle: pref, curve }))
}

/// Tuning of every responsive cell of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTuning {
    pub cells: Vec<CellTuning>,
    pub shifted_angle: Vec<f64>,
    pub angle_range: f64,
    /// Cells examined (after any `max_rois` cap).
    pub n_rois: usize,
    /// Fraction of examined cells that responded.
    pub frac_resp: f64,
}

impl SessionTuning {
    /// Zero-filled response vectors, one per responsive cell.
    pub fn responses(&self) -> Vec<Vec<f64>> {
        self.cells.iter().map(|c| c.curve.values.clone()).collect()
    }

    pub fn grid(&self) -> AngleGrid {
        AngleGrid { angles: self.shifted_angle.clone(), angle_range: self.angle_range }
    }
}

/// Per-cell aligned tuning curves for the grating protocol of `session`.
///
/// Fails with [`TuningError::UnknownProtocol`] when the session holds none
/// of the protocols named by `cfg.protocol`.
pub fn compute_tuning_response_per_cells(
    session: &Session,
    cfg: &TuningConfig,
) -> Result<SessionTuning> {
    let protocol_id = session.meta.resolve(&cfg.protocol)?;
    let set = EpisodeSet::for_protocol(session, protocol_id);
    log::debug!(
        "{}: protocol #{protocol_id} varies {:?}",
        session.label(),
        set.varied_parameters()
    );
    let grid = AngleGrid::from_angles(&set.angles(), cfg.angle_range);
    let n_rois = cfg
        .max_rois
        .map_or(session.n_rois(), |m| m.min(session.n_rois()));

    let mut cells = Vec::new();
    for (roi, trace) in session.traces.axis_iter(Axis(0)).take(n_rois).enumerate() {
        let windows = set.response_windows(trace, &session.t, &cfg.stat_test);
        if let Some(cell) = cell_tuning(roi, &set, &windows, &grid, cfg)? {
            cells.push(cell);
        }
    }
    log::debug!(
        "{}: {}/{} responsive cells at contrast {}",
        session.label(), cells.len(), n_rois, cfg.contrast
    );
    let frac_resp = if n_rois > 0 { cells.len() as f64 / n_rois as f64 } else { 0.0 };
    Ok(SessionTuning {
        cells,
        shifted_angle: grid.angles,
        angle_range: grid.angle_range,
        n_rois,
        frac_resp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn shift_examples() {
        assert_eq!(shift_orientation(45.0, 45.0, -22.5, 180.0), 0.0);
        assert_eq!(shift_orientation(22.5, 45.0, -22.5, 180.0), -22.5);
        assert_eq!(shift_orientation(0.0, 45.0, -22.5, 180.0), 135.0);
        assert_eq!(shift_orientation(0.0, 90.0, -45.0, 360.0), 270.0);
        assert_eq!(shift_orientation(315.0, 0.0, -45.0, 360.0), -45.0);
    }

    #[test]
    fn shift_stays_in_window() {
        for start in [-45.0, -22.5, 0.0, 10.0] {
            for range in [180.0, 360.0] {
                for k in -20..20 {
                    for p in [0.0, 22.5, 90.0, 337.5] {
                        let s = shift_orientation(k as f64 * 22.5, p, start, range);
                        let end = start + range;
                        assert!(s >= start && s < end, "{s} outside [{start}, {end})");
                    }
                }
            }
        }
    }

    #[test]
    fn shift_is_periodic_and_idempotent() {
        for k in -16..16 {
            let a = k as f64 * 45.0;
            let s = shift_orientation(a, 0.0, -45.0, 360.0);
            assert_eq!(s, shift_orientation(a.rem_euclid(360.0), 0.0, -45.0, 360.0));
            assert_eq!(shift_orientation(s, 0.0, -45.0, 360.0), s);
        }
    }

    #[test]
    fn shift_is_invertible_modulo_range() {
        for k in 0..8 {
            let a = k as f64 * 22.5;
            let s = shift_orientation(a, 67.5, -22.5, 180.0);
            assert_abs_diff_eq!((s + 67.5).rem_euclid(180.0), a, epsilon = 1e-9);
        }
    }

    #[test]
    fn grid_for_orientations_and_directions() {
        let ori: Vec<f64> = (0..8).map(|k| k as f64 * 22.5).collect();
        let g = AngleGrid::from_angles(&ori, 180.0);
        assert_eq!(g.angles, vec![-22.5, 0.0, 22.5, 45.0, 67.5, 90.0, 112.5, 135.0]);
        assert_eq!(g.index_of(0.0), Some(1));
        assert_eq!(g.index_of(90.0 + 1e-9), Some(5));

        let dir: Vec<f64> = (0..8).map(|k| k as f64 * 45.0).collect();
        let g = AngleGrid::from_angles(&dir, 360.0);
        assert_eq!(g.start_angle(), -45.0);
        assert_eq!(g.len(), 8);
        assert_eq!(AngleGrid::from_angles(&[30.0], 180.0).angles, vec![0.0]);
    }

    fn resp(angle: f64, value: f64, significant: bool) -> CellResponse {
        CellResponse {
            angle,
            contrast: 1.0,
            pre: 0.0,
            post: value,
            value,
            std_value: 0.0,
            significant,
            pvalue: Some(if significant { 0.001 } else { 0.5 }),
            n_repeats: 3,
        }
    }

    #[test]
    fn preferred_angle_requires_significance() {
        let r = vec![resp(0.0, 1.0, false), resp(45.0, 3.0, false)];
        assert_eq!(preferred_angle(&r, 1.0), None);
        let r = vec![resp(0.0, 1.0, true), resp(45.0, 3.0, false), resp(90.0, 3.0, false)];
        assert_eq!(preferred_angle(&r, 1.0), Some(45.0));
        assert_eq!(preferred_angle(&r, 0.5), None);
    }

    #[test]
    fn curve_peaks_at_zero_and_masks_missing() {
        let grid = AngleGrid::from_angles(&[0.0, 45.0, 90.0, 135.0], 180.0);
        let r = vec![resp(0.0, 0.5, false), resp(45.0, 2.0, true), resp(90.0, 0.2, false)];
        let curve = TuningCurve::from_responses(&r, 1.0, 45.0, &grid).unwrap();
        assert_eq!(grid.angles, vec![-45.0, 0.0, 45.0, 90.0]);
        assert_eq!(curve.values, vec![0.5, 2.0, 0.2, 0.0]);
        assert_eq!(curve.measured, vec![true, true, true, false]);
    }

    #[test]
    fn off_grid_angle_is_an_error() {
        let grid = AngleGrid::from_angles(&[0.0, 45.0, 90.0, 135.0], 180.0);
        let r = vec![resp(10.0, 1.0, true)];
        assert!(matches!(
            TuningCurve::from_responses(&r, 1.0, 0.0, &grid),
            Err(TuningError::AngleNotOnGrid(_))
        ));
    }
}
