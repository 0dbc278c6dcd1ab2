//! Orientation selectivity indices.
//!
//! Two formulas are in use and both are kept as named policies:
//!
//! | policy | formula | range |
//! |--------|---------|-------|
//! | [`SelectivityPolicy::PrefMinusOrth`] | `(pref - max(orth, 0)) / pref` | `≤ 1` for `pref > 0`, clip for display |
//! | [`SelectivityPolicy::Normalized`] | `(pref - orth) / (pref + orth)` | clipped to `[0, 1]` |
use serde::{Deserialize, Serialize};

use crate::error::TuningError;
use crate::tuning::AngleGrid;

/// `(pref - max(orth, 0)) / pref`.
///
/// A negative orthogonal response counts as no response.  Fails with
/// [`TuningError::DivisionByZero`] when `resp_pref == 0`.
pub fn orientation_selectivity_index(resp_pref: f64, resp_orth: f64) -> Result<f64, TuningError> {
    if resp_pref == 0.0 {
        return Err(TuningError::DivisionByZero);
    }
    Ok((resp_pref - resp_orth.max(0.0)) / resp_pref)
}

/// `(pref - orth) / (pref + orth)` clipped to `[0, 1]`.
///
/// `pref` is the largest response; `orth` the response at the angle closest
/// to `(angle[pref] + 90) mod 180`.  Returns `0` when the largest response
/// is not positive.
pub fn selectivity_index(angles: &[f64], resp: &[f64]) -> f64 {
    let Some(imax) = argmax(resp) else {
        return 0.0;
    };
    let target = (angles[imax] + 90.0).rem_euclid(180.0);
    let iop = angles
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(bi, bd), (i, &a)| {
            let d = (target - a).powi(2);
            if d < bd { (i, d) } else { (bi, bd) }
        })
        .0;
    let (pref, orth) = (resp[imax], resp[iop]);
    if pref <= 0.0 {
        return 0.0;
    }
    if pref + orth == 0.0 {
        // positive over zero
        return 1.0;
    }
    ((pref - orth) / (pref + orth)).clamp(0.0, 1.0)
}

fn argmax(x: &[f64]) -> Option<usize> {
    x.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None::<(usize, f64)>, |best, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Which selectivity formula to apply to an aligned curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectivityPolicy {
    /// [`orientation_selectivity_index`] on shifted angles 0° and 90°.
    #[default]
    PrefMinusOrth,
    /// [`selectivity_index`] over the whole grid.
    Normalized,
}

/// Selectivity of a curve aligned on `grid`.
pub fn curve_osi(
    curve: &[f64],
    grid: &AngleGrid,
    policy: SelectivityPolicy,
) -> Result<f64, TuningError> {
    match policy {
        SelectivityPolicy::PrefMinusOrth => {
            let i_pref = grid.index_of(0.0).ok_or(TuningError::AngleNotOnGrid(0.0))?;
            let i_orth = grid.index_of(90.0).ok_or(TuningError::AngleNotOnGrid(90.0))?;
            orientation_selectivity_index(curve[i_pref], curve[i_orth])
        }
        SelectivityPolicy::Normalized => Ok(selectivity_index(&grid.angles, curve)),
    }
}
