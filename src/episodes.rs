//! Episode selection and per-episode window reduction.
//!
//! Each repeat of a stimulus is reduced to two scalars per cell: the mean of
//! the trace over the pre-stimulus window and over the post-stimulus window,
//! both expressed relative to the episode onset.
use std::collections::BTreeMap;

use ndarray::ArrayView1;

use crate::config::StatTestConfig;
use crate::session::{Episode, Session};

/// Tolerance used when matching stimulus parameters (degrees, contrast).
pub const PARAM_EPS: f64 = 1e-6;

#[inline]
pub fn same_param(a: f64, b: f64) -> bool {
    (a - b).abs() < PARAM_EPS
}

fn unique_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v.dedup_by(|a, b| same_param(*a, *b));
    v
}

/// Episodes of one sub-protocol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeSet {
    pub protocol_id: usize,
    pub episodes: Vec<Episode>,
}

impl EpisodeSet {
    pub fn for_protocol(session: &Session, protocol_id: usize) -> Self {
        Self {
            protocol_id,
            episodes: session
                .episodes
                .iter()
                .filter(|e| e.protocol_id == protocol_id)
                .copied()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Distinct stimulus angles, ascending.
    pub fn angles(&self) -> Vec<f64> {
        unique_sorted(self.episodes.iter().map(|e| e.angle))
    }

    /// Distinct contrasts, ascending.
    pub fn contrasts(&self) -> Vec<f64> {
        unique_sorted(self.episodes.iter().map(|e| e.contrast))
    }

    /// Stimulus parameters taking more than one value in this set, with
    /// their distinct values.
    pub fn varied_parameters(&self) -> BTreeMap<&'static str, Vec<f64>> {
        [("angle", self.angles()), ("contrast", self.contrasts())]
            .into_iter()
            .filter(|(_, v)| v.len() > 1)
            .collect()
    }

    /// Mask of the episodes matching `angle` and/or `contrast`
    /// (`None` matches anything).
    pub fn find_episode_cond(&self, angle: Option<f64>, contrast: Option<f64>) -> Vec<bool> {
        self.episodes
            .iter()
            .map(|e| {
                angle.map_or(true, |a| same_param(e.angle, a))
                    && contrast.map_or(true, |c| same_param(e.contrast, c))
            })
            .collect()
    }

    /// Per-episode mean of `trace` over `interval` relative to onset.
    ///
    /// Samples with `interval[0] <= t - onset < interval[1]` are averaged;
    /// an episode whose window holds no sample yields NaN.  `t` must be
    /// ascending.
    pub fn window_means(&self, trace: ArrayView1<f32>, t: &[f64], interval: [f64; 2]) -> Vec<f64> {
        self.episodes
            .iter()
            .map(|e| {
                let lo = t.partition_point(|&x| x < e.start + interval[0]);
                let hi = t.partition_point(|&x| x < e.start + interval[1]);
                if hi <= lo {
                    return f64::NAN;
                }
                let sum: f64 = (lo..hi).map(|i| trace[i] as f64).sum();
                sum / (hi - lo) as f64
            })
            .collect()
    }

    /// Pre- and post-window means of one cell for every episode.
    pub fn response_windows(
        &self,
        trace: ArrayView1<f32>,
        t: &[f64],
        cfg: &StatTestConfig,
    ) -> ResponseWindows {
        ResponseWindows {
            pre: self.window_means(trace, t, cfg.interval_pre),
            post: self.window_means(trace, t, cfg.interval_post),
        }
    }
}

/// Per-episode pre/post window means of one cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseWindows {
    pub pre: Vec<f64>,
    pub post: Vec<f64>,
}

impl ResponseWindows {
    /// Paired `(pre, post)` samples of the episodes selected by `mask`,
    /// skipping episodes where either window was empty.
    pub fn paired(&self, mask: &[bool]) -> (Vec<f64>, Vec<f64>) {
        self.pre
            .iter()
            .zip(&self.post)
            .zip(mask)
            .filter(|((x, y), keep)| **keep && x.is_finite() && y.is_finite())
            .map(|((x, y), _)| (*x, *y))
            .unzip()
    }
}
