//! Evoked-response significance per (angle, contrast) condition.
//!
//! For one cell and one condition, every repeat contributes a paired sample
//! `(pre, post)` of window means.  The configured test decides whether the
//! cell responds; with `positive` set the mean `post - pre` must also be
//! above zero.
use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::{StatTest, StatTestConfig};
use crate::episodes::{EpisodeSet, ResponseWindows};
use crate::stats;

/// Paired pre/post samples of one condition and the test outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StatTestResult {
    pub pre: Vec<f64>,
    pub post: Vec<f64>,
    /// `None` when the test could not be computed (fewer than 2 repeats).
    pub pvalue: Option<f64>,
    pub positive: bool,
}

impl StatTestResult {
    pub fn n_repeats(&self) -> usize {
        self.pre.len()
    }

    /// Per-repeat `post - pre`.
    pub fn delta(&self) -> Vec<f64> {
        self.pre.iter().zip(&self.post).map(|(x, y)| y - x).collect()
    }

    pub fn mean_delta(&self) -> f64 {
        stats::mean(&self.delta())
    }

    /// `true` if `p < threshold` and, for a positive test, the mean
    /// difference is above zero.  An uncomputable test is never significant.
    pub fn significant(&self, threshold: f64) -> bool {
        match self.pvalue {
            Some(p) => p < threshold && (!self.positive || self.mean_delta() > 0.0),
            None => false,
        }
    }
}

/// Run the configured test on the episodes selected by `mask`.
pub fn stat_test_for_evoked_responses(
    windows: &ResponseWindows,
    mask: &[bool],
    cfg: &StatTestConfig,
) -> StatTestResult {
    let (pre, post) = windows.paired(mask);
    let pvalue = if pre.len() < 2 {
        warn!("only {} repeat(s) available, response test skipped", pre.len());
        None
    } else {
        match cfg.test {
            StatTest::Ttest => stats::paired_ttest(&pre, &post),
            StatTest::Anova => stats::one_way_anova(&[&pre, &post]),
        }
    };
    StatTestResult { pre, post, pvalue, positive: cfg.positive }
}

/// Response of one cell to one (angle, contrast) condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellResponse {
    pub angle: f64,
    pub contrast: f64,
    /// Mean of the pre-window values across repeats.
    pub pre: f64,
    /// Mean of the post-window values across repeats.
    pub post: f64,
    /// Mean `post - pre` across repeats.
    pub value: f64,
    /// Standard deviation of `post - pre` across repeats.
    pub std_value: f64,
    pub significant: bool,
    pub pvalue: Option<f64>,
    pub n_repeats: usize,
}

/// One [`CellResponse`] per (angle, contrast) present in `set`, ordered by
/// angle then contrast.
///
/// `episode_cond` further restricts the episodes used (e.g. running trials
/// only); conditions left without repeats are still reported, with NaN
/// values and `significant == false`.
pub fn compute_summary_data(
    set: &EpisodeSet,
    windows: &ResponseWindows,
    cfg: &StatTestConfig,
    threshold: f64,
    episode_cond: Option<&[bool]>,
) -> Vec<CellResponse> {
    let contrasts = set.contrasts();
    let mut out = Vec::with_capacity(contrasts.len() * 8);
    for angle in set.angles() {
        for &contrast in &contrasts {
            let mut mask = set.find_episode_cond(Some(angle), Some(contrast));
            if let Some(cond) = episode_cond {
                mask.iter_mut().zip(cond).for_each(|(m, &c)| *m &= c);
            }
            let res = stat_test_for_evoked_responses(windows, &mask, cfg);
            let delta = res.delta();
            out.push(CellResponse {
                angle,
                contrast,
                pre: stats::mean(&res.pre),
                post: stats::mean(&res.post),
                value: stats::mean(&delta),
                std_value: stats::std(&delta),
                significant: res.significant(threshold),
                pvalue: res.pvalue,
                n_repeats: res.n_repeats(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Episode;

    fn windows(pre: &[f64], post: &[f64]) -> ResponseWindows {
        ResponseWindows { pre: pre.to_vec(), post: post.to_vec() }
    }

    #[test]
    fn constant_positive_response_is_significant() {
        let w = windows(&[0.0, 0.0, 0.0], &[2.0, 2.0, 2.0]);
        let res = stat_test_for_evoked_responses(&w, &[true; 3], &StatTestConfig::default());
        assert!(res.significant(0.05));
    }

    #[test]
    fn single_repeat_is_not_significant() {
        let w = windows(&[0.0], &[5.0]);
        let res = stat_test_for_evoked_responses(&w, &[true], &StatTestConfig::default());
        assert_eq!(res.pvalue, None);
        assert!(!res.significant(0.05));
    }

    #[test]
    fn negative_response_fails_positive_test() {
        let w = windows(&[2.0, 2.1, 1.9, 2.0], &[0.0, 0.1, -0.1, 0.05]);
        let cfg = StatTestConfig::default();
        let res = stat_test_for_evoked_responses(&w, &[true; 4], &cfg);
        assert!(res.pvalue.unwrap() < 0.05);
        assert!(!res.significant(0.05));

        let two_sided = StatTestConfig { positive: false, ..cfg };
        let res = stat_test_for_evoked_responses(&w, &[true; 4], &two_sided);
        assert!(res.significant(0.05));
    }

    #[test]
    fn anova_detects_shift() {
        let w = windows(&[0.0, 0.1, -0.1, 0.0], &[1.0, 1.1, 0.9, 1.0]);
        let cfg = StatTestConfig { test: StatTest::Anova, ..StatTestConfig::default() };
        let res = stat_test_for_evoked_responses(&w, &[true; 4], &cfg);
        assert!(res.significant(0.01));
    }

    #[test]
    fn summary_covers_every_condition() {
        let episodes = (0..8)
            .map(|i| Episode {
                start: i as f64 * 5.0,
                stop: i as f64 * 5.0 + 2.0,
                angle: if i % 2 == 0 { 0.0 } else { 90.0 },
                contrast: if i < 4 { 0.5 } else { 1.0 },
                protocol_id: 0,
            })
            .collect();
        let set = EpisodeSet { protocol_id: 0, episodes };
        let w = windows(&[0.0; 8], &[1.0, 0.0, 1.0, 0.0, 2.0, 0.0, 2.0, 0.0]);
        let summary = compute_summary_data(&set, &w, &StatTestConfig::default(), 0.05, None);
        assert_eq!(summary.len(), 4);
        let full_zero = summary
            .iter()
            .find(|r| r.angle == 0.0 && r.contrast == 1.0)
            .unwrap();
        assert_eq!(full_zero.value, 2.0);
        assert_eq!(full_zero.n_repeats, 2);
        assert!(full_zero.significant);
        assert!(summary.iter().filter(|r| r.angle == 90.0).all(|r| !r.significant));
    }
}
