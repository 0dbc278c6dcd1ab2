//! Tuning split by behavioural state.
//!
//! Episodes are classed by the animal's mean running speed (running/still)
//! or mean pupil diameter (constricted/dilated) over the stimulus window.
//! The preferred angle is always taken from *all* episodes, so the state
//! curves of one cell share the same alignment.
use std::fmt;

use anyhow::Result;
use log::{debug, warn};
use ndarray::Axis;
use serde::{Deserialize, Serialize};

use crate::config::TuningConfig;
use crate::episodes::EpisodeSet;
use crate::response::compute_summary_data;
use crate::session::{Behavior, Channel, Session};
use crate::tuning::{preferred_angle, AngleGrid, TuningCurve};

/// Running threshold on the per-episode mean speed, in cm/s.
pub const RUNNING_SPEED_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorState {
    Running,
    Still,
    Constricted,
    Dilated,
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BehaviorState::Running => "running",
            BehaviorState::Still => "still",
            BehaviorState::Constricted => "constricted",
            BehaviorState::Dilated => "dilated",
        })
    }
}

/// Mean of `channel` over each episode's `[start, stop)`; NaN when the
/// window holds no sample.
pub fn episode_means(set: &EpisodeSet, channel: &Channel) -> Vec<f64> {
    set.episodes
        .iter()
        .map(|e| channel.mean_in(e.start, e.stop).unwrap_or(f64::NAN))
        .collect()
}

/// `true` for episodes whose mean running speed exceeds `threshold`.
///
/// `None` when the session has no locomotion channel.  An episode without
/// speed samples counts as still.
pub fn split_by_running(
    set: &EpisodeSet,
    behavior: &Behavior,
    threshold: f64,
) -> Option<Vec<bool>> {
    let speed = behavior.running_speed.as_ref()?;
    Some(episode_means(set, speed).into_iter().map(|v| v > threshold).collect())
}

/// `true` for episodes whose mean pupil diameter exceeds `threshold`
/// (dilated).  `None` when the session has no pupil channel.
pub fn split_by_pupil(set: &EpisodeSet, behavior: &Behavior, threshold: f64) -> Option<Vec<bool>> {
    let pupil = behavior.pupil.as_ref()?;
    Some(episode_means(set, pupil).into_iter().map(|v| v > threshold).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorOptions {
    /// Default: [`RUNNING_SPEED_THRESHOLD`].
    pub running_speed_threshold: f64,
    /// Pupil diameter (mm) separating constricted from dilated; no pupil
    /// split when `None`. Default: `None`.
    pub pupil_threshold: Option<f64>,
}

impl Default for BehaviorOptions {
    fn default() -> Self {
        Self { running_speed_threshold: RUNNING_SPEED_THRESHOLD, pupil_threshold: None }
    }
}

/// One responsive cell under every available state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorCell {
    pub roi: usize,
    pub preferred_angle: f64,
    pub all: TuningCurve,
    pub states: Vec<(BehaviorState, TuningCurve)>,
}

impl BehaviorCell {
    pub fn curve(&self, state: BehaviorState) -> Option<&TuningCurve> {
        self.states.iter().find(|(s, _)| *s == state).map(|(_, c)| c)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTuning {
    pub shifted_angle: Vec<f64>,
    pub cells: Vec<BehaviorCell>,
    /// Episodes in each state.
    pub n_episodes: Vec<(BehaviorState, usize)>,
}

impl BehaviorTuning {
    /// Mean over cells of the curve in `state` (`None` for all episodes).
    ///
    /// Unmeasured grid points count as zero, like the curves themselves.
    pub fn mean_curve(&self, state: Option<BehaviorState>) -> Vec<f64> {
        let curves: Vec<&TuningCurve> = self
            .cells
            .iter()
            .filter_map(|c| match state {
                None => Some(&c.all),
                Some(s) => c.curve(s),
            })
            .collect();
        let n = self.shifted_angle.len();
        if curves.is_empty() {
            return vec![f64::NAN; n];
        }
        (0..n)
            .map(|i| curves.iter().map(|c| c.values[i]).sum::<f64>() / curves.len() as f64)
            .collect()
    }
}

/// Per-cell tuning on all episodes and on each behavioural state.
pub fn behavior_modulated_tuning(
    session: &Session,
    cfg: &TuningConfig,
    opts: &BehaviorOptions,
) -> Result<BehaviorTuning> {
    let protocol_id = session.meta.resolve(&cfg.protocol)?;
    let set = EpisodeSet::for_protocol(session, protocol_id);
    let grid = AngleGrid::from_angles(&set.angles(), cfg.angle_range);

    let mut masks: Vec<(BehaviorState, Vec<bool>)> = Vec::new();
    match split_by_running(&set, &session.behavior, opts.running_speed_threshold) {
        Some(running) => {
            let still = running.iter().map(|r| !r).collect();
            masks.push((BehaviorState::Running, running));
            masks.push((BehaviorState::Still, still));
        }
        None => warn!("{}: no running-speed channel", session.label()),
    }
    if let Some(threshold) = opts.pupil_threshold {
        match split_by_pupil(&set, &session.behavior, threshold) {
            Some(dilated) => {
                let constricted = dilated.iter().map(|d| !d).collect();
                masks.push((BehaviorState::Constricted, constricted));
                masks.push((BehaviorState::Dilated, dilated));
            }
            None => warn!("{}: no pupil channel", session.label()),
        }
    }
    let n_episodes = masks
        .iter()
        .map(|(s, m)| (*s, m.iter().filter(|&&b| b).count()))
        .collect::<Vec<_>>();
    debug!("{}: episodes per state {:?}", session.label(), n_episodes);

    let n_rois = cfg.max_rois.map_or(session.n_rois(), |m| m.min(session.n_rois()));
    let threshold = cfg.response_significance_threshold;
    let mut cells = Vec::new();
    for (roi, trace) in session.traces.axis_iter(Axis(0)).take(n_rois).enumerate() {
        let windows = set.response_windows(trace, &session.t, &cfg.stat_test);
        let summary = compute_summary_data(&set, &windows, &cfg.stat_test, threshold, None);
        let Some(pref) = preferred_angle(&summary, cfg.contrast) else {
            continue;
        };
        let all = TuningCurve::from_responses(&summary, cfg.contrast, pref, &grid)?;
        let mut states = Vec::with_capacity(masks.len());
        for (state, mask) in &masks {
            let mask = Some(mask.as_slice());
            let sub = compute_summary_data(&set, &windows, &cfg.stat_test, threshold, mask);
            states.push((*state, TuningCurve::from_responses(&sub, cfg.contrast, pref, &grid)?));
        }
        cells.push(BehaviorCell { roi, preferred_angle: pref, all, states });
    }

    Ok(BehaviorTuning { shifted_angle: grid.angles, cells, n_episodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Episode;

    fn set() -> EpisodeSet {
        let episodes = (0..4)
            .map(|i| Episode {
                start: i as f64 * 10.0,
                stop: i as f64 * 10.0 + 2.0,
                angle: 0.0,
                contrast: 1.0,
                protocol_id: 0,
            })
            .collect();
        EpisodeSet { protocol_id: 0, episodes }
    }

    fn channel(per_episode: [f64; 4]) -> Channel {
        let t: Vec<f64> = (0..400).map(|i| i as f64 * 0.1).collect();
        let values = t.iter().map(|&x| per_episode[((x / 10.0) as usize).min(3)]).collect();
        Channel { t, values }
    }

    #[test]
    fn running_split_uses_episode_mean() {
        let behavior = Behavior {
            running_speed: Some(channel([0.0, 2.0, 0.05, 5.0])),
            pupil: None,
        };
        let running = split_by_running(&set(), &behavior, RUNNING_SPEED_THRESHOLD).unwrap();
        assert_eq!(running, vec![false, true, false, true]);
        assert!(split_by_pupil(&set(), &behavior, 2.5).is_none());
    }

    #[test]
    fn pupil_split() {
        let behavior = Behavior { running_speed: None, pupil: Some(channel([2.0, 3.0, 2.4, 2.6])) };
        assert_eq!(split_by_pupil(&set(), &behavior, 2.5).unwrap(), vec![false, true, false, true]);
    }

    #[test]
    fn episode_without_samples_is_still() {
        let behavior = Behavior {
            running_speed: Some(Channel { t: vec![0.5], values: vec![3.0] }),
            pupil: None,
        };
        let running = split_by_running(&set(), &behavior, RUNNING_SPEED_THRESHOLD).unwrap();
        assert_eq!(running, vec![true, false, false, false]);
    }
}
