//! Spontaneous activity under uniform screens.
//!
//! Luminosity protocols show three full-field screens, either before the
//! gratings (`BlankFirst`: dark, black, grey) or after them (`BlankLast`:
//! black, grey, dark).  For each screen every ROI is reduced to the mean,
//! standard deviation and skewness of its trace strictly inside the
//! presentation.
use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use ndarray::Axis;
use serde::{Deserialize, Serialize};

use crate::error::TuningError;
use crate::session::{Episode, Session};
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Luminosity {
    Dark,
    Black,
    Grey,
}

impl Luminosity {
    pub const ALL: [Luminosity; 3] = [Luminosity::Dark, Luminosity::Black, Luminosity::Grey];
}

impl fmt::Display for Luminosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Luminosity::Dark => "dark",
            Luminosity::Black => "black",
            Luminosity::Grey => "grey",
        })
    }
}

/// One uniform-screen presentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LuminosityWindow {
    pub luminosity: Luminosity,
    pub start: f64,
    pub stop: f64,
}

/// Locate the three uniform screens from the protocol label.
pub fn luminosity_windows(
    protocol: &str,
    episodes: &[Episode],
) -> Result<Vec<LuminosityWindow>, TuningError> {
    use Luminosity::*;
    let (picked, order): (Vec<&Episode>, [Luminosity; 3]) = if protocol.contains("BlankFirst") {
        (episodes.iter().take(3).collect(), [Dark, Black, Grey])
    } else if protocol.contains("BlankLast") {
        let skip = episodes.len().saturating_sub(3);
        (episodes.iter().skip(skip).collect(), [Black, Grey, Dark])
    } else {
        return Err(TuningError::UnrecognizedStimulusProtocol(protocol.to_string()));
    };
    Ok(picked
        .into_iter()
        .zip(order)
        .map(|(e, luminosity)| LuminosityWindow { luminosity, start: e.start, stop: e.stop })
        .collect())
}

/// Per-ROI statistics under one screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LuminosityStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub skewness: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LuminositySummary {
    pub windows: Vec<LuminosityWindow>,
    pub stats: BTreeMap<Luminosity, LuminosityStats>,
}

impl LuminositySummary {
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Luminosity statistics of every ROI of `session`.
///
/// An unrecognised protocol label is reported and yields an empty summary.
pub fn luminosity_summary(session: &Session, episodes: &[Episode]) -> LuminositySummary {
    let windows = match luminosity_windows(&session.meta.protocol, episodes) {
        Ok(w) => w,
        Err(e) => {
            warn!("{}: {e}, luminosity summary skipped", session.label());
            return LuminositySummary::default();
        }
    };

    let mut stats = BTreeMap::new();
    for w in &windows {
        let idx: Vec<usize> = session
            .t
            .iter()
            .enumerate()
            .filter(|(_, t)| **t > w.start && **t < w.stop)
            .map(|(i, _)| i)
            .collect();
        let mut s = LuminosityStats::default();
        for trace in session.traces.axis_iter(Axis(0)) {
            let x: Vec<f64> = idx.iter().map(|&i| trace[i] as f64).collect();
            s.mean.push(stats::mean(&x));
            s.std.push(stats::std(&x));
            s.skewness.push(stats::skewness(&x));
        }
        stats.insert(w.luminosity, s);
    }
    LuminositySummary { windows, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episodes(n: usize) -> Vec<Episode> {
        (0..n)
            .map(|i| Episode {
                start: i as f64 * 10.0,
                stop: i as f64 * 10.0 + 5.0,
                angle: 0.0,
                contrast: 1.0,
                protocol_id: 0,
            })
            .collect()
    }

    #[test]
    fn blank_first_takes_leading_episodes() {
        let w = luminosity_windows("Luminosity-BlankFirst+gratings", &episodes(5)).unwrap();
        let order: Vec<_> = w.iter().map(|w| w.luminosity).collect();
        assert_eq!(order, vec![Luminosity::Dark, Luminosity::Black, Luminosity::Grey]);
        assert_eq!(w[0].start, 0.0);
    }

    #[test]
    fn blank_last_takes_trailing_episodes() {
        let w = luminosity_windows("gratings+Luminosity-BlankLast", &episodes(5)).unwrap();
        let order: Vec<_> = w.iter().map(|w| w.luminosity).collect();
        assert_eq!(order, vec![Luminosity::Black, Luminosity::Grey, Luminosity::Dark]);
        assert_eq!(w[0].start, 20.0);
        assert_eq!(w[2].stop, 45.0);
    }

    #[test]
    fn unknown_protocol_is_reported() {
        assert_eq!(
            luminosity_windows("ff-gratings", &episodes(5)),
            Err(TuningError::UnrecognizedStimulusProtocol("ff-gratings".into()))
        );
    }
}
