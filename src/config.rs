//! Analysis configuration.
//!
//! [`StatTestConfig`] governs the evoked-response test, [`DfofParams`] is
//! forwarded untouched to whatever builds the ΔF/F traces, and
//! [`TuningConfig`] bundles everything [`crate::compute_tuning_response_per_cells`]
//! needs.  All fields are `pub` and every struct implements `Default`, so the
//! usual construction is struct-update syntax:
//!
//! ```
//! use vistuning::{StatTest, StatTestConfig};
//!
//! let strict = StatTestConfig {
//!     interval_pre: [-1.5, 0.0],
//!     interval_post: [1.0, 2.5],
//!     test: StatTest::Anova,
//!     ..StatTestConfig::default()
//! };
//! assert!(strict.positive);
//! ```
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::TuningError;

/// Statistical test used to decide whether a cell responds to a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatTest {
    /// Paired t-test on `post - pre` across repeats.
    Ttest,
    /// One-way ANOVA between the pre and post samples.
    Anova,
}

impl FromStr for StatTest {
    type Err = TuningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ttest" => Ok(StatTest::Ttest),
            "anova" => Ok(StatTest::Anova),
            other => Err(TuningError::UnknownStatTest(other.to_string())),
        }
    }
}

/// Windowing and test settings for the evoked-response test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StatTestConfig {
    /// Baseline window relative to stimulus onset, in seconds.
    ///
    /// Default: `[-1.0, 0.0]`.
    pub interval_pre: [f64; 2],

    /// Response window relative to stimulus onset, in seconds.
    ///
    /// Default: `[1.0, 2.0]`.
    pub interval_post: [f64; 2],

    /// Default: [`StatTest::Ttest`].
    pub test: StatTest,

    /// When set, a condition only counts as significant if the mean
    /// `post - pre` difference is strictly positive.
    ///
    /// Default: `true`.
    pub positive: bool,
}

impl Default for StatTestConfig {
    fn default() -> Self {
        Self {
            interval_pre: [-1.0, 0.0],
            interval_post: [1.0, 2.0],
            test: StatTest::Ttest,
            positive: true,
        }
    }
}

impl StatTestConfig {
    const KEYS: [&'static str; 4] = ["interval_pre", "interval_post", "test", "positive"];

    /// Parse a JSON object such as
    /// `{"interval_pre": [-1, 0], "test": "anova"}`.
    ///
    /// Missing keys take their default; an unrecognized key is rejected with
    /// [`TuningError::UnknownConfigKey`].
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).context("parsing stat-test configuration")?;
        if let Some(obj) = value.as_object() {
            if let Some(key) = obj.keys().find(|k| !Self::KEYS.contains(&k.as_str())) {
                return Err(TuningError::UnknownConfigKey(key.clone()).into());
            }
        }
        serde_json::from_value(value).context("invalid stat-test configuration")
    }
}

/// Which imaging signal the responses are computed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImagingQuantity {
    #[serde(rename = "dFoF")]
    DFoF,
    #[serde(rename = "rawFluo")]
    RawFluo,
    #[serde(rename = "neuropil")]
    Neuropil,
}

impl ImagingQuantity {
    /// Name of the tensor holding this quantity in a session file, which is
    /// also the label used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagingQuantity::DFoF => "dFoF",
            ImagingQuantity::RawFluo => "rawFluo",
            ImagingQuantity::Neuropil => "neuropil",
        }
    }
}

impl fmt::Display for ImagingQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImagingQuantity {
    type Err = TuningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dFoF" => Ok(ImagingQuantity::DFoF),
            "rawFluo" => Ok(ImagingQuantity::RawFluo),
            "neuropil" => Ok(ImagingQuantity::Neuropil),
            other => Err(TuningError::UnknownQuantity(other.to_string())),
        }
    }
}

/// ΔF/F extraction parameters.
///
/// Not interpreted by this crate: they are handed to the
/// [`crate::session::TraceSource`] that builds the traces and recorded in
/// cached cohort bundles so each sweep point is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DfofParams {
    /// Default: `1.15`.
    pub roi_to_neuropil_fluo_inclusion_factor: f64,
    /// Default: `0.7`.
    pub neuropil_correction_factor: f64,
    /// Default: `"sliding_percentile"`.
    #[serde(rename = "method_for_F0")]
    pub method_for_f0: String,
    /// Percentile used for F0, in percent. Default: `5.0`.
    pub percentile: f64,
    /// Sliding window for F0, in seconds. Default: `300.0`.
    pub sliding_window: f64,
}

impl Default for DfofParams {
    fn default() -> Self {
        Self {
            roi_to_neuropil_fluo_inclusion_factor: 1.15,
            neuropil_correction_factor: 0.7,
            method_for_f0: "sliding_percentile".to_string(),
            percentile: 5.0,
            sliding_window: 300.0,
        }
    }
}

/// Drifting-grating protocols recognised by default, in order of preference.
pub const GRATING_PROTOCOLS: [&str; 2] = [
    "ff-gratings-8orientation-2contrasts-15repeats",
    "ff-gratings-8orientation-2contrasts-10repeats",
];

/// How the grating protocol is picked inside a multi-protocol session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProtocolSelector {
    /// Use the sub-protocol at this index.
    Index(usize),
    /// Use the first of these names that the session contains.
    Named(Vec<String>),
}

impl Default for ProtocolSelector {
    fn default() -> Self {
        ProtocolSelector::Named(GRATING_PROTOCOLS.iter().map(|s| s.to_string()).collect())
    }
}

/// Everything needed to turn one session into per-cell tuning curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Default: [`ImagingQuantity::DFoF`].
    pub quantity: ImagingQuantity,

    /// Contrast level the curves are restricted to. Default: `1.0`.
    pub contrast: f64,

    /// Periodicity of the stimulus angles: `180` for orientation, `360` for
    /// direction. Default: `180.0`.
    pub angle_range: f64,

    pub stat_test: StatTestConfig,

    /// p-value below which a condition is significant. Default: `0.05`.
    pub response_significance_threshold: f64,

    pub protocol: ProtocolSelector,

    /// Only the first `max_rois` cells are analysed. Default: no cap.
    pub max_rois: Option<usize>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            quantity: ImagingQuantity::DFoF,
            contrast: 1.0,
            angle_range: 180.0,
            stat_test: StatTestConfig::default(),
            response_significance_threshold: 5e-2,
            protocol: ProtocolSelector::default(),
            max_rois: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_test_json_defaults_missing_keys() {
        let cfg = StatTestConfig::from_json(r#"{"test": "anova"}"#).unwrap();
        assert_eq!(cfg.test, StatTest::Anova);
        assert_eq!(cfg.interval_pre, [-1.0, 0.0]);
        assert!(cfg.positive);
    }

    #[test]
    fn stat_test_json_rejects_unknown_key() {
        let err = StatTestConfig::from_json(r#"{"interval": [0, 1]}"#).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TuningError>(),
            Some(&TuningError::UnknownConfigKey("interval".into()))
        );
    }

    #[test]
    fn stat_test_json_rejects_unknown_test() {
        assert!(StatTestConfig::from_json(r#"{"test": "wilcoxon"}"#).is_err());
    }

    #[test]
    fn quantity_round_trips_through_str() {
        for q in [ImagingQuantity::DFoF, ImagingQuantity::RawFluo, ImagingQuantity::Neuropil] {
            assert_eq!(q.as_str().parse::<ImagingQuantity>().unwrap(), q);
        }
        assert_eq!(
            "dF/F".parse::<ImagingQuantity>(),
            Err(TuningError::UnknownQuantity("dF/F".into()))
        );
    }

    #[test]
    fn dfof_params_use_f0_key() {
        let json = serde_json::to_value(DfofParams::default()).unwrap();
        assert_eq!(json["method_for_F0"], "sliding_percentile");
    }
}
