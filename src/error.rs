//! Typed errors for the analysis steps.
//!
//! I/O and orchestration code returns `anyhow::Result` and attaches file
//! context; the numeric core returns [`TuningError`] so callers can match on
//! the conditions they are expected to guard against.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuningError {
    /// Selectivity requested for a cell whose preferred response is zero.
    #[error("division by zero: preferred response is 0")]
    DivisionByZero,

    #[error("imaging quantity not recognized: {0:?} (expected dFoF, rawFluo or neuropil)")]
    UnknownQuantity(String),

    #[error("protocol not found in session: {0:?}")]
    UnknownProtocol(String),

    #[error("statistical test not recognized: {0:?} (expected ttest or anova)")]
    UnknownStatTest(String),

    /// Luminosity protocol carries neither `BlankFirst` nor `BlankLast`.
    #[error("stimulus protocol not recognized: {0:?}")]
    UnrecognizedStimulusProtocol(String),

    #[error("angle {0} does not fall on the shifted-angle grid")]
    AngleNotOnGrid(f64),

    #[error("missing tensor {0:?} in session file")]
    MissingTensor(String),

    #[error("shape mismatch for {name:?}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("unrecognized configuration key {0:?}")]
    UnknownConfigKey(String),

    /// Missing file or wrong extension.
    #[error("{} is not a session file", .0.display())]
    NotASessionFile(PathBuf),
}
