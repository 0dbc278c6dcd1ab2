//! # vistuning: orientation tuning of calcium-imaged cells
//!
//! `vistuning` takes two-photon recordings of visual cortex under drifting
//! full-field gratings and turns them into per-cell tuning curves aligned
//! on each cell's preferred orientation, selectivity indices, and
//! genotype-level population summaries.
//!
//! ## Pipeline overview
//!
//! ```text
//! session.safetensors
//!   │
//!   ├─ Session::load()                     traces [ROIs, T], episodes, behaviour
//!   ├─ EpisodeSet::for_protocol()          gratings sub-protocol
//!   ├─ compute_summary_data()              pre/post test per (angle, contrast)
//!   ├─ preferred_angle()                   argmax at the reference contrast
//!   ├─ TuningCurve::from_responses()       shifted onto the common grid
//!   └─ curve_osi()                         (pref − orth) / pref
//!        │
//!        └─→ SessionTuning   ──→  CohortSummary  ──→  population_curve()
//!                                                      compare_cohorts()
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use vistuning::{compute_tuning_response_per_cells, with_session, Session, StoredTraces, TuningConfig};
//!
//! let cfg = TuningConfig::default();
//! let tuning = with_session("data/2023_02_15-13-30-47.safetensors", |h| {
//!     let session = Session::load(h, cfg.quantity, &StoredTraces::default())?;
//!     compute_tuning_response_per_cells(&session, &cfg)
//! })
//! .unwrap();
//!
//! println!("{} / {} cells responsive", tuning.cells.len(), tuning.n_rois);
//! ```
//!
//! ## Cohorts
//!
//! ```no_run
//! use vistuning::cohort::{compute_summary_responses, scan_folder, CohortSummary, SummaryOptions};
//! use vistuning::config::GRATING_PROTOCOLS;
//!
//! let dataset = scan_folder("data/").unwrap();
//! let mut summary = CohortSummary::init(&dataset, &GRATING_PROTOCOLS);
//! compute_summary_responses(&mut summary, &SummaryOptions::default());
//! ```

pub mod behavior;
pub mod cohort;
pub mod config;
pub mod episodes;
pub mod error;
pub mod figure;
pub mod io;
pub mod luminosity;
pub mod report;
pub mod response;
pub mod selectivity;
pub mod session;
pub mod stats;
pub mod tuning;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{
    DfofParams, ImagingQuantity, ProtocolSelector, StatTest, StatTestConfig, TuningConfig,
    GRATING_PROTOCOLS,
};

// error
pub use error::TuningError;

// io: safetensors helpers
pub use io::{has_session_extension, SessionHandle, StWriter, SESSION_EXTENSION};

// session
pub use session::{with_session, Episode, Session, SessionMeta, StoredTraces, TraceSource};

// responses and tuning
pub use episodes::{EpisodeSet, ResponseWindows};
pub use response::{
    compute_summary_data, stat_test_for_evoked_responses, CellResponse, StatTestResult,
};
pub use selectivity::{
    curve_osi, orientation_selectivity_index, selectivity_index, SelectivityPolicy,
};
pub use tuning::{
    compute_tuning_response_per_cells, preferred_angle, shift_orientation, AngleGrid, CellTuning,
    SessionTuning, TuningCurve,
};

// cohorts
pub use cohort::{
    compare_cohorts, population_curve, Averaging, CohortSummary, Genotype, PopulationCurve,
    PopulationOptions, SummaryOptions, SweepPoint,
};
