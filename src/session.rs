//! One imaging recording: traces, episodes, behaviour and metadata.
//!
//! # Scoped access
//! ```no_run
//! use vistuning::session::{with_session, Session, StoredTraces};
//! use vistuning::ImagingQuantity;
//!
//! let n = with_session("data/2023_02_15-13-30-47.safetensors", |h| {
//!     let s = Session::load(h, ImagingQuantity::DFoF, &StoredTraces::default())?;
//!     Ok(s.n_rois())
//! }).unwrap();
//! ```
//! The file handle is released when the closure returns, whether it
//! succeeded, failed or panicked.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::{DfofParams, ImagingQuantity, ProtocolSelector};
use crate::error::TuningError;
use crate::io::SessionHandle;

/// One stimulus presentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Stimulus onset (s), on the imaging timeline.
    pub start: f64,
    /// Stimulus offset (s).
    pub stop: f64,
    pub angle: f64,
    pub contrast: f64,
    /// Index into [`SessionMeta::protocols`].
    pub protocol_id: usize,
}

/// A behavioural channel sampled on its own timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    pub t: Vec<f64>,
    pub values: Vec<f64>,
}

impl Channel {
    /// Mean of the samples with `lo <= t < hi`, `None` if there are none.
    pub fn mean_in(&self, lo: f64, hi: f64) -> Option<f64> {
        let (sum, n) = self
            .t
            .iter()
            .zip(&self.values)
            .filter(|(t, _)| **t >= lo && **t < hi)
            .fold((0.0, 0usize), |(s, n), (_, &v)| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}

/// Locomotion and pupil channels; either may be absent from a recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Behavior {
    /// Running speed (cm/s).
    pub running_speed: Option<Channel>,
    /// Pupil diameter (mm).
    pub pupil: Option<Channel>,
}

/// Subject and protocol description of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub subject: String,
    /// Full protocol label, e.g. `"Luminosity-BlankFirst+ff-gratings"`.
    pub protocol: String,
    /// Sub-protocol names, indexed by [`Episode::protocol_id`].
    pub protocols: Vec<String>,
    pub notes: String,
}

impl SessionMeta {
    /// Read the metadata map of an open session; missing keys are empty.
    pub fn read(handle: &SessionHandle) -> Self {
        let get = |k: &str| handle.metadata(k).unwrap_or_default().to_string();
        Self {
            subject: get("subject"),
            protocol: get("protocol"),
            protocols: handle
                .metadata("protocols")
                .unwrap_or_default()
                .lines()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            notes: get("notes"),
        }
    }

    /// Index of the sub-protocol called `name`.
    pub fn protocol_id(&self, name: &str) -> Result<usize, TuningError> {
        self.protocols
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| TuningError::UnknownProtocol(name.to_string()))
    }

    /// Resolve a [`ProtocolSelector`] against this session.
    pub fn resolve(&self, selector: &ProtocolSelector) -> Result<usize, TuningError> {
        match selector {
            ProtocolSelector::Index(i) if *i < self.protocols.len() => Ok(*i),
            ProtocolSelector::Index(i) => Err(TuningError::UnknownProtocol(format!("#{i}"))),
            ProtocolSelector::Named(names) => names
                .iter()
                .find_map(|n| self.protocol_id(n).ok())
                .ok_or_else(|| TuningError::UnknownProtocol(names.join(" | "))),
        }
    }
}

/// Produces the ROI × time traces for an imaging quantity.
///
/// This is where ΔF/F extraction plugs in; the crate itself only ships
/// [`StoredTraces`], which reads traces already present in the file.
pub trait TraceSource {
    fn traces(&self, handle: &mut SessionHandle, quantity: ImagingQuantity) -> Result<Array2<f32>>;

    /// Whether the traces depend on the [`DfofParams`] the source was built
    /// with.  Sources that only read precomputed traces keep the default.
    fn honours_dfof_params(&self) -> bool {
        false
    }
}

/// Reads the tensor named after the quantity (`dFoF`, `rawFluo`,
/// `neuropil`).
#[derive(Debug, Clone, Default)]
pub struct StoredTraces {
    /// Recorded alongside the results; the stored traces were built with
    /// whatever parameters the producer of the file used.
    pub params: DfofParams,
}

impl TraceSource for StoredTraces {
    fn traces(&self, handle: &mut SessionHandle, quantity: ImagingQuantity) -> Result<Array2<f32>> {
        debug!("{}: reading stored {quantity} ({:?})", handle.path().display(), self.params);
        handle.read_array2(quantity.as_str())
    }
}

/// A loaded recording.
#[derive(Debug, Clone)]
pub struct Session {
    pub path: PathBuf,
    pub meta: SessionMeta,
    pub quantity: ImagingQuantity,
    /// `[n_rois, n_times]`.
    pub traces: Array2<f32>,
    /// Imaging timeline (s), one entry per trace column.
    pub t: Vec<f64>,
    pub episodes: Vec<Episode>,
    pub behavior: Behavior,
}

impl Session {
    /// Materialise a session from an open handle.
    pub fn load(
        handle: &mut SessionHandle,
        quantity: ImagingQuantity,
        source: &dyn TraceSource,
    ) -> Result<Self> {
        let meta = SessionMeta::read(handle);
        let t = handle.read_f64("t_imaging")?;
        let traces = source.traces(handle, quantity)?;
        if traces.ncols() != t.len() {
            return Err(TuningError::ShapeMismatch {
                name: quantity.as_str().to_string(),
                expected: vec![traces.nrows(), t.len()],
                got: vec![traces.nrows(), traces.ncols()],
            }
            .into());
        }
        let episodes = read_episodes(handle)?;
        let behavior = Behavior {
            running_speed: read_channel(handle, "running_speed")?,
            pupil: read_channel(handle, "pupil")?,
        };
        Ok(Self {
            path: handle.path().to_path_buf(),
            meta,
            quantity,
            traces,
            t,
            episodes,
            behavior,
        })
    }

    pub fn n_rois(&self) -> usize {
        self.traces.nrows()
    }

    pub fn protocol_id(&self, name: &str) -> Result<usize, TuningError> {
        self.meta.protocol_id(name)
    }

    pub fn protocol_name(&self, id: usize) -> Option<&str> {
        self.meta.protocols.get(id).map(String::as_str)
    }

    /// File name without directories, for log messages and figure titles.
    pub fn label(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn read_episodes(handle: &mut SessionHandle) -> Result<Vec<Episode>> {
    let start = handle.read_f64("episode_start")?;
    let stop = handle.read_f64("episode_stop")?;
    let angle = handle.read_f64("episode_angle")?;
    let contrast = handle.read_f64("episode_contrast")?;
    let protocol = if handle.has("episode_protocol") {
        handle.read_indices("episode_protocol")?
    } else {
        vec![0; start.len()]
    };
    let n = start.len();
    for (name, len) in [
        ("episode_stop", stop.len()),
        ("episode_angle", angle.len()),
        ("episode_contrast", contrast.len()),
        ("episode_protocol", protocol.len()),
    ] {
        if len != n {
            return Err(TuningError::ShapeMismatch {
                name: name.to_string(),
                expected: vec![n],
                got: vec![len],
            }
            .into());
        }
    }
    Ok((0..n)
        .map(|i| Episode {
            start: start[i],
            stop: stop[i],
            angle: angle[i],
            contrast: contrast[i],
            protocol_id: protocol[i],
        })
        .collect())
}

fn read_channel(handle: &mut SessionHandle, name: &str) -> Result<Option<Channel>> {
    let t_name = format!("t_{name}");
    if !handle.has(name) || !handle.has(&t_name) {
        return Ok(None);
    }
    let values = handle.read_f64(name)?;
    let t = handle.read_f64(&t_name)?;
    if t.len() != values.len() {
        return Err(TuningError::ShapeMismatch {
            name: name.to_string(),
            expected: vec![t.len()],
            got: vec![values.len()],
        }
        .into());
    }
    Ok(Some(Channel { t, values }))
}

/// Open `path`, run `f` on the handle, and release the file on every exit
/// path.  Errors from `f` are tagged with the file name.
pub fn with_session<P, T, F>(path: P, f: F) -> Result<T>
where
    P: AsRef<Path>,
    F: FnOnce(&mut SessionHandle) -> Result<T>,
{
    let path = path.as_ref();
    let mut handle = SessionHandle::open(path)?;
    let out = f(&mut handle);
    drop(handle);
    out.with_context(|| format!("processing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_mean_in_half_open_window() {
        let ch = Channel { t: vec![0.0, 1.0, 2.0, 3.0], values: vec![1.0, 2.0, 3.0, 4.0] };
        assert_eq!(ch.mean_in(1.0, 3.0), Some(2.5));
        assert_eq!(ch.mean_in(5.0, 6.0), None);
    }

    #[test]
    fn selector_resolution() {
        let meta = SessionMeta {
            protocols: vec![
                "Luminosity-BlankFirst".into(),
                "ff-gratings-8orientation-2contrasts-10repeats".into(),
            ],
            ..SessionMeta::default()
        };
        assert_eq!(meta.resolve(&ProtocolSelector::default()), Ok(1));
        assert_eq!(meta.resolve(&ProtocolSelector::Index(0)), Ok(0));
        assert!(meta.resolve(&ProtocolSelector::Index(2)).is_err());
        assert_eq!(
            meta.protocol_id("size-tuning"),
            Err(TuningError::UnknownProtocol("size-tuning".into()))
        );
    }
}
