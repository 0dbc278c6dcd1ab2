//! Safetensors session container.
//!
//! Layout: an 8-byte little-endian header length, a JSON header mapping each
//! tensor name to `{dtype, shape, data_offsets}` (plus an optional
//! `__metadata__` string map), then the raw little-endian payload.
//!
//! [`SessionHandle`] keeps the file open and reads tensors on demand by
//! seeking; the file is released when the handle is dropped.  [`StWriter`]
//! produces files in the same layout.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::TuningError;

/// Extension a session file must carry.
pub const SESSION_EXTENSION: &str = "safetensors";

// ── Header ────────────────────────────────────────────────────────────────

/// Bytes of the little-endian header length in front of the JSON header.
const LEN_PREFIX: u64 = 8;

/// Header key of the string map stored next to the tensors.
const METADATA_KEY: &str = "__metadata__";

/// Location and layout of one tensor in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data_offsets: [usize; 2],
}

impl TensorInfo {
    fn n_elements(&self) -> usize {
        self.shape.iter().product()
    }

    fn byte_len(&self) -> usize {
        self.data_offsets[1].saturating_sub(self.data_offsets[0])
    }

    /// Byte range consistent with dtype and shape.
    fn check_layout(&self, name: &str) -> Result<()> {
        let width = dtype_width(&self.dtype)
            .with_context(|| format!("tensor {name:?}: unsupported dtype {}", self.dtype))?;
        if self.byte_len() != self.n_elements() * width {
            bail!(
                "tensor {name:?}: {} bytes for shape {:?} of {}",
                self.byte_len(), self.shape, self.dtype
            );
        }
        Ok(())
    }
}

/// Parsed header of a safetensors file.
#[derive(Debug, Clone, Default)]
pub struct TensorHeader {
    pub tensors: HashMap<String, TensorInfo>,
    pub metadata: HashMap<String, String>,
    /// Absolute file offset of the first payload byte.
    pub data_start: u64,
}

/// Read and validate the header from the start of `reader`.
///
/// `file_len` bounds every tensor's byte range.
pub fn read_header<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<TensorHeader> {
    reader.seek(SeekFrom::Start(0))?;
    let mut len_buf = [0u8; LEN_PREFIX as usize];
    reader
        .read_exact(&mut len_buf)
        .context("safetensors file too small")?;
    let n = u64::from_le_bytes(len_buf);
    if n > file_len.saturating_sub(LEN_PREFIX) {
        bail!("safetensors header length {n} exceeds file size {file_len}");
    }
    let mut hdr = vec![0u8; n as usize];
    reader.read_exact(&mut hdr).context("reading safetensors header")?;
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&hdr).context("failed to parse safetensors header")?;

    let data_start = LEN_PREFIX + n;
    let payload_len = (file_len - data_start) as usize;
    let mut header = TensorHeader { data_start, ..TensorHeader::default() };

    for (name, value) in raw {
        if name == METADATA_KEY {
            header.metadata = serde_json::from_value(value)
                .with_context(|| format!("{METADATA_KEY} must be a string map"))?;
            continue;
        }
        let info: TensorInfo = serde_json::from_value(value)
            .with_context(|| format!("malformed header entry {name:?}"))?;
        if info.data_offsets[1] > payload_len || info.data_offsets[0] > info.data_offsets[1] {
            bail!("tensor {name:?} lies outside the payload");
        }
        info.check_layout(&name)?;
        header.tensors.insert(name, info);
    }
    Ok(header)
}

fn dtype_width(dtype: &str) -> Option<usize> {
    match dtype {
        "F32" | "I32" => Some(4),
        "F64" | "I64" => Some(8),
        "U8" => Some(1),
        _ => None,
    }
}

fn decode_f64(dtype: &str, raw: &[u8]) -> Vec<f64> {
    match dtype {
        "F32" => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        "F64" => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        "I32" => raw
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        "I64" => raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64)
            .collect(),
        _ => raw.iter().map(|&b| b as f64).collect(),
    }
}

// ── SessionHandle ─────────────────────────────────────────────────────────

/// An open session file.
///
/// Tensors are read lazily; nothing but the header is loaded by
/// [`SessionHandle::open`].  The underlying file is closed on drop, so a
/// handle scoped to one iteration of a cohort loop never outlives it, even
/// when processing that session fails.
#[derive(Debug)]
pub struct SessionHandle {
    path: PathBuf,
    reader: BufReader<File>,
    header: TensorHeader,
}

impl SessionHandle {
    /// Open `path`, which must exist and carry the `.safetensors` extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !has_session_extension(path) {
            bail!(
                "{}: not a session file (expected a .{SESSION_EXTENSION} extension)",
                path.display()
            );
        }
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let file_len = file
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        let mut reader = BufReader::new(file);
        let header = read_header(&mut reader, file_len)
            .with_context(|| format!("reading header of {}", path.display()))?;
        debug!("opened {} ({} tensors)", path.display(), header.tensors.len());
        Ok(Self { path: path.to_path_buf(), reader, header })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &TensorHeader {
        &self.header
    }

    pub fn has(&self, name: &str) -> bool {
        self.header.tensors.contains_key(name)
    }

    /// Metadata string stored under `key`, if any.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.header.metadata.get(key).map(String::as_str)
    }

    /// Shape of tensor `name`.
    pub fn shape(&self, name: &str) -> Result<Vec<usize>> {
        Ok(self.info(name)?.shape.clone())
    }

    fn info(&self, name: &str) -> Result<&TensorInfo> {
        self.header
            .tensors
            .get(name)
            .ok_or_else(|| TuningError::MissingTensor(name.to_string()).into())
    }

    fn read_bytes(&mut self, name: &str) -> Result<(String, Vec<usize>, Vec<u8>)> {
        let info = self.info(name)?.clone();
        let pos = self.header.data_start + info.data_offsets[0] as u64;
        self.reader
            .seek(SeekFrom::Start(pos))
            .with_context(|| format!("seek to {name:?} in {}", self.path.display()))?;
        let mut raw = vec![0u8; info.byte_len()];
        self.reader
            .read_exact(&mut raw)
            .with_context(|| format!("read {name:?} from {}", self.path.display()))?;
        Ok((info.dtype, info.shape, raw))
    }

    /// Read any numeric tensor, flattened, converted to `f64`.
    pub fn read_f64(&mut self, name: &str) -> Result<Vec<f64>> {
        let (dtype, _shape, raw) = self.read_bytes(name)?;
        Ok(decode_f64(&dtype, &raw))
    }

    /// Read a 1-D tensor of integer indices.
    pub fn read_indices(&mut self, name: &str) -> Result<Vec<usize>> {
        self.read_f64(name)?
            .into_iter()
            .map(|v| {
                if v < 0.0 || v.fract() != 0.0 {
                    bail!("tensor {name:?}: {v} is not an index");
                }
                Ok(v as usize)
            })
            .collect()
    }

    /// Read a 2-D tensor as `f32`.
    pub fn read_array2(&mut self, name: &str) -> Result<Array2<f32>> {
        let (dtype, shape, raw) = self.read_bytes(name)?;
        if shape.len() != 2 {
            return Err(TuningError::ShapeMismatch {
                name: name.to_string(),
                expected: vec![0, 0],
                got: shape,
            }
            .into());
        }
        let values: Vec<f32> = match dtype.as_str() {
            "F32" => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            other => decode_f64(other, &raw).into_iter().map(|v| v as f32).collect(),
        };
        Ok(Array2::from_shape_vec((shape[0], shape[1]), values)?)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        debug!("closed {}", self.path.display());
    }
}

/// `true` when `path` ends in `.safetensors`.
pub fn has_session_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SESSION_EXTENSION)
}

// ── Writer ────────────────────────────────────────────────────────────────

/// Session-file writer: F32, F64 and I32 tensors plus string metadata,
/// laid out the way [`read_header`] expects them.
///
/// ```rust,no_run
/// use vistuning::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("t_imaging", &[0.0, 0.1, 0.2], &[3]);
/// w.set_metadata("subject", "SST-WT-01");
/// w.write(Path::new("/tmp/session.safetensors")).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct StWriter {
    tensors: Vec<(String, TensorInfo)>,
    payload: Vec<u8>,
    metadata: HashMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        name: &str,
        dtype: &str,
        shape: &[usize],
        bytes: impl Iterator<Item = u8>,
    ) {
        let start = self.payload.len();
        self.payload.extend(bytes);
        let info = TensorInfo {
            dtype: dtype.to_string(),
            shape: shape.to_vec(),
            data_offsets: [start, self.payload.len()],
        };
        self.tensors.push((name.to_string(), info));
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        self.push(name, "F32", shape, data.iter().flat_map(|v| v.to_le_bytes()));
    }

    /// Row-major `[rows, cols]`.
    pub fn add_f32_arr2(&mut self, name: &str, arr: &Array2<f32>) {
        let shape = [arr.nrows(), arr.ncols()];
        self.push(name, "F32", &shape, arr.iter().flat_map(|v| v.to_le_bytes()));
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        self.push(name, "F64", shape, data.iter().flat_map(|v| v.to_le_bytes()));
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        self.push(name, "I32", shape, data.iter().flat_map(|v| v.to_le_bytes()));
    }

    /// Later values replace earlier ones.
    pub fn set_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    /// Fails before touching `path` when a tensor's data does not match its
    /// shape.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut header = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header.insert(METADATA_KEY.into(), serde_json::to_value(&self.metadata)?);
        }
        for (name, info) in &self.tensors {
            info.check_layout(name)?;
            header.insert(name.clone(), serde_json::to_value(info)?);
        }
        let mut hdr = serde_json::to_vec(&header)?;
        // payload starts on an 8-byte boundary
        let align = LEN_PREFIX as usize;
        hdr.resize(hdr.len().div_ceil(align) * align, b' ');

        let mut f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        f.write_all(&(hdr.len() as u64).to_le_bytes())?;
        f.write_all(&hdr)?;
        f.write_all(&self.payload)?;
        Ok(())
    }
}
