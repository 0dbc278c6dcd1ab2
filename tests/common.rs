/// Shared helpers: synthetic session files.
///
/// Layout of every synthetic session:
///   t_imaging          [T]          f64   0.1 s steps
///   dFoF               [4, T]       f32
///   rawFluo            [4, T]       f32   dFoF + 100
///   episode_*          [51]               3 luminosity + 48 grating episodes
///   running_speed      [T]          f64   5 cm/s around first-repeat episodes
///   pupil              [T]          f64   3 mm around third-repeat episodes
use std::path::{Path, PathBuf};

use ndarray::Array2;
use vistuning::StWriter;

pub const DT: f64 = 0.1;
pub const ANGLES: [f64; 8] = [0.0, 22.5, 45.0, 67.5, 90.0, 112.5, 135.0, 157.5];
pub const CONTRASTS: [f64; 2] = [0.5, 1.0];
pub const REPEATS: usize = 3;
pub const GRATINGS: &str = "ff-gratings-8orientation-2contrasts-15repeats";

/// `(preferred angle, amplitude)` of each ROI.  A negative amplitude is a
/// uniform suppression at every angle.
pub const ROIS: [(f64, f64); 4] = [(90.0, 1.0), (45.0, 1.0), (0.0, -0.5), (90.0, 2.0)];

/// Baseline of ROI 0 under the grey screen.
pub const GREY_LEVEL: f32 = 0.3;

const FIRST_GRATING: f64 = 32.0;
const SPACING: f64 = 5.0;

#[allow(unused)]
pub fn orientation_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(180.0);
    d.min(180.0 - d)
}

/// Peak response of an ROI to one grating, before the repeat modulation.
#[allow(unused)]
pub fn amplitude(roi: usize, angle: f64, contrast: f64) -> f64 {
    let (pref, amp) = ROIS[roi];
    if amp < 0.0 {
        return amp;
    }
    let d = orientation_distance(angle, pref) / 30.0;
    contrast * amp * (-d * d).exp()
}

/// Repeat `r` scales every response by `1 + 0.1 r`.
#[allow(unused)]
pub fn repeat_gain(r: usize) -> f64 {
    1.0 + 0.1 * r as f64
}

struct Grating {
    start: f64,
    angle: f64,
    contrast: f64,
    repeat: usize,
}

fn gratings() -> Vec<Grating> {
    let mut out = Vec::new();
    for repeat in 0..REPEATS {
        for &contrast in &CONTRASTS {
            for &angle in &ANGLES {
                let start = FIRST_GRATING + SPACING * out.len() as f64;
                out.push(Grating { start, angle, contrast, repeat });
            }
        }
    }
    out
}

/// Write a synthetic session for `subject` to `dir/name`.
#[allow(unused)]
pub fn write_session(dir: &Path, name: &str, subject: &str) -> PathBuf {
    let gratings = gratings();
    let n_t = ((FIRST_GRATING + SPACING * gratings.len() as f64 + 5.0) / DT) as usize;
    let t: Vec<f64> = (0..n_t).map(|i| i as f64 * DT).collect();

    let mut dfof = Array2::<f32>::zeros((ROIS.len(), n_t));
    for (i, &ti) in t.iter().enumerate() {
        if ti > 20.0 && ti < 30.0 {
            dfof[[0, i]] += GREY_LEVEL;
        }
    }
    for g in &gratings {
        for (i, &ti) in t.iter().enumerate() {
            if ti >= g.start + 0.5 && ti < g.start + 2.5 {
                for roi in 0..ROIS.len() {
                    let a = amplitude(roi, g.angle, g.contrast) * repeat_gain(g.repeat);
                    dfof[[roi, i]] += a as f32;
                }
            }
        }
    }
    let raw = dfof.mapv(|v| v + 100.0);

    let mut start = vec![0.0, 10.0, 20.0];
    let mut stop = vec![10.0, 20.0, 30.0];
    let mut angle = vec![0.0; 3];
    let mut contrast = vec![0.0; 3];
    let mut protocol = vec![0i32; 3];
    for g in &gratings {
        start.push(g.start);
        stop.push(g.start + 2.0);
        angle.push(g.angle);
        contrast.push(g.contrast);
        protocol.push(1);
    }

    let level = |repeat: usize, on: f64, off: f64| -> Vec<f64> {
        t.iter()
            .map(|&ti| {
                let hit = gratings
                    .iter()
                    .any(|g| g.repeat == repeat && ti >= g.start - 1.0 && ti < g.start + 3.0);
                if hit { on } else { off }
            })
            .collect()
    };
    let running = level(0, 5.0, 0.0);
    let pupil = level(2, 3.0, 2.0);

    let n_ep = start.len();
    let mut w = StWriter::new();
    w.add_f64("t_imaging", &t, &[n_t]);
    w.add_f32_arr2("dFoF", &dfof);
    w.add_f32_arr2("rawFluo", &raw);
    w.add_f64("episode_start", &start, &[n_ep]);
    w.add_f64("episode_stop", &stop, &[n_ep]);
    w.add_f64("episode_angle", &angle, &[n_ep]);
    w.add_f64("episode_contrast", &contrast, &[n_ep]);
    w.add_i32("episode_protocol", &protocol, &[n_ep]);
    w.add_f64("running_speed", &running, &[n_t]);
    w.add_f64("t_running_speed", &t, &[n_t]);
    w.add_f64("pupil", &pupil, &[n_t]);
    w.add_f64("t_pupil", &t, &[n_t]);
    w.set_metadata("subject", subject);
    w.set_metadata("protocol", "Luminosity-BlankFirst+ff-gratings");
    w.set_metadata("protocols", &format!("Luminosity-BlankFirst\n{GRATINGS}"));
    w.set_metadata("notes", "synthetic");

    let path = dir.join(name);
    w.write(&path).unwrap();
    path
}
