//! Descriptive statistics and the hypothesis tests used to classify cells.
//!
//! Conventions follow numpy/scipy defaults:
//!
//! * [`std`] uses `ddof = 0`, [`sem`] uses `ddof = 1`.
//! * [`skewness`] is the biased estimator `m3 / m2^1.5`.
//! * p-values are two-sided.
use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

fn central_moment(x: &[f64], m: f64, k: i32) -> f64 {
    x.iter().map(|&v| (v - m).powi(k)).sum::<f64>() / x.len() as f64
}

/// Population standard deviation (`ddof = 0`).
pub fn std(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    central_moment(x, mean(x), 2).sqrt()
}

/// Sample standard deviation (`ddof = 1`); NaN below two samples.
pub fn sample_std(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(x);
    (x.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
}

/// Standard error of the mean; NaN below two samples.
pub fn sem(x: &[f64]) -> f64 {
    sample_std(x) / (x.len() as f64).sqrt()
}

/// Biased sample skewness. NaN for constant or empty input.
pub fn skewness(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    let m = mean(x);
    let m2 = central_moment(x, m, 2);
    if m2 == 0.0 {
        return f64::NAN;
    }
    central_moment(x, m, 3) / m2.powf(1.5)
}

/// Two-sided paired t-test of `y` against `x`.
///
/// Returns `None` when fewer than two pairs are available.  A zero-variance
/// difference gives `p = 0` if its mean is non-zero and `p = 1` otherwise.
pub fn paired_ttest(x: &[f64], y: &[f64]) -> Option<f64> {
    let d: Vec<f64> = x.iter().zip(y).map(|(a, b)| b - a).collect();
    let n = d.len();
    if n < 2 {
        return None;
    }
    let m = mean(&d);
    let s = sample_std(&d);
    if s == 0.0 {
        return Some(if m == 0.0 { 1.0 } else { 0.0 });
    }
    let t = m / (s / (n as f64).sqrt());
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64).ok()?;
    Some((2.0 * dist.sf(t.abs())).min(1.0))
}

/// One-way ANOVA across `groups` (scipy `f_oneway`).
///
/// Returns `None` when there are fewer than two groups or no residual
/// degrees of freedom.
pub fn one_way_anova(groups: &[&[f64]]) -> Option<f64> {
    let k = groups.len();
    let n: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || n <= k || groups.iter().any(|g| g.is_empty()) {
        return None;
    }
    let grand = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;
    let (mut ss_between, mut ss_within) = (0.0, 0.0);
    for g in groups {
        let m = mean(g);
        ss_between += g.len() as f64 * (m - grand).powi(2);
        ss_within += g.iter().map(|&v| (v - m).powi(2)).sum::<f64>();
    }
    let df_b = (k - 1) as f64;
    let df_w = (n - k) as f64;
    if ss_within == 0.0 {
        return Some(if ss_between > 0.0 { 0.0 } else { 1.0 });
    }
    let f = (ss_between / df_b) / (ss_within / df_w);
    let dist = FisherSnedecor::new(df_b, df_w).ok()?;
    Some(dist.sf(f).clamp(0.0, 1.0))
}

/// Result of a Mann–Whitney U test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MannWhitney {
    /// U statistic of the first sample.
    pub u: f64,
    pub pvalue: f64,
}

/// Two-sided Mann–Whitney U test, normal approximation with tie and
/// continuity correction.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Option<MannWhitney> {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return None;
    }
    let mut pooled: Vec<(f64, bool)> = a
        .iter()
        .map(|&v| (v, true))
        .chain(b.iter().map(|&v| (v, false)))
        .collect();
    if pooled.iter().any(|(v, _)| v.is_nan()) {
        return None;
    }
    pooled.sort_by(|x, y| x.0.total_cmp(&y.0));

    let n = pooled.len();
    let mut r1 = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && pooled[j].0 == pooled[i].0 {
            j += 1;
        }
        // ranks i+1 ..= j share their average
        let rank = (i + 1 + j) as f64 / 2.0;
        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        r1 += rank * pooled[i..j].iter().filter(|(_, first)| *first).count() as f64;
        i = j;
    }

    let (n1f, n2f, nf) = (n1 as f64, n2 as f64, n as f64);
    let u1 = r1 - n1f * (n1f + 1.0) / 2.0;
    let u2 = n1f * n2f - u1;
    let mu = n1f * n2f / 2.0;
    let sigma = (n1f * n2f / 12.0 * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)))).sqrt();
    let pvalue = if sigma > 0.0 {
        let z = (u1.max(u2) - mu - 0.5) / sigma;
        let normal = Normal::new(0.0, 1.0).ok()?;
        (2.0 * normal.sf(z)).clamp(0.0, 1.0)
    } else {
        1.0
    };
    Some(MannWhitney { u: u1, pvalue })
}
