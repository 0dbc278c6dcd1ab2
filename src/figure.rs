//! Figures rendered to in-memory SVG.
//!
//! Every plotting function builds and returns its own [`Figure`]; nothing is
//! kept between calls.  Sizes are in pixels at 300 dpi so figures can be
//! placed directly on an A4 report page.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::behavior::{BehaviorState, BehaviorTuning};
use crate::cohort::PopulationCurve;
use crate::luminosity::{Luminosity, LuminosityStats, LuminositySummary};
use crate::stats;
use crate::tuning::SessionTuning;

/// One rendered figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub svg: String,
}

impl Figure {
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.svg).with_context(|| format!("writing {}", path.display()))
    }
}

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

pub(crate) fn render<F>(name: &str, width: u32, height: u32, draw: F) -> Result<Figure>
where
    F: FnOnce(&Area) -> Result<()>,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
    }
    Ok(Figure { name: name.to_string(), width, height, svg })
}

// tab10
const TAB_BLUE: RGBColor = RGBColor(31, 119, 180);
const TAB_ORANGE: RGBColor = RGBColor(255, 127, 14);
const TAB_GREEN: RGBColor = RGBColor(44, 160, 44);
const TAB_RED: RGBColor = RGBColor(214, 39, 40);
const TAB_PURPLE: RGBColor = RGBColor(148, 103, 189);
const GREY: RGBColor = RGBColor(128, 128, 128);

/// Colours used for successive series.
pub const PALETTE: [RGBColor; 5] = [BLACK, TAB_BLUE, TAB_GREEN, TAB_ORANGE, TAB_PURPLE];

pub(crate) fn font(size: u32) -> TextStyle<'static> {
    ("sans-serif", size).into_font().into()
}

/// Finite `(lo, hi)` of `values` padded by 10 %, `(0, 1)` if none.
fn y_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if hi > lo { 0.1 * (hi - lo) } else { 0.5 };
    (lo.min(0.0) - pad, hi + pad)
}

fn x_range(angles: &[f64]) -> (f64, f64) {
    match (angles.first(), angles.last()) {
        (Some(&a), Some(&b)) if b > a => {
            let pad = 0.5 * (b - a) / angles.len() as f64;
            (a - pad, b + pad)
        }
        _ => (-1.0, 1.0),
    }
}

/// Mean ± error line with markers on one chart.
fn curve_panel(
    area: &Area,
    title: &str,
    y_desc: &str,
    angles: &[f64],
    series: &[(&str, RGBColor, &[f64], &[f64])],
) -> Result<()> {
    let (x0, x1) = x_range(angles);
    let (y0, y1) = y_range(
        series
            .iter()
            .flat_map(|(_, _, m, e)| m.iter().zip(e.iter()))
            .flat_map(|(m, e)| [m + e.max(0.0), m - e.max(0.0)])
            .collect::<Vec<_>>()
            .iter(),
    );
    let mut chart = ChartBuilder::on(area)
        .caption(title, font(34))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("angle (°)")
        .y_desc(y_desc)
        .label_style(font(22))
        .axis_desc_style(font(26))
        .draw()?;

    for &(label, color, mean, err) in series {
        let pts: Vec<(f64, f64)> = angles
            .iter()
            .zip(mean)
            .filter(|(_, m)| m.is_finite())
            .map(|(&a, &m)| (a, m))
            .collect();
        chart
            .draw_series(LineSeries::new(pts.clone(), color.stroke_width(3)))?
            .label(label)
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 30, y)], color.stroke_width(3))
            });
        chart.draw_series(pts.iter().map(|&p| Circle::new(p, 6, color.filled())))?;
        chart.draw_series(
            angles
                .iter()
                .zip(mean.iter().zip(err))
                .filter(|(_, (m, e))| m.is_finite() && e.is_finite())
                .map(|(&a, (&m, &e))| {
                    ErrorBar::new_vertical(a, m - e, m, m + e, color.filled(), 10)
                }),
        )?;
    }
    if series.len() > 1 {
        chart
            .configure_series_labels()
            .label_font(font(22))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;
    }
    Ok(())
}

fn column_stats(rows: &[Vec<f64>], n: usize) -> (Vec<f64>, Vec<f64>) {
    (0..n)
        .map(|i| {
            let col: Vec<f64> = rows.iter().map(|r| r[i]).filter(|v| v.is_finite()).collect();
            (stats::mean(&col), stats::std(&col))
        })
        .unzip()
}

// ── Session figures ───────────────────────────────────────────────────────────

/// Population tuning of one session: raw and peak-normalised mean ± s.d.,
/// plus the responsive fraction.
pub fn tuning_summary_fig(tuning: &SessionTuning) -> Result<Figure> {
    let n = tuning.shifted_angle.len();
    let raw = tuning.responses();
    let i_pref = tuning.grid().index_of(0.0);
    let normed: Vec<Vec<f64>> = raw
        .iter()
        .map(|r| {
            let peak = i_pref.map_or(f64::NAN, |i| r[i]);
            r.iter().map(|v| v / peak).collect()
        })
        .collect();
    let (raw_mean, raw_std) = column_stats(&raw, n);
    let (n_mean, n_std) = column_stats(&normed, n);
    let n_resp = tuning.cells.len();

    render("tuning-summary", 1800, 510, |root| {
        let panels = root.split_evenly((1, 3));
        let angles = tuning.shifted_angle.as_slice();
        curve_panel(
            &panels[0],
            "raw resp.",
            "ΔF/F",
            angles,
            &[("raw", BLACK, raw_mean.as_slice(), raw_std.as_slice())],
        )?;
        curve_panel(
            &panels[1],
            "peak normalized",
            "n. ΔF/F",
            angles,
            &[("norm", BLACK, n_mean.as_slice(), n_std.as_slice())],
        )?;

        let area = &panels[2];
        let (w, h) = area.dim_in_pixel();
        let (w, h) = (w as i32, h as i32);
        let frac = tuning.frac_resp.clamp(0.0, 1.0);
        let x_split = 40 + ((w - 80) as f64 * frac) as i32;
        area.draw(&Rectangle::new([(40, h / 3), (x_split, h / 2)], TAB_GREEN.filled()))?;
        area.draw(&Rectangle::new([(x_split, h / 3), (w - 40, h / 2)], TAB_ORANGE.filled()))?;
        area.draw(&Text::new(format!("{:.1}%", 100.0 * frac), (40, h / 3 - 40), font(26)))?;
        area.draw(&Text::new(
            format!("responsive ROIs : n={n_resp} / {}", tuning.n_rois),
            (40, h / 2 + 30),
            font(26),
        ))?;
        Ok(())
    })
}

/// Per-angle response of one example cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleCell {
    pub roi: usize,
    pub angles: Vec<f64>,
    /// Mean `post - pre` per angle.
    pub values: Vec<f64>,
    /// Standard deviation of `post - pre` per angle.
    pub stds: Vec<f64>,
    pub responsive: bool,
    pub si: f64,
}

/// One row per example cell: its tuning curve with responsiveness and
/// selectivity annotations.
pub fn tuning_examples_fig(cells: &[ExampleCell]) -> Result<Figure> {
    let rows = cells.len().max(1);
    let height = (180 * rows as u32).clamp(400, 2700);
    render("tuning-examples", 2250, height, |root| {
        for (area, cell) in root.split_evenly((rows, 1)).iter().zip(cells) {
            let (label, head) = area.split_horizontally(360);
            let (_, h) = label.dim_in_pixel();
            let h = h as i32;
            let status_color = if cell.responsive { TAB_GREEN } else { TAB_RED };
            label.draw(&Text::new(format!("roi #{}", cell.roi + 1), (20, h / 2 - 30), font(28)))?;
            label.draw(&Text::new(
                if cell.responsive { "responsive" } else { "unresponsive" },
                (20, h / 2),
                font(22).color(&status_color),
            ))?;
            label.draw(&Text::new(
                format!("SI={:.2}", cell.si),
                (20, h / 2 + 30),
                font(22).color(if cell.responsive { &BLACK } else { &GREY }),
            ))?;
            let series = [("", BLACK, cell.values.as_slice(), cell.stds.as_slice())];
            curve_panel(&head, "", "δ ΔF/F", &cell.angles, &series)?;
        }
        Ok(())
    })
}

fn metric<'a>(s: &'a LuminosityStats, name: &str) -> &'a [f64] {
    match name {
        "mean" => &s.mean,
        "std" => &s.std,
        _ => &s.skewness,
    }
}

/// Mean, s.d. and skewness of every ROI under each uniform screen.
pub fn luminosity_fig(summary: &LuminositySummary) -> Result<Figure> {
    render("lum-resp", 2100, 900, |root| {
        let panels = root.split_evenly((1, 3));
        for (area, name) in panels.iter().zip(["mean", "std", "skewness"]) {
            let all: Vec<f64> = summary
                .stats
                .values()
                .flat_map(|s| metric(s, name).iter().copied())
                .collect();
            let (y0, y1) = y_range(all.iter());
            let mut chart = ChartBuilder::on(area)
                .caption(format!("ΔF/F {name}"), font(34))
                .margin(20)
                .x_label_area_size(60)
                .y_label_area_size(90)
                .build_cartesian_2d(-0.5f64..2.5f64, y0..y1)?;
            chart
                .configure_mesh()
                .disable_mesh()
                .x_labels(3)
                .x_label_formatter(&|x: &f64| {
                    Luminosity::ALL
                        .get(x.round() as usize)
                        .map(|l| l.to_string())
                        .unwrap_or_default()
                })
                .label_style(font(22))
                .draw()?;
            for (k, lum) in Luminosity::ALL.iter().enumerate() {
                let Some(values) = summary.stats.get(lum).map(|s| metric(s, name)) else {
                    continue;
                };
                let x = k as f64;
                let n = values.len().max(1) as f64;
                chart.draw_series(
                    values
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.is_finite())
                        .map(|(i, &v)| {
                            Circle::new((x - 0.25 + 0.5 * i as f64 / n, v), 4, GREY.filled())
                        }),
                )?;
                let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
                let m = stats::mean(&finite);
                if m.is_finite() {
                    chart.draw_series(std::iter::once(PathElement::new(
                        vec![(x - 0.3, m), (x + 0.3, m)],
                        BLACK.stroke_width(4),
                    )))?;
                }
            }
        }
        Ok(())
    })
}

// ── Cohort and behaviour figures ──────────────────────────────────────────────

/// Population curves of several cohorts with their selectivity
/// distributions; `pvalue` is printed when two cohorts are compared.
pub fn cohort_comparison_fig(
    curves: &[(&str, &PopulationCurve)],
    y_desc: &str,
    pvalue: Option<f64>,
) -> Result<Figure> {
    render("cohort-comparison", 1500, 600, |root| {
        let (left, right) = root.split_horizontally(1000);
        let angles = curves.first().map(|(_, c)| c.shifted_angle.clone()).unwrap_or_default();
        let labels: Vec<String> = curves
            .iter()
            .map(|(name, c)| format!("{name} (n={} {})", c.n, c.averaging.label()))
            .collect();
        let series: Vec<(&str, RGBColor, &[f64], &[f64])> = curves
            .iter()
            .zip(&labels)
            .enumerate()
            .map(|(i, ((_, c), label))| {
                (label.as_str(), PALETTE[i % PALETTE.len()], c.mean.as_slice(), c.sem.as_slice())
            })
            .collect();
        curve_panel(&left, "", y_desc, &angles, &series)?;

        let mut chart = ChartBuilder::on(&right)
            .caption("select. index", font(28))
            .margin(20)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5f64..(curves.len() as f64 - 0.5), 0f64..1.15f64)?;
        chart.configure_mesh().disable_mesh().disable_x_axis().label_style(font(22)).draw()?;
        for (i, (_, c)) in curves.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            let n = c.si.len().max(1) as f64;
            chart.draw_series(c.si.iter().enumerate().map(|(j, &v)| {
                let x = i as f64 - 0.2 + 0.4 * j as f64 / n;
                Circle::new((x, v.clamp(0.0, 1.0)), 3, color.filled())
            }))?;
        }
        if let Some(p) = pvalue {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(0.0, 1.05), (1.0, 1.05)],
                BLACK.stroke_width(2),
            )))?;
            chart.draw_series(std::iter::once(Text::new(
                format!("Mann-Whitney: p={p:.1e}"),
                (-0.4, 1.13),
                font(20),
            )))?;
        }
        Ok(())
    })
}

/// Mean tuning on all episodes and per behavioural state.
pub fn behavior_fig(tuning: &BehaviorTuning) -> Result<Figure> {
    let zeros = vec![0.0; tuning.shifted_angle.len()];
    let all = tuning.mean_curve(None);
    let states = [
        (BehaviorState::Running, TAB_ORANGE),
        (BehaviorState::Still, TAB_BLUE),
        (BehaviorState::Constricted, TAB_GREEN),
        (BehaviorState::Dilated, TAB_PURPLE),
    ];
    let curves: Vec<(String, RGBColor, Vec<f64>)> = states
        .iter()
        .filter(|(s, _)| tuning.n_episodes.iter().any(|(t, _)| t == s))
        .map(|&(s, c)| (s.to_string(), c, tuning.mean_curve(Some(s))))
        .collect();
    render("behavior-tuning", 1000, 600, |root| {
        let mut series: Vec<(&str, RGBColor, &[f64], &[f64])> =
            vec![("all", GREY, all.as_slice(), zeros.as_slice())];
        series.extend(
            curves
                .iter()
                .map(|(l, c, m)| (l.as_str(), *c, m.as_slice(), zeros.as_slice())),
        );
        curve_panel(root, "", "ΔF/F", &tuning.shifted_angle, &series)
    })
}
