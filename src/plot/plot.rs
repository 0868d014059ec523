use ndarray::prelude::*;
use plotlib::page::Page;
use plotlib::repr::{Histogram, HistogramBins, Plot};
use plotlib::style::{LineStyle, PointMarker, PointStyle};
use plotlib::view::ContinuousView;
use std::fs;
use std::path::Path;

use crate::base::*;

/// Colours cycled through by multi-series plots
pub const PALETTE: [&str; 7] = [
    "#1F77B4", "#2CA02C", "#D62728", "#17BECF", "#9467BD", "#BCBD22", "#FF7F0E",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesStyle {
    Points,
    Line,
    DashedLine,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub style: SeriesStyle,
    pub colour: String,
}

impl Series {
    pub fn new(x: &Array1<f64>, y: &Array1<f64>, style: SeriesStyle, colour: &str) -> Self {
        Series {
            x: x.clone(),
            y: y.clone(),
            style,
            colour: colour.to_owned(),
        }
    }

    fn finite_points(&self) -> Vec<(f64, f64)> {
        self.x
            .iter()
            .zip(self.y.iter())
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| (x, y))
            .collect()
    }
}

// Range of the values padded by 5% on either side, widened when all values coincide
fn padded_range(values: &[f64]) -> Option<(f64, f64)> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(min.is_finite() && max.is_finite()) {
        return None;
    }
    let pad = if max > min {
        0.05 * (max - min)
    } else if min != 0.0 {
        0.05 * min.abs()
    } else {
        1.0
    };
    Some((min - pad, max + pad))
}

fn save(view: &ContinuousView, fname_svg: &Path) -> Result<String> {
    if let Some(dir) = fname_svg.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    Page::single(view)
        .save(fname_svg)
        .map_err(|e| HivfitError::Plot(format!("{}: {}", fname_svg.display(), e)))?;
    let out = fname_svg.display().to_string();
    log::info!("Plotted {}", out);
    Ok(out)
}

/// Several series sharing the axes, non-finite points are left out
pub fn plot_series(series: &[Series], xlab: &str, ylab: &str, fname_svg: &Path) -> Result<String> {
    let points = series.iter().map(|s| s.finite_points()).collect::<Vec<_>>();
    let xs = points.iter().flatten().map(|p| p.0).collect::<Vec<f64>>();
    let ys = points.iter().flatten().map(|p| p.1).collect::<Vec<f64>>();
    let (x_range, y_range) = match (padded_range(&xs), padded_range(&ys)) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(HivfitError::Plot(format!(
                "nothing finite to plot in {}",
                fname_svg.display()
            )))
        }
    };
    let mut view = ContinuousView::new()
        .x_range(x_range.0, x_range.1)
        .y_range(y_range.0, y_range.1)
        .x_label(xlab)
        .y_label(ylab);
    for (s, data) in series.iter().zip(points.into_iter()) {
        if data.is_empty() {
            continue;
        }
        let plot = match s.style {
            SeriesStyle::Points => Plot::new(data).point_style(
                PointStyle::new()
                    .marker(PointMarker::Circle)
                    .colour(s.colour.as_str()),
            ),
            SeriesStyle::Line => {
                Plot::new(data).line_style(LineStyle::new().colour(s.colour.as_str()).width(2.0))
            }
            // plotlib draws no dash patterns, thin lines stand in for them
            SeriesStyle::DashedLine => {
                Plot::new(data).line_style(LineStyle::new().colour(s.colour.as_str()).width(0.8))
            }
        };
        view = view.add(plot);
    }
    save(&view, fname_svg)
}

pub fn plot_scatter_2d(
    x: &Array1<f64>,
    y: &Array1<f64>,
    xlab: &str,
    ylab: &str,
    fname_svg: &Path,
) -> Result<String> {
    if x.len() != y.len() {
        return Err(HivfitError::Dimension(format!(
            "scatter plot of {} x values against {} y values",
            x.len(),
            y.len()
        )));
    }
    plot_series(
        &[Series::new(x, y, SeriesStyle::Points, "#35C788")],
        xlab,
        ylab,
        fname_svg,
    )
}

pub fn plot_histogram_1d(x: &Array1<f64>, nbins: usize, lab: &str, fname_svg: &Path) -> Result<String> {
    let finite = x.iter().copied().filter(|x| x.is_finite()).collect::<Vec<f64>>();
    let (lo, hi) = match padded_range(&finite) {
        Some(r) if nbins > 0 => r,
        _ => {
            return Err(HivfitError::Plot(format!(
                "nothing finite to bin in {}",
                fname_svg.display()
            )))
        }
    };
    let edges = linspace(lo, hi, nbins + 1);
    let max_count = histogram(&finite, &edges).fold(0.0, |m: f64, &c| m.max(c));
    let h = Histogram::from_slice(&finite, HistogramBins::Bounds(edges.to_vec()));
    let view = ContinuousView::new()
        .add(h)
        .x_range(lo, hi)
        .y_range(0.0, max_count.max(1.0) * 1.05)
        .x_label(lab)
        .y_label("Frequency");
    save(&view, fname_svg)
}
