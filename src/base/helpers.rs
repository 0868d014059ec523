use ndarray::prelude::*;
use statrs::statistics::{Data, Median};

use crate::base::*;

pub fn parse_f64_roundup_and_own(x: f64, n_digits: usize) -> String {
    let s = x.to_string();
    if s.len() < n_digits {
        return s;
    }
    match s[0..n_digits].parse::<f64>() {
        Ok(y) => y.to_string(),
        Err(_) => s,
    }
}

/// Time between consecutive samples, counting the first sample from the time of infection
pub fn time_increments(times: &Array1<f64>) -> Array1<f64> {
    let mut dt = times.clone();
    for k in 1..times.len() {
        dt[k] = times[k] - times[k - 1];
    }
    dt
}

/// Covariance across sites of a (time points x sites) matrix
pub fn covariance(x: &Array2<f64>) -> Result<Array2<f64>> {
    let (k, l) = x.dim();
    if l < 2 {
        return Err(HivfitError::InsufficientData(format!(
            "covariance over {} site(s) at {} time points",
            l, k
        )));
    }
    let means = x.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(k));
    let centred = x - &means.insert_axis(Axis(1));
    Ok(centred.dot(&centred.t()) / (l as f64 - 1.0))
}

/// Score at percentile `p` (0-100) with linear interpolation between order statistics
pub fn score_at_percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values
        .iter()
        .filter(|x| !x.is_nan())
        .copied()
        .collect::<Vec<f64>>();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (idx - lo as f64)
}

pub fn median(values: &[f64]) -> f64 {
    let finite = values
        .iter()
        .filter(|x| !x.is_nan())
        .copied()
        .collect::<Vec<f64>>();
    if finite.is_empty() {
        return f64::NAN;
    }
    Data::new(finite).median()
}

/// Moving average over windows of `ws` consecutive values, keeping only complete windows
pub fn running_average(x: &Array1<f64>, ws: usize) -> Array1<f64> {
    let n = x.len();
    if ws == 0 || n < ws {
        return Array1::zeros(0);
    }
    let mut out = Array1::zeros(n - ws + 1);
    let mut sum = x.slice(s![0..ws]).sum();
    out[0] = sum / ws as f64;
    for i in ws..n {
        sum += x[i] - x[i - ws];
        out[i - ws + 1] = sum / ws as f64;
    }
    out
}

pub fn argmax(x: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, v) in x.iter().enumerate() {
        if *v > x[best] {
            best = i;
        }
    }
    best
}

/// Ranks starting at 1, ties receive their average rank
pub fn ranks(x: ArrayView1<f64>) -> Array1<f64> {
    let n = x.len();
    let mut idx = (0..n).collect::<Vec<usize>>();
    idx.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
    let mut out = Array1::zeros(n);
    let mut i = 0;
    while i < n {
        let mut j = i;
        while (j + 1 < n) && (x[idx[j + 1]] == x[idx[i]]) {
            j += 1;
        }
        let r = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            out[idx[k]] = r;
        }
        i = j + 1;
    }
    out
}

pub fn linspace(start: f64, end: f64, n: usize) -> Array1<f64> {
    Array1::linspace(start, end, n)
}

/// Counts of values falling into [edges[i], edges[i+1]), the last bin being closed
pub fn histogram(values: &[f64], edges: &Array1<f64>) -> Array1<f64> {
    let nbins = edges.len().saturating_sub(1);
    let mut counts = Array1::zeros(nbins);
    for &v in values {
        if v.is_nan() {
            continue;
        }
        for i in 0..nbins {
            let last = i + 1 == nbins;
            if (v >= edges[i]) && ((v < edges[i + 1]) || (last && v <= edges[i + 1])) {
                counts[i] += 1.0;
                break;
            }
        }
    }
    counts
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n == 0.0 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| x * x).sum::<f64>() / n - mean * mean;
    var.max(0.0).sqrt()
}
