use ndarray::prelude::*;
use std::path::Path;

use crate::base::*;
use crate::io::write_table;
use crate::noncoding::*;
use crate::plot::*;
use crate::pooled::{pearsons_correlation, pool_region, selection_coefficients};

pub const S_MIN: f64 = 0.001;
pub const S_MAX: f64 = 0.1;
/// Running average window of the genome plots
pub const RUNNING_WINDOW: usize = 8;
/// Window of the pairing probability correlation
pub const PAIRING_WINDOW: usize = 100;

// Regions plotted in detail: start, stop, features and whether the synonymous average is shown.
// There is no synonymous average in the frame shift since gag and pol overlap there.
const DETAIL_WINDOWS: [(usize, usize, &[&str], bool); 3] = [
    (500, 900, &["polyA", "U5", "U5 stem", "PBS", "PSI SL1-4"], true),
    (2050, 2150, &["frame shift"], false),
    (9050, 9150, &["polypurine"], true),
];

/// Selection coefficients clipped to [S_MIN, S_MAX], NaN where unknown
pub fn clipped_selection(minor: &Array1<f64>, mutation_rate: f64, af_cutoff: f64) -> Array1<f64> {
    selection_coefficients(minor, mutation_rate, af_cutoff).mapv(|x| x.clamp(S_MIN, S_MAX))
}

/// Running geometric mean of the finite selection coefficients at the sites picked by `keep`,
/// with the matching running mean position
pub fn geometric_running_average(
    positions: &Array1<f64>,
    s: &Array1<f64>,
    keep: &[bool],
    ws: usize,
) -> (Array1<f64>, Array1<f64>) {
    let idx = (0..s.len())
        .filter(|&i| keep[i] && s[i].is_finite())
        .collect::<Vec<usize>>();
    let x = running_average(&positions.select(Axis(0), &idx), ws);
    let y = running_average(&s.select(Axis(0), &idx).mapv(f64::ln), ws).mapv(f64::exp);
    (x, y)
}

/// Pearson correlation of pairing probability and selection coefficient in sliding windows of `ws`
/// sites starting at every position; zero where no more than half of the window has an estimate.
/// Rows are window centre and correlation.
pub fn pairing_correlation(pairing: &Array1<f64>, s: &Array1<f64>, ws: usize) -> Result<Array2<f64>> {
    if pairing.len() != s.len() {
        return Err(HivfitError::Dimension(format!(
            "{} pairing probabilities for {} selection coefficients",
            pairing.len(),
            s.len()
        )));
    }
    let n = s.len().saturating_sub(ws);
    let mut out: Array2<f64> = Array2::zeros((n, 2));
    for ii in 0..n {
        let idx = (ii..ii + ws)
            .filter(|&i| s[i].is_finite() && pairing[i].is_finite())
            .collect::<Vec<usize>>();
        out[(ii, 0)] = ii as f64 + 0.5 * ws as f64;
        if idx.len() as f64 > 0.5 * ws as f64 {
            let x = pairing.select(Axis(0), &idx);
            let y = s.select(Axis(0), &idx);
            out[(ii, 1)] = match pearsons_correlation(&x.view(), &y.view()) {
                Ok(c) => c.r,
                Err(_) => 0.0,
            };
        }
    }
    Ok(out)
}

fn in_window(x: &Array1<f64>, y: &Array1<f64>, start: usize, stop: usize) -> (Array1<f64>, Array1<f64>) {
    let idx = (0..x.len())
        .filter(|&i| (x[i] >= start as f64) && (x[i] <= stop as f64))
        .collect::<Vec<usize>>();
    (x.select(Axis(0), &idx), y.select(Axis(0), &idx))
}

fn plot_window(
    start: usize,
    stop: usize,
    feature_names: &[&str],
    positions: &Array1<f64>,
    s: &Array1<f64>,
    running_all: &(Array1<f64>, Array1<f64>),
    running_syn: Option<&(Array1<f64>, Array1<f64>)>,
    fname_svg: &Path,
) -> Result<String> {
    let mut series: Vec<Series> = vec![];
    let (x, y) = in_window(positions, s, start, stop);
    series.push(Series::new(&x, &y.mapv(f64::log10), SeriesStyle::Points, PALETTE[0]));
    let (x, y) = in_window(&running_all.0, &running_all.1, start, stop);
    series.push(Series::new(&x, &y.mapv(f64::log10), SeriesStyle::Line, PALETTE[0]));
    if let Some(syn) = running_syn {
        let (x, y) = in_window(&syn.0, &syn.1, start, stop);
        series.push(Series::new(&x, &y.mapv(f64::log10), SeriesStyle::DashedLine, PALETTE[0]));
    }
    // Features as horizontal bars above the estimates
    let bar = Array1::from_elem(2, 0.12f64.log10());
    for (fi, name) in feature_names.iter().enumerate() {
        for &(a, b) in feature(name)?.iter() {
            series.push(Series::new(
                &Array1::from_vec(vec![a as f64 - 1.0, b as f64 - 1.0]),
                &bar,
                SeriesStyle::Line,
                PALETTE[(2 + fi) % PALETTE.len()],
            ));
        }
    }
    plot_series(
        &series,
        "HXB2 position",
        "log10 selection coefficient [1/day]",
        fname_svg,
    )
}

/// Genome-wide fitness costs around non-coding elements and their correlation with RNA pairing
pub fn run_noncoding(cohort: &Cohort, settings: &PooledSettings, outdir: &Path) -> Result<Vec<String>> {
    let pooled = pool_region(cohort, GENOMEWIDE, settings)?;
    let n = pooled.minor.len();
    let s = clipped_selection(&pooled.minor, settings.mutation_rate, settings.af_cutoff);
    let positions = Array1::from_shape_fn(n, |l| (pooled.start + l) as f64);
    let (start, end) = (pooled.start, pooled.start + n);
    let synonymous = match &cohort.reference.synonymous {
        Some(x) => x
            .get(start..end)
            .map(|v| v.to_vec())
            .ok_or_else(|| {
                HivfitError::Dimension(format!(
                    "synonymous annotation of {} positions for sites up to {}",
                    x.len(),
                    end
                ))
            })?,
        None => {
            log::warn!("No synonymous site annotation in the reference, using every site");
            vec![true; n]
        }
    };
    let mut out: Vec<String> = vec![];

    let mut per_site: Array2<f64> = Array2::zeros((n, 3));
    per_site.column_mut(0).assign(&positions);
    per_site.column_mut(1).assign(&s);
    per_site
        .column_mut(2)
        .assign(&synonymous.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect::<Array1<f64>>());
    out.push(write_table(
        &outdir.join("noncoding_selection_coefficients.txt"),
        &["position".to_owned(), "s".to_owned(), "synonymous".to_owned()],
        &[format!("clipped to [{}, {}]", S_MIN, S_MAX)],
        &per_site,
    )?);

    let running_all = geometric_running_average(&positions, &s, &vec![true; n], RUNNING_WINDOW);
    let running_syn = geometric_running_average(&positions, &s, &synonymous, RUNNING_WINDOW);
    for (label, (x, y)) in [("all", &running_all), ("synonymous", &running_syn)] {
        let mut table: Array2<f64> = Array2::zeros((x.len(), 2));
        table.column_mut(0).assign(x);
        table.column_mut(1).assign(y);
        out.push(write_table(
            &outdir.join(format!("noncoding_running_average_{}.txt", label)),
            &["position".to_owned(), "s".to_owned()],
            &[format!("geometric mean over {} sites", RUNNING_WINDOW)],
            &table,
        )?);
    }

    let (names, summary) = feature_summary(&Array1::from_shape_fn(end, |p| {
        if p >= start {
            s[p - start]
        } else {
            f64::NAN
        }
    }));
    out.push(write_table(
        &outdir.join("noncoding_features.txt"),
        &[
            "first".to_owned(),
            "last".to_owned(),
            "n_sites".to_owned(),
            "median_s".to_owned(),
        ],
        &["rows: ".to_owned() + &names.join(", ")],
        &summary,
    )?);

    match &cohort.reference.pairing {
        Some(pairing) if pairing.len() >= end => {
            let pp = pairing.slice(s![start..end]).to_owned();
            let correlation = pairing_correlation(&pp, &s, PAIRING_WINDOW)?;
            out.push(write_table(
                &outdir.join("pairing_fitness_correlation.txt"),
                &["centre".to_owned(), "r".to_owned()],
                &[format!("{} site windows", PAIRING_WINDOW)],
                &correlation,
            )?);
            if correlation.nrows() > 0 {
                out.push(plot_series(
                    &[Series::new(
                        &(correlation.column(0).to_owned() + start as f64),
                        &correlation.column(1).to_owned(),
                        SeriesStyle::Line,
                        PALETTE[0],
                    )],
                    "HXB2 position",
                    "fitness cost / RNA pairing correlation",
                    &outdir.join("pairing_fitness_correlation.svg"),
                )?);
            }
        }
        _ => log::warn!("No pairing probabilities for the pooled sites, skipping their correlation"),
    }

    for (w_start, w_stop, feature_names, with_syn) in DETAIL_WINDOWS.iter() {
        if (*w_stop <= start) || (*w_start >= end) {
            log::info!("Window {}-{} lies outside the pooled region", w_start, w_stop);
            continue;
        }
        out.push(plot_window(
            *w_start,
            *w_stop,
            feature_names,
            &positions,
            &s,
            &running_all,
            if *with_syn { Some(&running_syn) } else { None },
            &outdir.join(format!("noncoding_{}_{}.svg", w_start, w_stop)),
        )?);
    }
    Ok(out)
}
