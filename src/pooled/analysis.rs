use ndarray::prelude::*;
use rand::rngs::StdRng;
use std::path::Path;

use crate::base::*;
use crate::io::write_table;
use crate::plot::*;
use crate::pooled::*;

// Cross-sectional entropy bins of the selection coefficient summary
const N_ENTROPY_BINS: usize = 5;
// Frequency above which a nucleotide counts as observed
const OBSERVED_FREQUENCY: f64 = 1e-4;

fn to_strings(x: &[&str]) -> Vec<String> {
    x.iter().map(|s| s.to_string()).collect()
}

/// Pooled frequency analysis of one region: per-site table, correlation with cross-sectional
/// entropy, selection coefficients by entropy bin, bootstrap and partition noise.
pub fn run_pooled(
    cohort: &Cohort,
    region: &str,
    settings: &PooledSettings,
    rng: &mut StdRng,
    outdir: &Path,
) -> Result<Vec<String>> {
    let pooled = pool_region(cohort, region, settings)?;
    let xs = cohort.reference.region_entropy(region)?;
    let n = xs.len();
    let s = selection_coefficients(&pooled.minor, settings.mutation_rate, settings.af_cutoff);
    let mut out: Vec<String> = vec![];

    // Per site
    let mut per_site: Array2<f64> = Array2::zeros((n, 5));
    for l in 0..n {
        per_site[(l, 0)] = (pooled.start + l) as f64;
        per_site[(l, 1)] = pooled.entropy[l];
        per_site[(l, 2)] = pooled.minor[l];
        per_site[(l, 3)] = xs[l];
        per_site[(l, 4)] = s[l];
    }
    out.push(write_table(
        &outdir.join(format!("{}_pooled_selection_coefficients.txt", region)),
        &to_strings(&["position", "pooled_entropy", "minor_af", "xs_entropy", "s"]),
        &[format!(
            "mutation rate {:e}, af cutoff {:e}, {} patients",
            settings.mutation_rate,
            settings.af_cutoff,
            pooled.by_patient.len()
        )],
        &per_site,
    )?);

    // Pooled against cross-sectional entropy
    let (pe, xe) = finite_pairs(&pooled.entropy.view(), &xs.view());
    let pearson = pearsons_correlation(&pe.view(), &xe.view())?;
    let spearman = spearmans_correlation(&pe.view(), &xe.view())?;
    log::info!(
        "{}: Pearson r = {} (p = {:e}), Spearman rho = {} (p = {:e})",
        region,
        parse_f64_roundup_and_own(pearson.r, 6),
        pearson.pval,
        parse_f64_roundup_and_own(spearman.r, 6),
        spearman.pval
    );
    let correlations = Array2::from_shape_vec(
        (2, 3),
        vec![
            pearson.r,
            pearson.pval,
            pe.len() as f64,
            spearman.r,
            spearman.pval,
            pe.len() as f64,
        ],
    )?;
    out.push(write_table(
        &outdir.join(format!("{}_pooled_correlations.txt", region)),
        &to_strings(&["r", "pval", "n"]),
        &["rows: Pearson, Spearman".to_owned()],
        &correlations,
    )?);
    out.push(plot_scatter_2d(
        &pe.mapv(|x| (x + 1e-5).log10()),
        &xe.mapv(|x| (x + 1e-3).log10()),
        "log10 pooled within patient entropy",
        "log10 cross-sectional entropy",
        &outdir.join(format!("{}_entropy_scatter.svg", region)),
    )?);

    // Replicates
    let boot = bootstrap_replicates(&pooled, settings.n_bootstraps, rng)?;
    let mut binned = selection_by_entropy(&xs, &s, N_ENTROPY_BINS)?;
    let boot_binned = boot
        .iter()
        .map(|x| {
            selection_by_entropy(
                &xs,
                &selection_coefficients(&x.minor, settings.mutation_rate, settings.af_cutoff),
                N_ENTROPY_BINS,
            )
        })
        .collect::<Result<Vec<Array2<f64>>>>()?;
    let boot_std = Array1::from_shape_fn(N_ENTROPY_BINS, |b| {
        std_dev(
            &boot_binned
                .iter()
                .map(|x| x[(b, 1)])
                .filter(|x| x.is_finite())
                .collect::<Vec<f64>>(),
        )
    });
    binned.push_column(boot_std.view())?;
    out.push(write_table(
        &outdir.join(format!("{}_pooled_s_by_entropy.txt", region)),
        &to_strings(&[
            "entropy", "s_all", "s_cp0", "s_cp1", "s_cp2", "n_all", "n_cp0", "n_cp1", "n_cp2",
            "s_all_std",
        ]),
        &[format!("{} bootstrap replicates", boot.len())],
        &binned,
    )?);
    out.push(write_table(
        &outdir.join(format!("{}_pooled_codon_positions.txt", region)),
        &to_strings(&["n_nucleotides", "cp0", "cp1", "cp2", "n_sites"]),
        &[],
        &codon_position_fractions(&pooled.combined, OBSERVED_FREQUENCY),
    )?);
    let groups = entropy_by_observed_nucleotides(&xs, &pooled.combined, OBSERVED_FREQUENCY)?;
    out.push(write_table(
        &outdir.join(format!("{}_entropy_histogram.txt", region)),
        &to_strings(&["upper_edge", "nuc1", "nuc2", "nuc3", "nuc4"]),
        &["density of cross-sectional entropy by number of observed nucleotides".to_owned()],
        &entropy_histogram(&groups, &linspace(-2.7, 0.3, 21).mapv(|x| 10f64.powf(x))),
    )?);
    for (i, values) in groups.iter().enumerate() {
        if values.is_empty() {
            log::info!("{}: no site with {} observed nucleotide(s)", region, i + 1);
            continue;
        }
        out.push(plot_histogram_1d(
            &values.iter().map(|x| (x + 1e-3).log10()).collect::<Array1<f64>>(),
            20,
            "log10 cross-sectional entropy",
            &outdir.join(format!("{}_entropy_histogram_{}nuc.svg", region, i + 1)),
        )?);
    }
    let extrema = replicate_extrema(&boot.iter().map(|x| x.minor.clone()).collect::<Vec<_>>());
    out.push(write_table(
        &outdir.join(format!("{}_pooled_bootstrap_extrema.txt", region)),
        &to_strings(&["minimum", "median", "maximum"]),
        &["sites sorted by median".to_owned()],
        &extrema,
    )?);
    if extrema.nrows() > 0 {
        let index = Array1::from_shape_fn(extrema.nrows(), |i| i as f64);
        let series = (0..3)
            .map(|j| {
                Series::new(
                    &index,
                    &extrema.column(j).mapv(|x| (x + 1e-6).log10()),
                    SeriesStyle::Line,
                    PALETTE[j],
                )
            })
            .collect::<Vec<Series>>();
        out.push(plot_series(
            &series,
            "positions sorted by median",
            "log10 minor frequency",
            &outdir.join(format!("{}_frequency_noise.svg", region)),
        )?);
    }
    match partition_replicates(&pooled, settings.n_bootstraps, rng) {
        Ok(parts) => {
            let mut rows: Vec<f64> = vec![];
            let mut n_rows = 0;
            for (a, b) in parts.iter() {
                match partition_consistency(&a.minor, &b.minor) {
                    Ok(c) => {
                        rows.extend([
                            c.spearman.r,
                            c.spearman.pval,
                            c.difference_std,
                            c.single_std.0,
                            c.single_std.1,
                            c.n_sites as f64,
                        ]);
                        n_rows += 1;
                    }
                    Err(e) => log::debug!("Partition left out: {}", e),
                }
            }
            out.push(write_table(
                &outdir.join(format!("{}_pooled_partition.txt", region)),
                &to_strings(&["spearman_r", "pval", "difference_std", "std_a", "std_b", "n"]),
                &[],
                &Array2::from_shape_vec((n_rows, 6), rows)?,
            )?);
        }
        Err(e) => log::warn!("No partition replicates for {}: {}", region, e),
    }

    // Distributions per codon position
    let mut minor_series: Vec<Series> = vec![];
    let mut s_series: Vec<Series> = vec![];
    for cp in 0..3 {
        let minor_cp = pooled
            .minor
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 3 == cp)
            .map(|(_, &x)| x)
            .collect::<Vec<f64>>();
        let (x, p) = empirical_cdf(&minor_cp);
        minor_series.push(Series::new(
            &x.mapv(|x| (x + 1e-5).log10()),
            &p,
            SeriesStyle::Line,
            PALETTE[cp],
        ));
        let s_cp = s
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 3 == cp)
            .map(|(_, &x)| x)
            .collect::<Vec<f64>>();
        let (x, p) = empirical_cdf(&s_cp);
        s_series.push(Series::new(
            &x.mapv(f64::log10),
            &p.mapv(|p| 1.0 - p),
            SeriesStyle::Line,
            PALETTE[cp],
        ));
    }
    let (x, p) = empirical_cdf(&s.to_vec());
    s_series.push(Series::new(
        &x.mapv(f64::log10),
        &p.mapv(|p| 1.0 - p),
        SeriesStyle::DashedLine,
        PALETTE[3],
    ));
    out.push(plot_series(
        &minor_series,
        "log10 minor frequency",
        "P(nu < X)",
        &outdir.join(format!("{}_minor_af.svg", region)),
    )?);
    out.push(plot_series(
        &s_series,
        "log10 selection coefficient",
        "P(s > X)",
        &outdir.join(format!("{}_sel_coeff.svg", region)),
    )?);
    Ok(out)
}
