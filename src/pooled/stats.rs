use ndarray::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::base::*;

pub fn pearsons_correlation(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> Result<Correlation> {
    let n = x.len();
    if n != y.len() {
        return Err(HivfitError::Dimension(format!(
            "correlation of vectors of length {} and {}",
            n,
            y.len()
        )));
    }
    if n < 3 {
        return Err(HivfitError::InsufficientData(format!(
            "correlation over {} pair(s)",
            n
        )));
    }
    let mu_x = x.sum() / n as f64;
    let mu_y = y.sum() / n as f64;
    let x_less_mu_x = x.map(|x| x - mu_x);
    let y_less_mu_y = y.map(|y| y - mu_y);
    let numerator = (&x_less_mu_x * &y_less_mu_y).sum();
    let denominator =
        x_less_mu_x.mapv(|x| x.powi(2)).sum().sqrt() * y_less_mu_y.mapv(|y| y.powi(2)).sum().sqrt();
    let r_tmp = numerator / denominator;
    let r = match r_tmp.is_nan() {
        true => 0.0,
        false => r_tmp,
    };
    let sigma_r_denominator = (1.0 - r.powi(2)) / (n as f64 - 2.0);
    if sigma_r_denominator <= 0.0 {
        // No spread around the regression line
        return Ok(Correlation {
            r,
            pval: f64::EPSILON,
        });
    }
    let t = r / sigma_r_denominator.sqrt();
    let d = StudentsT::new(0.0, 1.0, n as f64 - 2.0)
        .map_err(|e| HivfitError::InvalidArgument(e.to_string()))?;
    let pval = 2.00 * (1.00 - d.cdf(t.abs()));
    Ok(Correlation { r, pval })
}

/// Pearson's correlation of the ranks, ties sharing their average rank
pub fn spearmans_correlation(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> Result<Correlation> {
    if x.len() != y.len() {
        return Err(HivfitError::Dimension(format!(
            "correlation of vectors of length {} and {}",
            x.len(),
            y.len()
        )));
    }
    pearsons_correlation(&ranks(x.view()).view(), &ranks(y.view()).view())
}

/// Pairs where both values are finite
pub fn finite_pairs(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> (Array1<f64>, Array1<f64>) {
    let (a, b): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .unzip();
    (Array1::from_vec(a), Array1::from_vec(b))
}

/// Selection coefficients under mutation-selection balance, NaN where the minor frequency is unknown
pub fn selection_coefficients(minor: &Array1<f64>, mutation_rate: f64, af_cutoff: f64) -> Array1<f64> {
    minor.mapv(|x| mutation_rate / (af_cutoff + x))
}

// Median of the values whose covariate falls in [lo, hi)
fn binned_median(covariate: &[f64], values: &[f64], lo: f64, hi: f64) -> (f64, usize) {
    let picked = covariate
        .iter()
        .zip(values.iter())
        .filter(|&(&c, _)| (c >= lo) && (c < hi))
        .map(|(_, &v)| v)
        .collect::<Vec<f64>>();
    (median(&picked), picked.len())
}

/// Median selection coefficient within `n_bins` cross-sectional entropy percentile bins,
/// over all sites and per codon position (site index modulo 3).
/// Columns: bin centre (median entropy), median over all sites, codon positions 0 to 2,
/// followed by the matching site counts.
pub fn selection_by_entropy(entropy: &Array1<f64>, s: &Array1<f64>, n_bins: usize) -> Result<Array2<f64>> {
    if entropy.len() != s.len() {
        return Err(HivfitError::Dimension(format!(
            "{} entropies for {} selection coefficients",
            entropy.len(),
            s.len()
        )));
    }
    if n_bins == 0 {
        return Err(HivfitError::InvalidArgument(
            "The number of entropy bins must be positive.".to_owned(),
        ));
    }
    let all_e = entropy.to_vec();
    let all_s = s.to_vec();
    let by_codon = (0..3)
        .map(|cp| {
            let idx = (0..entropy.len()).filter(|i| i % 3 == cp).collect::<Vec<usize>>();
            (
                idx.iter().map(|&i| entropy[i]).collect::<Vec<f64>>(),
                idx.iter().map(|&i| s[i]).collect::<Vec<f64>>(),
            )
        })
        .collect::<Vec<(Vec<f64>, Vec<f64>)>>();
    let mut out: Array2<f64> = Array2::zeros((n_bins, 9));
    for b in 0..n_bins {
        let (p_lo, p_up) = (
            100.0 * b as f64 / n_bins as f64,
            100.0 * (b + 1) as f64 / n_bins as f64,
        );
        let (lo, hi) = (
            score_at_percentile(&all_e, p_lo),
            score_at_percentile(&all_e, p_up),
        );
        let in_bin = all_e
            .iter()
            .copied()
            .filter(|&e| (e >= lo) && (e < hi))
            .collect::<Vec<f64>>();
        out[(b, 0)] = median(&in_bin);
        let (m, c) = binned_median(&all_e, &all_s, lo, hi);
        out[(b, 1)] = m;
        out[(b, 5)] = c as f64;
        for (cp, (e, v)) in by_codon.iter().enumerate() {
            let (lo, hi) = (score_at_percentile(e, p_lo), score_at_percentile(e, p_up));
            let (m, c) = binned_median(e, v, lo, hi);
            out[(b, 2 + cp)] = m;
            out[(b, 6 + cp)] = c as f64;
        }
    }
    Ok(out)
}

/// Fraction of sites at each codon position among sites with 1 to 4 observed nucleotides
/// (frequency above `threshold`). Rows are the number of nucleotides, the last column the site count.
pub fn codon_position_fractions(af: &Array2<f64>, threshold: f64) -> Array2<f64> {
    let n_observed = observed_nucleotides(af, threshold);
    let mut out: Array2<f64> = Array2::zeros((N_NUCLEOTIDES, 5));
    for ni in 1..=N_NUCLEOTIDES {
        let row = ni - 1;
        out[(row, 0)] = ni as f64;
        let mut counts = [0.0; 3];
        for (i, &n) in n_observed.iter().enumerate() {
            if n == ni {
                counts[i % 3] += 1.0;
            }
        }
        let total: f64 = counts.iter().sum();
        for cp in 0..3 {
            out[(row, 1 + cp)] = if total > 0.0 { counts[cp] / total } else { f64::NAN };
        }
        out[(row, 4)] = total;
    }
    out
}

/// Number of nucleotides above `threshold` at every site
pub fn observed_nucleotides(af: &Array2<f64>, threshold: f64) -> Array1<usize> {
    af.map_axis(Axis(0), |col| {
        col.slice(s![0..N_NUCLEOTIDES])
            .iter()
            .filter(|&&f| f > threshold)
            .count()
    })
}

/// Cross-sectional entropy of the sites with 1, 2, 3 and 4 observed nucleotides
pub fn entropy_by_observed_nucleotides(
    xs: &Array1<f64>,
    af: &Array2<f64>,
    threshold: f64,
) -> Result<Vec<Vec<f64>>> {
    if xs.len() != af.ncols() {
        return Err(HivfitError::Dimension(format!(
            "{} entropies for {} sites",
            xs.len(),
            af.ncols()
        )));
    }
    let n_observed = observed_nucleotides(af, threshold);
    Ok((1..=N_NUCLEOTIDES)
        .map(|ni| {
            xs.iter()
                .zip(n_observed.iter())
                .filter(|&(x, &n)| (n == ni) && x.is_finite())
                .map(|(&x, _)| x)
                .collect::<Vec<f64>>()
        })
        .collect())
}

/// Normalised density of log-spaced entropy bins per number of observed nucleotides.
/// Rows are bins: upper edge, then the density of 1..4 observed nucleotides (NaN for empty groups).
pub fn entropy_histogram(groups: &[Vec<f64>], edges: &Array1<f64>) -> Array2<f64> {
    let nbins = edges.len().saturating_sub(1);
    let mut out: Array2<f64> = Array2::zeros((nbins, groups.len() + 1));
    for b in 0..nbins {
        out[(b, 0)] = edges[b + 1];
    }
    for (g, values) in groups.iter().enumerate() {
        let counts = histogram(values, edges);
        let total = counts.sum();
        for b in 0..nbins {
            out[(b, g + 1)] = if total > 0.0 {
                counts[b] / (edges[b + 1] - edges[b]) / total
            } else {
                f64::NAN
            };
        }
    }
    out
}

/// Minimum, median and maximum across replicates of every site, rows sorted by the median.
/// Sites without data in any replicate are left out.
pub fn replicate_extrema(replicates: &[Array1<f64>]) -> Array2<f64> {
    let n_sites = replicates.first().map(|x| x.len()).unwrap_or(0);
    let mut rows: Vec<[f64; 3]> = vec![];
    for l in 0..n_sites {
        let values = replicates.iter().map(|x| x[l]).collect::<Vec<f64>>();
        if values.iter().any(|x| x.is_nan()) {
            continue;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        rows.push([min, median(&values), max]);
    }
    rows.sort_by(|a, b| a[1].total_cmp(&b[1]));
    let mut out: Array2<f64> = Array2::zeros((rows.len(), 3));
    for (i, r) in rows.iter().enumerate() {
        out.row_mut(i).assign(&ArrayView1::from(&r[..]));
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionConsistency {
    pub spearman: Correlation,
    pub difference_std: f64,
    pub single_std: (f64, f64),
    pub n_sites: usize,
}

/// Agreement of minor frequencies estimated from two disjoint halves of the cohort,
/// on log10 scale over the sites observed in both halves
pub fn partition_consistency(a: &Array1<f64>, b: &Array1<f64>) -> Result<PartitionConsistency> {
    let (x, y) = finite_pairs(&a.view(), &b.view());
    let keep = x
        .iter()
        .zip(y.iter())
        .enumerate()
        .filter(|&(_, (&u, &v))| (u > 0.0) && (v > 0.0))
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();
    let x = x.select(Axis(0), &keep).mapv(|u| u + 1e-6);
    let y = y.select(Axis(0), &keep).mapv(|v| v + 1e-6);
    let spearman = spearmans_correlation(&x.view(), &y.view())?;
    let lx = x.mapv(f64::log10);
    let ly = y.mapv(f64::log10);
    let diff = &lx - &ly;
    Ok(PartitionConsistency {
        spearman,
        difference_std: std_dev(&diff.to_vec()),
        single_std: (std_dev(&lx.to_vec()), std_dev(&ly.to_vec())),
        n_sites: keep.len(),
    })
}

/// Empirical cumulative distribution: sorted finite values against linearly spaced probabilities
pub fn empirical_cdf(values: &[f64]) -> (Array1<f64>, Array1<f64>) {
    let mut sorted = values
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .collect::<Vec<f64>>();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    (Array1::from_vec(sorted), linspace(0.0, 1.0, n))
}
