use ndarray::prelude::*;
use std::collections::HashSet;

use crate::base::*;

impl QuantileSettings {
    pub fn new(q: usize) -> Self {
        QuantileSettings {
            q,
            xcut: 0.0,
            xcut_up: 0.0,
            divergence: false,
            remove_outliers: true,
            outlier_cutoff: 0.5,
        }
    }
}

/// Major nucleotide of every site at the first sample
pub fn initial_consensus(trajectory: &Trajectory) -> Vec<usize> {
    (0..trajectory.n_sites())
        .map(|l| {
            argmax(
                trajectory
                    .frequencies
                    .slice(s![0, 0..N_NUCLEOTIDES, l]),
            )
        })
        .collect()
}

/// Time-weighted average frequency of the initial consensus at every site
pub fn average_consensus_frequency(trajectory: &Trajectory, consensus: &[usize]) -> Array1<f64> {
    let dt = time_increments(&trajectory.times);
    let t_last = trajectory.times[trajectory.times.len() - 1];
    Array1::from_shape_fn(trajectory.n_sites(), |l| {
        let x = trajectory
            .frequencies
            .slice(s![.., consensus[l], l])
            .to_owned();
        dt.dot(&x) / t_last
    })
}

/// Per-quantile site means and covariances of divergence from the initial consensus
pub fn prepare_quantiles(
    trajectory: &Trajectory,
    map: &PatientMap,
    quantiles: &[EntropyQuantile],
    settings: &QuantileSettings,
) -> Result<QuantileData> {
    let complete = trajectory.complete_samples();
    let removed = trajectory.times.len() - complete.times.len();
    if removed > 0 {
        log::info!(
            "Removing {} time point(s) out of {} with low coverage sites",
            removed,
            trajectory.times.len()
        );
    }
    let k = complete.times.len();
    if k == 0 {
        return Err(HivfitError::InsufficientData(
            "no sample covers every site of the region".to_owned(),
        ));
    }
    let l = complete.n_sites();
    let consensus = initial_consensus(&complete);
    let xave = average_consensus_frequency(&complete, &consensus);
    let keep = xave
        .iter()
        .map(|&x| (x <= 1.0 - settings.xcut) && (x > settings.xcut_up))
        .collect::<Vec<bool>>();

    let q = quantiles.len();
    let mut site_means: Array2<f64> = Array2::zeros((q, k));
    let mut covariances: Array3<f64> = Array3::zeros((q, k, k));
    let mut site_counts: Vec<usize> = vec![];
    let mut sites: Vec<Array2<f64>> = vec![];
    for (jq, quantile) in quantiles.iter().enumerate() {
        let in_quantile = quantile.positions.iter().copied().collect::<HashSet<usize>>();
        let idx = map
            .rows
            .iter()
            .filter(|(r, p)| in_quantile.contains(r) && (*p < l) && keep[*p])
            .map(|(_, p)| *p)
            .collect::<Vec<usize>>();
        let mut x_ka: Array2<f64> = Array2::from_shape_fn((k, idx.len()), |(i, a)| {
            let f = complete.frequencies[(i, consensus[idx[a]], idx[a])];
            if settings.divergence {
                (1.0 - f) * f
            } else {
                1.0 - f
            }
        });
        if settings.remove_outliers {
            let inliers = (0..x_ka.ncols())
                .filter(|&a| x_ka.column(a).iter().all(|&x| x <= settings.outlier_cutoff))
                .collect::<Vec<usize>>();
            x_ka = x_ka.select(Axis(1), &inliers);
        }
        if x_ka.ncols() < 2 {
            return Err(HivfitError::InsufficientData(format!(
                "{} site(s) in entropy quantile {}",
                x_ka.ncols(),
                jq + 1
            )));
        }
        site_means
            .row_mut(jq)
            .assign(&x_ka.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(k)));
        covariances
            .index_axis_mut(Axis(0), jq)
            .assign(&covariance(&x_ka)?);
        site_counts.push(x_ka.ncols());
        sites.push(x_ka);
    }
    Ok(QuantileData {
        times: complete.times.clone(),
        site_means,
        covariances,
        site_counts,
        sites,
    })
}
