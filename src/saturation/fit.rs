use ndarray::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::path::Path;

use crate::base::*;
use crate::bootstrap::patient_bootstrap;
use crate::io::write_table;
use crate::kl::{mean_trajectory, small_s_threshold};
use crate::optim::minimise;
use crate::plot::*;
use crate::quantiles::*;

// Site-mean trajectory of one quantile in one patient
#[derive(Debug, Clone)]
pub struct QuantileTrajectory {
    pub times: Array1<f64>,
    pub values: Array1<f64>,
}

/// Relative squared deviation of the pooled trajectories from mu/s (1 - exp(-s t)).
/// The single parameter is the square root of s.
#[derive(Debug, Clone)]
pub struct SaturationObjective {
    pub trajectories: Vec<QuantileTrajectory>,
    pub mutation_rate: f64,
    pub threshold: f64,
    pub norm: f64,
}

impl SaturationObjective {
    pub fn new(trajectories: Vec<QuantileTrajectory>, mutation_rate: f64) -> Result<Self> {
        let n_points = trajectories.iter().map(|x| x.times.len()).sum::<usize>();
        if n_points == 0 {
            return Err(HivfitError::InsufficientData(
                "no time points to fit the saturation curve to".to_owned(),
            ));
        }
        let dt_min = trajectories
            .iter()
            .map(|x| small_s_threshold(&x.times))
            .fold(0.0, f64::max);
        let norm = trajectories
            .iter()
            .map(|x| x.values.mapv(|v| v.powi(2)).sum())
            .sum::<f64>();
        Ok(SaturationObjective {
            trajectories,
            mutation_rate,
            threshold: dt_min,
            norm: if norm > 0.0 { norm } else { 1.0 },
        })
    }
}

impl Objective for SaturationObjective {
    fn n_params(&self) -> usize {
        1
    }
    fn evaluate(&self, params: &[f64]) -> f64 {
        let s = params[0].powi(2);
        self.trajectories
            .iter()
            .map(|x| {
                let b = mean_trajectory(&x.times, s, self.mutation_rate, self.threshold);
                (&x.values - &b).mapv(|r| r.powi(2)).sum()
            })
            .sum::<f64>()
            / self.norm
    }
}

/// Selection coefficient of the saturation curve through the pooled trajectories at fixed mu
pub fn fit_saturation(
    trajectories: &[QuantileTrajectory],
    mutation_rate: f64,
    optimizer: Optimizer,
    max_iters: usize,
) -> Result<f64> {
    let objective = SaturationObjective::new(trajectories.to_vec(), mutation_rate)?;
    let settings = SimplexSettings {
        edges: Array1::from_elem(1, 0.05),
        tol_x: 1e-10,
        tol_f: 1e-12,
        max_iters,
    };
    let res = minimise(objective, &Array1::from_elem(1, 0.1), &settings, optimizer)?;
    Ok(res.x[0].powi(2))
}

/// Saturation fit per entropy quantile with the patient bootstrap standard deviation
pub fn run_saturation(
    cohort: &Cohort,
    region: &str,
    quantile_settings: &QuantileSettings,
    mutation_rate: f64,
    n_bootstraps: usize,
    optimizer: Optimizer,
    max_iters: usize,
    rng: &mut StdRng,
    outdir: &Path,
) -> Result<Vec<String>> {
    let q = quantile_settings.q;
    let quantiles = entropy_quantiles(&cohort.reference.entropy, q)?;
    let medians = quantile_entropy_medians(&cohort.reference.entropy, &quantiles);
    let mut per_patient: Vec<QuantileData> = vec![];
    for patient in cohort.patients.iter() {
        let data = match (patient.trajectories.get(region), patient.maps.get(region)) {
            (Some(t), Some(m)) => prepare_quantiles(t, m, &quantiles, quantile_settings),
            _ => Err(HivfitError::InsufficientData(format!("no {} trajectory", region))),
        };
        match data {
            Ok(x) => per_patient.push(x),
            Err(e) => log::warn!("Skipping patient {}: {}", patient.name, e),
        }
    }
    if per_patient.is_empty() {
        return Err(HivfitError::InsufficientData(format!(
            "no patient has quantile data in region {}",
            region
        )));
    }
    let mut table: Array2<f64> = Array2::zeros((q, 4));
    let mut series: Vec<Series> = vec![];
    let t_max = per_patient
        .iter()
        .map(|x| x.times[x.times.len() - 1])
        .fold(0.0, f64::max);
    let tt = linspace(0.0, t_max, 100);
    for jq in 0..q {
        let trajectories = per_patient
            .iter()
            .map(|x| QuantileTrajectory {
                times: x.times.clone(),
                values: x.site_means.row(jq).to_owned(),
            })
            .collect::<Vec<QuantileTrajectory>>();
        let s = fit_saturation(&trajectories, mutation_rate, optimizer, max_iters)?;
        let seeds = (0..n_bootstraps).map(|_| rng.gen::<u64>()).collect::<Vec<u64>>();
        let boot = seeds
            .par_iter()
            .filter_map(|&seed| {
                let sample = patient_bootstrap(&trajectories, &mut StdRng::seed_from_u64(seed));
                fit_saturation(&sample, mutation_rate, optimizer, max_iters).ok()
            })
            .collect::<Vec<f64>>();
        table[(jq, 0)] = (jq + 1) as f64;
        table[(jq, 1)] = medians[jq];
        table[(jq, 2)] = s;
        table[(jq, 3)] = std_dev(&boot);
        log::info!(
            "Quantile {}: s = {:e} +/- {:e} from {} patients",
            jq + 1,
            s,
            table[(jq, 3)],
            trajectories.len()
        );
        let colour = PALETTE[jq % PALETTE.len()];
        for x in trajectories.iter() {
            series.push(Series::new(&x.times, &x.values, SeriesStyle::Points, colour));
        }
        // Most conserved quantile dashed
        let style = if jq == 0 {
            SeriesStyle::DashedLine
        } else {
            SeriesStyle::Line
        };
        series.push(Series::new(
            &tt,
            &mean_trajectory(&tt, s, mutation_rate, 0.0),
            style,
            colour,
        ));
    }
    Ok(vec![
        write_table(
            &outdir.join(format!("{}_saturation_fit.txt", region)),
            &[
                "quantile".to_owned(),
                "entropy_median".to_owned(),
                "s".to_owned(),
                "s_std".to_owned(),
            ],
            &[format!("mutation rate {:e}", mutation_rate)],
            &table,
        )?,
        plot_series(
            &series,
            "days since infection",
            "average divergence",
            &outdir.join(format!("{}_saturation_fit.svg", region)),
        )?,
    ])
}
