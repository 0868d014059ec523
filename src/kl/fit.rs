use ndarray::prelude::*;

use crate::base::*;
use crate::kl::*;
use crate::optim::minimise;

// Starting point, initial simplex edge and tolerances of the KL fits
const START: f64 = 1e-3;
const EDGE: f64 = 1e-4;

fn simplex_settings(n: usize, max_iters: usize) -> SimplexSettings {
    SimplexSettings {
        edges: Array1::from_elem(n, EDGE),
        tol_x: H,
        tol_f: H,
        max_iters,
    }
}

/// Simultaneous fit of the selection coefficients of all quantiles, the mutation rate
/// and the diffusion constant
#[function_name::named]
pub fn fit_simultaneous(data: &QuantileData, settings: &KlSettings) -> Result<KlFit> {
    let objective = KlObjective::new(data, settings, None)?;
    let n = objective.n_params();
    let q = objective.q();
    let res = minimise(
        objective,
        &Array1::from_elem(n, START),
        &simplex_settings(n, settings.max_iters),
        settings.optimizer,
    )?;
    let squared = res.x.mapv(|x| x.powi(2));
    Ok(KlFit {
        s: squared.slice(s![0..q]).to_owned(),
        mu: squared[q],
        d: squared[q + 1],
        negative_log_likelihood: res.f,
        iterations: res.iterations,
        method: function_name!().to_owned(),
    })
}

/// Fit of the selection coefficients and the diffusion constant for a given mutation rate
#[function_name::named]
pub fn fit_fixed_mu(data: &QuantileData, settings: &KlSettings, mu: f64) -> Result<KlFit> {
    if !(mu.is_finite() && mu > 0.0) {
        return Err(HivfitError::InvalidArgument(format!(
            "The mutation rate must be positive, got {}.",
            mu
        )));
    }
    let objective = KlObjective::new(data, settings, Some(mu))?;
    let n = objective.n_params();
    let q = objective.q();
    let res = minimise(
        objective,
        &Array1::from_elem(n, START),
        &simplex_settings(n, settings.max_iters),
        settings.optimizer,
    )?;
    let squared = res.x.mapv(|x| x.powi(2));
    Ok(KlFit {
        s: squared.slice(s![0..q]).to_owned(),
        mu,
        d: squared[q],
        negative_log_likelihood: res.f,
        iterations: res.iterations,
        method: function_name!().to_owned(),
    })
}

/// Mutation rate as the least-squares slope through the origin of the site-averaged
/// trajectory (time points x sites) of the least constrained sites
pub fn fit_upper(sites: &Array2<f64>, times: &Array1<f64>) -> Result<f64> {
    let (k, l) = sites.dim();
    if k != times.len() {
        return Err(HivfitError::Dimension(format!(
            "{} time points in the data and {} sampling times",
            k,
            times.len()
        )));
    }
    if l == 0 {
        return Err(HivfitError::InsufficientData(
            "no sites to estimate the mutation rate from".to_owned(),
        ));
    }
    let tt = times.dot(times);
    if tt <= 0.0 {
        return Err(HivfitError::InsufficientData(
            "all sampling times are zero".to_owned(),
        ));
    }
    let xk = sites.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(k));
    Ok(xk.dot(times) / tt)
}

impl KlFit {
    /// Parameters in the order s_1..s_q, mu, D
    pub fn to_row(&self) -> Array1<f64> {
        let mut row = self.s.to_vec();
        row.push(self.mu);
        row.push(self.d);
        Array1::from_vec(row)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    // Average of `n` independent discretised OU paths sampled at `times`
    fn simulate_quantile(times: &Array1<f64>, s: f64, mu: f64, d0: f64, n: usize, rng: &mut StdRng) -> Array2<f64> {
        let k = times.len();
        let dt = time_increments(times);
        let mut out = Array2::zeros((k, n));
        let normal = statrs::distribution::Normal::new(0.0, 1.0).unwrap();
        for a in 0..n {
            let mut x: f64 = 0.0;
            for i in 0..k {
                let decay = (-s * dt[i]).exp();
                let var = d0 * (1.0 - (-2.0 * s * dt[i]).exp()) / (2.0 * s);
                let mean = x * decay + mu * (1.0 - decay) / s;
                x = mean + var.sqrt() * normal.sample(rng);
                out[(i, a)] = x;
            }
        }
        out
    }

    fn quantile_data(sites: Vec<Array2<f64>>, times: &Array1<f64>) -> QuantileData {
        let q = sites.len();
        let k = times.len();
        let mut site_means = Array2::zeros((q, k));
        let mut covariances = Array3::zeros((q, k, k));
        for (jq, x) in sites.iter().enumerate() {
            site_means.row_mut(jq).assign(&x.mean_axis(Axis(1)).unwrap());
            covariances
                .index_axis_mut(Axis(0), jq)
                .assign(&covariance(x).unwrap());
        }
        QuantileData {
            times: times.clone(),
            site_means,
            covariances,
            site_counts: sites.iter().map(|x| x.ncols()).collect(),
            sites,
        }
    }

    #[test]
    fn test_fit_upper() {
        let times = Array1::from_vec(vec![100.0, 200.0, 400.0]);
        // Sites growing at 2e-5 and 4e-5 per day
        let sites = Array2::from_shape_vec(
            (3, 2),
            vec![2e-3, 4e-3, 4e-3, 8e-3, 8e-3, 16e-3],
        )
        .unwrap();
        let mu = fit_upper(&sites, &times).unwrap();
        assert!((mu - 3e-5).abs() < 1e-15);
        assert!(fit_upper(&sites, &Array1::zeros(2)).is_err());
        assert!(fit_upper(&Array2::zeros((3, 0)), &times).is_err());
    }

    #[test]
    fn test_fits_recover_ordering_of_selection() {
        let mut rng = StdRng::seed_from_u64(42);
        let times = Array1::from_vec(vec![150.0, 400.0, 800.0, 1300.0, 1900.0, 2600.0]);
        let mu = 1e-5;
        let d0 = 1e-7;
        let strong = simulate_quantile(&times, 5e-2, mu, d0, 200, &mut rng);
        let weak = simulate_quantile(&times, 2e-3, mu, d0, 200, &mut rng);
        let data = quantile_data(vec![strong, weak.clone()], &times);
        let settings = KlSettings {
            sigma: 0.0,
            weight_by_site_count: false,
            noise: NoiseModel::Gaussian,
            precision: PrecisionMode::Inverse,
            optimizer: Optimizer::Amoeba,
            max_iters: 10_000,
        };
        let fit = fit_simultaneous(&data, &settings).unwrap();
        assert_eq!(fit.method, "fit_simultaneous".to_owned());
        assert_eq!(fit.to_row().len(), 4);
        assert!(fit.s[0] > fit.s[1]);
        assert!(fit.mu > 0.0);
        let mu_upper = fit_upper(&weak, &times).unwrap();
        assert!(mu_upper > 0.0);
        let fixed = fit_fixed_mu(&data, &settings, mu).unwrap();
        assert_eq!(fixed.method, "fit_fixed_mu".to_owned());
        assert_eq!(fixed.mu, mu);
        assert!(fixed.s[0] > fixed.s[1]);
        assert!(fixed.negative_log_likelihood.is_finite());
        assert!(fit_fixed_mu(&data, &settings, -1.0).is_err());
    }
}
