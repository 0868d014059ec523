use ndarray::prelude::*;
use ndarray_linalg::{Determinant, Inverse};

use crate::base::*;
use crate::kl::*;

// Negative log likelihood of the quantile trajectories of one patient.
// Parameters are square roots of (s_1..s_q, mu, D), or of (s_1..s_q, D) when mu is fixed.
#[derive(Debug, Clone)]
pub struct KlObjective {
    pub data: QuantileData,
    pub settings: KlSettings,
    pub fixed_mu: Option<f64>,
    pub threshold: f64,
    pub site_weights: Array1<f64>,
}

impl Check for QuantileData {
    fn check(&self) -> Result<&Self> {
        let (q, k) = self.site_means.dim();
        if (self.times.len() != k)
            || (self.covariances.dim() != (q, k, k))
            || (self.site_counts.len() != q)
            || (self.sites.len() != q)
        {
            return Err(HivfitError::Dimension(format!(
                "quantile data with {} times, means {:?}, covariances {:?} and {} site counts",
                self.times.len(),
                self.site_means.dim(),
                self.covariances.dim(),
                self.site_counts.len()
            )));
        }
        if (q == 0) || (k == 0) {
            return Err(HivfitError::InsufficientData(
                "no quantiles or no time points to fit".to_owned(),
            ));
        }
        if time_increments(&self.times).iter().any(|&dt| dt <= 0.0) {
            return Err(HivfitError::InvalidArgument(
                "Sample times must be positive and strictly increasing.".to_owned(),
            ));
        }
        Ok(self)
    }
}

impl KlObjective {
    pub fn new(data: &QuantileData, settings: &KlSettings, fixed_mu: Option<f64>) -> Result<Self> {
        data.check()?;
        let q = data.site_counts.len();
        let site_weights = if settings.weight_by_site_count {
            data.site_counts.iter().map(|&x| x as f64).collect()
        } else {
            Array1::ones(q)
        };
        Ok(KlObjective {
            data: data.clone(),
            settings: settings.clone(),
            fixed_mu,
            threshold: small_s_threshold(&data.times),
            site_weights,
        })
    }

    pub fn q(&self) -> usize {
        self.data.site_counts.len()
    }

    /// Selection coefficients, mutation rate and diffusion constant from raw parameters
    pub fn unpack(&self, params: &[f64]) -> (Vec<f64>, f64, f64) {
        let q = self.q();
        let s = params[0..q].iter().map(|x| x.powi(2)).collect::<Vec<f64>>();
        match self.fixed_mu {
            Some(mu) => (s, mu, params[q].powi(2)),
            None => (s, params[q].powi(2), params[q + 1].powi(2)),
        }
    }

    fn precision(&self, s: f64, mu: f64, d0: f64, lq: f64) -> Result<Array2<f64>> {
        let times = &self.data.times;
        let a0 = match (self.settings.noise, self.settings.precision) {
            (NoiseModel::Gaussian, PrecisionMode::Analytic) => {
                gaussian_precision(times, s, self.threshold) * (lq / d0)
            }
            (NoiseModel::Gaussian, PrecisionMode::Inverse) => {
                gaussian_covariance(times, s, d0 / lq, self.threshold).inv()?
            }
            (NoiseModel::Sqrt, _) => sqrt_covariance(times, s, mu, d0 / lq, self.threshold).inv()?,
        };
        Ok(a0)
    }

    /// Contribution of quantile `jq`
    pub fn quantile_term(&self, jq: usize, s: f64, mu: f64, d0: f64) -> Result<f64> {
        let lq = self.site_weights[jq];
        let k = self.data.times.len();
        let a0 = self.precision(s, mu, d0, lq)?;
        // Sampling noise of variance sigma^2 on top of the process
        let c: Array2<f64> = Array2::eye(k) + self.settings.sigma.powi(2) * &a0;
        let a = a0.dot(&c.inv()?);
        let (sign_a0, ln_a0) = a0.sln_det()?;
        let (sign_c, ln_c) = c.sln_det()?;
        if sign_a0 * sign_c <= 0.0 {
            return Ok(f64::NAN);
        }
        let b = mean_trajectory(&self.data.times, s, mu, self.threshold);
        let r = &self.data.site_means.row(jq) - &b;
        let quadratic = r.dot(&a.dot(&r));
        let trace = self
            .data
            .covariances
            .index_axis(Axis(0), jq)
            .dot(&a)
            .diag()
            .sum()
            / lq;
        Ok(-0.5 * (ln_a0 - ln_c) + 0.5 * quadratic + 0.5 * trace)
    }

    pub fn negative_log_likelihood(&self, params: &[f64]) -> Result<f64> {
        if params.len() != self.n_params() {
            return Err(HivfitError::Dimension(format!(
                "{} parameters for an objective of {}",
                params.len(),
                self.n_params()
            )));
        }
        let (s, mu, d0) = self.unpack(params);
        let mut total = 0.0;
        for (jq, &sq) in s.iter().enumerate() {
            total += self.quantile_term(jq, sq, mu, d0)?;
        }
        Ok(total)
    }
}

impl Objective for KlObjective {
    fn n_params(&self) -> usize {
        match self.fixed_mu {
            Some(_) => self.q() + 1,
            None => self.q() + 2,
        }
    }

    fn evaluate(&self, params: &[f64]) -> f64 {
        match self.negative_log_likelihood(params) {
            Ok(x) if x.is_finite() => x,
            Ok(x) => {
                log::debug!(
                    "Non-finite log likelihood {} at squared parameters {:?}",
                    x,
                    params.iter().map(|p| p.powi(2)).collect::<Vec<f64>>()
                );
                f64::INFINITY
            }
            Err(e) => {
                log::debug!("Log likelihood could not be evaluated: {}", e);
                f64::INFINITY
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    fn toy_data() -> QuantileData {
        let times = Array1::from_vec(vec![200.0, 600.0, 1100.0, 1800.0]);
        let site_means = Array2::from_shape_vec(
            (2, 4),
            vec![
                0.0010, 0.0020, 0.0025, 0.0028, // conserved
                0.0020, 0.0055, 0.0090, 0.0140, // variable
            ],
        )
        .unwrap();
        let mut covariances = Array3::zeros((2, 4, 4));
        for jq in 0..2 {
            for i in 0..4 {
                covariances[(jq, i, i)] = 1e-6 * (jq + 1) as f64;
            }
        }
        QuantileData {
            times,
            site_means,
            covariances,
            site_counts: vec![40, 25],
            sites: vec![Array2::zeros((4, 40)), Array2::zeros((4, 25))],
        }
    }

    fn settings() -> KlSettings {
        KlSettings {
            sigma: 0.0,
            weight_by_site_count: false,
            noise: NoiseModel::Gaussian,
            precision: PrecisionMode::Inverse,
            optimizer: Optimizer::Amoeba,
            max_iters: 10_000,
        }
    }

    #[test]
    fn test_analytic_and_inverted_precision_agree() {
        let data = toy_data();
        let inverse = KlObjective::new(&data, &settings(), None).unwrap();
        let mut analytic_settings = settings();
        analytic_settings.precision = PrecisionMode::Analytic;
        let analytic = KlObjective::new(&data, &analytic_settings, None).unwrap();
        let params = vec![0.03, 0.01, 0.004, 0.001];
        let a = inverse.negative_log_likelihood(&params).unwrap();
        let b = analytic.negative_log_likelihood(&params).unwrap();
        assert!(((a - b) / a).abs() < 1e-6);
        assert_eq!(inverse.n_params(), 4);
        let (s, mu, d) = inverse.unpack(&params);
        assert_eq!(s.len(), 2);
        assert!((mu - 1.6e-5).abs() < 1e-18);
        assert!((d - 1e-6).abs() < 1e-18);
    }

    #[test]
    fn test_likelihood_prefers_the_generating_rates() {
        let data = toy_data();
        let objective = KlObjective::new(&data, &settings(), Some(1e-5)).unwrap();
        assert_eq!(objective.n_params(), 3);
        // Sum over quantiles
        let params = vec![0.03, 0.01, 0.001];
        let total = objective.negative_log_likelihood(&params).unwrap();
        let (s, mu, d0) = objective.unpack(&params);
        let parts = objective.quantile_term(0, s[0], mu, d0).unwrap()
            + objective.quantile_term(1, s[1], mu, d0).unwrap();
        assert!((total - parts).abs() < 1e-9 * total.abs());
        // Absurd diffusion constant is worse
        let worse = objective.evaluate(&vec![0.03, 0.01, 1.0]);
        assert!(worse > total);
        // Zero diffusion cannot be evaluated and maps to infinity
        assert_eq!(objective.evaluate(&vec![0.03, 0.01, 0.0]), f64::INFINITY);
        assert!(objective.negative_log_likelihood(&vec![0.1]).is_err());
    }

    fn two_point_data() -> QuantileData {
        let mut covariances = Array3::zeros((1, 2, 2));
        covariances[(0, 0, 0)] = 1e-6;
        covariances[(0, 1, 1)] = 2e-6;
        QuantileData {
            times: Array1::from_vec(vec![100.0, 300.0]),
            site_means: Array2::from_shape_vec((1, 2), vec![0.001, 0.002]).unwrap(),
            covariances,
            site_counts: vec![10],
            sites: vec![Array2::zeros((2, 10))],
        }
    }

    // 0.5 ln det(K) + 0.5 r'K^-1 r + 0.5 tr(V K^-1) / lq for an explicit 2x2 covariance K
    fn two_point_term(k: [[f64; 2]; 2], r: [f64; 2], v: [f64; 2], lq: f64) -> f64 {
        let det = k[0][0] * k[1][1] - k[0][1] * k[1][0];
        let quadratic =
            (r[0].powi(2) * k[1][1] - 2.0 * r[0] * r[1] * k[0][1] + r[1].powi(2) * k[0][0]) / det;
        let trace = (v[0] * k[1][1] + v[1] * k[0][0]) / det;
        0.5 * det.ln() + 0.5 * quadratic + 0.5 * trace / lq
    }

    fn two_point_residuals(s: f64, mu: f64) -> [f64; 2] {
        [
            0.001 - mu * (1.0 - (-s * 100.0f64).exp()) / s,
            0.002 - mu * (1.0 - (-s * 300.0f64).exp()) / s,
        ]
    }

    // Ornstein-Uhlenbeck covariance at t = 100 and 300
    fn two_point_gaussian(s: f64, d0: f64) -> [[f64; 2]; 2] {
        let c11 = (1.0 - (-2.0 * s * 100.0f64).exp()) * d0 / (2.0 * s);
        let c22 = (1.0 - (-2.0 * s * 300.0f64).exp()) * d0 / (2.0 * s);
        let c12 = (-s * 200.0f64).exp() * c11;
        [[c11, c12], [c12, c22]]
    }

    #[test]
    fn test_sqrt_noise_two_time_points() {
        let mut sqrt_settings = settings();
        sqrt_settings.noise = NoiseModel::Sqrt;
        let objective = KlObjective::new(&two_point_data(), &sqrt_settings, None).unwrap();
        let (s, mu, d0) = (0.01, 1e-5, 1e-3);
        let scale = mu * d0 / (2.0 * s * s);
        let c11 = (1.0 - (-s * 100.0f64).exp()) * scale;
        let c22 = (1.0 - (-s * 300.0f64).exp()) * scale;
        let c12 = (-s * 200.0f64).exp() * c11;
        let expected = two_point_term(
            [[c11, c12], [c12, c22]],
            two_point_residuals(s, mu),
            [1e-6, 2e-6],
            1.0,
        );
        let term = objective.quantile_term(0, s, mu, d0).unwrap();
        assert!(((term - expected) / expected).abs() < 1e-8);
        // The square root noise differs from the Gaussian one at the same rates
        let gaussian = KlObjective::new(&two_point_data(), &settings(), None).unwrap();
        assert!((gaussian.quantile_term(0, s, mu, d0).unwrap() - term).abs() > 1e-3);
    }

    #[test]
    fn test_sampling_noise_adds_to_the_covariance() {
        // A = A0 (I + sigma^2 A0)^-1 is the inverse of the process covariance plus sigma^2 I
        let (s, mu, d0, sigma) = (0.01, 1e-5, 1e-6, 5e-3);
        let mut noisy_settings = settings();
        noisy_settings.sigma = sigma;
        let noisy = KlObjective::new(&two_point_data(), &noisy_settings, None).unwrap();
        let quiet = KlObjective::new(&two_point_data(), &settings(), None).unwrap();
        let g = two_point_gaussian(s, d0);
        let r = two_point_residuals(s, mu);
        let v = [1e-6, 2e-6];
        let expected_quiet = two_point_term(g, r, v, 1.0);
        let g_noisy = [
            [g[0][0] + sigma.powi(2), g[0][1]],
            [g[1][0], g[1][1] + sigma.powi(2)],
        ];
        let expected_noisy = two_point_term(g_noisy, r, v, 1.0);
        let term_quiet = quiet.quantile_term(0, s, mu, d0).unwrap();
        let term_noisy = noisy.quantile_term(0, s, mu, d0).unwrap();
        assert!(((term_quiet - expected_quiet) / expected_quiet).abs() < 1e-8);
        assert!(((term_noisy - expected_noisy) / expected_noisy).abs() < 1e-8);
        assert!((term_noisy - term_quiet).abs() > 0.1);
    }

    #[test]
    fn test_site_count_weighting() {
        let (s, mu, d0) = (0.01, 1e-5, 1e-6);
        let lq = 10.0;
        let mut weighted_settings = settings();
        weighted_settings.weight_by_site_count = true;
        let weighted = KlObjective::new(&two_point_data(), &weighted_settings, None).unwrap();
        let plain = KlObjective::new(&two_point_data(), &settings(), None).unwrap();
        assert_eq!(weighted.site_weights, Array1::from_vec(vec![lq]));
        let g = two_point_gaussian(s, d0);
        let r = two_point_residuals(s, mu);
        let v = [1e-6, 2e-6];
        // Covariance of the quantile mean shrinks by the number of sites
        let g_mean = [
            [g[0][0] / lq, g[0][1] / lq],
            [g[1][0] / lq, g[1][1] / lq],
        ];
        let expected = two_point_term(g_mean, r, v, lq);
        let term_weighted = weighted.quantile_term(0, s, mu, d0).unwrap();
        let term_plain = plain.quantile_term(0, s, mu, d0).unwrap();
        assert!(((term_weighted - expected) / expected).abs() < 1e-8);
        // Log determinant shifts by -ln(lq), the residual term scales by lq and the trace term is unchanged
        let det = g[0][0] * g[1][1] - g[0][1] * g[1][0];
        let quadratic =
            (r[0].powi(2) * g[1][1] - 2.0 * r[0] * r[1] * g[0][1] + r[1].powi(2) * g[0][0]) / det;
        let shift = -lq.ln() + 0.5 * (lq - 1.0) * quadratic;
        assert!(((term_weighted - term_plain - shift) / shift).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_times() {
        let mut data = toy_data();
        data.times[1] = 100.0;
        assert!(KlObjective::new(&data, &settings(), None).is_err());
    }
}
