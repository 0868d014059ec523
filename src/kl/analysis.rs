use ndarray::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::path::Path;

use crate::base::*;
use crate::bootstrap::bootstrap_rows;
use crate::io::{parameter_header, write_table};
use crate::kl::*;
use crate::plot::*;
use crate::quantiles::*;

#[derive(Debug, Clone)]
pub struct PatientKlFit {
    pub name: String,
    pub data: QuantileData,
    pub simultaneous: KlFit,
    pub fixed_mu: KlFit,
}

/// Both KL fits of a single patient: simultaneous, then with the mutation rate of the
/// least conserved quantile held fixed
pub fn fit_patient(
    patient: &Patient,
    region: &str,
    quantiles: &[EntropyQuantile],
    quantile_settings: &QuantileSettings,
    kl_settings: &KlSettings,
) -> Result<PatientKlFit> {
    let (trajectory, map) = match (patient.trajectories.get(region), patient.maps.get(region)) {
        (Some(t), Some(m)) => (t, m),
        _ => {
            return Err(HivfitError::InsufficientData(format!(
                "no {} trajectory",
                region
            )))
        }
    };
    let data = prepare_quantiles(trajectory, map, quantiles, quantile_settings)?;
    let simultaneous = fit_simultaneous(&data, kl_settings)?;
    let q = data.sites.len();
    let mu = fit_upper(&data.sites[q - 1], &data.times)?;
    let fixed_mu = fit_fixed_mu(&data, kl_settings, mu)?;
    log::info!(
        "Patient {}: mu = {:e} (simultaneous), {:e} (upper quantile); D = {:e}; {} and {} iterations",
        patient.name,
        simultaneous.mu,
        mu,
        simultaneous.d,
        simultaneous.iterations,
        fixed_mu.iterations
    );
    Ok(PatientKlFit {
        name: patient.name.clone(),
        data,
        simultaneous,
        fixed_mu,
    })
}

fn stack_rows(rows: &[Array1<f64>]) -> Result<Array2<f64>> {
    let p = rows.first().map(|x| x.len()).unwrap_or(0);
    let mut out = Array2::zeros((rows.len(), p));
    for (i, r) in rows.iter().enumerate() {
        if r.len() != p {
            return Err(HivfitError::Dimension(format!(
                "row {} has {} values instead of {}",
                i,
                r.len(),
                p
            )));
        }
        out.row_mut(i).assign(r);
    }
    Ok(out)
}

fn plot_patient_fit(fit: &PatientKlFit, region: &str, outdir: &Path) -> Result<String> {
    let times = &fit.data.times;
    let t_max = times[times.len() - 1];
    let tt = linspace(0.0, t_max, 100);
    let threshold = small_s_threshold(times);
    let mut series: Vec<Series> = vec![];
    for jq in 0..fit.data.site_counts.len() {
        let colour = PALETTE[jq % PALETTE.len()];
        series.push(Series::new(
            times,
            &fit.data.site_means.row(jq).to_owned(),
            SeriesStyle::Points,
            colour,
        ));
        series.push(Series::new(
            &tt,
            &mean_trajectory(&tt, fit.simultaneous.s[jq], fit.simultaneous.mu, threshold),
            SeriesStyle::Line,
            colour,
        ));
        series.push(Series::new(
            &tt,
            &mean_trajectory(&tt, fit.fixed_mu.s[jq], fit.fixed_mu.mu, threshold),
            SeriesStyle::DashedLine,
            colour,
        ));
    }
    plot_series(
        &series,
        "t [days]",
        "divergence from the initial consensus",
        &outdir.join(format!("{}_KL_fit_{}.svg", region, fit.name)),
    )
}

// Histograms of the bootstrap replicates per parameter. Parameters that cannot be plotted are
// reported and skipped so that the tables already written stay usable.
fn plot_bootstrap_histograms(
    boot: &BootstrapSummary,
    header: &[String],
    region: &str,
    label: &str,
    outdir: &Path,
) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    for (j, name) in header.iter().enumerate() {
        match plot_histogram_1d(
            &boot.replicates.column(j).to_owned(),
            30,
            name,
            &outdir.join(format!("{}_boot_hist_{}_{}.svg", region, label, name)),
        ) {
            Ok(x) => out.push(x),
            Err(e) => log::warn!("No bootstrap histogram of {} ({}): {}", name, label, e),
        }
    }
    out
}

/// KL fits of every patient in `region`, bootstrapped over patients.
/// Returns the names of the tables and plots written to `outdir`.
pub fn run_kl_fit(
    cohort: &Cohort,
    region: &str,
    quantile_settings: &QuantileSettings,
    kl_settings: &KlSettings,
    n_boot: usize,
    rng: &mut StdRng,
    outdir: &Path,
) -> Result<Vec<String>> {
    let q = quantile_settings.q;
    let quantiles = entropy_quantiles(&cohort.reference.entropy, q)?;
    let medians = quantile_entropy_medians(&cohort.reference.entropy, &quantiles);
    let fits = cohort
        .patients
        .par_iter()
        .filter_map(|patient| {
            match fit_patient(patient, region, &quantiles, quantile_settings, kl_settings) {
                Ok(x) => Some(x),
                Err(e) => {
                    log::warn!("Skipping patient {}: {}", patient.name, e);
                    None
                }
            }
        })
        .collect::<Vec<PatientKlFit>>();
    if fits.is_empty() {
        return Err(HivfitError::InsufficientData(format!(
            "no patient could be fitted in region {}",
            region
        )));
    }
    let names = fits.iter().map(|x| x.name.clone()).collect::<Vec<String>>();
    let comments = vec!["patients: ".to_owned() + &names.join(" ")];
    let header = parameter_header(q);
    let simultaneous = stack_rows(
        &fits
            .iter()
            .map(|x| x.simultaneous.to_row())
            .collect::<Vec<Array1<f64>>>(),
    )?;
    let fixed_mu = stack_rows(
        &fits
            .iter()
            .map(|x| x.fixed_mu.to_row())
            .collect::<Vec<Array1<f64>>>(),
    )?;

    let mut out: Vec<String> = vec![];
    out.push(write_table(&outdir.join(format!("{}_smuD_KL.txt", region)), &header, &comments, &simultaneous)?);
    out.push(write_table(&outdir.join(format!("{}_smuD_KLmu.txt", region)), &header, &comments, &fixed_mu)?);
    for (label, rows) in [("KL", &simultaneous), ("KLmu", &fixed_mu)] {
        let boot = bootstrap_rows(rows, n_boot, rng)?;
        let summary = stack_rows(&[boot.mean.clone(), boot.std.clone()])?;
        out.push(write_table(
            &outdir.join(format!("{}_smuD_{}_boot.txt", region, label)),
            &header,
            &["rows: bootstrap mean, bootstrap standard deviation".to_owned()],
            &summary,
        )?);
        out.extend(plot_bootstrap_histograms(&boot, &header, region, label, outdir));
    }
    let mut median_table: Array2<f64> = Array2::zeros((q, 4));
    for (jq, quantile) in quantiles.iter().enumerate() {
        median_table[(jq, 0)] = (jq + 1) as f64;
        median_table[(jq, 1)] = medians[jq];
        median_table[(jq, 2)] = quantile.range.0;
        median_table[(jq, 3)] = quantile.range.1;
    }
    out.push(write_table(
        &outdir.join(format!("{}_smuD_KL_quant_medians.txt", region)),
        &[
            "quantile".to_owned(),
            "entropy_median".to_owned(),
            "entropy_min".to_owned(),
            "entropy_max".to_owned(),
        ],
        &[],
        &median_table,
    )?);
    for fit in fits.iter() {
        match plot_patient_fit(fit, region, outdir) {
            Ok(x) => out.push(x),
            Err(e) => log::warn!("No fit plot for patient {}: {}", fit.name, e),
        }
    }
    Ok(out)
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::new_rng;
    use crate::io::read_table;
    use std::collections::BTreeMap;

    // Patient whose minor variants grow like mu/s (1 - exp(-s t)), with weaker selection at higher entropy
    fn toy_patient(name: &str, n_sites: usize, entropy: &Array1<f64>, jitter: f64) -> Patient {
        let times = Array1::from_vec(vec![120.0, 400.0, 750.0, 1200.0, 1800.0]);
        let k = times.len();
        let mut frequencies: Array3<f64> = Array3::zeros((k, 6, n_sites));
        for l in 0..n_sites {
            let s = 0.1 * (-6.0 * entropy[l]).exp();
            for (i, &t) in times.iter().enumerate() {
                let wobble = 1.0 + jitter * (((l * 7 + i * 3) % 11) as f64 - 5.0) / 5.0;
                let x = (1e-5 * (1.0 - (-s * t).exp()) / s * wobble).min(0.4);
                frequencies[(i, 0, l)] = 1.0 - x;
                frequencies[(i, 1, l)] = x;
            }
        }
        let trajectory = Trajectory {
            times,
            frequencies,
            mask: Array2::from_elem((k, n_sites), false),
            ysi: Array1::from_vec(vec![0.3, 1.1, 2.1, 3.3, 4.9]),
            templates: Array1::from_elem(k, 500.0),
        };
        let mut trajectories = BTreeMap::new();
        trajectories.insert("pol".to_owned(), trajectory);
        let mut maps = BTreeMap::new();
        maps.insert(
            "pol".to_owned(),
            PatientMap {
                rows: (0..n_sites).map(|l| (l, l)).collect(),
            },
        );
        Patient {
            name: name.to_owned(),
            subtype: Some("B".to_owned()),
            trajectories,
            maps,
        }
    }

    #[test]
    fn test_bootstrap_histograms_skip_unplottable_parameters() {
        let mut replicates = Array2::from_shape_fn((50, 3), |(i, j)| (i + j) as f64 * 1e-3);
        replicates.column_mut(1).fill(f64::NAN);
        let boot = BootstrapSummary {
            mean: Array1::zeros(3),
            std: Array1::zeros(3),
            replicates,
        };
        let outdir = std::env::temp_dir().join("hivfit-test-kl-hist");
        let out = plot_bootstrap_histograms(&boot, &parameter_header(1), "pol", "KLmu", &outdir);
        assert_eq!(out.len(), 2);
        assert!(out[0].ends_with("pol_boot_hist_KLmu_s1.svg"));
        assert!(out[1].ends_with("pol_boot_hist_KLmu_D.svg"));
    }

    #[test]
    fn test_run_kl_fit() {
        let n_sites = 60;
        let entropy = Array1::from_shape_fn(n_sites, |l| l as f64 / n_sites as f64);
        let mut regions = BTreeMap::new();
        regions.insert("pol".to_owned(), (0, n_sites));
        let reference = Reference {
            name: "HXB2".to_owned(),
            entropy: entropy.clone(),
            consensus: vec![0; n_sites],
            pairing: None,
            synonymous: None,
            regions,
        };
        let mut p3 = toy_patient("p3", n_sites, &entropy, 0.2);
        p3.trajectories.clear();
        let cohort = Cohort {
            reference,
            patients: vec![
                toy_patient("p1", n_sites, &entropy, 0.1),
                toy_patient("p2", n_sites, &entropy, 0.3),
                p3,
            ],
        };
        let quantile_settings = QuantileSettings::new(2);
        let kl_settings = KlSettings {
            sigma: 0.0,
            weight_by_site_count: false,
            noise: NoiseModel::Gaussian,
            precision: PrecisionMode::Analytic,
            optimizer: Optimizer::Amoeba,
            max_iters: 5_000,
        };
        let outdir = std::env::temp_dir().join("hivfit-test-kl");
        let mut rng = new_rng(Some(1));
        let out = run_kl_fit(
            &cohort,
            "pol",
            &quantile_settings,
            &kl_settings,
            200,
            &mut rng,
            &outdir,
        )
        .unwrap();
        assert!(out.iter().any(|x| x.ends_with("smuD_KLmu_boot.txt")));
        assert!(out.iter().any(|x| x.ends_with("pol_KL_fit_p2.svg")));
        // The patient without data is skipped
        let (header, fits) = read_table(&outdir.join("pol_smuD_KL.txt")).unwrap();
        assert_eq!(header, vec!["s1", "s2", "mu", "D"]);
        assert_eq!(fits.dim(), (2, 4));
        let (_, boot) = read_table(&outdir.join("pol_smuD_KLmu_boot.txt")).unwrap();
        assert_eq!(boot.dim(), (2, 4));
        assert!(boot.iter().all(|x| x.is_finite()));
        let (_, medians) = read_table(&outdir.join("pol_smuD_KL_quant_medians.txt")).unwrap();
        assert_eq!(medians.dim(), (2, 4));
        assert!(medians[(0, 1)] < medians[(1, 1)]);
        assert!(run_kl_fit(
            &cohort,
            "env",
            &quantile_settings,
            &kl_settings,
            200,
            &mut rng,
            &outdir
        )
        .is_err());
    }
}
