use ndarray::prelude::*;
use std::path::Path;

use crate::base::*;
use crate::io::{read_table, write_table};
use crate::plot::*;

/// Codes of the method column of the comparison table
pub const METHOD_KL: f64 = 0.0;
pub const METHOD_POOLED: f64 = 1.0;
pub const METHOD_SATURATION: f64 = 2.0;

// Fitness cost estimates of one method against cross-sectional entropy
#[derive(Debug, Clone)]
pub struct CostCurve {
    pub method: f64,
    pub label: String,
    pub entropy: Array1<f64>,
    pub s: Array1<f64>,
    pub s_std: Array1<f64>,
}

impl CostCurve {
    fn rows(&self) -> Vec<f64> {
        let mut out = vec![];
        for i in 0..self.entropy.len() {
            out.extend([self.method, self.entropy[i], self.s[i], self.s_std[i]]);
        }
        out
    }
}

/// Bootstrapped KL selection coefficients at fixed mu with the entropy median of each quantile.
/// The most conserved quantile is left out.
pub fn kl_curve(region: &str, dir: &Path) -> Result<CostCurve> {
    let (_, boot) = read_table(&dir.join(format!("{}_smuD_KLmu_boot.txt", region)))?;
    let (_, medians) = read_table(&dir.join(format!("{}_smuD_KL_quant_medians.txt", region)))?;
    let q = medians.nrows();
    if boot.nrows() < 2 || boot.ncols() < q + 2 || medians.ncols() < 2 {
        return Err(HivfitError::Dimension(format!(
            "KL bootstrap table of {:?} does not match {} quantiles",
            boot.dim(),
            q
        )));
    }
    if q < 2 {
        return Err(HivfitError::InsufficientData(
            "at least two entropy quantiles are needed for the comparison".to_owned(),
        ));
    }
    Ok(CostCurve {
        method: METHOD_KL,
        label: "KL".to_owned(),
        entropy: medians.slice(s![1.., 1]).to_owned(),
        s: boot.slice(s![0, 1..q]).to_owned(),
        s_std: boot.slice(s![1, 1..q]).to_owned(),
    })
}

/// Pooled selection coefficients per entropy bin. The highest entropy bin is left out.
pub fn pooled_curve(region: &str, dir: &Path) -> Result<CostCurve> {
    let (_, binned) = read_table(&dir.join(format!("{}_pooled_s_by_entropy.txt", region)))?;
    if binned.ncols() < 10 || binned.nrows() < 2 {
        return Err(HivfitError::Dimension(format!(
            "unexpected pooled entropy table of {:?}",
            binned.dim()
        )));
    }
    let n = binned.nrows() - 1;
    Ok(CostCurve {
        method: METHOD_POOLED,
        label: "pooled".to_owned(),
        entropy: binned.slice(s![..n, 0]).to_owned(),
        s: binned.slice(s![..n, 1]).to_owned(),
        s_std: binned.slice(s![..n, 9]).to_owned(),
    })
}

/// Saturation fits per quantile, leaving out the most conserved quantile
pub fn saturation_curve(region: &str, dir: &Path) -> Result<CostCurve> {
    let (_, fits) = read_table(&dir.join(format!("{}_saturation_fit.txt", region)))?;
    if fits.ncols() < 4 || fits.nrows() < 2 {
        return Err(HivfitError::Dimension(format!(
            "unexpected saturation table of {:?}",
            fits.dim()
        )));
    }
    Ok(CostCurve {
        method: METHOD_SATURATION,
        label: "saturation".to_owned(),
        entropy: fits.slice(s![1.., 1]).to_owned(),
        s: fits.slice(s![1.., 2]).to_owned(),
        s_std: fits.slice(s![1.., 3]).to_owned(),
    })
}

/// Fitness costs of all methods against cross-sectional entropy, as one table and a log-log plot.
/// KL and pooled results are required, the saturation fit is included when present.
pub fn run_compare(region: &str, outdir: &Path) -> Result<Vec<String>> {
    let mut curves = vec![kl_curve(region, outdir)?, pooled_curve(region, outdir)?];
    match saturation_curve(region, outdir) {
        Ok(x) => curves.push(x),
        Err(e) => log::info!("No saturation fit included: {}", e),
    }
    let rows = curves.iter().flat_map(|x| x.rows()).collect::<Vec<f64>>();
    let n = rows.len() / 4;
    let table = Array2::from_shape_vec((n, 4), rows)?;
    let mut series: Vec<Series> = vec![];
    for (i, curve) in curves.iter().enumerate() {
        log::info!("{}: {} points", curve.label, curve.entropy.len());
        let x = curve.entropy.mapv(f64::log10);
        let y = curve.s.mapv(f64::log10);
        series.push(Series::new(&x, &y, SeriesStyle::Points, PALETTE[i]));
        series.push(Series::new(&x, &y, SeriesStyle::Line, PALETTE[i]));
        // One standard deviation above and below
        for sign in [-1.0, 1.0] {
            let band = (&curve.s + &curve.s_std.mapv(|x| sign * x)).mapv(f64::log10);
            series.push(Series::new(&x, &band, SeriesStyle::DashedLine, PALETTE[i]));
        }
    }
    let legend = curves
        .iter()
        .enumerate()
        .map(|(i, x)| format!("{} = {} ({})", x.method, x.label, PALETTE[i]))
        .collect::<Vec<String>>()
        .join(", ");
    Ok(vec![
        write_table(
            &outdir.join(format!("{}_comparison.txt", region)),
            &[
                "method".to_owned(),
                "entropy".to_owned(),
                "s".to_owned(),
                "s_std".to_owned(),
            ],
            &["methods: ".to_owned() + &legend],
            &table,
        )?,
        plot_series(
            &series,
            "log10 cross-sectional entropy",
            "log10 fitness cost",
            &outdir.join(format!("{}_fitness_costs.svg", region)),
        )?,
    ])
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parameter_header;
    #[test]
    fn test_run_compare() {
        let dir = std::env::temp_dir().join("hivfit-test-compare");
        let _ = std::fs::remove_file(dir.join("pol_pooled_s_by_entropy.txt"));
        let q = 3;
        let boot = Array2::from_shape_vec(
            (2, q + 2),
            vec![0.03, 0.01, 0.002, 1.2e-5, 1e-3, 0.01, 0.002, 0.0005, 1e-6, 1e-4],
        )
        .unwrap();
        write_table(
            &dir.join("pol_smuD_KLmu_boot.txt"),
            &parameter_header(q),
            &[],
            &boot,
        )
        .unwrap();
        let medians = Array2::from_shape_vec(
            (q, 4),
            vec![1.0, 0.001, 0.0, 0.002, 2.0, 0.01, 0.002, 0.05, 3.0, 0.3, 0.05, 1.2],
        )
        .unwrap();
        write_table(&dir.join("pol_smuD_KL_quant_medians.txt"), &[], &[], &medians).unwrap();
        // Without the pooled table there is nothing to compare against
        assert!(run_compare("pol", &dir).is_err());
        let mut binned: Array2<f64> = Array2::zeros((5, 10));
        for b in 0..5 {
            binned[(b, 0)] = 0.01 * (b + 1) as f64;
            binned[(b, 1)] = 0.01 / (b + 1) as f64;
            binned[(b, 9)] = 0.001;
        }
        write_table(&dir.join("pol_pooled_s_by_entropy.txt"), &[], &[], &binned).unwrap();
        let out = run_compare("pol", &dir).unwrap();
        assert!(out[1].ends_with("pol_fitness_costs.svg"));
        let (header, table) = read_table(&dir.join("pol_comparison.txt")).unwrap();
        assert_eq!(header, vec!["method", "entropy", "s", "s_std"]);
        // Two KL quantiles and four pooled bins
        assert_eq!(table.dim(), (6, 4));
        assert_eq!(table[(0, 0)], METHOD_KL);
        assert_eq!(table[(0, 1)], 0.01);
        assert_eq!(table[(0, 2)], 0.01);
        assert_eq!(table[(1, 3)], 0.0005);
        assert_eq!(table[(2, 0)], METHOD_POOLED);
        assert_eq!(table[(5, 1)], 0.04);
    }
}
