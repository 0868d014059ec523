use ndarray::prelude::*;

use crate::base::*;

// Nelder-Mead coefficients: reflection, expansion, contraction and shrink
const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO: f64 = -0.5;
const SIGMA: f64 = 0.5;

impl SimplexSettings {
    pub fn new(n: usize) -> Self {
        SimplexSettings {
            edges: Array1::ones(n),
            tol_x: 1e-4,
            tol_f: 1e-4,
            max_iters: 10_000,
        }
    }
}

fn evaluate<F: Fn(&[f64]) -> f64>(func: &F, x: ArrayView1<f64>) -> f64 {
    let x = x.to_vec();
    let f = func(&x);
    // NaN would break the ordering of the vertices
    if f.is_nan() {
        f64::INFINITY
    } else {
        f
    }
}

fn order(xx: &mut Array2<f64>, ff: &mut Array1<f64>) {
    let n = ff.len();
    let mut idx = (0..n).collect::<Vec<usize>>();
    idx.sort_by(|&a, &b| ff[a].total_cmp(&ff[b]));
    *xx = xx.select(Axis(0), &idx);
    *ff = ff.select(Axis(0), &idx);
}

fn converged(xx: &Array2<f64>, ff: &Array1<f64>, tol_x: f64, tol_f: f64) -> (bool, f64, f64) {
    let n = ff.len();
    let centre = xx.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(xx.ncols()));
    let fmean = ff.sum() / n as f64;
    let mut ok = true;
    let mut max_dx: f64 = 0.0;
    for row in xx.outer_iter() {
        for (x, c) in row.iter().zip(centre.iter()) {
            let dx = (x - c).abs();
            if !(dx < tol_x * c.abs()) {
                ok = false;
            }
            max_dx = max_dx.max(dx / c.abs());
        }
    }
    let mut max_df: f64 = 0.0;
    for f in ff.iter() {
        let df = (f - fmean).abs();
        if !(df < tol_f * fmean.abs()) {
            ok = false;
        }
        max_df = max_df.max(df / fmean.abs());
    }
    (ok, max_dx, max_df)
}

/// Multivariate Nelder-Mead minimum search.
///
/// The initial simplex is `x0` plus `x0 + edges[i] * e_i` for every dimension `i`.
/// The search stops when every vertex lies within `tol_x` (relative) of the
/// centroid and every function value within `tol_f` (relative) of the mean value,
/// or after `max_iters` iterations with a warning.
pub fn amoeba<F>(func: F, x0: &Array1<f64>, settings: &SimplexSettings) -> Result<SimplexMinimum>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        return Err(HivfitError::InvalidArgument(
            "Cannot minimise over zero parameters.".to_owned(),
        ));
    }
    if settings.edges.len() != n {
        return Err(HivfitError::Dimension(format!(
            "{} simplex edges for {} parameters",
            settings.edges.len(),
            n
        )));
    }
    let mut xx: Array2<f64> = Array2::zeros((n + 1, n));
    for mut row in xx.outer_iter_mut() {
        row.assign(x0);
    }
    for i in 0..n {
        xx[(i + 1, i)] += settings.edges[i];
    }
    let mut ff: Array1<f64> = xx.outer_iter().map(|x| evaluate(&func, x)).collect();

    let mut iterations = 0;
    let mut is_converged = false;
    let (mut max_dx, mut max_df) = (f64::NAN, f64::NAN);
    while iterations < settings.max_iters {
        let (ok, dx, df) = converged(&xx, &ff, settings.tol_x, settings.tol_f);
        max_dx = dx;
        max_df = df;
        if ok {
            is_converged = true;
            break;
        }
        iterations += 1;
        order(&mut xx, &mut ff);
        // Centroid of all but the worst vertex
        let xo = xx
            .slice(s![0..n, ..])
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n));
        let worst = xx.row(n).to_owned();
        // Reflection
        let xr = &xo + &(ALPHA * (&xo - &worst));
        let fr = evaluate(&func, xr.view());
        if (fr >= ff[0]) && (fr < ff[n - 1]) {
            xx.row_mut(n).assign(&xr);
            ff[n] = fr;
        } else if fr < ff[0] {
            // Expansion
            let xe = &xo + &(GAMMA * (&xo - &worst));
            let fe = evaluate(&func, xe.view());
            if fe < fr {
                xx.row_mut(n).assign(&xe);
                ff[n] = fe;
            } else {
                xx.row_mut(n).assign(&xr);
                ff[n] = fr;
            }
        } else {
            // Contraction towards the centroid
            let xc = &xo + &(RHO * (&xo - &worst));
            let fc = evaluate(&func, xc.view());
            if fc < ff[n] {
                xx.row_mut(n).assign(&xc);
                ff[n] = fc;
            } else {
                // Shrink towards the best vertex
                let best = xx.row(0).to_owned();
                for i in 1..(n + 1) {
                    let shrunk = &best + &(SIGMA * (&xx.row(i) - &best));
                    ff[i] = evaluate(&func, shrunk.view());
                    xx.row_mut(i).assign(&shrunk);
                }
            }
        }
    }
    if !is_converged {
        log::warn!(
            "The maximum number of iterations ({}) has been reached: max(dx/x) = {}, max(df/f) = {}",
            settings.max_iters,
            max_dx,
            max_df
        );
    }
    order(&mut xx, &mut ff);
    Ok(SimplexMinimum {
        x: xx.row(0).to_owned(),
        f: ff[0],
        iterations,
        converged: is_converged,
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_amoeba_quadratic() {
        // Shifted paraboloid with minimum at (1, -2, 3)
        let func = |x: &[f64]| {
            (x[0] - 1.0).powi(2) + 2.0 * (x[1] + 2.0).powi(2) + 0.5 * (x[2] - 3.0).powi(2) + 4.0
        };
        let mut settings = SimplexSettings::new(3);
        settings.tol_x = 1e-6;
        settings.tol_f = 1e-10;
        let res = amoeba(func, &Array1::zeros(3), &settings).unwrap();
        assert!(res.converged);
        assert_eq!((res.x[0] * 1e4).round(), 1e4);
        assert_eq!((res.x[1] * 1e4).round(), -2e4);
        assert_eq!((res.x[2] * 1e4).round(), 3e4);
        assert_eq!((res.f * 1e6).round(), 4e6);
    }

    #[test]
    fn test_amoeba_rosenbrock() {
        let func = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2) + 1.0;
        let mut settings = SimplexSettings::new(2);
        settings.edges = Array1::from_elem(2, 0.5);
        settings.tol_x = 1e-9;
        settings.tol_f = 1e-12;
        let res = amoeba(func, &Array1::from_vec(vec![-1.2, 1.0]), &settings).unwrap();
        assert_eq!((res.x[0] * 1e3).round(), 1e3);
        assert_eq!((res.x[1] * 1e3).round(), 1e3);
    }

    #[test]
    fn test_amoeba_iteration_cap_and_nan() {
        // NaN everywhere except near the origin is treated as +inf
        let func = |x: &[f64]| {
            if x[0].abs() > 10.0 {
                f64::NAN
            } else {
                (x[0] - 2.0).powi(2) + 1.0
            }
        };
        let mut settings = SimplexSettings::new(1);
        settings.max_iters = 3;
        let res = amoeba(func, &Array1::from_vec(vec![0.5]), &settings).unwrap();
        assert!(!res.converged);
        assert_eq!(res.iterations, 3);
        assert!(res.f.is_finite());
        // Mismatched edges
        settings.edges = Array1::ones(2);
        assert!(amoeba(func, &Array1::from_vec(vec![0.5]), &settings).is_err());
        assert!(amoeba(func, &Array1::zeros(0), &SimplexSettings::new(0)).is_err());
    }
}
