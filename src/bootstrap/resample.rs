use ndarray::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rayon::prelude::*;

use crate::base::*;

/// Random number generator seeded from `seed`, or from entropy when no seed is given
pub fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(x) => StdRng::seed_from_u64(x),
        None => StdRng::from_entropy(),
    }
}

/// Mean of `n` rows drawn with replacement
fn resampled_mean(rows: &Array2<f64>, rng: &mut StdRng) -> Array1<f64> {
    let n = rows.nrows();
    let idx = (0..n).map(|_| rng.gen_range(0..n)).collect::<Vec<usize>>();
    let picked = rows.select(Axis(0), &idx);
    picked
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::from_elem(rows.ncols(), f64::NAN))
}

/// Bootstrap over the rows of a (patients x parameters) matrix.
/// Each replicate averages as many rows as there are patients, drawn with replacement.
pub fn bootstrap_rows(rows: &Array2<f64>, n_boot: usize, rng: &mut StdRng) -> Result<BootstrapSummary> {
    let (n, p) = rows.dim();
    if n == 0 {
        return Err(HivfitError::InsufficientData(
            "no rows to bootstrap over".to_owned(),
        ));
    }
    if n_boot == 0 {
        return Err(HivfitError::InvalidArgument(
            "The number of bootstrap replicates must be positive.".to_owned(),
        ));
    }
    // One seed per replicate so that the result does not depend on the thread count
    let seeds = (0..n_boot).map(|_| rng.gen::<u64>()).collect::<Vec<u64>>();
    let means = seeds
        .par_iter()
        .map(|&seed| resampled_mean(rows, &mut StdRng::seed_from_u64(seed)))
        .collect::<Vec<Array1<f64>>>();
    let mut replicates: Array2<f64> = Array2::zeros((n_boot, p));
    for (i, m) in means.iter().enumerate() {
        replicates.row_mut(i).assign(m);
    }
    let mean = replicates
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::from_elem(p, f64::NAN));
    let mean_sq = replicates
        .mapv(|x| x.powi(2))
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::from_elem(p, f64::NAN));
    let std = (&mean_sq - &mean.mapv(|x| x.powi(2))).mapv(|x| x.max(0.0).sqrt());
    Ok(BootstrapSummary {
        mean,
        std,
        replicates,
    })
}

/// Items drawn with replacement, as many as there are items
pub fn patient_bootstrap<T: Clone>(items: &[T], rng: &mut StdRng) -> Vec<T> {
    let n = items.len();
    (0..n).map(|_| items[rng.gen_range(0..n)].clone()).collect()
}

/// Random split of `n` indices into two halves, the second one taking the extra index when `n` is odd
pub fn patient_partition(n: usize, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let shuffle = sample(rng, n, n).into_vec();
    let half = n / 2;
    let mut first = shuffle[0..half].to_vec();
    let mut second = shuffle[half..n].to_vec();
    first.sort();
    second.sort();
    (first, second)
}
