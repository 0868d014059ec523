use ndarray::prelude::*;

use crate::base::*;

/// Group reference positions into `q` entropy quantiles.
/// Boundaries are the 100*i/q percentiles of the finite entropies; the last group includes the maximum.
pub fn entropy_quantiles(entropy: &Array1<f64>, q: usize) -> Result<Vec<EntropyQuantile>> {
    if q == 0 {
        return Err(HivfitError::InvalidArgument(
            "The number of entropy quantiles must be positive.".to_owned(),
        ));
    }
    let finite = entropy
        .iter()
        .filter(|x| x.is_finite())
        .copied()
        .collect::<Vec<f64>>();
    if finite.len() < q {
        return Err(HivfitError::InsufficientData(format!(
            "{} positions with known entropy for {} quantiles",
            finite.len(),
            q
        )));
    }
    let thresholds = (0..=q)
        .map(|i| score_at_percentile(&finite, 100.0 * i as f64 / q as f64))
        .collect::<Vec<f64>>();
    let mut out: Vec<EntropyQuantile> = vec![];
    for jq in 0..q {
        let (lo, hi) = (thresholds[jq], thresholds[jq + 1]);
        let last = jq + 1 == q;
        let positions = entropy
            .iter()
            .enumerate()
            .filter(|&(_, &e)| e.is_finite() && (e >= lo) && ((e < hi) || (last && e <= hi)))
            .map(|(i, _)| i)
            .collect::<Vec<usize>>();
        out.push(EntropyQuantile {
            range: (lo, hi),
            positions,
        });
    }
    Ok(out)
}

/// Median cross-sectional entropy of each quantile
pub fn quantile_entropy_medians(entropy: &Array1<f64>, quantiles: &[EntropyQuantile]) -> Array1<f64> {
    quantiles
        .iter()
        .map(|quantile| {
            median(
                &quantile
                    .positions
                    .iter()
                    .map(|&i| entropy[i])
                    .collect::<Vec<f64>>(),
            )
        })
        .collect()
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_entropy_quantiles() {
        let entropy = Array1::from_vec(vec![0.5, 0.1, f64::NAN, 0.9, 0.3, 0.7, 0.2, 0.8, 0.0]);
        let quantiles = entropy_quantiles(&entropy, 2).unwrap();
        assert_eq!(quantiles.len(), 2);
        // Median of the 8 finite values is 0.4
        assert_eq!((quantiles[0].range.1 * 1e6).round(), 4e5);
        assert_eq!(quantiles[0].positions, vec![1, 4, 6, 8]);
        assert_eq!(quantiles[1].positions, vec![0, 3, 5, 7]);
        // Every finite position lands in exactly one quantile, the maximum included
        let n = quantiles.iter().map(|x| x.positions.len()).sum::<usize>();
        assert_eq!(n, 8);
        let medians = quantile_entropy_medians(&entropy, &quantiles);
        assert_eq!((medians[0] * 1e3).round(), 150.0);
        assert_eq!((medians[1] * 1e3).round(), 750.0);
        assert!(entropy_quantiles(&entropy, 0).is_err());
        assert!(entropy_quantiles(&entropy, 9).is_err());
    }
}
