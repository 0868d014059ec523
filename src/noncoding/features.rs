use ndarray::prelude::*;

use crate::base::*;

/// Non-coding elements of HIV-1 in 1-based, inclusive HXB2 coordinates
pub const HXB2_FEATURES: &[(&str, &[(usize, usize)])] = &[
    ("polyA", &[(514, 557)]),
    ("U5", &[(558, 570)]),
    ("U5 stem", &[(588, 596), (624, 631)]),
    ("PBS", &[(636, 654)]),
    ("interferon-stimulated response", &[(655, 674)]),
    ("PSI SL1-4", &[(691, 735), (736, 755), (766, 779), (790, 811)]),
    ("frame shift", &[(2086, 2093), (2101, 2126)]),
    (
        "RRE",
        &[
            (7780, 7792),
            (7796, 7805),
            (7808, 7813),
            (7817, 7825),
            (7829, 7838),
            (7846, 7853),
            (7856, 7863),
            (7865, 7872),
            (7875, 7880),
            (7886, 7892),
            (7901, 7913),
            (7916, 7928),
            (7931, 7940),
            (7948, 7957),
            (7962, 7972),
            (7975, 8003),
        ],
    ),
    ("polypurine", &[(9069, 9094)]),
    ("TCF-1alpha", &[(9400, 9415)]),
    ("NK-kappa B1", &[(9448, 9459)]),
    ("SP1", &[(9462, 9472), (9473, 9483), (9483, 9494)]),
    ("TATA", &[(9512, 9517)]),
    ("TAR", &[(9538, 9601)]),
];

pub fn feature(name: &str) -> Result<&'static [(usize, usize)]> {
    HXB2_FEATURES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, elements)| *elements)
        .ok_or_else(|| HivfitError::InvalidArgument(format!("Unknown non-coding feature {}.", name)))
}

/// 0-based reference positions covered by a feature
pub fn feature_positions(elements: &[(usize, usize)]) -> Vec<usize> {
    let mut out = elements
        .iter()
        .flat_map(|&(start, end)| (start.saturating_sub(1))..end)
        .collect::<Vec<usize>>();
    out.sort();
    out.dedup();
    out
}

/// Per feature: first position, last position, number of sites with an estimate and the
/// median selection coefficient. `s` is indexed by reference position.
pub fn feature_summary(s: &Array1<f64>) -> (Vec<String>, Array2<f64>) {
    let mut names: Vec<String> = vec![];
    let mut out: Array2<f64> = Array2::zeros((HXB2_FEATURES.len(), 4));
    for (i, (name, elements)) in HXB2_FEATURES.iter().enumerate() {
        let positions = feature_positions(elements);
        let values = positions
            .iter()
            .filter(|&&p| p < s.len())
            .map(|&p| s[p])
            .filter(|x| x.is_finite())
            .collect::<Vec<f64>>();
        names.push(name.to_string());
        out[(i, 0)] = positions.first().copied().unwrap_or(0) as f64;
        out[(i, 1)] = positions.last().copied().unwrap_or(0) as f64;
        out[(i, 2)] = values.len() as f64;
        out[(i, 3)] = median(&values);
    }
    (names, out)
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_features() {
        assert_eq!(feature("TATA").unwrap(), &[(9512, 9517)]);
        assert!(feature("gag").is_err());
        // Overlapping SP1 elements are counted once
        let sp1 = feature_positions(feature("SP1").unwrap());
        assert_eq!(sp1.len(), 9494 - 9462 + 1);
        assert_eq!(sp1[0], 9461);
        let mut s = Array1::from_elem(600, f64::NAN);
        for p in 513..557 {
            s[p] = 0.01 * (p - 512) as f64;
        }
        let (names, summary) = feature_summary(&s);
        assert_eq!(names[0], "polyA".to_owned());
        assert_eq!(summary[(0, 2)], 44.0);
        assert_eq!((summary[(0, 3)] * 1e3).round(), 225.0);
        // Beyond the end of the estimates
        assert_eq!(summary[(13, 2)], 0.0);
        assert!(summary[(13, 3)].is_nan());
    }
}
