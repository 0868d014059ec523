use ndarray::prelude::*;
use rand::rngs::StdRng;

use crate::base::*;
use crate::bootstrap::{patient_bootstrap, patient_partition};

// Pseudocounts of the pooled frequency normalisation and the entropy logarithm
const NORM_PSEUDOCOUNT: f64 = 1e-6;
const LOG_PSEUDOCOUNT: f64 = 1e-10;

impl PooledSettings {
    pub fn new() -> Self {
        PooledSettings {
            depth_cap: 300.0,
            min_ysi: 1.0,
            n_bootstraps: 100,
            mutation_rate: 1.2e-5,
            af_cutoff: 1e-5,
        }
    }
}

impl Default for PooledSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum of squared nucleotide frequencies, close to one where a single nucleotide dominates
fn homozygosity(trajectory: &Trajectory, i: usize, p: usize) -> f64 {
    (0..N_NUCLEOTIDES)
        .map(|a| trajectory.frequencies[(i, a, p)].powi(2))
        .sum()
}

/// Depth-weighted allele frequencies of one patient in region coordinates (6 x region length).
/// Only sites that stay rare and whose ancestral, final and sample consensus match the
/// reference consensus contribute, and only samples taken at least `min_ysi` years after infection.
pub fn accumulate_patient(
    reference: &Reference,
    region: &str,
    patient: &Patient,
    settings: &PooledSettings,
) -> Result<Array2<f64>> {
    let (start, end) = reference.region(region)?;
    let (trajectory, map) = match (patient.trajectories.get(region), patient.maps.get(region)) {
        (Some(t), Some(m)) => (t, m),
        _ => {
            return Err(HivfitError::InsufficientData(format!(
                "no {} trajectory",
                region
            )))
        }
    };
    let n_samples = trajectory.times.len();
    let l = trajectory.n_sites();
    let mut out: Array2<f64> = Array2::zeros((ALPHABET.len(), end - start));
    for &(r, p) in map.rows.iter() {
        if (r < start) || (r >= end) || (p >= l) {
            continue;
        }
        let observed = (0..n_samples)
            .filter(|&i| !trajectory.mask[(i, p)])
            .collect::<Vec<usize>>();
        let (first, last) = match (observed.first(), observed.last()) {
            (Some(&f), Some(&x)) => (f, x),
            _ => continue,
        };
        let rare = observed
            .iter()
            .map(|&i| homozygosity(trajectory, i, p))
            .fold(f64::INFINITY, f64::min)
            > 0.5;
        let consensus = reference.consensus[r];
        let ancestral = argmax(trajectory.frequencies.slice(s![first, .., p]));
        let last_major = argmax(trajectory.frequencies.slice(s![last, .., p]));
        if !(rare && (ancestral == consensus) && (last_major == consensus)) {
            continue;
        }
        for &i in observed.iter() {
            if trajectory.ysi[i] < settings.min_ysi {
                continue;
            }
            let af = trajectory.frequencies.slice(s![i, .., p]);
            if argmax(af) != consensus {
                continue;
            }
            let weight = settings.depth_cap.min(trajectory.templates[i]);
            let mut column = out.column_mut(r - start);
            column.scaled_add(weight, &af);
        }
    }
    Ok(out)
}

/// Pooled allele frequencies, normalised per site with a small pseudocount
pub fn af_average(afs: &[&Array2<f64>]) -> Result<Array2<f64>> {
    let first = match afs.first() {
        Some(x) => x,
        None => {
            return Err(HivfitError::InsufficientData(
                "no allele frequencies to average".to_owned(),
            ))
        }
    };
    let mut total: Array2<f64> = Array2::zeros(first.dim());
    for af in afs.iter() {
        if af.dim() != total.dim() {
            return Err(HivfitError::Dimension(format!(
                "allele frequencies of shape {:?} and {:?}",
                af.dim(),
                total.dim()
            )));
        }
        total = total + *af;
    }
    let norm = total.sum_axis(Axis(0)).mapv(|x| x + NORM_PSEUDOCOUNT);
    Ok(total / &norm.insert_axis(Axis(0)))
}

/// Entropy of every site, in nats
pub fn site_entropy(af: &Array2<f64>) -> Array1<f64> {
    af.map_axis(Axis(0), |col| {
        -col.iter()
            .map(|&f| f * (f + LOG_PSEUDOCOUNT).ln())
            .sum::<f64>()
    })
}

/// Frequency of everything but the major allele among the nucleotides, NaN at sites without data
pub fn minor_frequency(af: &Array2<f64>) -> Array1<f64> {
    af.map_axis(Axis(0), |col| {
        if col.sum() <= 0.0 {
            return f64::NAN;
        }
        let nuc = col.slice(s![0..N_NUCLEOTIDES]).sum();
        let major = col.fold(f64::NEG_INFINITY, |m, &x| m.max(x));
        (nuc - major) / (nuc + NORM_PSEUDOCOUNT)
    })
}

/// Pool one region over the cohort. Patients without data for the region are skipped.
pub fn pool_region(cohort: &Cohort, region: &str, settings: &PooledSettings) -> Result<PooledFrequencies> {
    let (start, _) = cohort.reference.region(region)?;
    let mut by_patient: Vec<Array2<f64>> = vec![];
    for patient in cohort.patients.iter() {
        match accumulate_patient(&cohort.reference, region, patient, settings) {
            Ok(x) => by_patient.push(x),
            Err(e) => log::warn!("Skipping patient {} in {}: {}", patient.name, region, e),
        }
    }
    let combined = af_average(&by_patient.iter().collect::<Vec<&Array2<f64>>>())?;
    let entropy = site_entropy(&combined);
    let minor = minor_frequency(&combined);
    log::info!(
        "Pooled {} patients over {} sites of {}, {} sites with data",
        by_patient.len(),
        combined.ncols(),
        region,
        minor.iter().filter(|x| !x.is_nan()).count()
    );
    Ok(PooledFrequencies {
        region: region.to_owned(),
        start,
        by_patient,
        combined,
        entropy,
        minor,
    })
}

#[derive(Debug, Clone)]
pub struct PooledReplicate {
    pub entropy: Array1<f64>,
    pub minor: Array1<f64>,
}

fn replicate(afs: &[&Array2<f64>]) -> Result<PooledReplicate> {
    let af = af_average(afs)?;
    Ok(PooledReplicate {
        entropy: site_entropy(&af),
        minor: minor_frequency(&af),
    })
}

/// Pooled entropy and minor frequency of `n` patient bootstrap replicates
pub fn bootstrap_replicates(pooled: &PooledFrequencies, n: usize, rng: &mut StdRng) -> Result<Vec<PooledReplicate>> {
    let afs = pooled.by_patient.iter().collect::<Vec<&Array2<f64>>>();
    (0..n)
        .map(|_| replicate(&patient_bootstrap(&afs, rng)))
        .collect()
}

/// `n` random splits of the patients into two halves, pooled separately
pub fn partition_replicates(
    pooled: &PooledFrequencies,
    n: usize,
    rng: &mut StdRng,
) -> Result<Vec<(PooledReplicate, PooledReplicate)>> {
    let n_patients = pooled.by_patient.len();
    if n_patients < 2 {
        return Err(HivfitError::InsufficientData(format!(
            "{} patient(s) cannot be split in two",
            n_patients
        )));
    }
    let mut out = vec![];
    for _ in 0..n {
        let (a, b) = patient_partition(n_patients, rng);
        let pick = |idx: &[usize]| {
            idx.iter()
                .map(|&i| &pooled.by_patient[i])
                .collect::<Vec<&Array2<f64>>>()
        };
        out.push((replicate(&pick(&a))?, replicate(&pick(&b))?));
    }
    Ok(out)
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::new_rng;
    use std::collections::BTreeMap;

    // Four region sites at reference positions 2..6; patient sites map one to one
    fn toy_cohort() -> Cohort {
        let mut regions = BTreeMap::new();
        regions.insert("pol".to_owned(), (2, 6));
        let reference = Reference {
            name: "HXB2".to_owned(),
            entropy: Array1::from_vec(vec![0.0, 0.0, 0.1, 0.2, 0.3, 0.4, 0.0]),
            consensus: vec![0, 0, 0, 1, 2, 3, 0],
            pairing: None,
            synonymous: None,
            regions,
        };
        let patients = (0..3)
            .map(|j| {
                let times = Array1::from_vec(vec![100.0, 500.0, 900.0]);
                let mut frequencies: Array3<f64> = Array3::zeros((3, 6, 4));
                let consensus = [0, 1, 2, 3];
                for i in 0..3 {
                    for l in 0..4 {
                        let minor = 0.01 * (j + 1) as f64;
                        frequencies[(i, consensus[l], l)] = 1.0 - minor;
                        frequencies[(i, (consensus[l] + 1) % 4, l)] = minor;
                    }
                }
                // Site 3 sweeps to another nucleotide by the last sample
                frequencies[(2, 3, 3)] = 0.2;
                frequencies[(2, 0, 3)] = 0.8;
                let mut trajectories = BTreeMap::new();
                trajectories.insert(
                    "pol".to_owned(),
                    Trajectory {
                        times,
                        frequencies,
                        mask: Array2::from_elem((3, 4), false),
                        ysi: Array1::from_vec(vec![0.3, 1.4, 2.5]),
                        templates: Array1::from_vec(vec![1000.0, 100.0, 1000.0]),
                    },
                );
                let mut maps = BTreeMap::new();
                maps.insert(
                    "pol".to_owned(),
                    PatientMap {
                        rows: (0..4).map(|l| (l + 2, l)).collect(),
                    },
                );
                Patient {
                    name: format!("p{}", j + 1),
                    subtype: None,
                    trajectories,
                    maps,
                }
            })
            .collect();
        Cohort {
            reference,
            patients,
        }
    }

    #[test]
    fn test_accumulate_and_pool() {
        let cohort = toy_cohort();
        let settings = PooledSettings::new();
        let af = accumulate_patient(&cohort.reference, "pol", &cohort.patients[0], &settings).unwrap();
        assert_eq!(af.dim(), (6, 4));
        // First sample is too early; weights are 100 and min(300, 1000)
        assert_eq!((af[(0, 0)] * 1e6).round(), (400.0 * 0.99 * 1e6f64).round());
        assert_eq!((af[(1, 0)] * 1e6).round(), (400.0 * 0.01 * 1e6f64).round());
        // The swept site is left out
        assert_eq!(af.column(3).sum(), 0.0);
        let pooled = pool_region(&cohort, "pol", &settings).unwrap();
        assert_eq!(pooled.by_patient.len(), 3);
        assert_eq!(pooled.start, 2);
        assert!(pooled.minor[3].is_nan());
        // Average minor frequency over the three patients is 0.02
        assert_eq!((pooled.minor[0] * 1e5).round(), 2000.0);
        let expected_entropy = -(0.98f64 * 0.98f64.ln() + 0.02 * 0.02f64.ln());
        assert_eq!((pooled.entropy[1] * 1e5).round(), (expected_entropy * 1e5).round());
        assert!(pool_region(&cohort, "env", &settings).is_err());
    }

    #[test]
    fn test_minor_frequency() {
        let af = Array2::from_shape_vec(
            (6, 3),
            vec![
                0.9, 0.0, 0.0, // A
                0.06, 0.0, 0.0, // C
                0.04, 0.0, 1.0, // G
                0.0, 0.0, 0.0, // T
                0.0, 0.0, 0.0, // -
                0.0, 0.0, 0.0, // N
            ],
        )
        .unwrap();
        let minor = minor_frequency(&af);
        assert_eq!((minor[0] * 1e6).round(), (0.1_f64 / (1.0 + 1e-6) * 1e6).round());
        // No data at the site
        assert!(minor[1].is_nan());
        assert!(minor[2].abs() < 1e-12);
    }

    #[test]
    fn test_replicates() {
        let cohort = toy_cohort();
        let pooled = pool_region(&cohort, "pol", &PooledSettings::new()).unwrap();
        let mut rng = new_rng(Some(42));
        let boot = bootstrap_replicates(&pooled, 10, &mut rng).unwrap();
        assert_eq!(boot.len(), 10);
        assert!(boot.iter().all(|x| (x.minor[0] >= 0.01 - 1e-6) && (x.minor[0] <= 0.03 + 1e-6)));
        let parts = partition_replicates(&pooled, 5, &mut rng).unwrap();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].0.minor.len(), 4);
        let empty = Array2::<f64>::zeros((6, 2));
        let av = af_average(&[&empty]).unwrap();
        assert_eq!(av.sum(), 0.0);
        assert!(af_average(&[]).is_err());
    }
}
