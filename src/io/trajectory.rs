use ndarray::prelude::*;
use std::fs::File;
use std::io::{prelude::*, BufReader};

use crate::base::*;
use crate::io::split_data_line;

impl Parse<Trajectory> for FileTrajectory {
    // sample,position,A,C,G,T,-,N,coverage
    fn lparse(&self) -> Result<Trajectory> {
        let fname = self.filename.display().to_string();
        let reader = BufReader::new(File::open(&self.filename)?);
        let n_samples = self.samples.len();
        let mut rows: Vec<(usize, usize, [f64; 6], f64)> = vec![];
        for (i, l) in reader.lines().enumerate() {
            let line = l?;
            let vec_line = match split_data_line(&line, "sample") {
                Some(x) => x,
                None => continue,
            };
            if vec_line.len() != 9 {
                return Err(HivfitError::parse(
                    &fname,
                    i + 1,
                    format!("expected 9 columns, found {}", vec_line.len()),
                ));
            }
            let parse_err = |e: String| HivfitError::parse(&fname, i + 1, e);
            let sample = vec_line[0]
                .parse::<usize>()
                .map_err(|e| parse_err(e.to_string()))?;
            if sample >= n_samples {
                return Err(parse_err(format!(
                    "sample index {} but only {} samples are listed in the manifest",
                    sample, n_samples
                )));
            }
            let position = vec_line[1]
                .parse::<usize>()
                .map_err(|e| parse_err(e.to_string()))?;
            let mut freqs = [0.0; 6];
            for a in 0..6 {
                freqs[a] = vec_line[2 + a]
                    .parse::<f64>()
                    .map_err(|e| parse_err(e.to_string()))?;
            }
            let coverage = vec_line[8]
                .parse::<f64>()
                .map_err(|e| parse_err(e.to_string()))?;
            rows.push((sample, position, freqs, coverage));
        }
        if rows.is_empty() {
            return Err(HivfitError::InsufficientData(format!(
                "trajectory table {} is empty",
                fname
            )));
        }
        let l = rows.iter().map(|x| x.1).max().unwrap_or(0) + 1;
        let mut frequencies: Array3<f64> = Array3::zeros((n_samples, ALPHABET.len(), l));
        let mut mask: Array2<bool> = Array2::from_elem((n_samples, l), true);
        for (sample, position, freqs, coverage) in rows.into_iter() {
            // Frequencies below the sequencing error rate are indistinguishable from errors
            let cleaned = freqs
                .iter()
                .map(|&x| if x < self.error_rate { 0.0 } else { x })
                .collect::<Vec<f64>>();
            let total: f64 = cleaned.iter().sum();
            for a in 0..ALPHABET.len() {
                frequencies[(sample, a, position)] = if total > 0.0 {
                    cleaned[a] / total
                } else {
                    0.0
                };
            }
            mask[(sample, position)] = (coverage < self.cov_min) || (total <= 0.0);
        }
        let trajectory = Trajectory {
            times: self.samples.iter().map(|x| x.time).collect(),
            frequencies,
            mask,
            ysi: self.samples.iter().map(|x| x.ysi).collect(),
            templates: self.samples.iter().map(|x| x.templates).collect(),
        };
        trajectory.check()?;
        Ok(trajectory)
    }
}

impl Check for Trajectory {
    fn check(&self) -> Result<&Self> {
        let (t, a, l) = self.frequencies.dim();
        if (self.times.len() != t) || (self.mask.dim() != (t, l)) || (a != ALPHABET.len()) {
            return Err(HivfitError::Dimension(format!(
                "trajectory with {} times, frequencies {:?} and mask {:?}",
                self.times.len(),
                self.frequencies.dim(),
                self.mask.dim()
            )));
        }
        for k in 1..t {
            if self.times[k] <= self.times[k - 1] {
                return Err(HivfitError::InvalidArgument(
                    "Sample times must be strictly increasing.".to_owned(),
                ));
            }
        }
        Ok(self)
    }
}

impl Trajectory {
    pub fn n_sites(&self) -> usize {
        self.frequencies.dim().2
    }

    /// Keep only the samples in which no site is masked
    pub fn complete_samples(&self) -> Trajectory {
        let keep = self
            .mask
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| !row.iter().any(|&m| m))
            .map(|(k, _)| k)
            .collect::<Vec<usize>>();
        Trajectory {
            times: self.times.select(Axis(0), &keep),
            frequencies: self.frequencies.select(Axis(0), &keep),
            mask: self.mask.select(Axis(0), &keep),
            ysi: self.ysi.select(Axis(0), &keep),
            templates: self.templates.select(Axis(0), &keep),
        }
    }
}

impl Parse<PatientMap> for FileMap {
    // reference,patient
    fn lparse(&self) -> Result<PatientMap> {
        let fname = self.filename.display().to_string();
        let reader = BufReader::new(File::open(&self.filename)?);
        let mut rows: Vec<(usize, usize)> = vec![];
        for (i, l) in reader.lines().enumerate() {
            let line = l?;
            let vec_line = match split_data_line(&line, "reference") {
                Some(x) => x,
                None => continue,
            };
            if vec_line.len() < 2 {
                return Err(HivfitError::parse(
                    &fname,
                    i + 1,
                    "expected reference and patient positions",
                ));
            }
            let r = vec_line[0]
                .parse::<usize>()
                .map_err(|e| HivfitError::parse(&fname, i + 1, e.to_string()))?;
            let p = vec_line[1]
                .parse::<usize>()
                .map_err(|e| HivfitError::parse(&fname, i + 1, e.to_string()))?;
            rows.push((r, p));
        }
        Ok(PatientMap { rows })
    }
}
