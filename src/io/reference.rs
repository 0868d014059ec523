use ndarray::prelude::*;
use std::fs::File;
use std::io::{prelude::*, BufReader};

use crate::base::*;

pub fn nucleotide_index(x: &str) -> Option<usize> {
    let c = x.trim().chars().next()?.to_ascii_uppercase();
    ALPHABET.iter().position(|&a| a == c)
}

fn parse_flag(x: &str) -> Option<bool> {
    match x.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Split a delimited line, ignoring comments, blank lines and headers
pub fn split_data_line(line: &str, header_start: &str) -> Option<Vec<String>> {
    let line = line.trim_end_matches(&['\n', '\r'][..]);
    if line.trim().is_empty() || line.starts_with('#') || line.starts_with(header_start) {
        return None;
    }
    Some(
        line.split(&[',', '\t'][..])
            .map(|x| x.trim().to_owned())
            .collect::<Vec<String>>(),
    )
}

impl Parse<Reference> for FileReference {
    // position,entropy,consensus[,pairing[,synonymous]]
    fn lparse(&self) -> Result<Reference> {
        let fname = self.filename.display().to_string();
        let reader = BufReader::new(File::open(&self.filename)?);
        let mut rows: Vec<(usize, f64, usize, Option<f64>, Option<bool>)> = vec![];
        for (i, l) in reader.lines().enumerate() {
            let line = l?;
            let vec_line = match split_data_line(&line, "position") {
                Some(x) => x,
                None => continue,
            };
            if vec_line.len() < 3 {
                return Err(HivfitError::parse(
                    &fname,
                    i + 1,
                    "expected at least position, entropy and consensus columns",
                ));
            }
            let position = vec_line[0]
                .parse::<usize>()
                .map_err(|e| HivfitError::parse(&fname, i + 1, e.to_string()))?;
            let entropy = vec_line[1]
                .parse::<f64>()
                .map_err(|e| HivfitError::parse(&fname, i + 1, e.to_string()))?;
            let consensus = nucleotide_index(&vec_line[2]).ok_or_else(|| {
                HivfitError::parse(&fname, i + 1, "consensus is not one of ACGT-N")
            })?;
            let pairing = match vec_line.get(3) {
                Some(x) if !x.is_empty() => Some(
                    x.parse::<f64>()
                        .map_err(|e| HivfitError::parse(&fname, i + 1, e.to_string()))?,
                ),
                _ => None,
            };
            let synonymous = match vec_line.get(4) {
                Some(x) if !x.is_empty() => Some(parse_flag(x).ok_or_else(|| {
                    HivfitError::parse(&fname, i + 1, "synonymous flag is not a boolean")
                })?),
                _ => None,
            };
            rows.push((position, entropy, consensus, pairing, synonymous));
        }
        if rows.is_empty() {
            return Err(HivfitError::InsufficientData(format!(
                "reference table {} is empty",
                fname
            )));
        }
        let n = rows.iter().map(|x| x.0).max().unwrap_or(0) + 1;
        let mut entropy = Array1::from_elem(n, f64::NAN);
        let mut consensus = vec![ALPHABET.len() - 1; n];
        let has_pairing = rows.iter().any(|x| x.3.is_some());
        let has_synonymous = rows.iter().any(|x| x.4.is_some());
        let mut pairing = Array1::zeros(n);
        let mut synonymous = vec![false; n];
        for (position, s, c, pp, syn) in rows.into_iter() {
            entropy[position] = s;
            consensus[position] = c;
            pairing[position] = pp.unwrap_or(0.0);
            synonymous[position] = syn.unwrap_or(false);
        }
        let reference = Reference {
            name: self.name.clone(),
            entropy,
            consensus,
            pairing: if has_pairing { Some(pairing) } else { None },
            synonymous: if has_synonymous { Some(synonymous) } else { None },
            regions: self.regions.clone(),
        };
        reference.check()?;
        Ok(reference)
    }
}

impl Check for Reference {
    fn check(&self) -> Result<&Self> {
        let n = self.entropy.len();
        for (name, (start, end)) in self.regions.iter() {
            if *end > n {
                return Err(HivfitError::Dimension(format!(
                    "Region {} ends at {} beyond the reference length of {}.",
                    name, end, n
                )));
            }
        }
        Ok(self)
    }
}

impl Reference {
    /// Interval of a region in reference coordinates, the whole reference for `genomewide`
    pub fn region(&self, name: &str) -> Result<(usize, usize)> {
        match self.regions.get(name) {
            Some(x) => Ok(*x),
            None if name == GENOMEWIDE => Ok((0, self.entropy.len())),
            None => Err(HivfitError::InvalidArgument(format!(
                "Region {} is not annotated in reference {}.",
                name, self.name
            ))),
        }
    }

    pub fn region_entropy(&self, name: &str) -> Result<Array1<f64>> {
        let (start, end) = self.region(name)?;
        Ok(self.entropy.slice(s![start..end]).to_owned())
    }
}
