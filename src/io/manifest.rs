use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::base::*;

impl Parse<CohortManifest> for FileManifest {
    fn lparse(&self) -> Result<CohortManifest> {
        let text = fs::read_to_string(&self.filename)?;
        let mut manifest: CohortManifest = serde_yaml::from_str(&text)?;
        // Relative paths are relative to the manifest itself
        let root = self
            .filename
            .parent()
            .map(|x| x.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        manifest.reference.table = resolve(&root, &manifest.reference.table);
        for patient in manifest.patients.iter_mut() {
            for path in patient.trajectories.values_mut() {
                *path = resolve(&root, path);
            }
            for path in patient.maps.values_mut() {
                *path = resolve(&root, path);
            }
        }
        manifest.check()?;
        Ok(manifest)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

impl Check for CohortManifest {
    fn check(&self) -> Result<&Self> {
        if self.patients.is_empty() {
            return Err(HivfitError::InvalidArgument(
                "The cohort manifest lists no patients.".to_owned(),
            ));
        }
        for (name, (start, end)) in self.reference.regions.iter() {
            if start >= end {
                return Err(HivfitError::InvalidArgument(format!(
                    "Region {} has an empty interval [{}, {}).",
                    name, start, end
                )));
            }
        }
        for patient in self.patients.iter() {
            if patient.samples.is_empty() {
                return Err(HivfitError::InvalidArgument(format!(
                    "Patient {} has no samples.",
                    patient.name
                )));
            }
            for region in patient.trajectories.keys() {
                if !patient.maps.contains_key(region) {
                    return Err(HivfitError::InvalidArgument(format!(
                        "Patient {} has a trajectory for {} but no map to the reference.",
                        patient.name, region
                    )));
                }
            }
        }
        Ok(self)
    }
}

/// Load the reference and every patient listed in the manifest.
/// Patients that fail to load are reported and left out.
pub fn load_cohort(filename: &Path, cov_min: f64, error_rate: f64) -> Result<Cohort> {
    let manifest = FileManifest {
        filename: filename.to_path_buf(),
    }
    .lparse()?;
    let reference = FileReference {
        filename: manifest.reference.table.clone(),
        name: manifest.reference.name.clone(),
        regions: manifest.reference.regions.clone(),
    }
    .lparse()?;
    log::info!(
        "Loaded reference {} with {} positions and {} annotated regions",
        reference.name,
        reference.entropy.len(),
        reference.regions.len()
    );
    let mut patients: Vec<Patient> = vec![];
    for patient_manifest in manifest.patients.iter() {
        match load_patient(patient_manifest, cov_min, error_rate) {
            Ok(patient) => {
                log::info!(
                    "Loaded patient {} (subtype {}) with {} sample(s)",
                    patient.name,
                    patient.subtype.clone().unwrap_or("unknown".to_owned()),
                    patient_manifest.samples.len()
                );
                patients.push(patient)
            }
            Err(e) => log::warn!("Can't load patient {}: {}", patient_manifest.name, e),
        }
    }
    if patients.is_empty() {
        return Err(HivfitError::InsufficientData(
            "none of the patients in the manifest could be loaded".to_owned(),
        ));
    }
    Ok(Cohort {
        reference,
        patients,
    })
}

fn load_patient(manifest: &PatientManifest, cov_min: f64, error_rate: f64) -> Result<Patient> {
    let mut trajectories = BTreeMap::new();
    let mut maps = BTreeMap::new();
    for (region, filename) in manifest.trajectories.iter() {
        let trajectory = FileTrajectory {
            filename: filename.clone(),
            samples: manifest.samples.clone(),
            cov_min,
            error_rate,
        }
        .lparse()?;
        trajectories.insert(region.clone(), trajectory);
    }
    for (region, filename) in manifest.maps.iter() {
        let map = FileMap {
            filename: filename.clone(),
        }
        .lparse()?;
        maps.insert(region.clone(), map);
    }
    Ok(Patient {
        name: manifest.name.clone(),
        subtype: manifest.subtype.clone(),
        trajectories,
        maps,
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_cohort() {
        let dir = std::env::temp_dir().join("hivfit-test-load-cohort");
        fs::create_dir_all(&dir).unwrap();
        write_file(
            &dir,
            "reference.csv",
            "position,entropy,consensus\n0,0.1,A\n1,0.5,C\n2,0.0,G\n3,1.2,T\n",
        );
        write_file(
            &dir,
            "p1_pol.csv",
            "sample,position,A,C,G,T,-,N,coverage\n\
             0,0,0.99,0.01,0,0,0,0,2000\n\
             0,1,0,1,0,0,0,0,2000\n\
             1,0,0.9,0.1,0,0,0,0,2000\n\
             1,1,0,0.98,0.02,0,0,0,2000\n",
        );
        write_file(&dir, "p1_pol_map.csv", "reference,patient\n1,0\n2,1\n");
        let manifest = write_file(
            &dir,
            "cohort.yaml",
            "reference:\n  name: HXB2\n  table: reference.csv\n  regions:\n    pol: [1, 3]\n\
             patients:\n  - name: p1\n    subtype: B\n    samples:\n      - {time: 100, ysi: 0.3, templates: 500}\n      - {time: 400, ysi: 1.1, templates: 80}\n    trajectories:\n      pol: p1_pol.csv\n    maps:\n      pol: p1_pol_map.csv\n\
             \x20 - name: p2\n    samples:\n      - {time: 100, ysi: 0.3, templates: 500}\n    trajectories:\n      pol: missing.csv\n    maps:\n      pol: missing_map.csv\n",
        );
        let cohort = load_cohort(&manifest, 1000.0, 2e-3).unwrap();
        // p2 does not have data files and is left out
        assert_eq!(cohort.patients.len(), 1);
        assert_eq!(cohort.reference.regions["pol"], (1, 3));
        let p1 = &cohort.patients[0];
        assert_eq!(p1.subtype, Some("B".to_owned()));
        assert_eq!(p1.trajectories["pol"].frequencies.dim(), (2, 6, 2));
        assert_eq!(p1.maps["pol"].rows, vec![(1, 0), (2, 1)]);
    }
}
