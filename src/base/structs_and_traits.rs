use ndarray::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::base::Result;

/// Nucleotide alphabet of the allele frequency tables, in column order
pub const ALPHABET: [char; 6] = ['A', 'C', 'G', 'T', '-', 'N'];
/// Number of proper nucleotides at the head of the alphabet
pub const N_NUCLEOTIDES: usize = 4;
/// Name of the implicit region spanning the whole reference
pub const GENOMEWIDE: &str = "genomewide";

///////////////////////////////////////////////////////////////////////////////
// STRUCTS
///////////////////////////////////////////////////////////////////////////////

// Cohort manifest as written in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct CohortManifest {
    pub reference: ReferenceManifest,
    pub patients: Vec<PatientManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceManifest {
    pub name: String,
    pub table: PathBuf,
    #[serde(default)]
    pub regions: BTreeMap<String, (usize, usize)>, // [start, end) in reference coordinates
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientManifest {
    pub name: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub samples: Vec<SampleManifest>,
    pub trajectories: BTreeMap<String, PathBuf>,
    pub maps: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SampleManifest {
    pub time: f64,      // days since estimated date of infection
    pub ysi: f64,       // years since infection
    pub templates: f64, // number of viral templates sequenced
}

#[derive(Debug, Clone)]
pub struct FileManifest {
    pub filename: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FileReference {
    pub filename: PathBuf,
    pub name: String,
    pub regions: BTreeMap<String, (usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct FileTrajectory {
    pub filename: PathBuf,
    pub samples: Vec<SampleManifest>,
    pub cov_min: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone)]
pub struct FileMap {
    pub filename: PathBuf,
}

// Cross-sectional reference: entropy and consensus of an alignment of many patients
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub entropy: Array1<f64>,            // cross-sectional entropy per position
    pub consensus: Vec<usize>,           // index into ALPHABET
    pub pairing: Option<Array1<f64>>,    // RNA pairing probability
    pub synonymous: Option<Vec<bool>>,   // non-coding or synonymous-only positions
    pub regions: BTreeMap<String, (usize, usize)>,
}

// Allele frequency trajectories of a single patient in a single region
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub times: Array1<f64>,       // T
    pub frequencies: Array3<f64>, // T samples x 6 alleles x L sites
    pub mask: Array2<bool>,       // T x L, true where coverage was too low
    pub ysi: Array1<f64>,         // T
    pub templates: Array1<f64>,   // T
}

// Rows of (reference position, patient position)
#[derive(Debug, Clone, PartialEq)]
pub struct PatientMap {
    pub rows: Vec<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct Patient {
    pub name: String,
    pub subtype: Option<String>,
    pub trajectories: BTreeMap<String, Trajectory>,
    pub maps: BTreeMap<String, PatientMap>,
}

#[derive(Debug, Clone)]
pub struct Cohort {
    pub reference: Reference,
    pub patients: Vec<Patient>,
}

// Reference positions grouped by cross-sectional entropy
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyQuantile {
    pub range: (f64, f64),
    pub positions: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct QuantileSettings {
    pub q: usize,
    pub xcut: f64,
    pub xcut_up: f64,
    pub divergence: bool,
    pub remove_outliers: bool,
    pub outlier_cutoff: f64,
}

// Per-quantile summaries of one patient's trajectories
#[derive(Debug, Clone)]
pub struct QuantileData {
    pub times: Array1<f64>,          // K
    pub site_means: Array2<f64>,     // q x K
    pub covariances: Array3<f64>,    // q x K x K
    pub site_counts: Vec<usize>,     // q
    pub sites: Vec<Array2<f64>>,     // q matrices of K x sites
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseModel {
    Gaussian,
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrecisionMode {
    Inverse,
    Analytic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Optimizer {
    Amoeba,
    Argmin,
}

#[derive(Debug, Clone)]
pub struct KlSettings {
    pub sigma: f64,                // sampling noise
    pub weight_by_site_count: bool,
    pub noise: NoiseModel,
    pub precision: PrecisionMode,
    pub optimizer: Optimizer,
    pub max_iters: usize,
}

#[derive(Debug, Clone)]
pub struct KlFit {
    pub s: Array1<f64>,
    pub mu: f64,
    pub d: f64,
    pub negative_log_likelihood: f64,
    pub iterations: usize,
    pub method: String,
}

#[derive(Debug, Clone)]
pub struct SimplexSettings {
    pub edges: Array1<f64>,
    pub tol_x: f64,
    pub tol_f: f64,
    pub max_iters: usize,
}

#[derive(Debug, Clone)]
pub struct SimplexMinimum {
    pub x: Array1<f64>,
    pub f: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct BootstrapSummary {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
    pub replicates: Array2<f64>, // n_boot x parameters
}

#[derive(Debug, Clone)]
pub struct PooledSettings {
    pub depth_cap: f64,
    pub min_ysi: f64,
    pub n_bootstraps: usize,
    pub mutation_rate: f64,
    pub af_cutoff: f64,
}

// Allele frequencies pooled over patients for one region
#[derive(Debug, Clone)]
pub struct PooledFrequencies {
    pub region: String,
    pub start: usize,                  // reference coordinate of column 0
    pub by_patient: Vec<Array2<f64>>,  // 6 x region length each
    pub combined: Array2<f64>,         // 6 x region length
    pub entropy: Array1<f64>,
    pub minor: Array1<f64>,            // NaN where no patient contributed
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub r: f64,
    pub pval: f64,
}

///////////////////////////////////////////////////////////////////////////////
// TRAITS
///////////////////////////////////////////////////////////////////////////////

pub trait Parse<T> {
    fn lparse(&self) -> Result<T>;
}

pub trait Check {
    fn check(&self) -> Result<&Self>;
}

/// Negative log likelihood over an unconstrained parameter vector
pub trait Objective {
    fn n_params(&self) -> usize;
    fn evaluate(&self, params: &[f64]) -> f64;
}
