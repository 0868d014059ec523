use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::process;

mod base;
mod bootstrap;
mod compare;
mod io;
mod kl;
mod noncoding;
mod optim;
mod plot;
mod pooled;
mod quantiles;
mod saturation;
use base::{Check, KlSettings, Parse, PooledSettings, QuantileSettings, Result};

// Command line arguments
#[derive(Parser, Debug)]
#[clap(
    author = "hivfit developers",
    version = "0.1.0",
    about = "Fitness costs of mutations from within-host HIV allele frequency trajectories.",
    long_about = "Fitness costs of mutations from within-host HIV allele frequency trajectories: Kullback-Leibler fits of selection coefficients per entropy quantile, mutation-selection balance on pooled minor allele frequencies, non-coding features and comparisons against cross-sectional entropy."
)]
struct Args {
    /// Analysis to perform (i.e. "kl-fit", "saturation", "pooled", "noncoding", "compare")
    analysis: String,
    /// YAML cohort manifest listing the reference table and the patient trajectory and map tables
    #[clap(short, long, default_value = "")]
    manifest: String,
    /// Output directory for tables and plots
    #[clap(short, long, default_value = "hivfit_out")]
    outdir: String,
    /// Genomic region to analyse (a region of the reference or "genomewide")
    #[clap(short, long, default_value = "pol")]
    region: String,
    /// Number of cross-sectional entropy quantiles
    #[clap(short, long, default_value_t = 7)]
    q: usize,
    /// Number of patient bootstrap replicates of the KL fits
    #[clap(long, default_value_t = 100_000)]
    n_boot: usize,
    /// Number of bootstrap and partition replicates of the pooled and saturation analyses
    #[clap(long, default_value_t = 100)]
    n_bootstraps: usize,
    /// Minimum coverage below which a site of a sample is masked
    #[clap(long, default_value_t = 1000.0)]
    cov_min: f64,
    /// Allele frequencies below the sequencing error rate are set to zero
    #[clap(long, default_value_t = 2e-3)]
    error_rate: f64,
    /// Maximum number of templates a sample contributes to pooled frequencies
    #[clap(long, default_value_t = 300.0)]
    depth_cap: f64,
    /// Mutation rate per site per day used for mutation-selection balance and saturation fits
    #[clap(long, default_value_t = 1.2e-5)]
    mutation_rate: f64,
    /// Allele frequency added to the minor frequency when computing selection coefficients
    #[clap(long, default_value_t = 1e-5)]
    af_cutoff: f64,
    /// Sampling noise (standard deviation) of the KL likelihood
    #[clap(long, default_value_t = 0.0)]
    sigma: f64,
    /// Weight each quantile of the KL likelihood by its number of sites
    #[clap(long)]
    weight_by_site_count: bool,
    /// Noise model of the KL likelihood: "gaussian" or "sqrt"
    #[clap(long, default_value = "gaussian")]
    noise: String,
    /// Precision matrix of the Gaussian noise model: "inverse" or "analytic"
    #[clap(long, default_value = "inverse")]
    precision: String,
    /// Simplex minimiser: "amoeba" or "argmin"
    #[clap(long, default_value = "amoeba")]
    optimizer: String,
    /// Maximum number of optimiser iterations
    #[clap(long, default_value_t = 10_000)]
    max_iters: usize,
    /// Fit divergence x(1-x) instead of the minor frequency 1-x
    #[clap(long)]
    divergence: bool,
    /// Keep sites whose consensus changes during infection
    #[clap(long)]
    keep_outliers: bool,
    /// Seed of the random number generator (random if omitted)
    #[clap(long)]
    seed: Option<u64>,
    /// Number of threads to use for parallel processing
    #[clap(long, default_value_t = 1)]
    n_threads: usize,
    /// Write the log to this file instead of stderr
    #[clap(long)]
    log_file: Option<String>,
    /// Log debugging messages
    #[clap(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<Vec<String>> {
    let outdir = PathBuf::from(&args.outdir);
    let mut rng = bootstrap::new_rng(args.seed);
    let mut quantile_settings = QuantileSettings::new(args.q);
    quantile_settings.divergence = args.divergence;
    quantile_settings.remove_outliers = !args.keep_outliers;
    let kl_settings = KlSettings {
        sigma: args.sigma,
        weight_by_site_count: args.weight_by_site_count,
        noise: args.noise.lparse()?,
        precision: args.precision.lparse()?,
        optimizer: args.optimizer.lparse()?,
        max_iters: args.max_iters,
    };
    kl_settings.check()?;
    let mut pooled_settings = PooledSettings::new();
    pooled_settings.depth_cap = args.depth_cap;
    pooled_settings.n_bootstraps = args.n_bootstraps;
    pooled_settings.mutation_rate = args.mutation_rate;
    pooled_settings.af_cutoff = args.af_cutoff;
    if args.analysis == String::from("compare") {
        return compare::run_compare(&args.region, &outdir);
    }
    if args.manifest.is_empty() {
        return Err(base::HivfitError::InvalidArgument(format!(
            "The {} analysis needs a cohort manifest (--manifest).",
            args.analysis
        )));
    }
    let cohort = io::load_cohort(&PathBuf::from(&args.manifest), args.cov_min, args.error_rate)?;
    log::info!(
        "Loaded {} patients against the {} reference",
        cohort.patients.len(),
        cohort.reference.name
    );
    if args.analysis == String::from("kl-fit") {
        kl::run_kl_fit(
            &cohort,
            &args.region,
            &quantile_settings,
            &kl_settings,
            args.n_boot,
            &mut rng,
            &outdir,
        )
    } else if args.analysis == String::from("saturation") {
        saturation::run_saturation(
            &cohort,
            &args.region,
            &quantile_settings,
            args.mutation_rate,
            args.n_bootstraps,
            kl_settings.optimizer,
            args.max_iters,
            &mut rng,
            &outdir,
        )
    } else if args.analysis == String::from("pooled") {
        pooled::run_pooled(&cohort, &args.region, &pooled_settings, &mut rng, &outdir)
    } else if args.analysis == String::from("noncoding") {
        noncoding::run_noncoding(&cohort, &pooled_settings, &outdir)
    } else {
        Err(base::HivfitError::InvalidArgument(format!(
            "Unknown analysis {}, please choose kl-fit, saturation, pooled, noncoding or compare.",
            args.analysis
        )))
    }
}

fn main() {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    match &args.log_file {
        Some(fname) => {
            if let Err(e) = simple_logging::log_to_file(fname, level) {
                eprintln!("Cannot log to {}: {}", fname, e);
                process::exit(1);
            }
        }
        None => simple_logging::log_to_stderr(level),
    }
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(args.n_threads)
        .build_global()
    {
        log::error!("Cannot set up {} threads: {}", args.n_threads, e);
        process::exit(1);
    }
    match run(args) {
        Ok(output) => {
            for fname in output.iter() {
                println!("{}", fname);
            }
        }
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    }
}
