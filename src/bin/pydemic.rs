use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pydemic::config::FitConfig;
use pydemic::io::case_data::write_frame_csv;
use pydemic::io::population::load_age_distribution_csv;
use pydemic::io::run_log::write_run_log;
use pydemic::sampling::LikelihoodEstimator;
use pydemic::{ChainBackend, ParameterSet, Simulator};

#[derive(Parser)]
#[command(name = "pydemic", version, about = "Epidemic simulation and parameter inference")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one model and write its daily output as CSV.
    Simulate {
        /// Model name, e.g. SeirPlusPlusSimulation.
        #[arg(long, default_value = "SeirPlusPlusSimulation")]
        model: String,
        /// JSON parameter set.
        #[arg(long)]
        params: PathBuf,
        /// Age distribution CSV (`age,count`) overriding `age_distribution`.
        #[arg(long)]
        ages: Option<PathBuf>,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
        #[arg(long, short)]
        output: PathBuf,
        /// Also write a run log into this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Fit a model to case data as described by a JSON fit config.
    Sample {
        config: PathBuf,
        /// Resume the chain stored in the configured backend.
        #[arg(long)]
        resume: bool,
    },
    /// Summarize a chain backend file.
    Inspect {
        backend: PathBuf,
        /// Iterations to drop from the start of the chain.
        #[arg(long, default_value_t = 0)]
        discard: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pydemic=info")))
        .init();

    match Cli::parse().command {
        Command::Simulate { model, params, ages, start, end, output, log_dir } => {
            simulate(&model, &params, ages.as_deref(), (start, end), &output, log_dir.as_deref())
        }
        Command::Sample { config, resume } => sample(&config, resume),
        Command::Inspect { backend, discard } => inspect(&backend, discard),
    }
}

fn read_params(path: &std::path::Path) -> anyhow::Result<ParameterSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameters: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse parameters: {}", path.display()))
}

fn simulate(
    model: &str,
    params_path: &std::path::Path,
    ages: Option<&std::path::Path>,
    (start, end): (f64, f64),
    output: &std::path::Path,
    log_dir: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let simulator: Simulator = model.parse()?;
    let mut params = read_params(params_path)?;
    if let Some(ages) = ages {
        params.insert("age_distribution", load_age_distribution_csv(ages)?.fractions());
    }
    anyhow::ensure!(end >= start, "end day {} precedes start day {}", end, start);

    let t_eval: Vec<f64> = (0..=(end - start).floor() as usize).map(|i| start + i as f64).collect();
    let frame = simulator
        .get_model_data(&t_eval, params.clone())
        .with_context(|| format!("{} failed", simulator))?;
    write_frame_csv(output, &frame)?;
    tracing::info!(model = %simulator, rows = frame.len(), output = %output.display(), "simulation written");

    if let Some(dir) = log_dir {
        let run_id = format!("{}-{}", simulator, chrono::Utc::now().format("%Y%m%dT%H%M%S"));
        let columns: Vec<&str> = frame.column_names().collect();
        let path = write_run_log(dir, &run_id, simulator.name(), &params, &frame, &columns)?;
        tracing::info!(path = %path.display(), "run log written");
    }
    Ok(())
}

fn sample(config_path: &std::path::Path, resume: bool) -> anyhow::Result<()> {
    let cfg = FitConfig::load(config_path)?;
    let estimator = cfg.estimator()?;

    if let Some(grid) = &cfg.grid {
        let (points, values) = estimator.sample_uniform(grid)?;
        let best = points
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1));
        match best {
            Some((theta, lp)) => report_best(&estimator, theta, *lp),
            None => tracing::warn!("no grid point has finite probability"),
        }
        return Ok(());
    }

    let mut options = cfg.sampler.clone();
    options.resume |= resume;
    let mut backend = match &cfg.backend {
        Some(path) => Some(ChainBackend::open(path)?),
        None => None,
    };
    let run = estimator.sample_ensemble(&options, backend.as_mut())?;

    let last = run.chain.positions.last().zip(run.chain.log_prob.last());
    if let Some((positions, lps)) = last {
        let best = positions
            .iter()
            .zip(lps)
            .filter(|(_, v)| v.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1));
        if let Some((theta, lp)) = best {
            report_best(&estimator, theta, *lp);
        }
    }
    if let Some(tau) = run.autocorrelations.last() {
        tracing::info!(?tau, "autocorrelation time");
    }
    Ok(())
}

fn report_best(estimator: &LikelihoodEstimator, theta: &[f64], log_prob: f64) {
    for (name, value) in estimator.fit_names().iter().zip(theta) {
        println!("{name} = {value:.6}");
    }
    println!("log_probability = {log_prob:.6}");
}

fn inspect(path: &std::path::Path, discard: usize) -> anyhow::Result<()> {
    anyhow::ensure!(path.exists(), "no backend at {}", path.display());
    let backend = ChainBackend::open(path)?;

    if let Some(sim) = backend.simulator() {
        println!("simulator: {}", sim.name());
    }
    if let Some(data) = backend.data() {
        println!("data: {} rows, columns {:?}", data.len(), data.column_names().collect::<Vec<_>>());
    }
    let Some(chain) = backend.chain() else {
        println!("no chain stored");
        return Ok(());
    };
    println!("iterations: {} ({} walkers)", chain.iterations(), chain.walkers);

    let samples = chain.flat_samples(discard, 1);
    let names: Vec<String> = backend
        .fit_parameters()
        .map(|ps| ps.iter().map(|p| p.name.clone()).collect())
        .unwrap_or_else(|| (0..chain.ndim).map(|d| format!("x{d}")).collect());
    let n = samples.len().max(1) as f64;
    for (d, name) in names.iter().enumerate() {
        let mean = samples.iter().map(|s| s[d]).sum::<f64>() / n;
        let var = samples.iter().map(|s| (s[d] - mean).powi(2)).sum::<f64>() / n;
        println!("{name}: mean {mean:.6} std {:.6}", var.sqrt());
    }
    let acceptance = chain.acceptance_fraction();
    let mean_acceptance = acceptance.iter().sum::<f64>() / acceptance.len().max(1) as f64;
    println!("mean acceptance: {mean_acceptance:.3}");
    if let Some(tau) = backend.autocorrelations().last() {
        println!("autocorrelation time: {tau:?}");
    }

    Ok(())
}
