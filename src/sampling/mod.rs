//! Parameter inference: likelihood of case data under a model, evaluated on a
//! uniform grid or explored with an affine-invariant ensemble sampler.

pub mod autocorr;
pub mod ensemble;
pub mod norm;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::ChainBackend;
use crate::data::DataFrame;
use crate::error::{Error, Result};
use crate::model::ModelDataSource;
use crate::params::ParameterSet;

pub use autocorr::integrated_time;
pub use ensemble::{Chain, EnsembleSampler};
pub use norm::Norm;

/// A parameter that is fit rather than held fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleParameter {
    pub name: String,
    pub bounds: (f64, f64),
    #[serde(default)]
    pub guess: Option<f64>,
    #[serde(default)]
    pub uncertainty: Option<f64>,
    /// Width of a Gaussian prior centred on `guess`.
    #[serde(default)]
    pub sigma: Option<f64>,
}

impl SampleParameter {
    pub fn new(name: impl Into<String>, bounds: (f64, f64)) -> Self {
        Self { name: name.into(), bounds, guess: None, uncertainty: None, sigma: None }
    }

    pub fn with_guess(mut self, guess: f64, uncertainty: f64) -> Self {
        self.guess = Some(guess);
        self.uncertainty = Some(uncertainty);
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn contains(&self, value: f64) -> bool {
        self.bounds.0 <= value && value <= self.bounds.1
    }

    /// Evenly spaced values across the bounds, endpoints included.
    pub fn linspace(&self, n: usize) -> Vec<f64> {
        let (lo, hi) = self.bounds;
        match n {
            0 => Vec::new(),
            1 => vec![lo],
            _ => (0..n).map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64).collect(),
        }
    }
}

/// Points per parameter for [`LikelihoodEstimator::sample_uniform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GridSize {
    Uniform(usize),
    PerParameter(BTreeMap<String, usize>),
}

/// Settings for [`LikelihoodEstimator::sample_ensemble`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleOptions {
    /// Defaults to the larger of the thread count and twice the dimension.
    pub walkers: Option<usize>,
    pub steps: usize,
    pub checkpoint_steps: usize,
    pub stretch_scale: f64,
    pub seed: Option<u64>,
    /// Continue the chain stored in the backend instead of starting over.
    pub resume: bool,
}

impl Default for EnsembleOptions {
    fn default() -> Self {
        Self {
            walkers: None,
            steps: 100,
            checkpoint_steps: 100,
            stretch_scale: 2.0,
            seed: None,
            resume: false,
        }
    }
}

/// Result of an ensemble run.
#[derive(Debug, Clone)]
pub struct EnsembleRun {
    pub chain: Chain,
    /// One row of per-dimension autocorrelation times per checkpoint.
    pub autocorrelations: Vec<Vec<f64>>,
}

/// Log-likelihood of case data under a model, as a function of the fit
/// parameters.
#[derive(Clone)]
pub struct LikelihoodEstimator {
    pub fit_parameters: Vec<SampleParameter>,
    pub fixed_values: ParameterSet,
    pub data: DataFrame,
    pub simulator: Arc<dyn ModelDataSource>,
    pub norm: Norm,
}

impl std::fmt::Debug for LikelihoodEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LikelihoodEstimator")
            .field("fit_parameters", &self.fit_parameters)
            .field("fixed_values", &self.fixed_values)
            .field("simulator", &self.simulator.name())
            .field("norm", &self.norm)
            .finish_non_exhaustive()
    }
}

impl LikelihoodEstimator {
    pub fn new(
        fit_parameters: Vec<SampleParameter>,
        fixed_values: ParameterSet,
        data: DataFrame,
        simulator: Arc<dyn ModelDataSource>,
        norm: Norm,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for p in &fit_parameters {
            if !seen.insert(p.name.as_str()) {
                return Err(Error::Sampling(format!("parameter '{}' is fit twice", p.name)));
            }
            let (lo, hi) = p.bounds;
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(Error::Sampling(format!("parameter '{}' has bounds {:?}", p.name, p.bounds)));
            }
            if fixed_values.contains(&p.name) {
                return Err(Error::Sampling(format!("parameter '{}' is both fit and fixed", p.name)));
            }
        }
        if data.is_empty() {
            return Err(Error::Sampling("no case data to fit".into()));
        }
        Ok(Self { fit_parameters, fixed_values, data, simulator, norm })
    }

    pub fn ndim(&self) -> usize {
        self.fit_parameters.len()
    }

    pub fn fit_names(&self) -> Vec<&str> {
        self.fit_parameters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn check_within_bounds(&self, theta: &[f64]) -> bool {
        theta.len() == self.ndim()
            && self.fit_parameters.iter().zip(theta).all(|(p, v)| p.contains(*v))
    }

    /// Fixed values overlaid with `theta`.
    pub fn parameters(&self, theta: &[f64]) -> ParameterSet {
        let mut params = self.fixed_values.clone();
        for (p, v) in self.fit_parameters.iter().zip(theta) {
            params.insert(p.name.clone(), *v);
        }
        params
    }

    pub fn log_prior(&self, theta: &[f64]) -> f64 {
        self.fit_parameters
            .iter()
            .zip(theta)
            .filter_map(|(p, v)| match (p.guess, p.sigma) {
                (Some(guess), Some(sigma)) => Some(-0.5 * ((v - guess) / sigma).powi(2)),
                _ => None,
            })
            .sum()
    }

    /// Norm summed over the data columns that the model also produces.
    pub fn get_log_likelihood(&self, params: ParameterSet) -> Result<f64> {
        let model = self.simulator.get_model_data(&self.data.t, params)?;
        let mut total = 0.0;
        for (name, observed) in &self.data.columns {
            if let Some(predicted) = model.column(name) {
                total += self.norm.evaluate(predicted, observed);
            }
        }
        Ok(total)
    }

    /// Like [`log_probability`](Self::log_probability) but propagates errors
    /// other than invalid parameters.
    pub fn try_log_probability(&self, theta: &[f64]) -> Result<f64> {
        if !self.check_within_bounds(theta) {
            return Ok(f64::NEG_INFINITY);
        }
        match self.get_log_likelihood(self.parameters(theta)) {
            Ok(ll) => Ok(ll + self.log_prior(theta)),
            Err(e) if e.is_invalid_parameters() => {
                tracing::trace!(?theta, error = %e, "rejected parameters");
                Ok(f64::NEG_INFINITY)
            }
            Err(e) => Err(e),
        }
    }

    /// Log posterior (up to a constant); `-inf` outside the bounds or for
    /// parameter sets the model rejects.
    pub fn log_probability(&self, theta: &[f64]) -> f64 {
        self.try_log_probability(theta).unwrap_or_else(|e| {
            tracing::warn!(?theta, error = %e, "likelihood evaluation failed");
            f64::NEG_INFINITY
        })
    }

    /// `guess + N(0, 1) * uncertainty`, clamped into the bounds. Parameters
    /// without a guess or a positive uncertainty start uniformly inside their
    /// bounds; stretch moves cannot separate walkers that share a point.
    pub fn get_initial_positions<R: Rng + ?Sized>(&self, walkers: usize, rng: &mut R) -> Vec<Vec<f64>> {
        (0..walkers)
            .map(|_| {
                self.fit_parameters
                    .iter()
                    .map(|p| {
                        let (lo, hi) = p.bounds;
                        match (p.guess, p.uncertainty) {
                            (Some(guess), Some(uncertainty)) if uncertainty > 0.0 => {
                                let noise: f64 = StandardNormal.sample(&mut *rng);
                                (guess + noise * uncertainty).clamp(lo, hi)
                            }
                            _ => rng.gen_range(lo..=hi),
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Evaluate the log probability on a Cartesian grid over the bounds.
    /// Returns the grid points and their values in row-major order.
    pub fn sample_uniform(&self, size: &GridSize) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
        let axes: Vec<Vec<f64>> = self
            .fit_parameters
            .iter()
            .map(|p| {
                let n = match size {
                    GridSize::Uniform(n) => Some(*n),
                    GridSize::PerParameter(map) => map.get(&p.name).copied(),
                };
                n.map(|n| p.linspace(n))
                    .ok_or_else(|| Error::Sampling(format!("no grid size for '{}'", p.name)))
            })
            .collect::<Result<_>>()?;

        let mut points: Vec<Vec<f64>> = vec![Vec::new()];
        for axis in &axes {
            points = points
                .iter()
                .flat_map(|prefix| {
                    axis.iter().map(move |v| {
                        let mut p = prefix.clone();
                        p.push(*v);
                        p
                    })
                })
                .collect();
        }

        tracing::info!(points = points.len(), simulator = self.simulator.name(), "sampling uniform grid");
        let values = points
            .par_iter()
            .map(|theta| self.try_log_probability(theta))
            .collect::<Result<Vec<_>>>()?;
        Ok((points, values))
    }

    /// Run the stretch-move ensemble sampler, checkpointing the autocorrelation
    /// time and (if given) the backend every `checkpoint_steps` iterations.
    pub fn sample_ensemble(
        &self,
        options: &EnsembleOptions,
        mut backend: Option<&mut ChainBackend>,
    ) -> Result<EnsembleRun> {
        let ndim = self.ndim();
        let stored = match (&backend, options.resume) {
            (Some(b), true) => b.chain().cloned(),
            _ => None,
        };
        // A resumed run keeps the stored walker count unless told otherwise.
        let walkers = options
            .walkers
            .or_else(|| stored.as_ref().map(|c| c.walkers))
            .unwrap_or_else(|| rayon::current_num_threads().max(2 * ndim));
        let mut autocorrelations = match (&backend, &stored) {
            (Some(b), Some(_)) => b.autocorrelations(),
            _ => Vec::new(),
        };

        let mut sampler = EnsembleSampler::new(walkers, ndim, |theta: &[f64]| self.log_probability(theta), options.seed)?
            .with_stretch_scale(options.stretch_scale);

        let initial = match stored {
            Some(chain) => {
                tracing::info!(iterations = chain.iterations(), "resuming stored chain");
                sampler = sampler.with_chain(chain)?;
                None
            }
            None => {
                if let Some(b) = backend.as_deref_mut() {
                    b.set_run(&self.fit_parameters, &self.fixed_values, &self.data, self.simulator.name())?;
                }
                let mut rng = match options.seed {
                    Some(s) => StdRng::seed_from_u64(s.wrapping_add(1)),
                    None => StdRng::from_entropy(),
                };
                Some(self.get_initial_positions(walkers, &mut rng))
            }
        };

        tracing::info!(walkers, ndim, steps = options.steps, simulator = self.simulator.name(), "sampling ensemble");
        let checkpoint = options.checkpoint_steps.max(1);
        let steps = options.steps;
        let mut done = 0;
        sampler.run(initial, steps, |chain| {
            done += 1;
            if done % checkpoint == 0 || done == steps {
                let tau = integrated_time(&chain.positions, autocorr::DEFAULT_WINDOW_C);
                tracing::debug!(iteration = chain.iterations(), ?tau, "checkpoint");
                autocorrelations.push(tau);
                if let Some(b) = backend.as_deref_mut() {
                    b.record(chain, &autocorrelations)?;
                }
            }
            Ok(())
        })?;

        let chain = sampler.chain;
        let mean_acceptance =
            chain.acceptance_fraction().iter().sum::<f64>() / chain.walkers.max(1) as f64;
        tracing::info!(iterations = chain.iterations(), mean_acceptance, "sampling finished");
        Ok(EnsembleRun { chain, autocorrelations })
    }
}
