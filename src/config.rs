use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::io::case_data::load_case_data_csv;
use crate::model::Simulator;
use crate::params::ParameterSet;
use crate::sampling::{EnsembleOptions, GridSize, LikelihoodEstimator, Norm, SampleParameter};

/// Fit description read by `pydemic sample`.
///
/// ```json
/// {
///   "simulator": "SeirPlusPlusSimulation",
///   "data": "cases.csv",
///   "norm": "poisson",
///   "fit_parameters": [{"name": "r0", "bounds": [1, 5], "guess": 3, "uncertainty": 0.5}],
///   "fixed_values": {"start_day": 40, "total_population": 1e6, "initial_cases": 10,
///                    "age_distribution": [0.5, 0.5]},
///   "sampler": {"walkers": 16, "steps": 200, "seed": 1},
///   "backend": "chain.json"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    pub simulator: String,
    /// Case data CSV; relative paths resolve against the config file.
    pub data: PathBuf,
    pub fit_parameters: Vec<SampleParameter>,
    #[serde(default)]
    pub fixed_values: ParameterSet,
    #[serde(default)]
    pub norm: Norm,
    #[serde(default)]
    pub sampler: EnsembleOptions,
    /// Evaluate on a grid instead of running the ensemble sampler.
    #[serde(default)]
    pub grid: Option<GridSize>,
    #[serde(default)]
    pub backend: Option<PathBuf>,
}

impl FitConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fit config: {}", path.display()))?;
        let mut cfg: FitConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse fit config: {}", path.display()))?;
        if let Some(dir) = path.parent() {
            cfg.data = dir.join(&cfg.data);
            cfg.backend = cfg.backend.map(|b| dir.join(b));
        }
        Ok(cfg)
    }

    pub fn simulator(&self) -> anyhow::Result<Simulator> {
        Ok(self.simulator.parse::<Simulator>()?)
    }

    pub fn estimator(&self) -> anyhow::Result<LikelihoodEstimator> {
        let data = load_case_data_csv(&self.data)?;
        let estimator = LikelihoodEstimator::new(
            self.fit_parameters.clone(),
            self.fixed_values.clone(),
            data,
            Arc::new(self.simulator()?),
            self.norm,
        )?;
        Ok(estimator)
    }
}
