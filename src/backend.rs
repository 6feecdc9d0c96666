//! On-disk store for ensemble runs: the inputs that define the likelihood plus
//! the chain itself, in one JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::DataFrame;
use crate::error::{Error, Result};
use crate::model::Simulator;
use crate::params::ParameterSet;
use crate::sampling::{Chain, SampleParameter};

/// A stored simulator: a registered model, or just the name that was saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatorRef {
    Known(Simulator),
    Unknown(String),
}

impl SimulatorRef {
    pub fn name(&self) -> &str {
        match self {
            SimulatorRef::Known(s) => s.name(),
            SimulatorRef::Unknown(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct BackendFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fit_parameters: Option<Vec<SampleParameter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fixed_values: Option<ParameterSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<DataFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    simulator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chain: Option<Chain>,
    /// Missing estimates are stored as null.
    #[serde(default)]
    autocorrelations: Vec<Vec<Option<f64>>>,
}

/// JSON-file chain backend.
#[derive(Debug, Clone)]
pub struct ChainBackend {
    path: PathBuf,
    file: BackendFile,
}

impl ChainBackend {
    /// Open `path` if it exists, otherwise start an empty store that is
    /// written on the first save.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text)
                .map_err(|e| Error::Backend(format!("{}: {e}", path.display())))?
        } else {
            BackendFile::default()
        };
        Ok(Self { path, file })
    }

    /// Start a fresh store at `path`, discarding anything already there.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let backend = Self { path: path.as_ref().to_path_buf(), file: BackendFile::default() };
        backend.save()?;
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fit_parameters(&self) -> Option<&[SampleParameter]> {
        self.file.fit_parameters.as_deref()
    }

    pub fn fixed_values(&self) -> Option<&ParameterSet> {
        self.file.fixed_values.as_ref()
    }

    pub fn data(&self) -> Option<&DataFrame> {
        self.file.data.as_ref()
    }

    pub fn simulator(&self) -> Option<SimulatorRef> {
        self.file.simulator.as_deref().map(|name| match Simulator::from_name(name) {
            Some(s) => SimulatorRef::Known(s),
            None => SimulatorRef::Unknown(name.to_string()),
        })
    }

    pub fn chain(&self) -> Option<&Chain> {
        self.file.chain.as_ref()
    }

    pub fn iteration(&self) -> usize {
        self.file.chain.as_ref().map_or(0, Chain::iterations)
    }

    pub fn autocorrelations(&self) -> Vec<Vec<f64>> {
        self.file
            .autocorrelations
            .iter()
            .map(|row| row.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect()
    }

    /// Store the inputs of a new run and drop any previous chain.
    pub fn set_run(
        &mut self,
        fit_parameters: &[SampleParameter],
        fixed_values: &ParameterSet,
        data: &DataFrame,
        simulator: &str,
    ) -> Result<()> {
        self.file = BackendFile {
            fit_parameters: Some(fit_parameters.to_vec()),
            fixed_values: Some(fixed_values.clone()),
            data: Some(data.clone()),
            simulator: Some(simulator.to_string()),
            chain: None,
            autocorrelations: Vec::new(),
        };
        self.save()
    }

    pub fn record(&mut self, chain: &Chain, autocorrelations: &[Vec<f64>]) -> Result<()> {
        self.file.chain = Some(chain.clone());
        self.file.autocorrelations = autocorrelations
            .iter()
            .map(|row| row.iter().map(|v| v.is_finite().then_some(*v)).collect())
            .collect();
        tracing::debug!(path = %self.path.display(), iteration = chain.iterations(), "chain saved");
        self.save()
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec(&self.file)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
