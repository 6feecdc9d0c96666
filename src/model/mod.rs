pub mod base;
pub mod neher;
pub mod seir;
pub mod seirpp;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::DataFrame;
use crate::distributions::GammaDistribution;
use crate::error::{Error, Result};
use crate::math::interp::interp_linear_many;
use crate::mitigation::MitigationModel;
use crate::params::{ParamValue, ParameterSet};

pub use base::{InitialState, NonMarkovianSeir, SimulationResult};
pub use neher::NeherModelSimulation;
pub use seir::SeirModelSimulation;
#[allow(deprecated)]
pub use seirpp::SeirPlusPlusHospitalCriticalAndDeath;
pub use seirpp::{SeirPlusPlusOnsetAndDeath, SeirPlusPlusSimulation};

/// Delay distributions that can be given as `<key>_mean` plus `<key>_std` or `<key>_k`.
pub const DISTRIBUTION_KEYS: [&str; 8] = [
    "serial",
    "incubation",
    "hospitalized",
    "discharged",
    "critical",
    "dead",
    "recovered",
    "all_dead",
];

/// Probabilities that may be rescaled by `p_<key>_prefactor`.
pub const PREFACTOR_KEYS: [&str; 5] = ["symptomatic", "positive", "hospitalized", "critical", "dead"];

pub const DEFAULT_MIN_MITIGATION_SPACING: f64 = 5.0;

/// Everything the shared driver has already parsed out of a parameter set.
///
/// Models take what they need; the rest of `params` is what they did not
/// recognize.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub mitigation: MitigationModel,
    pub age_distribution: Vec<f64>,
    pub distributions: BTreeMap<String, GammaDistribution>,
    pub params: ParameterSet,
}

impl ModelInputs {
    pub fn new(mitigation: MitigationModel, age_distribution: Vec<f64>, params: ParameterSet) -> Self {
        Self { mitigation, age_distribution, distributions: BTreeMap::new(), params }
    }

    pub fn n_ages(&self) -> usize {
        self.age_distribution.len()
    }

    pub fn take_distribution(&mut self, key: &str, default: GammaDistribution) -> GammaDistribution {
        self.distributions.remove(key).unwrap_or(default)
    }

    pub fn take_scalar_or(&mut self, key: &str, default: f64) -> Result<f64> {
        Ok(self.params.take_scalar(key)?.unwrap_or(default))
    }

    /// Per-age probability (or scalar) broadcast over the age groups.
    pub fn take_per_age_or(&mut self, key: &str, default: f64) -> Result<Vec<f64>> {
        let n = self.n_ages();
        match self.params.take_value(key) {
            Some(v) => v.broadcast(n),
            None => Ok(vec![default; n]),
        }
    }

    /// Fail on anything a strict model did not consume.
    pub fn ensure_consumed(&self) -> Result<()> {
        let unused: Vec<String> = self
            .distributions
            .keys()
            .map(|k| format!("{k}_mean"))
            .chain(self.params.keys().cloned())
            .collect();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(Error::UnknownParameters(unused))
        }
    }
}

/// A model that can be built from keyword parameters and run over a time span.
pub trait ModelSimulation: Sized {
    /// Registry name, also what the sampling backend stores.
    const NAME: &'static str;
    /// Compartments that also get a daily `<key>_incr` column.
    const INCREMENT_KEYS: &'static [&'static str];
    /// Whether unrecognized parameters are rejected.
    const STRICT: bool = true;

    fn from_inputs(inputs: &mut ModelInputs) -> Result<Self>;

    fn solve(&self, tspan: (f64, f64), total_population: f64, initial_cases: f64) -> Result<SimulationResult>;
}

/// Build and run model `M` from keyword parameters, evaluating the age-summed
/// compartments at `t_eval` (days since 2020-01-01).
///
/// Fails with [`Error::InvalidParameters`] for parameter sets that cannot be
/// simulated, which the likelihood treats as impossible rather than fatal.
pub fn get_model_data<M: ModelSimulation>(t_eval: &[f64], mut params: ParameterSet) -> Result<DataFrame> {
    let Some(&t_last) = t_eval.last() else {
        return Err(Error::invalid("no evaluation times given"));
    };

    let t0 = params.take_required_scalar("start_day")?;
    let tf = t_last + 2.0;

    if t_eval.iter().any(|t| *t < t0 + 1.0) {
        return Err(Error::invalid(
            "Must start simulation at least one day before result evaluation.",
        ));
    }

    if let Some(log_ifr) = params.take_scalar("log_ifr")? {
        if params.contains("ifr") {
            return Err(Error::invalid("Can't pass both ifr and log_ifr."));
        }
        params.insert("ifr", log_ifr.exp());
    }

    let mitigation = MitigationModel::from_parameters(t0, tf, &mut params)?;
    let min_spacing = params
        .take_scalar("min_mitigation_spacing")?
        .unwrap_or(DEFAULT_MIN_MITIGATION_SPACING);
    if mitigation.min_spacing().is_some_and(|gap| gap < min_spacing) {
        return Err(Error::invalid(
            "Mitigation times must be spaced by at least min_mitigation_spacing. \
             Decrease min_mitigation_spacing to prevent this check.",
        ));
    }

    let age_distribution = params.take_required_vector("age_distribution")?;

    let mut distributions = BTreeMap::new();
    for key in DISTRIBUTION_KEYS {
        let mean = params.take_scalar(&format!("{key}_mean"))?;
        let std = params.take_scalar(&format!("{key}_std"))?;
        let shape = params.take_scalar(&format!("{key}_k"))?;
        let dist = match (mean, shape, std) {
            (Some(mean), Some(shape), _) => GammaDistribution::from_mean_shape(mean, shape)?,
            (Some(mean), None, Some(std)) => GammaDistribution::from_mean_std(mean, std)?,
            (Some(_), None, None) => {
                return Err(Error::invalid(format!("Must pass either {key}_k or {key}_std.")));
            }
            (None, _, _) => continue,
        };
        distributions.insert(key.to_string(), dist);
    }

    for key in PREFACTOR_KEYS {
        if let Some(prefactor) = params.take_scalar(&format!("p_{key}_prefactor"))? {
            let p_key = format!("p_{key}");
            let prob = params.get(&p_key).cloned().unwrap_or(ParamValue::Scalar(1.0));
            params.insert(p_key, prob.scale(prefactor));
        }
    }

    let total_population = params.take_required_scalar("total_population")?;
    let initial_cases = params.take_required_scalar("initial_cases")?;

    let mut inputs = ModelInputs::new(mitigation, age_distribution, params);
    inputs.distributions = distributions;
    let model = M::from_inputs(&mut inputs)?;
    if M::STRICT {
        inputs.ensure_consumed()?;
    }

    let result = model.solve((t0, tf), total_population, initial_cases)?;
    tracing::trace!(model = M::NAME, steps = result.t.len(), "simulation finished");

    let mut frame = DataFrame::new(t_eval.to_vec());
    let shifted: Vec<f64> = t_eval.iter().map(|t| t - 1.0).collect();
    for key in result.y.keys() {
        let total = result.total(key)?;
        let now = interp_linear_many(&result.t, &total, t_eval)?;
        if M::INCREMENT_KEYS.contains(&key.as_str()) {
            let before = interp_linear_many(&result.t, &total, &shifted)?;
            let incr = now.iter().zip(&before).map(|(a, b)| a - b).collect();
            frame.insert(format!("{key}_incr"), incr)?;
        }
        frame.insert(key.clone(), now)?;
    }
    Ok(frame)
}

/// Source of model predictions used by the likelihood estimator.
pub trait ModelDataSource: Send + Sync {
    fn name(&self) -> &str;

    fn get_model_data(&self, t_eval: &[f64], params: ParameterSet) -> Result<DataFrame>;
}

const ALIASES: [(&str, Simulator); 3] = [
    ("SEIRPlusPlusSimulation", Simulator::SeirPlusPlus),
    ("SEIRPlusPlusSimulationOnsetAndDeath", Simulator::SeirPlusPlusOnsetAndDeath),
    ("SEIRModelSimulation", Simulator::Seir),
];

/// The models shipped with the crate, addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Simulator {
    #[serde(rename = "SeirPlusPlusSimulation")]
    SeirPlusPlus,
    #[serde(rename = "SeirPlusPlusOnsetAndDeath")]
    SeirPlusPlusOnsetAndDeath,
    #[serde(rename = "SeirModelSimulation")]
    Seir,
    #[serde(rename = "NeherModelSimulation")]
    Neher,
}

impl Simulator {
    pub const ALL: [Simulator; 4] = [
        Simulator::SeirPlusPlus,
        Simulator::SeirPlusPlusOnsetAndDeath,
        Simulator::Seir,
        Simulator::Neher,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Simulator::SeirPlusPlus => SeirPlusPlusSimulation::NAME,
            Simulator::SeirPlusPlusOnsetAndDeath => SeirPlusPlusOnsetAndDeath::NAME,
            Simulator::Seir => SeirModelSimulation::NAME,
            Simulator::Neher => NeherModelSimulation::NAME,
        }
    }

    /// Registry names, plus the upper-case `SEIR...` spellings older chain
    /// stores carry.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == seirpp::LEGACY_HOSPITAL_CRITICAL_AND_DEATH {
            tracing::warn!("{name} is deprecated, use {}", SeirPlusPlusSimulation::NAME);
            return Some(Simulator::SeirPlusPlus);
        }
        Self::ALL
            .into_iter()
            .find(|s| s.name() == name)
            .or_else(|| ALIASES.iter().find(|(alias, _)| *alias == name).map(|(_, s)| *s))
    }

    pub fn get_model_data(&self, t_eval: &[f64], params: ParameterSet) -> Result<DataFrame> {
        match self {
            Simulator::SeirPlusPlus => get_model_data::<SeirPlusPlusSimulation>(t_eval, params),
            Simulator::SeirPlusPlusOnsetAndDeath => {
                get_model_data::<SeirPlusPlusOnsetAndDeath>(t_eval, params)
            }
            Simulator::Seir => get_model_data::<SeirModelSimulation>(t_eval, params),
            Simulator::Neher => get_model_data::<NeherModelSimulation>(t_eval, params),
        }
    }
}

impl std::str::FromStr for Simulator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Simulator::from_name(s).ok_or_else(|| Error::UnknownSimulator(s.to_string()))
    }
}

impl std::fmt::Display for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ModelDataSource for Simulator {
    fn name(&self) -> &str {
        Simulator::name(self)
    }

    fn get_model_data(&self, t_eval: &[f64], params: ParameterSet) -> Result<DataFrame> {
        Simulator::get_model_data(self, t_eval, params)
    }
}
