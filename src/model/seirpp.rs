//! SEIR++ models: the renewal-equation infection driver with hospital, ICU
//! and death readouts obtained by convolving fluxes with delay distributions.

use std::collections::BTreeMap;

use crate::distributions::GammaDistribution;
use crate::error::{Error, Result};
use crate::model::base::{combine, cumsum, InitialState, NonMarkovianSeir, SimulationResult, DEFAULT_DT};
use crate::model::{ModelInputs, ModelSimulation};

/// Name the hospital/critical/death variant used to be registered under.
pub const LEGACY_HOSPITAL_CRITICAL_AND_DEATH: &str = "SEIRPlusPlusSimulationHospitalCriticalAndDeath";

// Fraction of ICU patients on ventilators.
const VENTILATOR_FRACTION: f64 = 0.73;

fn infectious_dist() -> GammaDistribution {
    GammaDistribution::with_mean_std(5.0, 2.0)
}

/// Flux `key` fed from `source` with per-age probability `prob` after a delay
/// drawn from `dist`.
#[derive(Debug, Clone)]
pub struct Readout {
    pub key: &'static str,
    pub source: &'static str,
    pub prob: Vec<f64>,
    pub dist: GammaDistribution,
}

fn apply_readouts(
    influxes: &mut SimulationResult,
    readouts: &[Readout],
) -> Result<()> {
    for readout in readouts {
        let source = influxes.compartment(readout.source)?;
        let flux = readout.dist.convolve_pdf(&influxes.t, source, &readout.prob);
        influxes.y.insert(readout.key.to_string(), flux);
    }
    Ok(())
}

/// Turn per-step influxes into levels: everything is accumulated except the
/// susceptible population, which already is one.
fn accumulate(influxes: &SimulationResult) -> Result<SimulationResult> {
    let mut y = BTreeMap::new();
    for (key, val) in &influxes.y {
        let level = if key == "susceptible" { val.clone() } else { cumsum(val) };
        y.insert(key.clone(), level);
    }
    let mut sol = SimulationResult { t: influxes.t.clone(), y };
    let infected = influxes.compartment("infected")?;
    let infectious = infectious_dist().convolve_survival(&influxes.t, infected);
    sol.y.insert("infectious".to_string(), infectious);
    Ok(sol)
}

fn elementwise(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

/// SEIR++ with the readout topology
///
/// ```text
/// -> symptomatic
///     -> hospitalized -> recovered
///                     -> critical -> dead -> all_dead
///                                 -> hospitalized -> recovered
/// ```
#[derive(Debug, Clone)]
pub struct SeirPlusPlusSimulation {
    pub base: NonMarkovianSeir,
    pub age_distribution: Vec<f64>,
    pub readouts: Vec<Readout>,
    pub dt: f64,
}

/// Old name of [`SeirPlusPlusSimulation`].
#[deprecated(note = "use SeirPlusPlusSimulation")]
pub type SeirPlusPlusHospitalCriticalAndDeath = SeirPlusPlusSimulation;

/// Probabilities and delays of the SEIR++ readouts.
#[derive(Debug, Clone)]
pub struct SeirPlusPlusParams {
    /// Infection fatality ratio. When set, `p_symptomatic` is rescaled to hit it.
    pub ifr: Option<f64>,
    pub p_symptomatic: Vec<f64>,
    pub p_positive: Vec<f64>,
    pub p_hospitalized: Vec<f64>,
    pub p_critical: Vec<f64>,
    pub p_dead: Vec<f64>,
    pub all_dead_multiplier: f64,
    pub incubation_dist: GammaDistribution,
    pub hospitalized_dist: GammaDistribution,
    pub discharged_dist: GammaDistribution,
    pub critical_dist: GammaDistribution,
    pub dead_dist: GammaDistribution,
    pub recovered_dist: GammaDistribution,
    pub all_dead_dist: GammaDistribution,
}

impl SeirPlusPlusParams {
    pub fn defaults(n_ages: usize) -> Self {
        Self {
            ifr: None,
            p_symptomatic: vec![1.0; n_ages],
            p_positive: vec![1.0; n_ages],
            p_hospitalized: vec![1.0; n_ages],
            p_critical: vec![1.0; n_ages],
            p_dead: vec![1.0; n_ages],
            all_dead_multiplier: 1.0,
            incubation_dist: GammaDistribution::with_mean_std(5.5, 2.0),
            hospitalized_dist: GammaDistribution::with_mean_std(6.5, 4.0),
            discharged_dist: GammaDistribution::with_mean_std(6.0, 4.0),
            critical_dist: GammaDistribution::with_mean_std(2.0, 2.0),
            dead_dist: GammaDistribution::with_mean_std(7.5, 7.5),
            recovered_dist: GammaDistribution::with_mean_std(7.5, 7.5),
            all_dead_dist: GammaDistribution::with_mean_std(2.5, 2.5),
        }
    }

    fn from_inputs(inputs: &mut ModelInputs) -> Result<Self> {
        let d = Self::defaults(inputs.n_ages());
        Ok(Self {
            ifr: inputs.params.take_scalar("ifr")?,
            p_symptomatic: inputs.take_per_age_or("p_symptomatic", 1.0)?,
            p_positive: inputs.take_per_age_or("p_positive", 1.0)?,
            p_hospitalized: inputs.take_per_age_or("p_hospitalized", 1.0)?,
            p_critical: inputs.take_per_age_or("p_critical", 1.0)?,
            p_dead: inputs.take_per_age_or("p_dead", 1.0)?,
            all_dead_multiplier: inputs.take_scalar_or("all_dead_multiplier", 1.0)?,
            incubation_dist: inputs.take_distribution("incubation", d.incubation_dist),
            hospitalized_dist: inputs.take_distribution("hospitalized", d.hospitalized_dist),
            discharged_dist: inputs.take_distribution("discharged", d.discharged_dist),
            critical_dist: inputs.take_distribution("critical", d.critical_dist),
            dead_dist: inputs.take_distribution("dead", d.dead_dist),
            recovered_dist: inputs.take_distribution("recovered", d.recovered_dist),
            all_dead_dist: inputs.take_distribution("all_dead", d.all_dead_dist),
        })
    }
}

impl SeirPlusPlusSimulation {
    pub fn new(base: NonMarkovianSeir, age_distribution: Vec<f64>, params: SeirPlusPlusParams) -> Result<Self> {
        let n = age_distribution.len();
        let per_age = [
            ("p_symptomatic", &params.p_symptomatic),
            ("p_positive", &params.p_positive),
            ("p_hospitalized", &params.p_hospitalized),
            ("p_critical", &params.p_critical),
            ("p_dead", &params.p_dead),
        ];
        for (name, v) in per_age {
            if v.len() != n {
                return Err(Error::invalid(format!(
                    "{name} has {} entries for {n} age groups",
                    v.len()
                )));
            }
        }

        let mut p_symptomatic = params.p_symptomatic.clone();
        if let Some(ifr) = params.ifr {
            let weighted_sum: f64 = (0..n)
                .map(|a| {
                    p_symptomatic[a]
                        * params.p_hospitalized[a]
                        * params.p_critical[a]
                        * params.p_dead[a]
                        * params.all_dead_multiplier
                        * age_distribution[a]
                })
                .sum();
            if !(weighted_sum > 0.0) {
                return Err(Error::invalid("cannot rescale p_symptomatic to the requested ifr"));
            }
            for p in &mut p_symptomatic {
                *p *= ifr / weighted_sum;
            }
        }

        // each step of the progression can only lose people
        let chain = [
            ("p_symptomatic", &p_symptomatic),
            ("p_hospitalized", &params.p_hospitalized),
            ("p_critical", &params.p_critical),
            ("p_dead", &params.p_dead),
        ];
        let mut progression = age_distribution.clone();
        for (name, prob) in chain {
            let next = elementwise(&progression, prob);
            if progression.iter().sum::<f64>() < next.iter().sum::<f64>() {
                return Err(Error::invalid(format!("{name} is too large")));
            }
            progression = next;
        }

        let complement = |p: &[f64]| p.iter().map(|x| 1.0 - x).collect::<Vec<f64>>();
        let readouts = vec![
            Readout {
                key: "symptomatic",
                source: "infected",
                prob: p_symptomatic.clone(),
                dist: params.incubation_dist,
            },
            Readout {
                key: "positive",
                source: "infected",
                prob: elementwise(&params.p_positive, &p_symptomatic),
                dist: params.incubation_dist,
            },
            Readout {
                key: "admitted_to_hospital",
                source: "symptomatic",
                prob: params.p_hospitalized.clone(),
                dist: params.hospitalized_dist,
            },
            Readout {
                key: "icu",
                source: "admitted_to_hospital",
                prob: params.p_critical.clone(),
                dist: params.critical_dist,
            },
            Readout {
                key: "dead",
                source: "icu",
                prob: params.p_dead.clone(),
                dist: params.dead_dist,
            },
            Readout {
                key: "general_ward",
                source: "icu",
                prob: complement(&params.p_dead),
                dist: params.recovered_dist,
            },
            Readout {
                key: "hospital_recovered",
                source: "admitted_to_hospital",
                prob: complement(&params.p_critical),
                dist: params.discharged_dist,
            },
            Readout {
                key: "general_ward_recovered",
                source: "general_ward",
                prob: vec![1.0; n],
                dist: params.discharged_dist,
            },
            Readout {
                key: "all_dead",
                source: "dead",
                prob: vec![params.all_dead_multiplier; n],
                dist: params.all_dead_dist,
            },
        ];

        Ok(Self { base, age_distribution, readouts, dt: DEFAULT_DT })
    }

    pub fn run(&self, tspan: (f64, f64), y0: &InitialState) -> Result<SimulationResult> {
        let mut influxes = self.base.influxes(tspan, y0, self.dt)?;
        apply_readouts(&mut influxes, &self.readouts)?;
        let mut sol = accumulate(&influxes)?;

        let y = &sol.y;
        let get = |k: &str| y.get(k).map(Vec::as_slice).unwrap_or(&[]);
        let critical = combine(&[(1.0, get("icu")), (-1.0, get("general_ward")), (-1.0, get("dead"))]);
        let ventilators = combine(&[(VENTILATOR_FRACTION, critical.as_slice())]);
        let hospitalized = combine(&[
            (1.0, get("admitted_to_hospital")),
            (-1.0, get("hospital_recovered")),
            (-1.0, get("icu")),
            (1.0, get("general_ward")),
            (-1.0, get("general_ward_recovered")),
        ]);
        let total_discharged = combine(&[
            (1.0, get("hospital_recovered")),
            (1.0, get("general_ward_recovered")),
        ]);
        let recovered = combine(&[
            (1.0, get("infected")),
            (-1.0, get("infectious")),
            (-1.0, get("all_dead")),
        ]);

        sol.y.insert("critical".to_string(), critical);
        sol.y.insert("ventilators".to_string(), ventilators);
        sol.y.insert("hospitalized".to_string(), hospitalized);
        sol.y.insert("total_discharged".to_string(), total_discharged);
        sol.y.insert("recovered".to_string(), recovered);
        Ok(sol)
    }
}

impl ModelSimulation for SeirPlusPlusSimulation {
    const NAME: &'static str = "SeirPlusPlusSimulation";
    const INCREMENT_KEYS: &'static [&'static str] = &[
        "infected",
        "dead",
        "all_dead",
        "positive",
        "admitted_to_hospital",
        "total_discharged",
    ];

    fn from_inputs(inputs: &mut ModelInputs) -> Result<Self> {
        let base = NonMarkovianSeir::from_inputs(inputs)?;
        let dt = inputs.take_scalar_or("dt", DEFAULT_DT)?;
        let params = SeirPlusPlusParams::from_inputs(inputs)?;
        let mut sim = Self::new(base, inputs.age_distribution.clone(), params)?;
        sim.dt = dt;
        Ok(sim)
    }

    fn solve(&self, tspan: (f64, f64), total_population: f64, initial_cases: f64) -> Result<SimulationResult> {
        let y0 = InitialState::seeded(total_population, initial_cases, &self.age_distribution);
        self.run(tspan, &y0)
    }
}

/// Reduced SEIR++ that only reads out symptom onset and deaths.
#[derive(Debug, Clone)]
pub struct SeirPlusPlusOnsetAndDeath {
    pub base: NonMarkovianSeir,
    pub age_distribution: Vec<f64>,
    pub readouts: Vec<Readout>,
    pub dt: f64,
}

impl SeirPlusPlusOnsetAndDeath {
    pub fn new(
        base: NonMarkovianSeir,
        age_distribution: Vec<f64>,
        p_symptomatic: Vec<f64>,
        p_observed: Vec<f64>,
        p_dead: Vec<f64>,
        incubation_dist: GammaDistribution,
        dead_dist: GammaDistribution,
    ) -> Self {
        let readouts = vec![
            Readout {
                key: "observed",
                source: "infected",
                prob: elementwise(&p_observed, &p_symptomatic),
                dist: incubation_dist,
            },
            Readout { key: "dead", source: "observed", prob: p_dead, dist: dead_dist },
        ];
        Self { base, age_distribution, readouts, dt: DEFAULT_DT }
    }

    pub fn run(&self, tspan: (f64, f64), y0: &InitialState) -> Result<SimulationResult> {
        let mut influxes = self.base.influxes(tspan, y0, self.dt)?;
        apply_readouts(&mut influxes, &self.readouts)?;
        accumulate(&influxes)
    }
}

impl ModelSimulation for SeirPlusPlusOnsetAndDeath {
    const NAME: &'static str = "SeirPlusPlusOnsetAndDeath";
    const INCREMENT_KEYS: &'static [&'static str] = &["infected", "dead"];
    const STRICT: bool = false;

    fn from_inputs(inputs: &mut ModelInputs) -> Result<Self> {
        let base = NonMarkovianSeir::from_inputs(inputs)?;
        let dt = inputs.take_scalar_or("dt", DEFAULT_DT)?;
        let p_symptomatic = inputs.take_per_age_or("p_symptomatic", 1.0)?;
        let p_observed = inputs.take_per_age_or("p_observed", 1.0)?;
        let p_dead = inputs.take_per_age_or("p_dead", 1.0)?;
        let defaults = SeirPlusPlusParams::defaults(0);
        let incubation = inputs.take_distribution("incubation", defaults.incubation_dist);
        let dead = inputs.take_distribution("dead", defaults.dead_dist);
        let mut sim = Self::new(
            base,
            inputs.age_distribution.clone(),
            p_symptomatic,
            p_observed,
            p_dead,
            incubation,
            dead,
        );
        sim.dt = dt;
        Ok(sim)
    }

    fn solve(&self, tspan: (f64, f64), total_population: f64, initial_cases: f64) -> Result<SimulationResult> {
        let y0 = InitialState::seeded(total_population, initial_cases, &self.age_distribution);
        self.run(tspan, &y0)
    }
}
