//! Discrete-time age-structured model with hospital and ICU capacity.
//!
//! Transitions between compartments are drawn once per step, either as their
//! expected value or from a Poisson distribution, and each is capped by the
//! size of its source. Critical patients occupy ICU beds youngest age group
//! first; anyone who does not find a bed is counted as overflow.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::base::{time_grid, NonMarkovianSeir, SimulationResult};
use crate::model::{ModelInputs, ModelSimulation};

/// Largest seed an `f64` parameter holds exactly.
pub const MAX_SEED: u64 = 1 << 53;

/// Seeds `seed, seed + 1, ...` as values for the `seed` parameter.
pub fn seed_parameters(seed: u64, n: usize) -> Result<Vec<f64>> {
    (0..n as u64)
        .map(|i| match seed.checked_add(i) {
            Some(s) if s <= MAX_SEED => Ok(s as f64),
            _ => Err(Error::invalid(format!("seed {seed} + {i} exceeds {MAX_SEED}"))),
        })
        .collect()
}

fn seed_from_parameter(value: f64) -> Result<u64> {
    if value.fract() != 0.0 || !(0.0..=MAX_SEED as f64).contains(&value) {
        return Err(Error::invalid(format!("seed must be an integer in [0, {MAX_SEED}], got {value}")));
    }
    Ok(value as u64)
}

pub const COMPARTMENTS: [&str; 11] = [
    "susceptible",
    "exposed",
    "infectious",
    "hospitalized",
    "critical",
    "overflow",
    "recovered",
    "dead",
    "discharged",
    "intensive",
    "infected",
];

/// How transition counts are drawn from their expected values.
pub enum Transitions<'a> {
    Expected,
    Poisson(&'a mut StdRng),
}

impl Transitions<'_> {
    fn draw(&mut self, mean: f64) -> f64 {
        if !(mean > 0.0) {
            return 0.0;
        }
        match self {
            Transitions::Expected => mean,
            Transitions::Poisson(rng) => match Poisson::new(mean) {
                Ok(p) => p.sample(&mut **rng),
                Err(_) => mean,
            },
        }
    }
}

/// Population state, one entry per age group.
#[derive(Debug, Clone, PartialEq)]
pub struct NeherState {
    pub time: f64,
    pub susceptible: Vec<f64>,
    pub exposed: Vec<f64>,
    pub infectious: Vec<f64>,
    pub hospitalized: Vec<f64>,
    pub critical: Vec<f64>,
    pub overflow: Vec<f64>,
    pub recovered: Vec<f64>,
    pub dead: Vec<f64>,
    // cumulative tallies, not part of the population balance
    pub discharged: Vec<f64>,
    pub intensive: Vec<f64>,
    pub infected: Vec<f64>,
}

impl NeherState {
    pub fn seeded(time: f64, total_population: f64, initial_cases: f64, age_distribution: &[f64]) -> Self {
        let n = age_distribution.len();
        let infectious: Vec<f64> = age_distribution.iter().map(|a| initial_cases * a).collect();
        let susceptible = age_distribution
            .iter()
            .zip(&infectious)
            .map(|(a, i)| total_population * a - i)
            .collect();
        Self {
            time,
            susceptible,
            exposed: vec![0.0; n],
            infected: infectious.clone(),
            infectious,
            hospitalized: vec![0.0; n],
            critical: vec![0.0; n],
            overflow: vec![0.0; n],
            recovered: vec![0.0; n],
            dead: vec![0.0; n],
            discharged: vec![0.0; n],
            intensive: vec![0.0; n],
        }
    }

    /// Everyone alive or dead; constant under [`NeherModelSimulation::evolve`].
    pub fn population(&self) -> f64 {
        [
            &self.susceptible,
            &self.exposed,
            &self.infectious,
            &self.hospitalized,
            &self.critical,
            &self.overflow,
            &self.recovered,
            &self.dead,
        ]
        .iter()
        .map(|v| v.iter().sum::<f64>())
        .sum()
    }

    fn compartment(&self, name: &str) -> &[f64] {
        match name {
            "susceptible" => &self.susceptible,
            "exposed" => &self.exposed,
            "infectious" => &self.infectious,
            "hospitalized" => &self.hospitalized,
            "critical" => &self.critical,
            "overflow" => &self.overflow,
            "recovered" => &self.recovered,
            "dead" => &self.dead,
            "discharged" => &self.discharged,
            "intensive" => &self.intensive,
            "infected" => &self.infected,
            _ => &[],
        }
    }
}

/// Collect a trajectory into per-compartment `[time][age]` arrays.
pub fn collect_totals(trajectory: &[NeherState]) -> SimulationResult {
    let t = trajectory.iter().map(|s| s.time).collect();
    let y = COMPARTMENTS
        .iter()
        .map(|name| {
            let series = trajectory.iter().map(|s| s.compartment(name).to_vec()).collect();
            (name.to_string(), series)
        })
        .collect::<BTreeMap<_, _>>();
    SimulationResult { t, y }
}

/// One deterministic trajectory plus an ensemble of stochastic ones.
#[derive(Debug, Clone)]
pub struct NeherRun {
    pub deterministic: SimulationResult,
    pub stochastic: Vec<SimulationResult>,
}

#[derive(Debug, Clone)]
pub struct NeherModelSimulation {
    /// Supplies `r0`, mitigation and seasonal forcing.
    pub transmission: NonMarkovianSeir,
    pub age_distribution: Vec<f64>,
    pub incubation_time: f64,
    pub infectious_period: f64,
    pub length_hospital_stay: f64,
    pub length_icu_stay: f64,
    /// Fraction of infectious individuals needing hospital care.
    pub p_severe: Vec<f64>,
    /// Fraction of hospitalized patients needing intensive care.
    pub p_critical: Vec<f64>,
    /// Fraction of ICU patients who die.
    pub p_fatal: Vec<f64>,
    /// Death-rate multiplier for critical patients without an ICU bed.
    pub overflow_severity: f64,
    pub imports_per_day: f64,
    pub isolated_frac: f64,
    pub icu_beds: f64,
    pub time_delta_days: f64,
    /// When set, [`ModelSimulation::solve`] draws one Poisson trajectory with
    /// this seed instead of the deterministic one.
    pub seed: Option<u64>,
}

impl NeherModelSimulation {
    pub fn check(&self) -> Result<()> {
        let n = self.age_distribution.len();
        if n == 0 {
            return Err(Error::invalid("age_distribution is empty"));
        }
        for (name, v) in [("p_severe", &self.p_severe), ("p_critical", &self.p_critical), ("p_fatal", &self.p_fatal)] {
            if v.len() != n {
                return Err(Error::invalid(format!("{name} has {} entries for {n} age groups", v.len())));
            }
            if v.iter().any(|p| !(0.0..=1.0).contains(p)) {
                return Err(Error::invalid(format!("{name} must lie in [0, 1]")));
            }
        }
        let durations = [
            self.incubation_time,
            self.infectious_period,
            self.length_hospital_stay,
            self.length_icu_stay,
            self.time_delta_days,
        ];
        if durations.iter().any(|d| !(*d > 0.0)) {
            return Err(Error::invalid("durations and time_delta_days must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.isolated_frac) {
            return Err(Error::invalid("isolated_frac must lie in [0, 1]"));
        }
        if self.icu_beds < 0.0 || self.imports_per_day < 0.0 || self.overflow_severity < 0.0 {
            return Err(Error::invalid("icu_beds, imports_per_day and overflow_severity must be >= 0"));
        }
        Ok(())
    }

    fn infection_rate(&self, t: f64) -> f64 {
        self.transmission.reproduction_number(t) / self.infectious_period
    }

    /// Advance `pop` by one step.
    pub fn evolve(&self, pop: &NeherState, sample: &mut Transitions<'_>) -> NeherState {
        let dt = self.time_delta_days;
        let n = self.age_distribution.len();
        let total: f64 = pop.population() - pop.dead.iter().sum::<f64>();
        let frac_infected = if total > 0.0 { pop.infectious.iter().sum::<f64>() / total } else { 0.0 };
        let new_time = pop.time + dt;
        let infection_rate = self.infection_rate(new_time);

        let mut next = pop.clone();
        next.time = new_time;

        let mut new_critical = vec![0.0; n];
        let mut new_stabilized = vec![0.0; n];
        let mut new_icu_dead = vec![0.0; n];
        let mut new_overflow_stabilized = vec![0.0; n];
        let mut new_overflow_dead = vec![0.0; n];

        for a in 0..n {
            let recovery_rate = (1.0 - self.p_severe[a]) / self.infectious_period;
            let hospitalized_rate = self.p_severe[a] / self.infectious_period;
            let discharge_rate = (1.0 - self.p_critical[a]) / self.length_hospital_stay;
            let critical_rate = self.p_critical[a] / self.length_hospital_stay;
            let stabilization_rate = (1.0 - self.p_fatal[a]) / self.length_icu_stay;
            let death_rate = self.p_fatal[a] / self.length_icu_stay;
            let overflow_death_rate = self.overflow_severity * death_rate;

            let new_cases = (sample.draw(self.imports_per_day * self.age_distribution[a] * dt)
                + sample.draw(
                    (1.0 - self.isolated_frac) * infection_rate * pop.susceptible[a] * frac_infected * dt,
                ))
            .min(pop.susceptible[a].max(0.0));
            let new_infectious = sample.draw(pop.exposed[a] * dt / self.incubation_time).min(pop.exposed[a]);
            let new_recovered = sample.draw(pop.infectious[a] * dt * recovery_rate).min(pop.infectious[a]);
            let new_hospitalized = sample
                .draw(pop.infectious[a] * dt * hospitalized_rate)
                .min(pop.infectious[a] - new_recovered);
            let new_discharged = sample
                .draw(pop.hospitalized[a] * dt * discharge_rate)
                .min(pop.hospitalized[a]);
            new_critical[a] = sample
                .draw(pop.hospitalized[a] * dt * critical_rate)
                .min(pop.hospitalized[a] - new_discharged);
            new_stabilized[a] = sample
                .draw(pop.critical[a] * dt * stabilization_rate)
                .min(pop.critical[a]);
            new_icu_dead[a] = sample
                .draw(pop.critical[a] * dt * death_rate)
                .min(pop.critical[a] - new_stabilized[a]);
            new_overflow_stabilized[a] = sample
                .draw(pop.overflow[a] * dt * stabilization_rate)
                .min(pop.overflow[a]);
            new_overflow_dead[a] = sample
                .draw(pop.overflow[a] * dt * overflow_death_rate)
                .min(pop.overflow[a] - new_overflow_stabilized[a]);

            next.susceptible[a] -= new_cases;
            next.exposed[a] += new_cases - new_infectious;
            next.infectious[a] += new_infectious - new_recovered - new_hospitalized;
            next.hospitalized[a] += new_hospitalized + new_stabilized[a] + new_overflow_stabilized[a]
                - new_discharged
                - new_critical[a];
            next.recovered[a] += new_recovered + new_discharged;
            next.dead[a] += new_icu_dead[a] + new_overflow_dead[a];

            next.discharged[a] += new_discharged;
            next.intensive[a] += new_critical[a];
            next.infected[a] += new_cases;
        }

        let occupied: f64 = pop.critical.iter().sum::<f64>()
            - new_stabilized.iter().sum::<f64>()
            - new_icu_dead.iter().sum::<f64>();
        let mut free_icu_beds = (self.icu_beds - occupied).max(0.0);

        // youngest age groups get beds first
        for a in 0..n {
            let leaving_icu = new_stabilized[a] + new_icu_dead[a];
            let leaving_overflow = new_overflow_dead[a] + new_overflow_stabilized[a];
            if free_icu_beds > new_critical[a] {
                free_icu_beds -= new_critical[a];
                next.critical[a] += new_critical[a] - leaving_icu;
                next.overflow[a] -= leaving_overflow;
            } else if free_icu_beds > 0.0 {
                let new_overflow = new_critical[a] - free_icu_beds;
                next.critical[a] += free_icu_beds - leaving_icu;
                next.overflow[a] += new_overflow - leaving_overflow;
                free_icu_beds = 0.0;
            } else {
                next.critical[a] -= leaving_icu;
                next.overflow[a] += new_critical[a] - leaving_overflow;
            }
        }

        // beds still free pull overflow patients back in, youngest first
        for a in 0..n {
            if free_icu_beds <= 0.0 {
                break;
            }
            if next.overflow[a] < free_icu_beds {
                next.critical[a] += next.overflow[a];
                free_icu_beds -= next.overflow[a];
                next.overflow[a] = 0.0;
            } else {
                next.critical[a] += free_icu_beds;
                next.overflow[a] -= free_icu_beds;
                free_icu_beds = 0.0;
            }
        }

        next
    }

    /// Evolve from `initial` until the time reaches `t_max`.
    pub fn simulate(&self, initial: NeherState, t_max: f64, sample: &mut Transitions<'_>) -> Vec<NeherState> {
        let mut dynamics = vec![initial];
        while let Some(pop) = dynamics.last() {
            if pop.time >= t_max - 1e-9 {
                break;
            }
            let next = self.evolve(pop, sample);
            dynamics.push(next);
        }
        dynamics
    }

    /// Deterministic trajectory plus `n_stochastic` Poisson trajectories, run in
    /// parallel with seeds `seed, seed + 1, ...`.
    pub fn run(
        &self,
        tspan: (f64, f64),
        total_population: f64,
        initial_cases: f64,
        n_stochastic: usize,
        seed: u64,
    ) -> Result<NeherRun> {
        self.check()?;
        let (t0, tf) = tspan;
        time_grid(t0, tf, self.time_delta_days)?;
        let initial = NeherState::seeded(t0, total_population, initial_cases, &self.age_distribution);

        let deterministic = collect_totals(&self.simulate(initial.clone(), tf, &mut Transitions::Expected));
        let stochastic = (0..n_stochastic)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                collect_totals(&self.simulate(initial.clone(), tf, &mut Transitions::Poisson(&mut rng)))
            })
            .collect();

        tracing::debug!(n_stochastic, "neher ensemble finished");
        Ok(NeherRun { deterministic, stochastic })
    }
}

impl ModelSimulation for NeherModelSimulation {
    const NAME: &'static str = "NeherModelSimulation";
    const INCREMENT_KEYS: &'static [&'static str] = &["infected", "dead"];

    fn from_inputs(inputs: &mut ModelInputs) -> Result<Self> {
        let transmission = NonMarkovianSeir::from_inputs(inputs)?;
        let sim = Self {
            transmission,
            age_distribution: inputs.age_distribution.clone(),
            incubation_time: inputs.take_scalar_or("incubation_time", 5.0)?,
            infectious_period: inputs.take_scalar_or("infectious_period", 3.0)?,
            length_hospital_stay: inputs.take_scalar_or("length_hospital_stay", 4.0)?,
            length_icu_stay: inputs.take_scalar_or("length_icu_stay", 14.0)?,
            p_severe: inputs.take_per_age_or("p_severe", 0.03)?,
            p_critical: inputs.take_per_age_or("p_critical", 0.25)?,
            p_fatal: inputs.take_per_age_or("p_fatal", 0.4)?,
            overflow_severity: inputs.take_scalar_or("overflow_severity", 2.0)?,
            imports_per_day: inputs.take_scalar_or("imports_per_day", 0.1)?,
            isolated_frac: inputs.take_scalar_or("isolated_frac", 0.0)?,
            icu_beds: inputs.take_scalar_or("icu_beds", f64::INFINITY)?,
            time_delta_days: inputs.take_scalar_or("dt", 1.0)?,
            seed: inputs.params.take_scalar("seed")?.map(seed_from_parameter).transpose()?,
        };
        sim.check()?;
        Ok(sim)
    }

    fn solve(&self, tspan: (f64, f64), total_population: f64, initial_cases: f64) -> Result<SimulationResult> {
        match self.seed {
            None => Ok(self.run(tspan, total_population, initial_cases, 0, 0)?.deterministic),
            Some(seed) => {
                let mut run = self.run(tspan, total_population, initial_cases, 1, seed)?;
                run.stochastic
                    .pop()
                    .ok_or_else(|| Error::invalid("stochastic ensemble came back empty"))
            }
        }
    }
}
