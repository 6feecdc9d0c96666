use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::math::ode::Rk4;
use crate::model::base::{time_grid, NonMarkovianSeir, SimulationResult, DEFAULT_DT};
use crate::model::{ModelInputs, ModelSimulation};

// Per age block: S | E | I | R | cumulative infections
const BLOCK: usize = 5;

fn indices(a: usize) -> (usize, usize, usize, usize, usize) {
    let base = a * BLOCK;
    (base, base + 1, base + 2, base + 3, base + 4)
}

/// Markovian age-structured SEIR with homogeneous mixing.
#[derive(Debug, Clone)]
pub struct SeirModelSimulation {
    /// Supplies `r0`, mitigation and seasonal forcing.
    pub transmission: NonMarkovianSeir,
    pub age_distribution: Vec<f64>,
    pub incubation_time: f64,
    pub infectious_period: f64,
    pub dt: f64,
}

impl SeirModelSimulation {
    pub fn check(&self) -> Result<()> {
        if self.age_distribution.is_empty() {
            return Err(Error::invalid("age_distribution is empty"));
        }
        if !(self.incubation_time > 0.0 && self.infectious_period > 0.0) {
            return Err(Error::invalid("incubation_time and infectious_period must be > 0"));
        }
        Ok(())
    }

    fn beta_at(&self, t: f64) -> f64 {
        self.transmission.reproduction_number(t) / self.infectious_period
    }

    pub fn deriv(&self, t: f64, y: &[f64], dy: &mut [f64]) {
        dy.fill(0.0);
        let n_ages = self.age_distribution.len();

        let mut total_n = 0.0;
        let mut total_i = 0.0;
        for a in 0..n_ages {
            let (s, e, i, r, _) = indices(a);
            total_n += y[s] + y[e] + y[i] + y[r];
            total_i += y[i];
        }
        let lambda = if total_n > 0.0 { self.beta_at(t) * total_i / total_n } else { 0.0 };

        let sigma = 1.0 / self.incubation_time;
        let gamma = 1.0 / self.infectious_period;
        for a in 0..n_ages {
            let (s, e, i, r, c) = indices(a);
            let to_e = lambda * y[s];
            let to_i = sigma * y[e];
            let to_r = gamma * y[i];
            dy[s] = -to_e;
            dy[e] = to_e - to_i;
            dy[i] = to_i - to_r;
            dy[r] = to_r;
            dy[c] = to_e;
        }
    }

    pub fn run(&self, tspan: (f64, f64), total_population: f64, initial_cases: f64) -> Result<SimulationResult> {
        self.check()?;
        let times = time_grid(tspan.0, tspan.1, self.dt)?;
        let n_ages = self.age_distribution.len();

        let mut y = vec![0.0; n_ages * BLOCK];
        for (a, frac) in self.age_distribution.iter().enumerate() {
            let (s, _, i, _, c) = indices(a);
            y[i] = initial_cases * frac;
            y[s] = total_population * frac - y[i];
            y[c] = y[i];
        }

        let trajectory = Rk4::new(y.len()).integrate(y, &times, |tt, yy, dy| self.deriv(tt, yy, dy));

        let names = ["susceptible", "exposed", "infectious", "removed", "infected"];
        let y: BTreeMap<String, Vec<Vec<f64>>> = names
            .iter()
            .enumerate()
            .map(|(k, name)| {
                let series = trajectory
                    .iter()
                    .map(|state| (0..n_ages).map(|a| state[a * BLOCK + k]).collect())
                    .collect();
                (name.to_string(), series)
            })
            .collect();
        Ok(SimulationResult { t: times, y })
    }
}

impl ModelSimulation for SeirModelSimulation {
    const NAME: &'static str = "SeirModelSimulation";
    const INCREMENT_KEYS: &'static [&'static str] = &["infected"];

    fn from_inputs(inputs: &mut ModelInputs) -> Result<Self> {
        let transmission = NonMarkovianSeir::from_inputs(inputs)?;
        Ok(Self {
            transmission,
            age_distribution: inputs.age_distribution.clone(),
            incubation_time: inputs.take_scalar_or("incubation_time", 5.5)?,
            infectious_period: inputs.take_scalar_or("infectious_period", 5.0)?,
            dt: inputs.take_scalar_or("dt", DEFAULT_DT)?,
        })
    }

    fn solve(&self, tspan: (f64, f64), total_population: f64, initial_cases: f64) -> Result<SimulationResult> {
        self.run(tspan, total_population, initial_cases)
    }
}
