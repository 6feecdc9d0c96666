use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::distributions::GammaDistribution;
use crate::error::{Error, Result};
use crate::mitigation::MitigationModel;
use crate::model::ModelInputs;

pub const DEFAULT_DT: f64 = 0.05;

pub fn default_serial() -> GammaDistribution {
    GammaDistribution::with_mean_std(4.0, 3.25)
}

/// Solution of a simulation: one `[time][age]` array per compartment.
#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    pub t: Vec<f64>,
    pub y: BTreeMap<String, Vec<Vec<f64>>>,
}

impl SimulationResult {
    pub fn compartment(&self, key: &str) -> Result<&[Vec<f64>]> {
        self.y
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::invalid(format!("simulation has no '{key}' compartment")))
    }

    /// Sum over age groups at each time.
    pub fn total(&self, key: &str) -> Result<Vec<f64>> {
        Ok(self.compartment(key)?.iter().map(|row| row.iter().sum()).collect())
    }
}

/// Initial state for the renewal driver.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialState {
    pub total_population: f64,
    pub susceptible: Vec<f64>,
    pub infected: Vec<f64>,
}

impl InitialState {
    /// `initial_cases` infectious individuals spread in proportion to
    /// `age_distribution`; everyone else is susceptible.
    pub fn seeded(total_population: f64, initial_cases: f64, age_distribution: &[f64]) -> Self {
        let infected: Vec<f64> = age_distribution.iter().map(|a| initial_cases * a).collect();
        let susceptible = age_distribution
            .iter()
            .zip(&infected)
            .map(|(a, i)| total_population * a - i)
            .collect();
        Self { total_population, susceptible, infected }
    }

    pub fn n_ages(&self) -> usize {
        self.susceptible.len()
    }
}

/// Non-Markovian SEIR driver: new infections follow a renewal equation whose
/// kernel is the serial-interval distribution.
#[derive(Debug, Clone)]
pub struct NonMarkovianSeir {
    pub mitigation: MitigationModel,
    pub r0: f64,
    pub serial_dist: GammaDistribution,
    pub seasonal_forcing_amp: f64,
    pub peak_day: f64,
}

impl Default for NonMarkovianSeir {
    fn default() -> Self {
        Self {
            mitigation: MitigationModel::constant(),
            r0: 3.2,
            serial_dist: default_serial(),
            seasonal_forcing_amp: 0.2,
            peak_day: 15.0,
        }
    }
}

/// Evaluation grid `t0, t0 + dt, ...` ending at the first point >= `tf`.
pub fn time_grid(t0: f64, tf: f64, dt: f64) -> Result<Vec<f64>> {
    if !(dt > 0.0) || !dt.is_finite() {
        return Err(Error::invalid(format!("timestep must be positive, got {dt}")));
    }
    if !(tf >= t0) {
        return Err(Error::invalid(format!("end time {tf} precedes start time {t0}")));
    }
    let n_steps = ((tf - t0) / dt - 1e-9).ceil().max(0.0) as usize + 1;
    Ok((0..n_steps).map(|i| t0 + i as f64 * dt).collect())
}

impl NonMarkovianSeir {
    /// Takes `r0`, `seasonal_forcing_amp`, `peak_day` and the serial-interval
    /// distribution from `inputs`.
    pub fn from_inputs(inputs: &mut ModelInputs) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            mitigation: inputs.mitigation.clone(),
            r0: inputs.take_scalar_or("r0", defaults.r0)?,
            serial_dist: inputs.take_distribution("serial", defaults.serial_dist),
            seasonal_forcing_amp: inputs
                .take_scalar_or("seasonal_forcing_amp", defaults.seasonal_forcing_amp)?,
            peak_day: inputs.take_scalar_or("peak_day", defaults.peak_day)?,
        })
    }

    pub fn seasonal_forcing(&self, t: f64) -> f64 {
        let phase = 2.0 * PI * (t - self.peak_day) / 365.0;
        1.0 + self.seasonal_forcing_amp * phase.cos()
    }

    pub fn reproduction_number(&self, t: f64) -> f64 {
        self.r0 * self.mitigation.eval(t) * self.seasonal_forcing(t)
    }

    /// Run the renewal equation over `tspan`, returning per-step influxes into
    /// `infected` and the `susceptible` level.
    pub fn influxes(&self, tspan: (f64, f64), y0: &InitialState, dt: f64) -> Result<SimulationResult> {
        let (t0, tf) = tspan;
        let times = time_grid(t0, tf, dt)?;
        let n_steps = times.len();
        let n_ages = y0.n_ages();
        if y0.infected.len() != n_ages {
            return Err(Error::invalid("initial infected and susceptible differ in length"));
        }
        if !(y0.total_population > 0.0) {
            return Err(Error::invalid("total population must be positive"));
        }

        let offsets: Vec<f64> = times[1..].iter().map(|t| t - t0).collect();
        let serial_pdf: Vec<f64> = self
            .serial_dist
            .pdf_diff(&offsets)
            .into_iter()
            .map(|p| p / dt)
            .collect();

        let mut infected = vec![vec![0.0; n_ages]; n_steps];
        let mut susceptible = vec![vec![0.0; n_ages]; n_steps];
        infected[0].clone_from(&y0.infected);
        susceptible[0].clone_from(&y0.susceptible);

        for count in 1..n_steps {
            let rt = self.reproduction_number(times[count]);
            // infectivity summed over ages and the serial-interval kernel
            let mut j = 0.0;
            for k in 0..count {
                let row = &infected[count - 1 - k];
                j += serial_pdf[k] * row.iter().sum::<f64>();
            }
            for a in 0..n_ages {
                let s_prev = susceptible[count - 1][a];
                let new_infected = dt * rt * s_prev * j / y0.total_population;
                infected[count][a] = new_infected;
                susceptible[count][a] = s_prev - new_infected;
            }
        }

        let mut y = BTreeMap::new();
        y.insert("infected".to_string(), infected);
        y.insert("susceptible".to_string(), susceptible);
        Ok(SimulationResult { t: times, y })
    }
}

/// Running sum along the time axis.
pub fn cumsum(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut out = Vec::with_capacity(series.len());
    let mut acc = vec![0.0; series.first().map_or(0, Vec::len)];
    for row in series {
        for (a, v) in acc.iter_mut().zip(row) {
            *a += v;
        }
        out.push(acc.clone());
    }
    out
}

/// Linear combination `Σ coef · series` of equally shaped `[time][age]` arrays.
pub fn combine(terms: &[(f64, &[Vec<f64>])]) -> Vec<Vec<f64>> {
    let Some((_, first)) = terms.first() else {
        return Vec::new();
    };
    let mut out = vec![vec![0.0; first.first().map_or(0, Vec::len)]; first.len()];
    for (coef, series) in terms {
        for (row_out, row) in out.iter_mut().zip(series.iter()) {
            for (o, v) in row_out.iter_mut().zip(row) {
                *o += coef * v;
            }
        }
    }
    out
}
