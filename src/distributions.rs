//! Delay-time distributions and the convolutions that turn one population
//! flux into another.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::special::{gamma_p, gamma_q, ln_gamma};

/// Gamma distribution parametrized by shape `k` and scale `theta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaDistribution {
    pub shape: f64,
    pub scale: f64,
}

impl GammaDistribution {
    /// Distribution with the given mean and standard deviation.
    pub fn from_mean_std(mean: f64, std: f64) -> Result<Self> {
        if !(mean > 0.0 && std > 0.0) || !mean.is_finite() || !std.is_finite() {
            return Err(Error::invalid(format!(
                "gamma distribution needs mean > 0 and std > 0 (got {mean}, {std})"
            )));
        }
        let shape = mean * mean / (std * std);
        Ok(Self { shape, scale: mean / shape })
    }

    /// Distribution with the given mean and shape parameter.
    pub fn from_mean_shape(mean: f64, shape: f64) -> Result<Self> {
        if !(mean > 0.0 && shape > 0.0) || !mean.is_finite() || !shape.is_finite() {
            return Err(Error::invalid(format!(
                "gamma distribution needs mean > 0 and shape > 0 (got {mean}, {shape})"
            )));
        }
        Ok(Self { shape, scale: mean / shape })
    }

    /// Infallible constructor for the compiled-in defaults.
    pub(crate) fn with_mean_std(mean: f64, std: f64) -> Self {
        let shape = mean * mean / (std * std);
        Self { shape, scale: mean / shape }
    }

    pub fn mean(&self) -> f64 {
        self.shape * self.scale
    }

    pub fn std(&self) -> f64 {
        self.shape.sqrt() * self.scale
    }

    pub fn pdf(&self, t: f64) -> f64 {
        if t < 0.0 {
            return 0.0;
        }
        if t == 0.0 {
            return match self.shape {
                k if k < 1.0 => f64::INFINITY,
                k if k == 1.0 => 1.0 / self.scale,
                _ => 0.0,
            };
        }
        let k = self.shape;
        ((k - 1.0) * t.ln() - t / self.scale - ln_gamma(k) - k * self.scale.ln()).exp()
    }

    pub fn cdf(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        gamma_p(self.shape, t / self.scale)
    }

    pub fn survival(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 1.0;
        }
        gamma_q(self.shape, t / self.scale)
    }

    /// Probability mass falling in each interval `(ts[i-1], ts[i]]`, with the
    /// first entry taking everything up to `ts[0]`.
    pub fn pdf_diff(&self, ts: &[f64]) -> Vec<f64> {
        let mut prev = 0.0;
        ts.iter()
            .map(|t| {
                let c = self.cdf(*t);
                let out = c - prev;
                prev = c;
                out
            })
            .collect()
    }

    /// Convolve a time-major `influx[time][age]` with the discretized density,
    /// scaling each age group by `prefactor`.
    pub fn convolve_pdf(
        &self,
        t: &[f64],
        influx: &[Vec<f64>],
        prefactor: &[f64],
    ) -> Vec<Vec<f64>> {
        let t0 = t.first().copied().unwrap_or(0.0);
        let shifted: Vec<f64> = t.iter().map(|x| x - t0).collect();
        let kernel = self.pdf_diff(&shifted);
        convolve_time_major(&kernel, influx, prefactor)
    }

    /// Number still "in" the compartment: influx convolved with the survival
    /// function `1 - cdf`.
    pub fn convolve_survival(&self, t: &[f64], influx: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let t0 = t.first().copied().unwrap_or(0.0);
        let kernel: Vec<f64> = t.iter().map(|x| self.survival(x - t0)).collect();
        let n_ages = influx.first().map_or(0, Vec::len);
        convolve_time_major(&kernel, influx, &vec![1.0; n_ages])
    }
}

/// Causal discrete convolution along the time axis, one age group per task.
pub fn convolve_time_major(
    kernel: &[f64],
    influx: &[Vec<f64>],
    prefactor: &[f64],
) -> Vec<Vec<f64>> {
    let n_t = influx.len();
    let n_ages = influx.first().map_or(0, Vec::len);
    if kernel.is_empty() {
        return vec![vec![0.0; n_ages]; n_t];
    }

    let columns: Vec<Vec<f64>> = (0..n_ages)
        .into_par_iter()
        .map(|a| {
            let col: Vec<f64> = influx.iter().map(|row| row[a]).collect();
            (0..n_t)
                .map(|i| {
                    let upto = i.min(kernel.len() - 1);
                    let acc: f64 = (0..=upto).map(|j| kernel[j] * col[i - j]).sum();
                    prefactor[a] * acc
                })
                .collect()
        })
        .collect();

    (0..n_t)
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect()
}
