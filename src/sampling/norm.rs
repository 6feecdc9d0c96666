use serde::{Deserialize, Serialize};

use crate::math::special::ln_gamma;

/// Log-likelihood of model predictions given observed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    /// `-½ Σ (ln model - ln data)²`
    #[default]
    L2Log,
    /// Poisson log-probability of the data counts given the model means.
    Poisson,
}

impl Norm {
    /// Data points that are missing (non-finite) or, for the log norm, not
    /// positive are skipped.
    pub fn evaluate(&self, model: &[f64], data: &[f64]) -> f64 {
        match self {
            Norm::L2Log => l2_log_norm(model, data),
            Norm::Poisson => poisson_norm(model, data),
        }
    }
}

pub fn l2_log_norm(model: &[f64], data: &[f64]) -> f64 {
    let mut acc = 0.0;
    for (a, b) in model.iter().zip(data) {
        if !b.is_finite() || *b <= 0.0 {
            continue;
        }
        if !(*a > 0.0) {
            return f64::NEG_INFINITY;
        }
        let diff = a.ln() - b.ln();
        acc += diff * diff;
    }
    -0.5 * acc
}

pub fn poisson_norm(model: &[f64], data: &[f64]) -> f64 {
    let mut acc = 0.0;
    for (a, b) in model.iter().zip(data) {
        if !b.is_finite() || *b < 0.0 {
            continue;
        }
        if !(*a > 0.0) {
            if *b == 0.0 && *a == 0.0 {
                continue;
            }
            return f64::NEG_INFINITY;
        }
        acc += b * a.ln() - a - ln_gamma(b + 1.0);
    }
    acc
}
