use std::sync::Arc;

use crate::error::{Error, Result};
use crate::math::interp::Pchip;
use crate::params::{ParamValue, ParameterSet};

// Days of padding added on either side of the event knots.
const PAD_DAYS: f64 = 10.0;

type Multiplier = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Time-dependent multiplicative factor on the reproduction number.
///
/// A monotone cubic through the mitigation events, flat beyond the first and
/// last event.
#[derive(Clone)]
pub struct MitigationModel {
    pub times: Vec<f64>,
    pub factors: Vec<f64>,
    curve: Option<Pchip>,
    multiplier: Option<Multiplier>,
}

impl std::fmt::Debug for MitigationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MitigationModel")
            .field("times", &self.times)
            .field("factors", &self.factors)
            .field("multiplier", &self.multiplier.is_some())
            .finish()
    }
}

impl MitigationModel {
    pub fn new(t0: f64, tf: f64, times: Vec<f64>, factors: Vec<f64>) -> Result<Self> {
        if times.len() != factors.len() {
            return Err(Error::invalid(format!(
                "{} mitigation times but {} factors",
                times.len(),
                factors.len()
            )));
        }

        if times.is_empty() {
            return Ok(Self::constant());
        }

        let (knots, values) = {
            let first = times[0];
            let last = times[times.len() - 1];
            let mut knots = Vec::with_capacity(times.len() + 2);
            knots.push(t0.min(first) - PAD_DAYS);
            knots.extend_from_slice(&times);
            knots.push(tf.max(last) + PAD_DAYS);

            let mut values = Vec::with_capacity(factors.len() + 2);
            values.push(factors[0]);
            values.extend_from_slice(&factors);
            values.push(factors[factors.len() - 1]);
            (knots, values)
        };

        let curve = Pchip::new(knots, values).map_err(|_| {
            Error::invalid("Mitigation times must be ordered within t0 and tf.")
        })?;

        Ok(Self { times, factors, curve: Some(curve), multiplier: None })
    }

    /// No mitigation at all.
    pub fn constant() -> Self {
        Self { times: Vec::new(), factors: Vec::new(), curve: None, multiplier: None }
    }

    /// Extra factor applied on top of the interpolated curve.
    pub fn with_multiplier(mut self, f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        self.multiplier = Some(Arc::new(f));
        self
    }

    /// Build from `mitigation_t_<i>` / `mitigation_factor_<i>` keys, removing them
    /// from `params`.
    pub fn from_parameters(t0: f64, tf: f64, params: &mut ParameterSet) -> Result<Self> {
        Self::from_prefixed(t0, tf, "mitigation", params)
    }

    pub fn from_prefixed(t0: f64, tf: f64, prefix: &str, params: &mut ParameterSet) -> Result<Self> {
        let factors = take_indexed(params, &format!("{prefix}_factor"))?;
        let times = take_indexed(params, &format!("{prefix}_t"))?;
        Self::new(t0, tf, times, factors)
    }

    pub fn eval(&self, t: f64) -> f64 {
        let base = self.curve.as_ref().map_or(1.0, |c| c.eval(t));
        match &self.multiplier {
            Some(m) => base * m(t),
            None => base,
        }
    }

    /// Smallest gap between consecutive event times, if there are at least two.
    pub fn min_spacing(&self) -> Option<f64> {
        self.times
            .windows(2)
            .map(|w| w[1] - w[0])
            .reduce(f64::min)
    }
}

fn take_indexed(params: &mut ParameterSet, prefix: &str) -> Result<Vec<f64>> {
    let mut indexed = Vec::new();
    for (key, value) in params.drain_prefixed(prefix) {
        let suffix = &key[prefix.len()..];
        let index: usize = suffix
            .strip_prefix('_')
            .unwrap_or(suffix)
            .parse()
            .map_err(|_| Error::invalid(format!("cannot read event index from '{key}'")))?;
        let value = match value {
            ParamValue::Scalar(v) => v,
            ParamValue::Vector(_) => {
                return Err(Error::ParameterType { key, expected: "scalar" });
            }
        };
        indexed.push((index, value));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
