use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Population counts binned by age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeDistribution {
    pub bin_edges: Vec<f64>,
    pub counts: Vec<f64>,
}

impl AgeDistribution {
    /// `bin_edges` holds either one lower edge per bin or the full set of
    /// `counts.len() + 1` edges.
    pub fn new(bin_edges: Vec<f64>, counts: Vec<f64>) -> Result<Self> {
        let dist = Self { bin_edges, counts };
        dist.check()?;
        Ok(dist)
    }

    pub fn check(&self) -> Result<()> {
        let n = self.counts.len();
        if n == 0 {
            return Err(Error::invalid("age distribution has no bins"));
        }
        if self.bin_edges.len() != n && self.bin_edges.len() != n + 1 {
            return Err(Error::invalid(format!(
                "age distribution has {} counts but {} bin edges",
                n,
                self.bin_edges.len()
            )));
        }
        if self.counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(Error::invalid("age distribution counts must be finite and >= 0"));
        }
        if self.bin_edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::invalid("age bin edges must be increasing"));
        }
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Relative fraction of the population in each bin.
    pub fn fractions(&self) -> Vec<f64> {
        let total = self.total();
        if total <= 0.0 {
            return vec![0.0; self.counts.len()];
        }
        self.counts.iter().map(|c| c / total).collect()
    }
}

/// Description of the population a scenario is run for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationModel {
    pub country: String,
    pub cases: String,
    pub population_served: f64,
    pub hospital_beds: f64,
    #[serde(rename = "ICUBeds")]
    pub icu_beds: f64,
    pub suspected_cases_today: f64,
    pub imports_per_day: f64,
}
