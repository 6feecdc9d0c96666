use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Calendar origin: every time in this crate is days since 2020-01-01.
pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

pub fn date_to_day(date: NaiveDate) -> f64 {
    (date - epoch()).num_days() as f64
}

/// Calendar date of a (possibly fractional) day; fractions are truncated.
/// `None` for days that are not finite or fall outside chrono's date range.
pub fn day_to_date(day: f64) -> Option<NaiveDate> {
    if !day.is_finite() {
        return None;
    }
    let offset = TimeDelta::try_days(day.floor() as i64)?;
    epoch().checked_add_signed(offset)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| Error::Date(s.to_string()))
}

/// Named columns sharing one time index.
///
/// Used both for observed case data and for model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub t: Vec<f64>,
    /// Missing observations are NaN (null in JSON).
    #[serde(with = "nan_as_null")]
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl DataFrame {
    pub fn new(t: Vec<f64>) -> Self {
        Self { t, columns: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.t.len() {
            return Err(Error::invalid(format!(
                "column '{}' has {} rows, index has {}",
                name,
                values.len(),
                self.t.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.insert(name, values)?;
        Ok(self)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn dates(&self) -> Vec<Option<NaiveDate>> {
        self.t.iter().map(|d| day_to_date(*d)).collect()
    }
}

mod nan_as_null {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(columns: &BTreeMap<String, Vec<f64>>, s: S) -> Result<S::Ok, S::Error> {
        let columns: BTreeMap<&String, Vec<Option<f64>>> = columns
            .iter()
            .map(|(k, v)| (k, v.iter().map(|x| x.is_finite().then_some(*x)).collect()))
            .collect();
        columns.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Vec<f64>>, D::Error> {
        let columns = BTreeMap::<String, Vec<Option<f64>>>::deserialize(d)?;
        Ok(columns
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect()))
            .collect())
    }
}
