use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single named model input: either one number or one number per age group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ParamValue {
    /// Expand to `n` entries. Scalars repeat; vectors must already have length `n`.
    pub fn broadcast(&self, n: usize) -> Result<Vec<f64>> {
        match self {
            ParamValue::Scalar(v) => Ok(vec![*v; n]),
            ParamValue::Vector(v) if v.len() == n => Ok(v.clone()),
            ParamValue::Vector(v) => Err(Error::invalid(format!(
                "expected {} age groups, got {}",
                n,
                v.len()
            ))),
        }
    }

    pub fn scale(&self, factor: f64) -> ParamValue {
        match self {
            ParamValue::Scalar(v) => ParamValue::Scalar(v * factor),
            ParamValue::Vector(v) => ParamValue::Vector(v.iter().map(|x| x * factor).collect()),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::Vector(v)
    }
}

/// Keyword-style parameter map consumed by the model drivers.
///
/// Drivers `take` the keys they understand so that whatever is left over can
/// be reported (or ignored) by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of `self`.
    pub fn extend(&mut self, other: &ParameterSet) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn take_scalar(&mut self, key: &str) -> Result<Option<f64>> {
        match self.0.remove(key) {
            None => Ok(None),
            Some(ParamValue::Scalar(v)) => Ok(Some(v)),
            Some(ParamValue::Vector(_)) => Err(Error::ParameterType {
                key: key.to_string(),
                expected: "scalar",
            }),
        }
    }

    pub fn take_required_scalar(&mut self, key: &str) -> Result<f64> {
        self.take_scalar(key)?
            .ok_or_else(|| Error::MissingParameter(key.to_string()))
    }

    pub fn take_value(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    /// Take a per-age vector. A scalar is accepted as a single age group.
    pub fn take_required_vector(&mut self, key: &str) -> Result<Vec<f64>> {
        match self.0.remove(key) {
            None => Err(Error::MissingParameter(key.to_string())),
            Some(ParamValue::Scalar(v)) => Ok(vec![v]),
            Some(ParamValue::Vector(v)) => Ok(v),
        }
    }

    /// Remove and return every key starting with `prefix`.
    pub fn drain_prefixed(&mut self, prefix: &str) -> Vec<(String, ParamValue)> {
        let keys: Vec<String> = self
            .0
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|k| self.0.remove(&k).map(|v| (k, v)))
            .collect()
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        ParameterSet(iter.into_iter().collect())
    }
}
