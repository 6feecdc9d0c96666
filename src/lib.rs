//! Epidemic modeling: age-structured SEIR-type simulations driven by a
//! renewal equation, and Bayesian parameter inference against case data.
//!
//! Times are days since 2020-01-01 throughout. Models are driven by a
//! keyword-style [`ParameterSet`] through [`model::get_model_data`], which
//! returns daily model output as a [`DataFrame`].

pub mod backend;
pub mod config;
pub mod data;
pub mod distributions;
pub mod error;
pub mod io;
pub mod math;
pub mod mitigation;
pub mod model;
pub mod params;
pub mod population;
pub mod sampling;

pub use backend::{ChainBackend, SimulatorRef};
pub use data::DataFrame;
pub use distributions::GammaDistribution;
pub use error::{Error, Result};
pub use mitigation::MitigationModel;
pub use model::{get_model_data, ModelDataSource, ModelSimulation, Simulator};
pub use params::{ParamValue, ParameterSet};
pub use population::{AgeDistribution, PopulationModel};
pub use sampling::{LikelihoodEstimator, Norm, SampleParameter};
