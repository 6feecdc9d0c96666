use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stored state of an ensemble run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub walkers: usize,
    pub ndim: usize,
    /// `[iteration][walker][dim]`
    pub positions: Vec<Vec<Vec<f64>>>,
    /// `[iteration][walker]`; rejected regions are stored as null.
    #[serde(with = "nonfinite")]
    pub log_prob: Vec<Vec<f64>>,
    /// Accepted proposals per walker.
    pub accepted: Vec<u64>,
}

impl Chain {
    pub fn new(walkers: usize, ndim: usize) -> Self {
        Self {
            walkers,
            ndim,
            positions: Vec::new(),
            log_prob: Vec::new(),
            accepted: vec![0; walkers],
        }
    }

    pub fn iterations(&self) -> usize {
        self.positions.len()
    }

    pub fn last_positions(&self) -> Option<&[Vec<f64>]> {
        self.positions.last().map(Vec::as_slice)
    }

    pub fn last_log_prob(&self) -> Option<&[f64]> {
        self.log_prob.last().map(Vec::as_slice)
    }

    pub fn acceptance_fraction(&self) -> Vec<f64> {
        let n = self.iterations().max(1) as f64;
        self.accepted.iter().map(|a| *a as f64 / n).collect()
    }

    /// Positions with the first `discard` iterations dropped and every `thin`-th kept,
    /// flattened over walkers.
    pub fn flat_samples(&self, discard: usize, thin: usize) -> Vec<Vec<f64>> {
        self.positions
            .iter()
            .skip(discard)
            .step_by(thin.max(1))
            .flat_map(|step| step.iter().cloned())
            .collect()
    }
}

/// Affine-invariant ensemble sampler using the stretch move.
pub struct EnsembleSampler<F> {
    log_prob_fn: F,
    stretch_scale: f64,
    rng: StdRng,
    pub chain: Chain,
}

impl<F> EnsembleSampler<F>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    pub fn new(walkers: usize, ndim: usize, log_prob_fn: F, seed: Option<u64>) -> Result<Self> {
        if ndim == 0 {
            return Err(Error::Sampling("no parameters to sample".into()));
        }
        if walkers < 2 * ndim {
            return Err(Error::Sampling(format!(
                "need at least {} walkers for {} parameters, got {}",
                2 * ndim,
                ndim,
                walkers
            )));
        }
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            log_prob_fn,
            stretch_scale: 2.0,
            rng,
            chain: Chain::new(walkers, ndim),
        })
    }

    pub fn with_stretch_scale(mut self, a: f64) -> Self {
        self.stretch_scale = a;
        self
    }

    /// Continue from a previously stored chain.
    pub fn with_chain(mut self, chain: Chain) -> Result<Self> {
        if chain.walkers != self.chain.walkers || chain.ndim != self.chain.ndim {
            return Err(Error::Sampling(format!(
                "stored chain has {} walkers x {} dims, sampler has {} x {}",
                chain.walkers, chain.ndim, self.chain.walkers, self.chain.ndim
            )));
        }
        self.chain = chain;
        Ok(self)
    }

    fn evaluate(&self, points: &[Vec<f64>]) -> Vec<f64> {
        points.par_iter().map(|p| (self.log_prob_fn)(p)).collect()
    }

    /// Advance the ensemble `iterations` times, starting at `initial` (or at the
    /// last stored positions when `initial` is `None`). `on_step` sees the chain
    /// after every iteration.
    pub fn run<C>(&mut self, initial: Option<Vec<Vec<f64>>>, iterations: usize, mut on_step: C) -> Result<()>
    where
        C: FnMut(&Chain) -> Result<()>,
    {
        let walkers = self.chain.walkers;
        let ndim = self.chain.ndim;

        let mut positions = match initial {
            Some(p) => p,
            None => self
                .chain
                .last_positions()
                .map(<[Vec<f64>]>::to_vec)
                .ok_or_else(|| Error::Sampling("no initial positions and no stored chain".into()))?,
        };
        if positions.len() != walkers || positions.iter().any(|p| p.len() != ndim) {
            return Err(Error::Sampling(format!(
                "initial positions must be {walkers} walkers x {ndim} dims"
            )));
        }

        let mut log_prob = match self.chain.last_log_prob() {
            Some(lp) if self.chain.last_positions() == Some(positions.as_slice()) => lp.to_vec(),
            _ => self.evaluate(&positions),
        };
        if log_prob.iter().all(|lp| !lp.is_finite()) {
            return Err(Error::Sampling("every initial walker has zero probability".into()));
        }

        let a = self.stretch_scale;
        let mut order: Vec<usize> = (0..walkers).collect();
        for _ in 0..iterations {
            order.shuffle(&mut self.rng);
            let (first, second) = order.split_at(walkers / 2);
            for (active, complement) in [(first, second), (second, first)] {
                let mut zs = Vec::with_capacity(active.len());
                let mut proposals = Vec::with_capacity(active.len());
                for &k in active {
                    let j = complement[self.rng.gen_range(0..complement.len())];
                    let u: f64 = self.rng.gen();
                    let z = ((a - 1.0) * u + 1.0).powi(2) / a;
                    let y: Vec<f64> = positions[k]
                        .iter()
                        .zip(&positions[j])
                        .map(|(xk, xj)| xj + z * (xk - xj))
                        .collect();
                    zs.push(z);
                    proposals.push(y);
                }

                let new_lp = self.evaluate(&proposals);
                for ((&k, proposal), (z, lp)) in active.iter().zip(proposals).zip(zs.into_iter().zip(new_lp)) {
                    let ln_ratio = (ndim as f64 - 1.0) * z.ln() + lp - log_prob[k];
                    let threshold: f64 = self.rng.gen::<f64>().ln();
                    if ln_ratio > threshold {
                        positions[k] = proposal;
                        log_prob[k] = lp;
                        self.chain.accepted[k] += 1;
                    }
                }
            }

            self.chain.positions.push(positions.clone());
            self.chain.log_prob.push(log_prob.clone());
            on_step(&self.chain)?;
        }
        Ok(())
    }
}

mod nonfinite {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(rows: &[Vec<f64>], s: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<Vec<Option<f64>>> = rows
            .iter()
            .map(|row| row.iter().map(|v| v.is_finite().then_some(*v)).collect())
            .collect();
        rows.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<f64>>, D::Error> {
        let rows = Vec::<Vec<Option<f64>>>::deserialize(d)?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NEG_INFINITY)).collect())
            .collect())
    }
}
