// Classical Runge-Kutta tableau: stage offsets and final weights.
const STAGE_OFFSET: [f64; 4] = [0.0, 0.5, 0.5, 1.0];
const STAGE_WEIGHT: [f64; 4] = [1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0];

/// Fixed-step RK4 integrator for `dy/dt = f(t, y)` that reuses its stage
/// buffers between steps.
pub struct Rk4 {
    stages: [Vec<f64>; 4],
    scratch: Vec<f64>,
}

impl Rk4 {
    pub fn new(dim: usize) -> Self {
        Self {
            stages: std::array::from_fn(|_| vec![0.0; dim]),
            scratch: vec![0.0; dim],
        }
    }

    /// Advance `y` in place from `t` to `t + dt`.
    pub fn step<F>(&mut self, y: &mut [f64], t: f64, dt: f64, f: &mut F)
    where
        F: FnMut(f64, &[f64], &mut [f64]),
    {
        let n = y.len();
        if self.scratch.len() != n {
            *self = Self::new(n);
        }

        f(t, y, &mut self.stages[0]);
        for s in 1..4 {
            let h = STAGE_OFFSET[s] * dt;
            let (done, rest) = self.stages.split_at_mut(s);
            let prev = &done[s - 1];
            for ((out, yi), k) in self.scratch.iter_mut().zip(y.iter()).zip(prev) {
                *out = yi + h * k;
            }
            f(t + h, &self.scratch, &mut rest[0]);
        }

        for (i, yi) in y.iter_mut().enumerate() {
            let slope: f64 = self.stages.iter().zip(STAGE_WEIGHT).map(|(k, w)| w * k[i]).sum();
            *yi += dt * slope;
        }
    }

    /// States at each of `times`, starting from `y0` at `times[0]`.
    pub fn integrate<F>(&mut self, y0: Vec<f64>, times: &[f64], mut f: F) -> Vec<Vec<f64>>
    where
        F: FnMut(f64, &[f64], &mut [f64]),
    {
        let mut out = Vec::with_capacity(times.len());
        let mut y = y0;
        out.push(y.clone());
        for w in times.windows(2) {
            self.step(&mut y, w[0], w[1] - w[0], &mut f);
            out.push(y.clone());
        }
        out
    }
}
