//! Integrated autocorrelation time of an ensemble chain, estimated the way
//! affine-invariant samplers usually report it: the walker-averaged
//! normalized autocorrelation function summed up to an automatic window.

/// Window constant: stop at the first lag `m` with `m >= C * tau(m)`.
pub const DEFAULT_WINDOW_C: f64 = 5.0;

/// `chain[iteration][walker][dim]` → one estimate per dimension.
///
/// Dimensions without any variation report NaN.
pub fn integrated_time(chain: &[Vec<Vec<f64>>], c: f64) -> Vec<f64> {
    let Some(first) = chain.first() else {
        return Vec::new();
    };
    let walkers = first.len();
    let ndim = first.first().map_or(0, Vec::len);

    (0..ndim)
        .map(|d| {
            let series: Vec<Vec<f64>> = (0..walkers)
                .map(|w| chain.iter().map(|step| step[w][d]).collect())
                .collect();
            integrated_time_1d(&series, c)
        })
        .collect()
}

fn centered(x: &[f64]) -> (Vec<f64>, f64) {
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let y: Vec<f64> = x.iter().map(|v| v - mean).collect();
    let var = y.iter().map(|v| v * v).sum();
    (y, var)
}

fn integrated_time_1d(series: &[Vec<f64>], c: f64) -> f64 {
    let centered: Vec<(Vec<f64>, f64)> = series
        .iter()
        .map(|x| centered(x))
        .filter(|(_, var)| *var > 0.0)
        .collect();
    if centered.is_empty() {
        return f64::NAN;
    }
    let n = centered[0].0.len();

    let mut cumulative = 0.0;
    let mut tau = 1.0;
    for lag in 0..n {
        let f: f64 = centered
            .iter()
            .map(|(y, var)| {
                let acc: f64 = y[..n - lag].iter().zip(&y[lag..]).map(|(a, b)| a * b).sum();
                acc / var
            })
            .sum::<f64>()
            / centered.len() as f64;
        cumulative += f;
        tau = 2.0 * cumulative - 1.0;
        if lag as f64 >= c * tau {
            break;
        }
    }
    tau
}
