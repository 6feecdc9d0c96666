use std::sync::Arc;

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use pydemic::model::ModelDataSource;
use pydemic::sampling::norm::{l2_log_norm, poisson_norm};
use pydemic::sampling::{
    integrated_time, EnsembleSampler, GridSize, LikelihoodEstimator, Norm, SampleParameter,
};
use pydemic::{DataFrame, Error, ParameterSet, Simulator};

/// `scale * exp(growth * t)`, rejecting growth rates above 0.5.
struct Exponential;

impl ModelDataSource for Exponential {
    fn name(&self) -> &str {
        "Exponential"
    }

    fn get_model_data(&self, t_eval: &[f64], mut params: ParameterSet) -> pydemic::Result<DataFrame> {
        let growth = params.take_required_scalar("growth")?;
        let scale = params.take_required_scalar("scale")?;
        if growth > 0.5 {
            return Err(Error::invalid("growth too fast"));
        }
        let cases = t_eval.iter().map(|t| scale * (growth * t).exp()).collect();
        DataFrame::new(t_eval.to_vec()).with_column("cases", cases)
    }
}

fn observed() -> DataFrame {
    let t: Vec<f64> = (0..30).map(f64::from).collect();
    let cases = t.iter().map(|t| 5.0 * (0.1 * t).exp()).collect();
    DataFrame::new(t).with_column("cases", cases).expect("frame")
}

fn estimator(fit: Vec<SampleParameter>, fixed: ParameterSet) -> LikelihoodEstimator {
    LikelihoodEstimator::new(fit, fixed, observed(), Arc::new(Exponential), Norm::L2Log).expect("estimator")
}

#[test]
fn norms() {
    assert_eq!(l2_log_norm(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    assert_relative_eq!(l2_log_norm(&[1.0], &[std::f64::consts::E]), -0.5);
    // missing and non-positive observations are skipped
    assert_eq!(l2_log_norm(&[3.0, 4.0], &[f64::NAN, 0.0]), 0.0);
    assert_eq!(l2_log_norm(&[0.0], &[2.0]), f64::NEG_INFINITY);

    let expected = 3.0 * 2.0f64.ln() - 2.0 - 6.0f64.ln();
    assert_relative_eq!(poisson_norm(&[2.0], &[3.0]), expected, max_relative = 1e-12);
    assert_relative_eq!(Norm::Poisson.evaluate(&[2.0, 1.0], &[3.0, f64::NAN]), expected, max_relative = 1e-12);
}

#[test]
fn log_probability_outside_bounds_or_for_rejected_parameters_is_minus_infinity() {
    let est = estimator(
        vec![SampleParameter::new("growth", (0.0, 1.0))],
        ParameterSet::new().with("scale", 5.0),
    );
    assert_eq!(est.log_probability(&[1.5]), f64::NEG_INFINITY);
    assert_eq!(est.log_probability(&[-0.1]), f64::NEG_INFINITY);
    assert_eq!(est.log_probability(&[0.7]), f64::NEG_INFINITY);
    assert!(est.check_within_bounds(&[0.7]));
    assert_relative_eq!(est.log_probability(&[0.1]), 0.0, epsilon = 1e-20);
    assert!(est.log_probability(&[0.12]) < est.log_probability(&[0.11]));
}

#[test]
fn missing_fixed_values_are_errors_not_rejections() {
    let est = estimator(vec![SampleParameter::new("growth", (0.0, 1.0))], ParameterSet::new());
    let err = est.try_log_probability(&[0.1]).unwrap_err();
    assert!(matches!(err, Error::MissingParameter(ref k) if k == "scale"), "{err}");
    assert_eq!(est.log_probability(&[0.1]), f64::NEG_INFINITY);
}

#[test]
fn gaussian_prior_is_added() {
    let fixed = ParameterSet::new().with("scale", 5.0);
    let flat = estimator(vec![SampleParameter::new("growth", (0.0, 1.0))], fixed.clone());
    let prior = estimator(
        vec![SampleParameter::new("growth", (0.0, 1.0)).with_guess(0.2, 0.05).with_sigma(0.1)],
        fixed,
    );
    let theta = [0.15];
    assert_relative_eq!(
        prior.log_probability(&theta) - flat.log_probability(&theta),
        -0.5 * 0.25,
        max_relative = 1e-9
    );
}

#[test]
fn invalid_estimators_are_refused() {
    let fixed = ParameterSet::new().with("scale", 5.0);
    let twice = vec![SampleParameter::new("growth", (0.0, 1.0)), SampleParameter::new("growth", (0.0, 2.0))];
    assert!(LikelihoodEstimator::new(twice, fixed.clone(), observed(), Arc::new(Exponential), Norm::L2Log).is_err());

    let inverted = vec![SampleParameter::new("growth", (1.0, 0.0))];
    assert!(LikelihoodEstimator::new(inverted, fixed, observed(), Arc::new(Exponential), Norm::L2Log).is_err());

    let both = vec![SampleParameter::new("scale", (1.0, 10.0))];
    let fixed = ParameterSet::new().with("scale", 5.0);
    assert!(LikelihoodEstimator::new(both, fixed, observed(), Arc::new(Exponential), Norm::L2Log).is_err());
}

#[test]
fn uniform_grid_peaks_at_the_true_value() {
    let est = estimator(
        vec![SampleParameter::new("growth", (0.0, 0.2)), SampleParameter::new("scale", (1.0, 9.0))],
        ParameterSet::new(),
    );
    let (points, values) = est.sample_uniform(&GridSize::Uniform(21)).expect("grid");
    assert_eq!(points.len(), 21 * 21);
    assert_eq!(values.len(), points.len());

    let best = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .expect("non-empty");
    assert_relative_eq!(points[best][0], 0.1, epsilon = 1e-12);
    assert_relative_eq!(points[best][1], 5.0, epsilon = 1e-12);

    let per_parameter: GridSize = serde_json::from_str(r#"{"growth": 3, "scale": 2}"#).expect("json");
    let (points, _) = est.sample_uniform(&per_parameter).expect("grid");
    assert_eq!(points.len(), 6);
    assert_eq!(points[0], vec![0.0, 1.0]);
    assert_eq!(points[5], vec![0.2, 9.0]);
}

#[test]
fn initial_positions_stay_within_bounds() {
    let est = estimator(
        vec![
            SampleParameter::new("growth", (0.0, 0.2)).with_guess(0.19, 0.5),
            SampleParameter::new("scale", (1.0, 9.0)),
        ],
        ParameterSet::new(),
    );
    let mut rng = StdRng::seed_from_u64(3);
    let positions = est.get_initial_positions(64, &mut rng);
    assert_eq!(positions.len(), 64);
    for p in &positions {
        assert!(est.check_within_bounds(p), "{p:?}");
    }
    // a wide guess gets clamped onto the upper bound now and then
    assert!(positions.iter().any(|p| p[0] == 0.2));
}

#[test]
fn guesses_without_uncertainty_start_spread_out() {
    let bare_guess = SampleParameter { guess: Some(0.15), ..SampleParameter::new("growth", (0.0, 0.2)) };
    let zero_width = SampleParameter::new("scale", (1.0, 9.0)).with_guess(5.0, 0.0);
    let est = estimator(vec![bare_guess, zero_width], ParameterSet::new());

    let mut rng = StdRng::seed_from_u64(8);
    let positions = est.get_initial_positions(16, &mut rng);
    for dim in 0..2 {
        let first = positions[0][dim];
        assert!(positions.iter().any(|p| p[dim] != first), "dimension {dim} collapsed");
    }
    for p in &positions {
        assert!(est.check_within_bounds(p), "{p:?}");
    }

    let est = estimator(
        vec![SampleParameter { guess: Some(0.15), ..SampleParameter::new("growth", (0.0, 0.2)) }],
        ParameterSet::new().with("scale", 5.0),
    );
    let mut sampler =
        EnsembleSampler::new(8, 1, |theta: &[f64]| est.log_probability(theta), Some(4)).expect("sampler");
    sampler
        .run(Some(est.get_initial_positions(8, &mut rng)), 50, |_| Ok(()))
        .expect("run");
    let last = sampler.chain.last_positions().expect("positions");
    assert!(last.iter().any(|p| p[0] != last[0][0]), "{last:?}");
}

#[test]
fn misspelled_fixed_values_are_errors_not_rejections() {
    let est = LikelihoodEstimator::new(
        vec![SampleParameter::new("r0", (1.0, 5.0))],
        ParameterSet::new()
            .with("start_day", 40.0)
            .with("total_population", 1e6)
            .with("initial_cases", 10.0)
            .with("age_distribution", vec![0.5, 0.5])
            .with("p_deadd", 0.1),
        DataFrame::new((50..60).map(f64::from).collect()).with_column("dead", vec![1.0; 10]).expect("frame"),
        Arc::new(Simulator::SeirPlusPlus),
        Norm::L2Log,
    )
    .expect("estimator");
    let err = est.try_log_probability(&[2.5]).unwrap_err();
    assert!(matches!(&err, Error::UnknownParameters(keys) if keys == &["p_deadd"]), "{err}");
}

#[test]
fn stretch_move_samples_a_gaussian() {
    let target = |x: &[f64]| -0.5 * ((x[0] - 1.0).powi(2) + ((x[1] + 2.0) / 0.5).powi(2));
    let mut sampler = EnsembleSampler::new(32, 2, target, Some(42)).expect("sampler");

    let mut rng = StdRng::seed_from_u64(1);
    let normal = Normal::new(0.0, 1.0).expect("normal");
    let initial: Vec<Vec<f64>> = (0..32).map(|_| vec![normal.sample(&mut rng), normal.sample(&mut rng)]).collect();

    let mut steps = 0;
    sampler
        .run(Some(initial), 2000, |_| {
            steps += 1;
            Ok(())
        })
        .expect("run");
    assert_eq!(steps, 2000);
    assert_eq!(sampler.chain.iterations(), 2000);

    let samples = sampler.chain.flat_samples(500, 1);
    let n = samples.len() as f64;
    let mean: Vec<f64> = (0..2).map(|d| samples.iter().map(|s| s[d]).sum::<f64>() / n).collect();
    let std: Vec<f64> = (0..2)
        .map(|d| (samples.iter().map(|s| (s[d] - mean[d]).powi(2)).sum::<f64>() / n).sqrt())
        .collect();
    assert!((mean[0] - 1.0).abs() < 0.15, "{mean:?}");
    assert!((mean[1] + 2.0).abs() < 0.1, "{mean:?}");
    assert!((std[0] - 1.0).abs() < 0.15, "{std:?}");
    assert!((std[1] - 0.5).abs() < 0.1, "{std:?}");

    let acceptance = sampler.chain.acceptance_fraction();
    let mean_acceptance = acceptance.iter().sum::<f64>() / acceptance.len() as f64;
    assert!(mean_acceptance > 0.3 && mean_acceptance < 0.9, "{mean_acceptance}");

    let tau = integrated_time(&sampler.chain.positions[500..], 5.0);
    assert!(tau.iter().all(|t| *t > 1.0 && *t < 100.0), "{tau:?}");
}

#[test]
fn sampler_needs_enough_walkers() {
    assert!(EnsembleSampler::new(3, 2, |_: &[f64]| 0.0, None).is_err());
    assert!(EnsembleSampler::new(4, 0, |_: &[f64]| 0.0, None).is_err());
}

#[test]
fn autocorrelation_of_white_noise_and_ar1() {
    let mut rng = StdRng::seed_from_u64(9);
    let normal = Normal::new(0.0, 1.0).expect("normal");

    // [iteration][walker][dim]
    let white: Vec<Vec<Vec<f64>>> =
        (0..10_000).map(|_| (0..4).map(|_| vec![normal.sample(&mut rng)]).collect()).collect();
    let tau = integrated_time(&white, 5.0);
    assert!((tau[0] - 1.0).abs() < 0.3, "{tau:?}");

    let phi: f64 = 0.9;
    let mut state = [0.0f64; 4];
    let ar1: Vec<Vec<Vec<f64>>> = (0..20_000)
        .map(|_| {
            state
                .iter_mut()
                .map(|x| {
                    *x = phi * *x + normal.sample(&mut rng);
                    vec![*x]
                })
                .collect()
        })
        .collect();
    let tau = integrated_time(&ar1, 5.0);
    let exact = (1.0 + phi) / (1.0 - phi);
    assert!((tau[0] - exact).abs() < 0.25 * exact, "{tau:?} vs {exact}");

    let constant = vec![vec![vec![1.0]; 4]; 100];
    assert!(integrated_time(&constant, 5.0)[0].is_nan());
}
