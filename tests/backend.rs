use std::sync::Arc;

use pydemic::model::ModelDataSource;
use pydemic::sampling::{Chain, EnsembleOptions, LikelihoodEstimator, Norm, SampleParameter};
use pydemic::{ChainBackend, DataFrame, ParameterSet, Simulator, SimulatorRef};

struct Linear;

impl ModelDataSource for Linear {
    fn name(&self) -> &str {
        "Linear"
    }

    fn get_model_data(&self, t_eval: &[f64], mut params: ParameterSet) -> pydemic::Result<DataFrame> {
        let slope = params.take_required_scalar("slope")?;
        let cases = t_eval.iter().map(|t| 1.0 + slope * t).collect();
        DataFrame::new(t_eval.to_vec()).with_column("cases", cases)
    }
}

fn data() -> DataFrame {
    let t: Vec<f64> = (0..20).map(f64::from).collect();
    let mut cases: Vec<f64> = t.iter().map(|t| 1.0 + 2.0 * t).collect();
    cases[3] = f64::NAN;
    DataFrame::new(t).with_column("cases", cases).expect("frame")
}

#[test]
fn empty_backend_reports_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let backend = ChainBackend::open(tmp.path().join("missing.json")).expect("open");
    assert!(backend.fit_parameters().is_none());
    assert!(backend.fixed_values().is_none());
    assert!(backend.data().is_none());
    assert!(backend.simulator().is_none());
    assert!(backend.chain().is_none());
    assert_eq!(backend.iteration(), 0);
    assert!(!tmp.path().join("missing.json").exists());
}

#[test]
fn run_inputs_and_chain_survive_a_reload() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("nested").join("chain.json");
    let fit = vec![SampleParameter::new("r0", (1.0, 5.0)).with_guess(3.0, 0.5)];
    let fixed = ParameterSet::new().with("start_day", 40.0).with("age_distribution", vec![0.5, 0.5]);

    let mut backend = ChainBackend::create(&path).expect("create");
    backend.set_run(&fit, &fixed, &data(), "SeirPlusPlusSimulation").expect("set run");

    let mut chain = Chain::new(2, 1);
    chain.positions = vec![vec![vec![2.0], vec![3.0]], vec![vec![2.5], vec![3.0]]];
    chain.log_prob = vec![vec![-1.0, f64::NEG_INFINITY], vec![-0.5, f64::NEG_INFINITY]];
    chain.accepted = vec![1, 0];
    backend.record(&chain, &[vec![f64::NAN]]).expect("record");

    let reopened = ChainBackend::open(&path).expect("open");
    assert_eq!(reopened.fit_parameters(), Some(fit.as_slice()));
    assert_eq!(reopened.fixed_values(), Some(&fixed));
    assert_eq!(reopened.chain(), Some(&chain));
    assert_eq!(reopened.iteration(), 2);
    assert_eq!(reopened.simulator(), Some(SimulatorRef::Known(Simulator::SeirPlusPlus)));
    assert!(reopened.autocorrelations()[0][0].is_nan());

    let stored = reopened.data().expect("data");
    assert_eq!(stored.t, data().t);
    assert!(stored.column("cases").expect("cases")[3].is_nan());
    assert_eq!(stored.column("cases").expect("cases")[4], 9.0);

    let leftovers: Vec<_> = std::fs::read_dir(path.parent().expect("dir"))
        .expect("read dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn unknown_simulators_fall_back_to_their_name() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("chain.json");
    let mut backend = ChainBackend::create(&path).expect("create");
    backend.set_run(&[], &ParameterSet::new(), &data(), "Linear").expect("set run");

    let sim = ChainBackend::open(&path).expect("open").simulator().expect("simulator");
    assert_eq!(sim, SimulatorRef::Unknown("Linear".to_string()));
    assert_eq!(sim.name(), "Linear");
}

#[test]
fn upper_case_model_names_resolve_to_known_simulators() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("chain.json");
    let mut backend = ChainBackend::create(&path).expect("create");
    backend
        .set_run(&[], &ParameterSet::new(), &data(), "SEIRPlusPlusSimulationOnsetAndDeath")
        .expect("set run");

    let sim = ChainBackend::open(&path).expect("open").simulator().expect("simulator");
    assert_eq!(sim, SimulatorRef::Known(Simulator::SeirPlusPlusOnsetAndDeath));
}

#[test]
fn ensemble_checkpoints_to_the_backend_and_resumes() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("chain.json");
    let estimator = LikelihoodEstimator::new(
        vec![SampleParameter::new("slope", (0.0, 4.0)).with_guess(2.0, 0.2)],
        ParameterSet::new(),
        data(),
        Arc::new(Linear),
        Norm::L2Log,
    )
    .expect("estimator");

    let options = EnsembleOptions {
        walkers: Some(6),
        steps: 50,
        checkpoint_steps: 10,
        seed: Some(5),
        ..Default::default()
    };
    let mut backend = ChainBackend::create(&path).expect("create");
    let run = estimator.sample_ensemble(&options, Some(&mut backend)).expect("sample");
    assert_eq!(run.chain.iterations(), 50);
    assert_eq!(run.autocorrelations.len(), 5);

    let mut reopened = ChainBackend::open(&path).expect("open");
    assert_eq!(reopened.iteration(), 50);
    assert_eq!(reopened.chain(), Some(&run.chain));
    assert_eq!(reopened.simulator(), Some(SimulatorRef::Unknown("Linear".to_string())));

    // the walker count comes from the stored chain, whatever the thread count
    let resume = EnsembleOptions { walkers: None, steps: 20, resume: true, ..options };
    let resumed = estimator.sample_ensemble(&resume, Some(&mut reopened)).expect("resume");
    assert_eq!(resumed.chain.walkers, 6);
    assert_eq!(resumed.chain.iterations(), 70);
    assert_eq!(resumed.chain.positions[..50], run.chain.positions[..]);
    assert_eq!(resumed.autocorrelations.len(), 7);
    assert_eq!(ChainBackend::open(&path).expect("open").iteration(), 70);

    for step in &resumed.chain.positions {
        for walker in step {
            assert!((0.0..=4.0).contains(&walker[0]));
        }
    }
}
