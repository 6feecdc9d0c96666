use approx::assert_relative_eq;

use pydemic::model::{get_model_data, SeirPlusPlusOnsetAndDeath, SeirPlusPlusSimulation};
use pydemic::{Error, ParameterSet, Simulator};

fn base_params() -> ParameterSet {
    ParameterSet::new()
        .with("start_day", 40.0)
        .with("total_population", 1e6)
        .with("initial_cases", 10.0)
        .with("age_distribution", vec![0.3, 0.4, 0.3])
        .with("r0", 2.5)
}

fn days(from: usize, to: usize) -> Vec<f64> {
    (from..=to).map(|d| d as f64).collect()
}

#[test]
fn output_has_levels_and_daily_increments() {
    let frame = get_model_data::<SeirPlusPlusSimulation>(&days(50, 100), base_params()).expect("simulation");
    assert_eq!(frame.len(), 51);
    for col in [
        "susceptible",
        "infected",
        "infected_incr",
        "infectious",
        "symptomatic",
        "positive_incr",
        "admitted_to_hospital_incr",
        "hospitalized",
        "critical",
        "ventilators",
        "dead",
        "dead_incr",
        "all_dead_incr",
        "total_discharged_incr",
        "recovered",
    ] {
        assert!(frame.column(col).is_some(), "missing {col}");
    }
}

#[test]
fn susceptible_plus_cumulative_infected_is_the_population() {
    let frame = get_model_data::<SeirPlusPlusSimulation>(&days(45, 150), base_params()).expect("simulation");
    let s = frame.column("susceptible").expect("susceptible");
    let i = frame.column("infected").expect("infected");
    for (s, i) in s.iter().zip(i) {
        assert_relative_eq!(s + i, 1e6, max_relative = 1e-9);
    }

    let incr = frame.column("infected_incr").expect("infected_incr");
    assert!(incr.iter().all(|v| *v >= -1e-9));
    // the epidemic grows at first
    assert!(incr[20] > incr[0]);
}

#[test]
fn zero_initial_cases_stay_at_zero() {
    let params = base_params().with("initial_cases", 0.0);
    let frame = get_model_data::<SeirPlusPlusSimulation>(&days(41, 60), params).expect("simulation");
    for name in ["infected", "dead", "hospitalized", "critical"] {
        assert!(frame.column(name).expect(name).iter().all(|v| *v == 0.0), "{name}");
    }
    assert!(frame.column("susceptible").expect("s").iter().all(|v| (*v - 1e6).abs() < 1e-6));
}

#[test]
fn death_prefactor_scales_deaths_linearly() {
    let t = days(50, 120);
    let full = get_model_data::<SeirPlusPlusSimulation>(&t, base_params()).expect("simulation");
    let half = get_model_data::<SeirPlusPlusSimulation>(&t, base_params().with("p_dead_prefactor", 0.5))
        .expect("simulation");
    let full_dead = full.column("dead").expect("dead");
    let half_dead = half.column("dead").expect("dead");
    assert!(full_dead[70] > 0.0);
    assert_relative_eq!(half_dead[70], 0.5 * full_dead[70], max_relative = 1e-9);
}

#[test]
fn mitigation_slows_the_epidemic() {
    let t = days(50, 110);
    let free = get_model_data::<SeirPlusPlusSimulation>(&t, base_params()).expect("simulation");
    let mitigated = base_params()
        .with("mitigation_t_0", 55.0)
        .with("mitigation_factor_0", 1.0)
        .with("mitigation_t_1", 65.0)
        .with("mitigation_factor_1", 0.3);
    let mitigated = get_model_data::<SeirPlusPlusSimulation>(&t, mitigated).expect("simulation");
    let last = t.len() - 1;
    assert!(mitigated.column("infected").expect("i")[last] < free.column("infected").expect("i")[last]);
}

#[test]
fn log_ifr_sets_the_infection_fatality_ratio() {
    let t = days(50, 80);
    let with_log = get_model_data::<SeirPlusPlusSimulation>(&t, base_params().with("log_ifr", 0.01f64.ln()))
        .expect("simulation");
    let with_ifr = get_model_data::<SeirPlusPlusSimulation>(&t, base_params().with("ifr", 0.01)).expect("simulation");
    let a = with_log.column("dead").expect("dead");
    let b = with_ifr.column("dead").expect("dead");
    for (a, b) in a.iter().zip(b) {
        assert_relative_eq!(a, b, max_relative = 1e-9);
    }
}

#[test]
fn rejected_parameter_sets() {
    let t = days(50, 80);
    let cases = [
        ("both ifr forms", base_params().with("ifr", 0.01).with("log_ifr", -4.0)),
        (
            "crowded mitigation",
            base_params()
                .with("mitigation_t_0", 55.0)
                .with("mitigation_factor_0", 1.0)
                .with("mitigation_t_1", 57.0)
                .with("mitigation_factor_1", 0.5),
        ),
        ("mean without width", base_params().with("serial_mean", 4.0)),
        ("probability above one", base_params().with("p_hospitalized", vec![1.0, 2.0, 1.0])),
    ];
    for (what, params) in cases {
        let err = get_model_data::<SeirPlusPlusSimulation>(&t, params).unwrap_err();
        assert!(err.is_invalid_parameters(), "{what}: {err}");
    }

    let err = get_model_data::<SeirPlusPlusSimulation>(&t, base_params().with("not_a_parameter", 1.0)).unwrap_err();
    assert!(!err.is_invalid_parameters());
    assert!(matches!(&err, Error::UnknownParameters(keys) if keys == &["not_a_parameter"]), "{err}");

    let err = get_model_data::<SeirPlusPlusSimulation>(&days(40, 60), base_params()).unwrap_err();
    assert!(err.to_string().contains("at least one day before"), "{err}");

    let mut missing = base_params();
    missing.remove("total_population");
    assert!(get_model_data::<SeirPlusPlusSimulation>(&t, missing).is_err());
}

#[test]
fn spacing_check_can_be_relaxed() {
    let params = base_params()
        .with("mitigation_t_0", 55.0)
        .with("mitigation_factor_0", 1.0)
        .with("mitigation_t_1", 57.0)
        .with("mitigation_factor_1", 0.5)
        .with("min_mitigation_spacing", 1.0);
    assert!(get_model_data::<SeirPlusPlusSimulation>(&days(50, 80), params).is_ok());
}

#[test]
fn onset_and_death_model_ignores_unknown_keys() {
    let params = base_params().with("p_observed", 0.5).with("something_else", 3.0);
    let frame = get_model_data::<SeirPlusPlusOnsetAndDeath>(&days(50, 90), params).expect("simulation");
    assert!(frame.column("observed").is_some());
    assert!(frame.column("dead_incr").is_some());
    let observed = frame.column("observed").expect("observed");
    let infected = frame.column("infected").expect("infected");
    assert!(observed[40] < 0.5 * infected[40]);
}

#[test]
fn registry_resolves_names() {
    assert_eq!(Simulator::from_name("SeirPlusPlusSimulation"), Some(Simulator::SeirPlusPlus));
    assert_eq!(
        Simulator::from_name("SEIRPlusPlusSimulationHospitalCriticalAndDeath"),
        Some(Simulator::SeirPlusPlus)
    );
    for (name, sim) in [
        ("SEIRPlusPlusSimulation", Simulator::SeirPlusPlus),
        ("SEIRPlusPlusSimulationOnsetAndDeath", Simulator::SeirPlusPlusOnsetAndDeath),
        ("SEIRModelSimulation", Simulator::Seir),
        ("NeherModelSimulation", Simulator::Neher),
    ] {
        assert_eq!(Simulator::from_name(name), Some(sim), "{name}");
        assert_eq!(name.parse::<Simulator>().ok(), Some(sim), "{name}");
    }
    assert_eq!(Simulator::from_name("nope"), None);
    assert!("nope".parse::<Simulator>().is_err());

    let via_registry = Simulator::SeirPlusPlus
        .get_model_data(&days(50, 60), base_params())
        .expect("simulation");
    let direct = get_model_data::<SeirPlusPlusSimulation>(&days(50, 60), base_params()).expect("simulation");
    assert_eq!(via_registry, direct);
}
