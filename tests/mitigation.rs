use approx::assert_relative_eq;

use pydemic::{MitigationModel, ParameterSet};

#[test]
fn no_events_means_no_mitigation() {
    let m = MitigationModel::new(0.0, 100.0, vec![], vec![]).expect("valid");
    for t in [-50.0, 0.0, 42.0, 500.0] {
        assert_eq!(m.eval(t), 1.0);
    }
    assert_eq!(m.min_spacing(), None);
}

#[test]
fn curve_passes_through_events_and_is_flat_outside() {
    let m = MitigationModel::new(40.0, 120.0, vec![60.0, 70.0, 90.0], vec![1.0, 0.4, 0.6]).expect("valid");
    assert_relative_eq!(m.eval(60.0), 1.0, epsilon = 1e-12);
    assert_relative_eq!(m.eval(70.0), 0.4, epsilon = 1e-12);
    assert_relative_eq!(m.eval(90.0), 0.6, epsilon = 1e-12);
    assert_relative_eq!(m.eval(45.0), 1.0, epsilon = 1e-12);
    assert_relative_eq!(m.eval(110.0), 0.6, epsilon = 1e-12);

    // monotone between events, no overshoot
    let mut prev = m.eval(60.0);
    for i in 1..=100 {
        let v = m.eval(60.0 + 0.1 * i as f64);
        assert!(v <= prev + 1e-12);
        assert!(v >= 0.4 - 1e-12);
        prev = v;
    }
    assert_eq!(m.min_spacing(), Some(10.0));
}

#[test]
fn mismatched_or_unordered_events_are_rejected() {
    assert!(MitigationModel::new(0.0, 100.0, vec![10.0, 20.0], vec![1.0]).is_err());
    let err = MitigationModel::new(0.0, 100.0, vec![30.0, 20.0], vec![1.0, 0.5]).unwrap_err();
    assert!(err.is_invalid_parameters());
}

#[test]
fn events_are_read_from_indexed_keys() {
    let mut params = ParameterSet::new()
        .with("mitigation_t_1", 70.0)
        .with("mitigation_factor_1", 0.3)
        .with("mitigation_t_0", 50.0)
        .with("mitigation_factor_0", 0.9)
        .with("r0", 2.5);
    let m = MitigationModel::from_parameters(40.0, 100.0, &mut params).expect("valid");
    assert_eq!(m.times, vec![50.0, 70.0]);
    assert_eq!(m.factors, vec![0.9, 0.3]);
    assert_eq!(params.keys().collect::<Vec<_>>(), vec!["r0"]);
}

#[test]
fn multiplier_scales_the_curve() {
    let m = MitigationModel::constant().with_multiplier(|t| if t > 10.0 { 0.5 } else { 1.0 });
    assert_eq!(m.eval(5.0), 1.0);
    assert_eq!(m.eval(20.0), 0.5);
}
