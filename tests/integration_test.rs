//! Integration tests: synthesize readings from known prescriptions, corrupt some
//! of them, and verify the fit and the outlier resolver recover the truth.


use spherocyl::fit::Exclusion;
use spherocyl::{
    curve_fitting, resolve_outliers, CylinderConvention, FitConfig, Measurement,
    MeasurementSession, OutlierConfig, OutlierMask, OutlierRule, Prescription, SolverError,
};
use test_data::{even_angles, nine_angles, sample, sample_noisy};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

fn truth() -> Prescription {
    Prescription::new(-1.0, -2.0, 30.0)
}

/// Nine clean readings with a +3 D error on the one at 80°.
fn spiked_nine() -> Vec<Measurement> {
    let mut ms = sample(&truth(), &nine_angles());
    ms[4].power_d += 3.0;
    ms
}

// ── Fitting ─────────────────────────────────────────────────────────────────

#[test]
fn test_four_meridian_fit() {
    init_tracing();

    // sphere 0, cyl +2, axis 45
    let ms = vec![
        Measurement::new(0.0, 1.0),
        Measurement::new(45.0, 0.0),
        Measurement::new(90.0, 1.0),
        Measurement::new(135.0, 2.0),
    ];
    let rx = curve_fitting(&ms, &FitConfig::default())
        .unwrap()
        .to_convention(CylinderConvention::Plus);
    println!("four-meridian fit: {rx:?}");
    assert!((rx.cylinder.abs() - 2.0).abs() < 1e-3, "cyl {}", rx.cylinder);
    assert!((rx.axis - 45.0).abs() < 1e-3, "axis {}", rx.axis);
    assert!(rx.sphere.abs() < 1e-3, "sphere {}", rx.sphere);
}

#[test]
fn test_quarter_turn_readings_have_no_cylinder() {
    // readings repeating every 90° match no sin² profile; the best fit is flat
    let ms = vec![
        Measurement::new(0.0, 2.0),
        Measurement::new(45.0, 0.0),
        Measurement::new(90.0, 2.0),
        Measurement::new(135.0, 0.0),
    ];
    let rx = curve_fitting(&ms, &FitConfig::default()).unwrap();
    println!("quarter-turn fit: {rx:?}");
    assert!(rx.cylinder.abs() < 1e-3, "cyl {}", rx.cylinder);
    assert!((rx.sphere - 1.0).abs() < 1e-3, "sphere {}", rx.sphere);
}

#[test]
fn test_noisy_fit_stays_close() {
    init_tracing();

    for seed in 0..10 {
        let ms = sample_noisy(&truth(), &nine_angles(), 0.02, seed);
        let rx = curve_fitting(&ms, &FitConfig::default())
            .unwrap()
            .to_convention(CylinderConvention::Minus);
        assert!((rx.cylinder + 2.0).abs() < 0.1, "seed {seed}: cyl {}", rx.cylinder);
        assert!((rx.sphere + 1.0).abs() < 0.1, "seed {seed}: sphere {}", rx.sphere);
        assert!((rx.axis - 30.0).abs() < 3.0, "seed {seed}: axis {}", rx.axis);
    }
}

#[test]
fn test_single_meridian_is_fatal() {
    let ms: Vec<Measurement> = (0..5)
        .map(|i| Measurement::new(60.0, -1.0 + i as f64 * 0.5))
        .collect();
    let err = curve_fitting(&ms, &FitConfig::default()).unwrap_err();
    assert!(matches!(err, SolverError::SingularSystem { .. }));
    assert!(err.to_string().starts_with("could not compute a fit for this data"));
}

// ── Resolver ────────────────────────────────────────────────────────────────

#[test]
fn test_spike_is_flagged_first() {
    init_tracing();

    let ms = spiked_nine();
    let config = OutlierConfig::default();
    let current = curve_fitting(&ms, &config.fit).unwrap();
    let mut mask = OutlierMask::new(ms.len());

    let res = resolve_outliers(&ms, &mut mask, 0, &current, &config).unwrap();
    let decision = res.decision.expect("a rule should fire");
    println!("decision: {}", decision.reason);

    assert_eq!(decision.rule, OutlierRule::AxisPush);
    assert_eq!(decision.exclusion, Exclusion::single(4));
    assert_eq!(mask.excluded_indices(), vec![4]);
    // the refit without the spike is the truth, and its cylinder is closer to it
    assert!((res.prescription.cylinder.abs() - 2.0).abs() < 1e-3);
    assert!(current.cylinder.abs() - res.prescription.cylinder.abs() > 0.1);
    assert!(decision.base_score < res.current_quality.base);
}

#[test]
fn test_spike_flagged_under_noise() {
    init_tracing();

    for seed in 0..20 {
        let mut ms = sample_noisy(&truth(), &nine_angles(), 0.02, seed);
        ms[4].power_d += 3.0;
        let mut session = MeasurementSession::new(ms);
        let outcome = session.resolve_outliers().unwrap();
        assert_eq!(outcome.outliers, vec![4], "seed {seed}: {:?}", session.trace());
    }
}

#[test]
fn test_noisy_clean_data_has_no_outliers() {
    for seed in 100..120 {
        let ms = sample_noisy(&truth(), &nine_angles(), 0.02, seed);
        let mut session = MeasurementSession::new(ms);
        let outcome = session.resolve_outliers().unwrap();
        assert!(outcome.outliers.is_empty(), "seed {seed}: {:?}", session.trace());
    }
}

#[test]
fn test_six_measurements_unchanged() {
    let config = OutlierConfig::default();
    for spike in 0..6 {
        let mut ms = sample(&truth(), &even_angles(6));
        ms[spike].power_d += 3.0;
        let current = curve_fitting(&ms, &config.fit).unwrap();
        let mut mask = OutlierMask::new(ms.len());
        let res = resolve_outliers(&ms, &mut mask, 0, &current, &config).unwrap();
        assert!(res.decision.is_none());
        assert_eq!(res.prescription, current);
        assert_eq!(mask.count(), 0);
    }
}

#[test]
fn test_seven_measurements_evaluated() {
    init_tracing();

    let config = OutlierConfig::default();
    for spike in 0..7 {
        let mut ms = sample(&truth(), &even_angles(7));
        ms[spike].power_d += 3.0;
        let current = curve_fitting(&ms, &config.fit).unwrap();
        let mut mask = OutlierMask::new(ms.len());
        let res = resolve_outliers(&ms, &mut mask, 0, &current, &config).unwrap();
        let decision = res.decision.expect("a rule should fire");
        println!("spike {spike}: {:?} {:?}", decision.rule, decision.exclusion);

        // the first pass may pick a neighbour; the session settles on the spike
        let mut session = MeasurementSession::new(ms);
        let outcome = session.resolve_outliers().unwrap();
        assert_eq!(outcome.outliers, vec![spike], "spike {spike}: {:?}", session.trace());
        assert!((outcome.prescription.cylinder.abs() - 2.0).abs() < 1e-3);
    }
}

#[test]
fn test_high_cylinder_push() {
    let mut angles: Vec<f64> = (0..8).map(|i| i as f64 * 22.5).collect();
    angles.push(11.25);
    let mut ms = sample(&truth(), &angles);
    ms[8].power_d += 3.0;

    let config = OutlierConfig::default();
    let current = curve_fitting(&ms, &config.fit).unwrap();
    assert!(current.cylinder.abs() > 2.5);
    let mut mask = OutlierMask::new(ms.len());
    let res = resolve_outliers(&ms, &mut mask, 0, &current, &config).unwrap();
    let decision = res.decision.expect("a rule should fire");
    assert_eq!(decision.rule, OutlierRule::CylinderPush);
    assert_eq!(decision.exclusion, Exclusion::single(8));
    assert!(decision.reason.starts_with("Lowering Cyl because it was pushing the cyl higher"));
}

#[test]
fn test_rule_order_is_configurable() {
    let ms = spiked_nine();
    let default = OutlierConfig::default();
    let current = curve_fitting(&ms, &default.fit).unwrap();

    let config = OutlierConfig {
        rules: vec![
            OutlierRule::FarFromCurve,
            OutlierRule::CylinderPush,
            OutlierRule::AxisPush,
            OutlierRule::FitQualityDeforming,
        ],
        ..Default::default()
    };
    let mut mask = OutlierMask::new(ms.len());
    let res = resolve_outliers(&ms, &mut mask, 0, &current, &config).unwrap();
    let decision = res.decision.expect("far-from-curve should fire");
    assert_eq!(decision.rule, OutlierRule::FarFromCurve);
    assert_eq!(decision.exclusion, Exclusion::single(4));

    // cylinder push alone does not see this spike
    let config = OutlierConfig {
        rules: vec![OutlierRule::CylinderPush],
        ..Default::default()
    };
    let res = resolve_outliers(&ms, &mut mask, 0, &current, &config).unwrap();
    assert!(res.decision.is_none());
    assert_eq!(mask.count(), 0);
}

#[test]
fn test_score_gate_moves_down_the_cascade() {
    init_tracing();

    let powers = [1.0, 0.83, 0.2, 2.21, 0.06, 0.68, 1.19, 1.63, 2.18];
    let ms: Vec<Measurement> = nine_angles()
        .into_iter()
        .zip(powers)
        .map(|(a, p)| Measurement::new(a, p))
        .collect();
    let gated = OutlierConfig::default();
    let current = curve_fitting(&ms, &gated.fit).unwrap();

    // without the gate, axis push takes a refit that scores worse than the current fit
    let ungated = OutlierConfig {
        require_score_improvement: false,
        ..Default::default()
    };
    let mut mask = OutlierMask::new(ms.len());
    let res = resolve_outliers(&ms, &mut mask, 0, &current, &ungated).unwrap();
    let decision = res.decision.expect("axis push should fire");
    assert_eq!(decision.rule, OutlierRule::AxisPush);
    assert_eq!(decision.exclusion, Exclusion::single(2));
    assert!(decision.base_score > res.current_quality.base);

    let res = resolve_outliers(&ms, &mut mask, 0, &current, &gated).unwrap();
    let decision = res.decision.expect("a later rule should fire");
    assert_eq!(decision.rule, OutlierRule::FitQualityDeforming);
    assert_eq!(decision.exclusion, Exclusion::single(3));
    assert!(decision.base_score <= res.current_quality.base);
    assert_eq!(mask.excluded_indices(), vec![3]);
}

#[test]
fn test_known_user_errors_raise_every_score() {
    let ms = spiked_nine();
    let config = OutlierConfig::default();
    let current = curve_fitting(&ms, &config.fit).unwrap();

    let mut mask = OutlierMask::new(ms.len());
    let clean = resolve_outliers(&ms, &mut mask, 0, &current, &config).unwrap();
    let flagged = resolve_outliers(&ms, &mut mask, 2, &current, &config).unwrap();

    let penalty = 2.0 * config.score.user_error_penalty;
    assert_eq!(clean.current_quality.base, flagged.current_quality.base);
    assert!((flagged.current_quality.score - clean.current_quality.score - penalty).abs() < 1e-12);

    let (a, b) = (clean.decision.unwrap(), flagged.decision.unwrap());
    assert_eq!(a.exclusion, b.exclusion);
    assert!((b.score - a.score - penalty).abs() < 1e-12);

    let mut session = MeasurementSession::new(spiked_nine()).with_known_user_errors(2);
    assert_eq!(session.known_user_errors(), 2);
    let outcome = session.resolve_outliers().unwrap();
    assert_eq!(outcome.outliers, vec![4]);
}

#[test]
fn test_resolver_is_idempotent() {
    let ms = spiked_nine();
    let config = OutlierConfig::default();
    let current = curve_fitting(&ms, &config.fit).unwrap();

    let mut mask_a = OutlierMask::new(ms.len());
    let mut mask_b = OutlierMask::new(ms.len());
    mask_b.flag(0);
    let a = resolve_outliers(&ms, &mut mask_a, 0, &current, &config).unwrap();
    let b = resolve_outliers(&ms, &mut mask_b, 0, &current, &config).unwrap();
    assert_eq!(a, b);
    assert_eq!(mask_a, mask_b);
}

#[test]
fn test_flagging_never_worsens_the_score() {
    for seed in 0..10 {
        let mut ms = sample_noisy(&truth(), &nine_angles(), 0.05, seed);
        ms[(seed % 9) as usize].power_d -= 2.0;
        let config = OutlierConfig::default();
        let current = curve_fitting(&ms, &config.fit).unwrap();
        let mut mask = OutlierMask::new(ms.len());
        let res = resolve_outliers(&ms, &mut mask, 0, &current, &config).unwrap();
        if let Some(d) = res.decision {
            assert!(
                d.base_score <= res.current_quality.base,
                "seed {seed}: {:?} {} > {}",
                d.rule,
                d.base_score,
                res.current_quality.base
            );
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

#[test]
fn test_session_round_trip() {
    init_tracing();

    let mut session = MeasurementSession::new(spiked_nine());
    let outcome = session.resolve_outliers().unwrap();
    assert_eq!(outcome.outliers, vec![4]);
    assert_eq!(outcome.rounds, 2);
    assert!((outcome.prescription.sphere + 1.0).abs() < 1e-3);
    assert!((outcome.prescription.cylinder + 2.0).abs() < 1e-3);
    assert!((outcome.prescription.axis - 30.0).abs() < 1e-3);

    let trace = session.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].rule, OutlierRule::AxisPush);

    // resolving again from scratch reproduces the same outcome
    let again = session.resolve_outliers().unwrap();
    assert_eq!(again, outcome);

    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.residuals.len(), 8);
    assert!(snapshot.std_dev < 1e-3);
}
