//! End-to-end power-flow tests through [`PowerFlowDriver`].
//!
//! Covers convergence on small reference grids, slack promotion, island
//! handling, reactive-limit and tap control, retry exhaustion and
//! cancellation.

use gflow_algo::power_flow::{
    classify, CalculationInputs, PowerFlowDriver, PowerFlowOptions, ReactivePowerControlMode,
    SolverType, StructureKind, TapBranchStrategy, TapControlMode,
};
use gflow_core::{
    BranchData, BusData, BusMode, FlowError, Logger, MemorySink, NetworkSnapshot, Severity,
    TapChanger,
};
use num_complex::Complex64;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn two_bus(load: Complex64) -> NetworkSnapshot {
    let mut net = NetworkSnapshot::new("two-bus");
    let s = net.add_bus(BusData::slack("Slack", 1.0));
    let l = net.add_bus(BusData::pq("Load", load));
    net.add_branch(BranchData::line(s, l, 0.02, 0.04, 0.0).with_rate(100.0));
    net
}

/// Two copies of the two-bus grid with no branch between them.
fn two_islands() -> NetworkSnapshot {
    let mut net = NetworkSnapshot::new("split");
    for k in 0..2 {
        let s = net.add_bus(BusData::slack(format!("S{}", k), 1.0));
        let l = net.add_bus(BusData::pq(format!("L{}", k), Complex64::new(-0.5, -0.2)));
        net.add_branch(BranchData::line(s, l, 0.02, 0.04, 0.0).with_rate(100.0));
    }
    net
}

#[test]
fn test_two_bus_newton_raphson() {
    init_tracing();
    let driver = PowerFlowDriver::new(PowerFlowOptions::default());
    let result = driver
        .run(&two_bus(Complex64::new(-0.5, -0.2)), &mut Logger::default())
        .unwrap();

    assert!(result.converged);
    assert!(result.iterations <= 5, "took {} iterations", result.iterations);
    let vm = result.voltage[1].norm();
    assert!((0.90..=0.99).contains(&vm), "|V1| = {}", vm);

    // the slack covers the load plus the series losses
    assert!(result.losses[0].re >= 0.0);
    assert!((result.s_from[0].re - (50.0 + result.losses[0].re)).abs() < 1e-6);
    assert!((result.sbus[0].re - result.s_from[0].re).abs() < 1e-6);
    assert!(result.loading[0] > 0.5 && result.loading[0] < 0.6);
}

#[test]
fn test_every_method_solves_two_bus() {
    init_tracing();
    let net = two_bus(Complex64::new(-0.5, -0.2));
    let exact = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&net, &mut Logger::default())
        .unwrap();

    for method in [
        SolverType::IwamotoNr,
        SolverType::LevenbergMarquardt,
        SolverType::FastDecoupled,
        SolverType::NewtonRaphsonCurrent,
        SolverType::HolomorphicEmbedding,
    ] {
        let options = PowerFlowOptions::default().with_solver(method).with_retry(false);
        let result = PowerFlowDriver::new(options)
            .run(&net, &mut Logger::default())
            .unwrap();
        assert!(result.converged, "{} did not converge", method);
        assert!(
            (result.voltage[1] - exact.voltage[1]).norm() < 1e-5,
            "{} disagrees with Newton-Raphson",
            method
        );
        assert_eq!(result.islands[0].method, Some(method));
    }
}

#[test]
fn test_slack_promotion_picks_largest_injection() {
    let mut logger = Logger::default();

    let sbus = [Complex64::new(1.0, 0.0), Complex64::new(2.0, 0.0)];
    let mut types = [BusMode::PV, BusMode::PV];
    let sets = classify(&sbus, &mut types, &mut logger);
    assert_eq!(sets.slack, vec![1]);
    assert_eq!(types, [BusMode::PV, BusMode::Ref]);

    // nothing positive: the first PV bus is promoted
    let sbus = [Complex64::new(-1.0, 0.0), Complex64::new(-2.0, 0.0)];
    let mut types = [BusMode::PV, BusMode::PV];
    let sets = classify(&sbus, &mut types, &mut logger);
    assert_eq!(sets.slack, vec![0]);
}

#[test]
fn test_no_slack_island_is_reported() {
    init_tracing();
    let mut net = NetworkSnapshot::new("floating");
    let a = net.add_bus(BusData::pq("A", Complex64::new(-0.1, 0.0)));
    let b = net.add_bus(BusData::pq("B", Complex64::new(-0.1, 0.0)));
    net.add_branch(BranchData::line(a, b, 0.01, 0.1, 0.0));

    let sink = Arc::new(MemorySink::default());
    let mut logger = Logger::with_sink(sink.clone());
    let result = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&net, &mut logger)
        .unwrap();

    assert!(result.voltage.iter().all(|v| v.norm() == 0.0));
    assert!(sink
        .issues()
        .iter()
        .any(|i| i.message.contains("There are no slack nodes in the island 0")));
}

#[test]
fn test_islands_are_solved_independently() {
    init_tracing();
    let net = two_islands();
    let sequential = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&net, &mut Logger::default())
        .unwrap();
    assert!(sequential.converged);
    assert_eq!(sequential.islands.len(), 2);
    assert!((sequential.voltage[1] - sequential.voltage[3]).norm() < 1e-12);

    let parallel = PowerFlowDriver::new(PowerFlowOptions::default().with_multi_threading(true, 2))
        .run(&net, &mut Logger::default())
        .unwrap();
    assert!(parallel.converged);
    for (a, b) in sequential.voltage.iter().zip(&parallel.voltage) {
        assert!((a - b).norm() < 1e-12);
    }
    let indices: Vec<usize> = parallel.islands.iter().map(|i| i.index).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[test]
fn test_inactive_branch_splits_network() {
    init_tracing();
    let mut net = NetworkSnapshot::new("open-line");
    let s = net.add_bus(BusData::slack("S", 1.0));
    let m = net.add_bus(BusData::pq("M", Complex64::new(-0.2, -0.1)));
    let far = net.add_bus(BusData::pq("F", Complex64::new(-0.2, -0.1)));
    net.add_branch(BranchData::line(s, m, 0.01, 0.05, 0.0));
    net.add_branch(BranchData::line(m, far, 0.01, 0.05, 0.0).with_active(false));

    let options = PowerFlowOptions::default().with_ignore_single_node_islands(true);
    let result = PowerFlowDriver::new(options)
        .run(&net, &mut Logger::default())
        .unwrap();

    assert_eq!(result.islands.len(), 1);
    assert!(result.converged);
    assert_eq!(result.voltage[2].norm(), 0.0, "dropped bus keeps a zero voltage");
    assert_eq!(result.s_from[1].norm(), 0.0, "open branch carries nothing");
}

#[test]
fn test_deenergised_neighbour_does_not_load_the_island() {
    init_tracing();
    let load = Complex64::new(-0.5, -0.2);
    let reference = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&two_bus(load), &mut Logger::default())
        .unwrap();

    let mut net = two_bus(load);
    let dead = net.add_bus(BusData::pq("Dead", Complex64::default()).with_active(false));
    net.add_branch(BranchData::line(1, dead, 0.01, 0.05, 0.0));
    let result = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&net, &mut Logger::default())
        .unwrap();

    assert!(result.converged);
    for i in 0..2 {
        assert!(
            (result.voltage[i] - reference.voltage[i]).norm() < 1e-9,
            "bus {} moved: {} vs {}",
            i,
            result.voltage[i],
            reference.voltage[i]
        );
    }
    assert!((result.sbus[0] - reference.sbus[0]).norm() < 1e-6);
    assert_eq!(result.voltage[2].norm(), 0.0);
    assert_eq!(result.s_from[1].norm(), 0.0);
    assert_eq!(result.s_to[1].norm(), 0.0);
}

#[test]
fn test_reactive_limit_switches_generator() {
    init_tracing();
    let mut net = NetworkSnapshot::new("generator");
    let s = net.add_bus(BusData::slack("S", 1.0));
    let g = net.add_bus(BusData::pv("G", -0.4, 1.0).with_q_limits(-0.1, 0.1));
    net.add_branch(BranchData::line(s, g, 0.02, 0.04, 0.0));

    let unconstrained = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&net, &mut Logger::default())
        .unwrap();
    assert_eq!(unconstrained.bus_types[1], BusMode::PV);
    assert!((unconstrained.voltage[1].norm() - 1.0).abs() < 1e-9);

    let options = PowerFlowOptions::default()
        .with_reactive_limits(true, ReactivePowerControlMode::Direct);
    let sink = Arc::new(MemorySink::default());
    let mut logger = Logger::with_sink(sink);
    let result = PowerFlowDriver::new(options).run(&net, &mut logger).unwrap();

    assert!(result.converged);
    assert_eq!(result.bus_types[1], BusMode::PQ);
    assert!((result.sbus[1].im - 10.0).abs() < 1e-6, "Q held at Qmax (MVA)");
    assert!(result.voltage[1].norm() < 1.0);
    assert!(result.report.len() >= 2);
}

#[test]
fn test_tap_control_regulates_voltage() {
    init_tracing();
    let mut net = NetworkSnapshot::new("transformer");
    let s = net.add_bus(BusData::slack("S", 1.0));
    let l = net.add_bus(BusData::pq("L", Complex64::new(-0.5, -0.2)));
    net.add_branch(BranchData::line(s, l, 0.01, 0.05, 0.0).with_tap_changer(TapChanger {
        min_position: -10,
        max_position: 10,
        ..TapChanger::default()
    }));

    for mode in [TapControlMode::Iterative, TapControlMode::Direct] {
        let options = PowerFlowOptions::default().with_tap_control(
            true,
            mode,
            TapBranchStrategy::AllRegulated,
        );
        let result = PowerFlowDriver::new(options)
            .run(&net, &mut Logger::default())
            .unwrap();
        assert!(result.converged, "{:?}", mode);
        let position = result.tap_positions[0].unwrap();
        assert!(position < 0, "{:?} left the tap at {}", mode, position);
        assert!(
            (result.voltage[1].norm() - 1.0).abs() < 0.02,
            "{:?}: |V| = {}",
            mode,
            result.voltage[1].norm()
        );
    }
}

#[test]
fn test_retry_exhaustion_reports_every_method() {
    init_tracing();
    // far past the loadability limit of the line
    let net = two_bus(Complex64::new(-50.0, -20.0));
    let sink = Arc::new(MemorySink::default());
    let mut logger = Logger::with_sink(sink);
    let result = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&net, &mut logger)
        .unwrap();

    assert!(!result.converged);
    assert_eq!(
        result.report.methods(),
        vec![
            SolverType::NewtonRaphson,
            SolverType::IwamotoNr,
            SolverType::FastDecoupled,
            SolverType::LevenbergMarquardt,
            SolverType::LinearAc,
        ]
    );
    let errors: Vec<_> = result.diagnostics.issues_by_category("retry").collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity, Severity::Error);
    assert_eq!(errors[0].message, "Did not converge, even after retry!");
}

#[test]
fn test_cancel_handle_stops_run() {
    let driver = PowerFlowDriver::new(PowerFlowOptions::default());
    let handle = driver.cancel_handle();
    handle.store(true, std::sync::atomic::Ordering::Relaxed);
    assert!(driver.is_cancelled());
    assert!(matches!(
        driver.run(&two_bus(Complex64::new(-0.5, -0.2)), &mut Logger::default()),
        Err(FlowError::Cancelled)
    ));
}

#[test]
fn test_report_table_lists_outer_iterations() {
    init_tracing();
    let result = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&two_bus(Complex64::new(-0.5, -0.2)), &mut Logger::default())
        .unwrap();
    let table = result.report.to_string();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[2].starts_with("newton_raphson"));
    assert!(lines[2].contains("true"));
}

#[test]
fn test_options_from_json_drive_the_run() {
    init_tracing();
    let options = PowerFlowOptions::from_json(
        r#"{ "solver_type": "fdpf", "retry_with_other_methods": false, "tolerance": 1e-7 }"#,
    )
    .unwrap();
    let result = PowerFlowDriver::new(options)
        .run(&two_bus(Complex64::new(-0.5, -0.2)), &mut Logger::default())
        .unwrap();
    assert!(result.converged);
    assert!(result.norm_f < 1e-7);
    assert_eq!(result.report.methods(), vec![SolverType::FastDecoupled]);
}

#[test]
fn test_structure_export() {
    let inputs = CalculationInputs::compile(&two_bus(Complex64::new(-0.5, -0.2))).unwrap();
    let ybus = inputs.structure(StructureKind::Ybus);
    assert_eq!(ybus.shape(), (2, 2));
    assert_eq!(ybus.row_labels, vec!["Slack", "Load"]);

    let jac = inputs.structure(StructureKind::Jacobian);
    // one PQ bus: dP and dQ rows against dVa and dVm columns
    assert_eq!(jac.shape(), (2, 2));
    assert_eq!(jac.row_labels, vec!["P Load", "Q Load"]);
}

#[test]
fn test_invalid_snapshot_is_rejected() {
    let mut net = NetworkSnapshot::new("broken");
    let s = net.add_bus(BusData::slack("S", 1.0));
    net.add_branch(BranchData::line(s, 5, 0.01, 0.05, 0.0));
    let err = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&net, &mut Logger::default())
        .unwrap_err();
    assert!(matches!(err, FlowError::Validation(_)), "{}", err);
}

#[test]
fn test_active_limit_violation_is_warned() {
    init_tracing();
    let mut net = NetworkSnapshot::new("limited-slack");
    let s = net.add_bus(BusData::slack("S", 1.0).with_p_limits(0.0, 0.3));
    let l = net.add_bus(BusData::pq("L", Complex64::new(-0.5, -0.2)).with_v_limits(0.995, 1.05));
    net.add_branch(BranchData::line(s, l, 0.02, 0.04, 0.0).with_rate(100.0));

    let options = PowerFlowOptions::default()
        .with_active_limits(true)
        .with_max_outer_iterations(Some(3));
    let result = PowerFlowDriver::new(options)
        .run(&net, &mut Logger::default())
        .unwrap();

    assert!(result.converged, "active limits only warn");
    assert!(result.diagnostics.warning_count() >= 1);
    assert_eq!(result.limits.undervoltage, vec![1]);
    assert!(result.limits.score > 0.0);
}

#[test]
fn test_gauss_backend_matches_faer() {
    init_tracing();
    let net = two_bus(Complex64::new(-0.5, -0.2));
    let faer = PowerFlowDriver::new(PowerFlowOptions::default())
        .run(&net, &mut Logger::default())
        .unwrap();
    let options = PowerFlowOptions::default()
        .with_linear_solver(gflow_core::LinearSolverKind::Gauss)
        .with_robust(false)
        .with_max_iterations(10);
    let gauss = PowerFlowDriver::new(options)
        .run(&net, &mut Logger::default())
        .unwrap();
    assert!(gauss.converged);
    assert!((gauss.voltage[1] - faer.voltage[1]).norm() < 1e-9);
}
