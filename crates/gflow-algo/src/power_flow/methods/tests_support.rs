//! Small fixture networks shared by the method tests.

use super::MethodInput;
use crate::sparse::{AdmittanceModel, BranchPrimitive};
use gflow_core::FaerSolver;
use num_complex::Complex64;

fn line(from: usize, to: usize, y: Complex64, b: f64) -> BranchPrimitive {
    let z = y.inv();
    BranchPrimitive {
        from,
        to,
        active: true,
        r: z.re,
        x: z.im,
        b,
        tap_module: 1.0,
        tap_angle: 0.0,
    }
}

pub struct Case {
    pub model: AdmittanceModel,
    pub v0: Vec<Complex64>,
    pub sbus: Vec<Complex64>,
    pub ibus: Vec<Complex64>,
    pub pq: Vec<usize>,
    pub pv: Vec<usize>,
    pub slack: Vec<usize>,
    pub pqpv: Vec<usize>,
    backend: FaerSolver,
}

impl Case {
    pub fn input(&self, tolerance: f64, max_iterations: usize) -> MethodInput<'_> {
        MethodInput {
            v0: &self.v0,
            sbus: &self.sbus,
            ibus: &self.ibus,
            ybus: &self.model.ybus,
            yseries: &self.model.yseries,
            b1: &self.model.b1,
            b2: &self.model.b2,
            pq: &self.pq,
            pv: &self.pv,
            slack: &self.slack,
            pqpv: &self.pqpv,
            tolerance,
            max_iterations,
            robust: true,
            backend: &self.backend,
        }
    }
}

/// Slack `1∠0` feeding a `0.5 + j0.2` load through `y = 10 − j20`.
pub fn two_bus() -> Case {
    let model = AdmittanceModel::build(
        2,
        vec![line(0, 1, Complex64::new(10.0, -20.0), 0.0)],
        vec![Complex64::default(); 2],
    )
    .unwrap();
    Case {
        model,
        v0: vec![Complex64::new(1.0, 0.0); 2],
        sbus: vec![Complex64::default(), Complex64::new(-0.5, -0.2)],
        ibus: vec![Complex64::default(); 2],
        pq: vec![1],
        pv: vec![],
        slack: vec![0],
        pqpv: vec![1],
        backend: FaerSolver,
    }
}

/// Slack (0), PV generator at 1.02 pu (1), two loads (2, 3) on a meshed grid.
pub fn four_bus_with_pv() -> Case {
    let model = AdmittanceModel::build(
        4,
        vec![
            line(0, 1, Complex64::new(4.0, -12.0), 0.02),
            line(0, 2, Complex64::new(5.0, -15.0), 0.02),
            line(1, 2, Complex64::new(3.0, -9.0), 0.01),
            line(2, 3, Complex64::new(6.0, -18.0), 0.01),
            line(1, 3, Complex64::new(2.0, -8.0), 0.0),
        ],
        vec![Complex64::default(); 4],
    )
    .unwrap();
    Case {
        model,
        v0: vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(1.02, 0.0),
            Complex64::new(1.0, 0.0),
            Complex64::new(1.0, 0.0),
        ],
        sbus: vec![
            Complex64::default(),
            Complex64::new(0.3, 0.0),
            Complex64::new(-0.6, -0.25),
            Complex64::new(-0.4, -0.15),
        ],
        ibus: vec![Complex64::default(); 4],
        pq: vec![2, 3],
        pv: vec![1],
        slack: vec![0],
        pqpv: vec![1, 2, 3],
        backend: FaerSolver,
    }
}

/// Same grid as [`four_bus_with_pv`] with the generator turned into a load.
pub fn four_bus_pq_only() -> Case {
    let mut case = four_bus_with_pv();
    case.sbus[1] = Complex64::new(-0.2, -0.05);
    case.v0[1] = Complex64::new(1.0, 0.0);
    case.pq = vec![1, 2, 3];
    case.pv = vec![];
    case
}
