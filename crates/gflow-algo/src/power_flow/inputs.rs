//! Compiled per-circuit arrays handed to the solver.
//!
//! [`CalculationInputs`] is the flat, index-based form of a
//! [`NetworkSnapshot`]: per-bus vectors, per-branch vectors and the assembled
//! [`AdmittanceModel`]. Islands are produced by slicing it, so every island
//! carries `original_bus_idx`/`original_branch_idx` back to the full network.

use super::bus_types::classify;
use super::methods::common::jacobian;
use crate::sparse::{real, AdmittanceModel, BranchPrimitive};
use gflow_core::{BusMode, FlowError, FlowResult, Logger, NetworkSnapshot, TapChanger};
use num_complex::Complex64;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CalculationInputs {
    pub n_bus: usize,
    pub n_branch: usize,
    pub bus_names: Vec<String>,
    pub branch_names: Vec<String>,
    pub bus_active: Vec<bool>,
    /// Initial voltage (set points, or a previous solution when seeded)
    pub vbus: Vec<Complex64>,
    pub sbus: Vec<Complex64>,
    pub ibus: Vec<Complex64>,
    /// Working bus types
    pub types: Vec<BusMode>,
    /// Types as declared in the snapshot
    pub original_types: Vec<BusMode>,
    pub vm_set: Vec<f64>,
    pub qmin: Vec<f64>,
    pub qmax: Vec<f64>,
    pub pmin: Vec<f64>,
    pub pmax: Vec<f64>,
    pub vmin: Vec<f64>,
    pub vmax: Vec<f64>,
    pub branch_rates: Vec<f64>,
    pub tap_changers: Vec<Option<TapChanger>>,
    pub admittance: AdmittanceModel,
    pub sbase: f64,
    pub original_bus_idx: Vec<usize>,
    pub original_branch_idx: Vec<usize>,
}

impl CalculationInputs {
    /// Validate `snapshot` and assemble its admittances.
    pub fn compile(snapshot: &NetworkSnapshot) -> FlowResult<Self> {
        snapshot.validate()?;

        let buses = &snapshot.buses;
        // a branch touching a de-energised bus carries nothing
        let primitives = snapshot
            .branches
            .iter()
            .map(|br| BranchPrimitive {
                from: br.from_bus,
                to: br.to_bus,
                active: br.active && buses[br.from_bus].active && buses[br.to_bus].active,
                r: br.r,
                x: br.x,
                b: br.b,
                tap_module: br.effective_tap_module(),
                tap_angle: br.tap_angle,
            })
            .collect();
        let shunts = snapshot
            .buses
            .iter()
            .map(|b| if b.active { b.shunt } else { Complex64::default() })
            .collect();
        let admittance = AdmittanceModel::build(snapshot.bus_count(), primitives, shunts)
            .map_err(|e| FlowError::Network(e.to_string()))?;

        let types: Vec<BusMode> = buses.iter().map(|b| b.mode).collect();
        Ok(Self {
            n_bus: snapshot.bus_count(),
            n_branch: snapshot.branch_count(),
            bus_names: buses.iter().map(|b| b.name.clone()).collect(),
            branch_names: snapshot.branches.iter().map(|b| b.name.clone()).collect(),
            bus_active: buses.iter().map(|b| b.active).collect(),
            vbus: buses.iter().map(|b| b.seed()).collect(),
            sbus: buses.iter().map(|b| b.power).collect(),
            ibus: buses.iter().map(|b| b.current).collect(),
            original_types: types.clone(),
            types,
            vm_set: buses.iter().map(|b| b.vm_set).collect(),
            qmin: buses.iter().map(|b| b.q_min).collect(),
            qmax: buses.iter().map(|b| b.q_max).collect(),
            pmin: buses.iter().map(|b| b.p_min).collect(),
            pmax: buses.iter().map(|b| b.p_max).collect(),
            vmin: buses.iter().map(|b| b.vm_min).collect(),
            vmax: buses.iter().map(|b| b.vm_max).collect(),
            branch_rates: snapshot.branches.iter().map(|b| b.rate).collect(),
            tap_changers: snapshot.branches.iter().map(|b| b.tap_changer.clone()).collect(),
            admittance,
            sbase: snapshot.sbase,
            original_bus_idx: (0..snapshot.bus_count()).collect(),
            original_branch_idx: (0..snapshot.branch_count()).collect(),
        })
    }

    /// Restrict to a bus/branch subset (local indices of `self`).
    pub fn slice(&self, buses: &[usize], branches: &[usize]) -> FlowResult<Self> {
        fn pick<T: Clone>(values: &[T], idx: &[usize]) -> Vec<T> {
            idx.iter().map(|&i| values[i].clone()).collect()
        }

        let admittance = self
            .admittance
            .slice(buses, branches)
            .map_err(|e| FlowError::Network(e.to_string()))?;

        Ok(Self {
            n_bus: buses.len(),
            n_branch: branches.len(),
            bus_names: pick(&self.bus_names, buses),
            branch_names: pick(&self.branch_names, branches),
            bus_active: pick(&self.bus_active, buses),
            vbus: pick(&self.vbus, buses),
            sbus: pick(&self.sbus, buses),
            ibus: pick(&self.ibus, buses),
            types: pick(&self.types, buses),
            original_types: pick(&self.original_types, buses),
            vm_set: pick(&self.vm_set, buses),
            qmin: pick(&self.qmin, buses),
            qmax: pick(&self.qmax, buses),
            pmin: pick(&self.pmin, buses),
            pmax: pick(&self.pmax, buses),
            vmin: pick(&self.vmin, buses),
            vmax: pick(&self.vmax, buses),
            branch_rates: pick(&self.branch_rates, branches),
            tap_changers: pick(&self.tap_changers, branches),
            admittance,
            sbase: self.sbase,
            original_bus_idx: pick(&self.original_bus_idx, buses),
            original_branch_idx: pick(&self.original_branch_idx, branches),
        })
    }

    /// Branches whose tap changer regulates the "to" bus voltage
    pub fn regulated_branches(&self) -> Vec<usize> {
        self.tap_changers
            .iter()
            .enumerate()
            .filter(|(k, changer)| {
                self.admittance.branches()[*k].active
                    && changer.as_ref().is_some_and(|c| c.regulates_to_bus)
            })
            .map(|(k, _)| k)
            .collect()
    }

    /// Sum of the position ranges of all regulating changers
    pub fn total_tap_range(&self) -> usize {
        self.regulated_branches()
            .iter()
            .filter_map(|&k| self.tap_changers[k].as_ref())
            .map(TapChanger::range)
            .sum()
    }

    /// Tap magnitude of every branch from the current changer positions.
    pub fn tap_modules(&self) -> Vec<f64> {
        self.admittance
            .branches()
            .iter()
            .zip(&self.tap_changers)
            .map(|(prim, changer)| match changer {
                Some(c) => c.module(),
                None => prim.tap_module,
            })
            .collect()
    }

    /// Named dense view of one compiled array, for inspection and export.
    pub fn structure(&self, kind: StructureKind) -> Structure {
        let buses = self.bus_names.clone();
        let all: Vec<usize> = (0..self.n_bus).collect();
        let label = |name: &str| vec![name.to_string()];

        let (col_labels, data) = match kind {
            StructureKind::Vbus => (label("V"), complex_column(&self.vbus)),
            StructureKind::Sbus => (label("S"), complex_column(&self.sbus)),
            StructureKind::Ibus => (label("I"), complex_column(&self.ibus)),
            StructureKind::Ybus => (
                buses.clone(),
                StructureData::Complex(self.admittance.ybus.to_dense()),
            ),
            StructureKind::Yseries => (
                buses.clone(),
                StructureData::Complex(self.admittance.yseries.to_dense()),
            ),
            StructureKind::B1 => (
                buses.clone(),
                StructureData::Real(real::dense_block(&self.admittance.b1, &all, &all)),
            ),
            StructureKind::B2 => (
                buses.clone(),
                StructureData::Real(real::dense_block(&self.admittance.b2, &all, &all)),
            ),
            StructureKind::Types => {
                let codes: Vec<f64> = self.types.iter().map(|t| t.code() as f64).collect();
                (label("type"), real_column(&codes))
            }
            StructureKind::Qmin => (label("Qmin"), real_column(&self.qmin)),
            StructureKind::Qmax => (label("Qmax"), real_column(&self.qmax)),
            StructureKind::Jacobian => return self.jacobian_structure(),
        };

        Structure {
            name: kind.as_str().to_string(),
            row_labels: buses,
            col_labels,
            data,
        }
    }

    fn jacobian_structure(&self) -> Structure {
        let mut types = self.types.clone();
        let sets = classify(&self.sbus, &mut types, &mut Logger::default());
        let pvpq = sets.pvpq();
        let jac = jacobian(&self.admittance.ybus, &self.vbus, &self.ibus, &pvpq, &sets.pq);
        let rows: Vec<usize> = (0..jac.rows()).collect();
        let cols: Vec<usize> = (0..jac.cols()).collect();

        let name = |i: usize| self.bus_names[i].as_str();
        let mut row_labels: Vec<String> = pvpq.iter().map(|&i| format!("P {}", name(i))).collect();
        row_labels.extend(sets.pq.iter().map(|&i| format!("Q {}", name(i))));
        let mut col_labels: Vec<String> = pvpq.iter().map(|&i| format!("Va {}", name(i))).collect();
        col_labels.extend(sets.pq.iter().map(|&i| format!("Vm {}", name(i))));

        Structure {
            name: StructureKind::Jacobian.as_str().to_string(),
            row_labels,
            col_labels,
            data: StructureData::Real(real::dense_block(&jac, &rows, &cols)),
        }
    }
}

fn real_column(values: &[f64]) -> StructureData {
    StructureData::Real(values.iter().map(|&v| vec![v]).collect())
}

fn complex_column(values: &[Complex64]) -> StructureData {
    StructureData::Complex(values.iter().map(|&v| vec![v]).collect())
}

/// Arrays that [`CalculationInputs::structure`] can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    Vbus,
    Sbus,
    Ibus,
    Ybus,
    Yseries,
    B1,
    B2,
    Types,
    Qmin,
    Qmax,
    /// Power-mismatch Jacobian at the seed voltage
    Jacobian,
}

impl StructureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureKind::Vbus => "Vbus",
            StructureKind::Sbus => "Sbus",
            StructureKind::Ibus => "Ibus",
            StructureKind::Ybus => "Ybus",
            StructureKind::Yseries => "Yseries",
            StructureKind::B1 => "B1",
            StructureKind::B2 => "B2",
            StructureKind::Types => "Types",
            StructureKind::Qmin => "Qmin",
            StructureKind::Qmax => "Qmax",
            StructureKind::Jacobian => "Jacobian",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StructureData {
    Real(Vec<Vec<f64>>),
    Complex(Vec<Vec<Complex64>>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Structure {
    pub name: String,
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub data: StructureData,
}

impl Structure {
    pub fn shape(&self) -> (usize, usize) {
        let rows = match &self.data {
            StructureData::Real(d) => d.len(),
            StructureData::Complex(d) => d.len(),
        };
        (rows, self.col_labels.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gflow_core::{BranchData, BusData};

    fn three_bus() -> NetworkSnapshot {
        let mut net = NetworkSnapshot::new("three");
        let a = net.add_bus(BusData::slack("A", 1.0));
        let b = net.add_bus(BusData::pv("B", 0.2, 1.01).with_q_limits(-0.5, 0.5));
        let c = net.add_bus(BusData::pq("C", Complex64::new(-0.4, -0.1)));
        net.add_branch(BranchData::line(a, b, 0.01, 0.05, 0.02));
        net.add_branch(BranchData::line(b, c, 0.01, 0.04, 0.0).with_tap_changer(TapChanger {
            position: 2,
            ..TapChanger::default()
        }));
        net
    }

    #[test]
    fn test_compile_copies_arrays() {
        let inputs = CalculationInputs::compile(&three_bus()).unwrap();
        assert_eq!(inputs.n_bus, 3);
        assert_eq!(inputs.n_branch, 2);
        assert_eq!(inputs.types, vec![BusMode::Ref, BusMode::PV, BusMode::PQ]);
        assert!((inputs.vbus[1].norm() - 1.01).abs() < 1e-12);
        assert!((inputs.admittance.branches()[1].tap_module - 1.02).abs() < 1e-12);
        assert_eq!(inputs.qmax[1], 0.5);
    }

    #[test]
    fn test_branch_to_inactive_bus_is_left_out() {
        let mut net = three_bus();
        let dead = net.add_bus(BusData::pq("D", Complex64::default()).with_active(false));
        net.add_branch(BranchData::line(2, dead, 0.01, 0.05, 0.1));
        let with_dead = CalculationInputs::compile(&net).unwrap();
        let without = CalculationInputs::compile(&three_bus()).unwrap();

        assert!(!with_dead.admittance.branches()[2].active);
        for i in 0..3 {
            for j in 0..3 {
                let diff = with_dead.admittance.ybus.get(i, j) - without.admittance.ybus.get(i, j);
                assert!(diff.norm() < 1e-12, "Ybus[{}][{}] changed", i, j);
            }
        }
        assert_eq!(with_dead.admittance.ybus.get(3, 3).norm(), 0.0);
    }

    #[test]
    fn test_compile_rejects_invalid_snapshot() {
        let mut net = three_bus();
        net.branches[0].to_bus = 7;
        assert!(matches!(
            CalculationInputs::compile(&net),
            Err(FlowError::Validation(_))
        ));
    }

    #[test]
    fn test_slice_keeps_index_maps() {
        let inputs = CalculationInputs::compile(&three_bus()).unwrap();
        let part = inputs.slice(&[1, 2], &[1]).unwrap();
        assert_eq!(part.original_bus_idx, vec![1, 2]);
        assert_eq!(part.original_branch_idx, vec![1]);
        assert_eq!(part.bus_names, vec!["B".to_string(), "C".to_string()]);
        assert_eq!(part.admittance.ybus.get(1, 1), inputs.admittance.ybus.get(2, 2));
    }

    #[test]
    fn test_tap_bookkeeping() {
        let inputs = CalculationInputs::compile(&three_bus()).unwrap();
        assert_eq!(inputs.regulated_branches(), vec![1]);
        assert_eq!(inputs.total_tap_range(), 10);
    }

    #[test]
    fn test_structure_shapes() {
        let inputs = CalculationInputs::compile(&three_bus()).unwrap();
        assert_eq!(inputs.structure(StructureKind::Ybus).shape(), (3, 3));
        assert_eq!(inputs.structure(StructureKind::Sbus).shape(), (3, 1));
        let jac = inputs.structure(StructureKind::Jacobian);
        // two angles (B, C) and one magnitude (C)
        assert_eq!(jac.shape(), (3, 3));
        assert_eq!(jac.row_labels[2], "Q C");
    }
}
