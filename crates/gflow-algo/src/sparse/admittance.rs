//! Admittance assembly for AC and fast-decoupled power flow.
//!
//! Every branch is modelled as a π-equivalent with an ideal transformer on the
//! "from" side:
//! ```text
//! ys  = 1 / (r + jx)
//! tap = m · e^{jθ}
//!
//! Ytt = ys + jb/2
//! Yff = Ytt / (tap · conj(tap))
//! Yft = -ys / conj(tap)
//! Ytf = -ys / tap
//! ```
//! from which
//! ```text
//! Yf   = diag(Yff)·Cf + diag(Yft)·Ct
//! Yt   = diag(Ytf)·Cf + diag(Ytt)·Ct
//! Ybus = Cfᵀ·Yf + Ctᵀ·Yt + diag(Ysh)
//! ```
//! `Yseries` repeats the assembly without charging and without bus shunts.
//!
//! B′ and B″ follow the XB scheme: B′ ignores resistance, taps and shunts;
//! B″ keeps the tap magnitude, charging and bus shunts.

use super::complex::{position_map, SparseComplexMatrix};
use super::real;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use thiserror::Error;

/// Errors from admittance assembly
#[derive(Debug, Error)]
pub enum AdmittanceError {
    #[error("Branch {0} has zero impedance")]
    ZeroImpedance(usize),

    #[error("Branch {branch} references unknown bus {bus}")]
    UnknownBus { branch: usize, bus: usize },

    #[error("Expected {expected} values, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Electrical primitives of one branch.
#[derive(Debug, Clone)]
pub struct BranchPrimitive {
    pub from: usize,
    pub to: usize,
    pub active: bool,
    pub r: f64,
    pub x: f64,
    /// Total charging susceptance
    pub b: f64,
    pub tap_module: f64,
    pub tap_angle: f64,
}

/// Primitive 2×2 admittances of one branch.
#[derive(Debug, Clone, Copy)]
struct BranchAdmittance {
    yff: Complex64,
    yft: Complex64,
    ytf: Complex64,
    ytt: Complex64,
}

fn primitive(branch: &BranchPrimitive, with_charging: bool) -> BranchAdmittance {
    let zero = Complex64::new(0.0, 0.0);
    if !branch.active {
        return BranchAdmittance {
            yff: zero,
            yft: zero,
            ytf: zero,
            ytt: zero,
        };
    }
    let ys = Complex64::new(branch.r, branch.x).inv();
    let tap = Complex64::from_polar(branch.tap_module, branch.tap_angle);
    let charging = if with_charging {
        Complex64::new(0.0, branch.b / 2.0)
    } else {
        zero
    };
    let ytt = ys + charging;
    BranchAdmittance {
        yff: ytt / (tap * tap.conj()),
        yft: -ys / tap.conj(),
        ytf: -ys / tap,
        ytt,
    }
}

/// All admittance matrices of one circuit.
#[derive(Debug, Clone)]
pub struct AdmittanceModel {
    n_bus: usize,
    branches: Vec<BranchPrimitive>,
    shunts: Vec<Complex64>,
    /// Bus admittance (n × n)
    pub ybus: SparseComplexMatrix,
    /// "From" branch admittance (m × n)
    pub yf: SparseComplexMatrix,
    /// "To" branch admittance (m × n)
    pub yt: SparseComplexMatrix,
    /// Series-only bus admittance (n × n)
    pub yseries: SparseComplexMatrix,
    /// Fast-decoupled P-θ matrix
    pub b1: CsMat<f64>,
    /// Fast-decoupled Q-V matrix
    pub b2: CsMat<f64>,
}

impl AdmittanceModel {
    /// Assemble every matrix from branch primitives and bus shunts.
    pub fn build(
        n_bus: usize,
        branches: Vec<BranchPrimitive>,
        shunts: Vec<Complex64>,
    ) -> Result<Self, AdmittanceError> {
        if shunts.len() != n_bus {
            return Err(AdmittanceError::DimensionMismatch {
                expected: n_bus,
                got: shunts.len(),
            });
        }
        for (k, branch) in branches.iter().enumerate() {
            for bus in [branch.from, branch.to] {
                if bus >= n_bus {
                    return Err(AdmittanceError::UnknownBus { branch: k, bus });
                }
            }
            if branch.active && Complex64::new(branch.r, branch.x).norm() < 1e-12 {
                return Err(AdmittanceError::ZeroImpedance(k));
            }
        }

        let empty = SparseComplexMatrix::from_triplets((0, 0), &[]);
        let mut model = Self {
            n_bus,
            branches,
            shunts,
            ybus: empty.clone(),
            yf: empty.clone(),
            yt: empty.clone(),
            yseries: empty,
            b1: TriMat::new((0, 0)).to_csr(),
            b2: TriMat::new((0, 0)).to_csr(),
        };
        model.assemble();
        Ok(model)
    }

    pub fn n_bus(&self) -> usize {
        self.n_bus
    }

    pub fn n_branch(&self) -> usize {
        self.branches.len()
    }

    pub fn branches(&self) -> &[BranchPrimitive] {
        &self.branches
    }

    pub fn shunts(&self) -> &[Complex64] {
        &self.shunts
    }

    pub fn tap_modules(&self) -> Vec<f64> {
        self.branches.iter().map(|b| b.tap_module).collect()
    }

    /// Rebuild every matrix after a tap-magnitude change.
    pub fn recompute(&mut self, tap_module: &[f64]) -> Result<(), AdmittanceError> {
        if tap_module.len() != self.branches.len() {
            return Err(AdmittanceError::DimensionMismatch {
                expected: self.branches.len(),
                got: tap_module.len(),
            });
        }
        for (branch, &m) in self.branches.iter_mut().zip(tap_module) {
            branch.tap_module = m;
        }
        self.assemble();
        Ok(())
    }

    /// Restrict the model to a bus/branch subset without reassembling.
    ///
    /// Every branch in `branches` must have both terminals in `buses`.
    pub fn slice(&self, buses: &[usize], branches: &[usize]) -> Result<Self, AdmittanceError> {
        let bus_map = position_map(self.n_bus, buses);
        let mut sliced_branches = Vec::with_capacity(branches.len());
        for &k in branches {
            let branch = &self.branches[k];
            let from = bus_map[branch.from].ok_or(AdmittanceError::UnknownBus {
                branch: k,
                bus: branch.from,
            })?;
            let to = bus_map[branch.to].ok_or(AdmittanceError::UnknownBus {
                branch: k,
                bus: branch.to,
            })?;
            sliced_branches.push(BranchPrimitive {
                from,
                to,
                ..branch.clone()
            });
        }

        Ok(Self {
            n_bus: buses.len(),
            branches: sliced_branches,
            shunts: buses.iter().map(|&i| self.shunts[i]).collect(),
            ybus: self.ybus.submatrix(buses, buses),
            yf: self.yf.submatrix(branches, buses),
            yt: self.yt.submatrix(branches, buses),
            yseries: self.yseries.submatrix(buses, buses),
            b1: real::submatrix(&self.b1, buses, buses),
            b2: real::submatrix(&self.b2, buses, buses),
        })
    }

    /// Branch-bus incidence (from side, to side) as real sparse matrices.
    pub fn connectivity(&self) -> (CsMat<f64>, CsMat<f64>) {
        let m = self.branches.len();
        let mut cf = TriMat::new((m, self.n_bus));
        let mut ct = TriMat::new((m, self.n_bus));
        for (k, branch) in self.branches.iter().enumerate() {
            if branch.active {
                cf.add_triplet(k, branch.from, 1.0);
                ct.add_triplet(k, branch.to, 1.0);
            }
        }
        (cf.to_csr(), ct.to_csr())
    }

    fn assemble(&mut self) {
        let n = self.n_bus;
        let m = self.branches.len();

        let mut yf = Vec::with_capacity(2 * m);
        let mut yt = Vec::with_capacity(2 * m);
        let mut ybus = Vec::with_capacity(4 * m + n);
        let mut yseries = Vec::with_capacity(4 * m);
        let mut b1 = TriMat::new((n, n));
        let mut b2 = TriMat::new((n, n));

        for (k, branch) in self.branches.iter().enumerate() {
            let (f, t) = (branch.from, branch.to);

            let full = primitive(branch, true);
            yf.push((k, f, full.yff));
            yf.push((k, t, full.yft));
            yt.push((k, f, full.ytf));
            yt.push((k, t, full.ytt));
            ybus.push((f, f, full.yff));
            ybus.push((f, t, full.yft));
            ybus.push((t, f, full.ytf));
            ybus.push((t, t, full.ytt));

            let series = primitive(branch, false);
            yseries.push((f, f, series.yff));
            yseries.push((f, t, series.yft));
            yseries.push((t, f, series.ytf));
            yseries.push((t, t, series.ytt));

            if !branch.active {
                continue;
            }

            // Susceptance = 1/x (ignoring resistance)
            let x = branch.x.abs().max(1e-6);
            let bs = 1.0 / x;
            b1.add_triplet(f, f, bs);
            b1.add_triplet(t, t, bs);
            b1.add_triplet(f, t, -bs);
            b1.add_triplet(t, f, -bs);

            let tap = if branch.tap_module > 0.0 {
                branch.tap_module
            } else {
                1.0
            };
            let half_charging = branch.b / 2.0;
            b2.add_triplet(f, f, bs / (tap * tap) - half_charging);
            b2.add_triplet(t, t, bs - half_charging);
            b2.add_triplet(f, t, -bs / tap);
            b2.add_triplet(t, f, -bs / tap);
        }

        for (i, &ysh) in self.shunts.iter().enumerate() {
            ybus.push((i, i, ysh));
            b2.add_triplet(i, i, -ysh.im);
        }

        self.yf = SparseComplexMatrix::from_triplets((m, n), &yf);
        self.yt = SparseComplexMatrix::from_triplets((m, n), &yt);
        self.ybus = SparseComplexMatrix::from_triplets((n, n), &ybus);
        self.yseries = SparseComplexMatrix::from_triplets((n, n), &yseries);
        self.b1 = b1.to_csr();
        self.b2 = b2.to_csr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(from: usize, to: usize, r: f64, x: f64, b: f64) -> BranchPrimitive {
        BranchPrimitive {
            from,
            to,
            active: true,
            r,
            x,
            b,
            tap_module: 1.0,
            tap_angle: 0.0,
        }
    }

    fn three_bus() -> AdmittanceModel {
        let mut transformer = line(1, 2, 0.0, 0.15, 0.0);
        transformer.tap_module = 1.05;
        transformer.tap_angle = 0.1;
        AdmittanceModel::build(
            3,
            vec![line(0, 1, 0.01, 0.1, 0.02), transformer, line(0, 2, 0.02, 0.2, 0.04)],
            vec![
                Complex64::new(0.0, 0.0),
                Complex64::new(0.01, 0.05),
                Complex64::new(0.0, 0.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_ybus_matches_branch_composition() {
        let model = three_bus();
        let (cf, ct) = model.connectivity();
        let v = vec![
            Complex64::new(1.0, 0.0),
            Complex64::from_polar(0.98, -0.05),
            Complex64::from_polar(1.02, 0.03),
        ];

        // Ybus·V = Cfᵀ·(Yf·V) + Ctᵀ·(Yt·V) + Ysh·V
        let direct = model.ybus.mul_vec(&v);
        let i_f = model.yf.mul_vec(&v);
        let i_t = model.yt.mul_vec(&v);
        for bus in 0..3 {
            let mut composed = model.shunts()[bus] * v[bus];
            for k in 0..model.n_branch() {
                composed += i_f[k] * real::get(&cf, k, bus) + i_t[k] * real::get(&ct, k, bus);
            }
            assert!(
                (direct[bus] - composed).norm() < 1e-10,
                "bus {} mismatch: {} vs {}",
                bus,
                direct[bus],
                composed
            );
        }
    }

    #[test]
    fn test_single_line_entries() {
        let model =
            AdmittanceModel::build(2, vec![line(0, 1, 0.0, 0.1, 0.2)], vec![Complex64::default(); 2])
                .unwrap();
        assert!((model.ybus.get(0, 0) - Complex64::new(0.0, -10.0 + 0.1)).norm() < 1e-12);
        assert!((model.ybus.get(0, 1) - Complex64::new(0.0, 10.0)).norm() < 1e-12);
        assert!((model.yseries.get(0, 0) - Complex64::new(0.0, -10.0)).norm() < 1e-12);
        assert!((real::get(&model.b1, 0, 0) - 10.0).abs() < 1e-12);
        assert!((real::get(&model.b1, 0, 1) + 10.0).abs() < 1e-12);
        assert!((real::get(&model.b2, 1, 1) - (10.0 - 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_recompute_changes_tapped_entries_only() {
        let mut model = three_bus();
        let before = model.ybus.get(0, 1);
        let before_b1 = real::get(&model.b1, 1, 1);

        let mut taps = model.tap_modules();
        taps[1] = 0.95;
        model.recompute(&taps).unwrap();

        assert!((model.ybus.get(0, 1) - before).norm() < 1e-12, "untapped line unchanged");
        assert!((real::get(&model.b1, 1, 1) - before_b1).abs() < 1e-12, "B′ ignores taps");

        let ys = Complex64::new(0.0, 0.15).inv();
        let tap = Complex64::from_polar(0.95, 0.1);
        let expected_ytf = -ys / tap;
        assert!((model.ybus.get(2, 1) - expected_ytf).norm() < 1e-12);
    }

    #[test]
    fn test_slice_matches_rebuild() {
        let model = three_bus();
        let sliced = model.slice(&[1, 2], &[1]).unwrap();
        let rebuilt = AdmittanceModel::build(
            2,
            sliced.branches().to_vec(),
            sliced.shunts().to_vec(),
        )
        .unwrap();

        // Slicing drops the other branches' contributions to the diagonal,
        // so only the off-diagonal entries agree with a rebuild.
        assert!((sliced.ybus.get(0, 1) - rebuilt.ybus.get(0, 1)).norm() < 1e-12);
        assert!((sliced.yf.get(0, 0) - rebuilt.yf.get(0, 0)).norm() < 1e-12);
        assert_eq!(sliced.branches()[0].from, 0);
        assert_eq!(sliced.branches()[0].to, 1);
        assert!(model.slice(&[1], &[1]).is_err(), "branch 1 leaves the bus subset");
    }

    #[test]
    fn test_inactive_branch_contributes_nothing() {
        let mut off = line(0, 1, 0.01, 0.1, 0.0);
        off.active = false;
        let model = AdmittanceModel::build(2, vec![off], vec![Complex64::default(); 2]).unwrap();
        assert_eq!(model.ybus.get(0, 0), Complex64::new(0.0, 0.0));
        assert_eq!(real::get(&model.b1, 0, 0), 0.0);
    }

    #[test]
    fn test_rejects_zero_impedance_and_bad_bus() {
        let err = AdmittanceModel::build(2, vec![line(0, 1, 0.0, 0.0, 0.0)], vec![Complex64::default(); 2])
            .unwrap_err();
        assert!(matches!(err, AdmittanceError::ZeroImpedance(0)));

        let err = AdmittanceModel::build(2, vec![line(0, 4, 0.0, 0.1, 0.0)], vec![Complex64::default(); 2])
            .unwrap_err();
        assert!(matches!(err, AdmittanceError::UnknownBus { branch: 0, bus: 4 }));
    }
}
