//! Per-solve description of one circuit.
//!
//! A [`NetworkSnapshot`] is what an external collaborator (file importer, GUI,
//! time-series driver) hands to the power-flow kernel. All quantities are in
//! per-unit on the snapshot's `sbase` except where a field says otherwise.
//!
//! The kernel never mutates a snapshot. Bus types and tap positions change
//! during the outer loop, but only on the per-island copies made at compile
//! time.

use crate::error::{FlowError, FlowResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Bus control mode.
///
/// Numeric codes follow the convention used by most power-flow tools:
/// `PQ = 1`, `PV = 2`, `REF = 3`. Storage dispatch buses are reported as their
/// own set but solved as PQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BusMode {
    #[default]
    PQ,
    PV,
    Ref,
    StoDispatch,
}

impl BusMode {
    pub fn code(self) -> i32 {
        match self {
            BusMode::PQ => 1,
            BusMode::PV => 2,
            BusMode::Ref => 3,
            BusMode::StoDispatch => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(BusMode::PQ),
            2 => Some(BusMode::PV),
            3 => Some(BusMode::Ref),
            4 => Some(BusMode::StoDispatch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BusMode::PQ => "PQ",
            BusMode::PV => "PV",
            BusMode::Ref => "REF",
            BusMode::StoDispatch => "STO_DISPATCH",
        }
    }
}

impl std::fmt::Display for BusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusData {
    pub name: String,
    pub mode: BusMode,
    pub active: bool,
    /// Net complex power injection (generation minus load)
    pub power: Complex64,
    /// Net complex current injection
    pub current: Complex64,
    /// Shunt admittance to ground
    pub shunt: Complex64,
    /// Voltage magnitude set point; also the magnitude of the initial seed
    pub vm_set: f64,
    /// Angle of the initial seed (radians)
    pub va_seed: f64,
    pub vm_min: f64,
    pub vm_max: f64,
    pub q_min: f64,
    pub q_max: f64,
    pub p_min: f64,
    pub p_max: f64,
}

impl Default for BusData {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: BusMode::PQ,
            active: true,
            power: Complex64::new(0.0, 0.0),
            current: Complex64::new(0.0, 0.0),
            shunt: Complex64::new(0.0, 0.0),
            vm_set: 1.0,
            va_seed: 0.0,
            vm_min: 0.9,
            vm_max: 1.1,
            q_min: -9999.0,
            q_max: 9999.0,
            p_min: -9999.0,
            p_max: 9999.0,
        }
    }
}

impl BusData {
    /// Slack bus holding `vm` at angle zero.
    pub fn slack(name: impl Into<String>, vm: f64) -> Self {
        Self {
            name: name.into(),
            mode: BusMode::Ref,
            vm_set: vm,
            ..Self::default()
        }
    }

    /// Voltage-controlled bus injecting `p` and holding `vm`.
    pub fn pv(name: impl Into<String>, p: f64, vm: f64) -> Self {
        Self {
            name: name.into(),
            mode: BusMode::PV,
            power: Complex64::new(p, 0.0),
            vm_set: vm,
            ..Self::default()
        }
    }

    /// Load/generation bus with a fixed complex injection.
    pub fn pq(name: impl Into<String>, power: Complex64) -> Self {
        Self {
            name: name.into(),
            mode: BusMode::PQ,
            power,
            ..Self::default()
        }
    }

    pub fn with_q_limits(mut self, q_min: f64, q_max: f64) -> Self {
        self.q_min = q_min;
        self.q_max = q_max;
        self
    }

    pub fn with_p_limits(mut self, p_min: f64, p_max: f64) -> Self {
        self.p_min = p_min;
        self.p_max = p_max;
        self
    }

    pub fn with_v_limits(mut self, vm_min: f64, vm_max: f64) -> Self {
        self.vm_min = vm_min;
        self.vm_max = vm_max;
        self
    }

    pub fn with_shunt(mut self, shunt: Complex64) -> Self {
        self.shunt = shunt;
        self
    }

    pub fn with_current(mut self, current: Complex64) -> Self {
        self.current = current;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Initial voltage phasor
    pub fn seed(&self) -> Complex64 {
        Complex64::from_polar(self.vm_set, self.va_seed)
    }
}

/// On-load tap changer regulating the voltage of the branch's "to" bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapChanger {
    pub position: i32,
    pub min_position: i32,
    pub max_position: i32,
    /// Per-step magnitude increment above the neutral position
    pub inc_reg_up: f64,
    /// Per-step magnitude increment below the neutral position
    pub inc_reg_down: f64,
    /// Voltage magnitude the changer tries to hold at the regulated bus
    pub v_set: f64,
    /// Whether the changer actively regulates the "to" bus
    pub regulates_to_bus: bool,
}

impl Default for TapChanger {
    fn default() -> Self {
        Self {
            position: 0,
            min_position: -5,
            max_position: 5,
            inc_reg_up: 0.01,
            inc_reg_down: 0.01,
            v_set: 1.0,
            regulates_to_bus: true,
        }
    }
}

impl TapChanger {
    /// Continuous tap magnitude for a given position
    pub fn module_at(&self, position: i32) -> f64 {
        if position > 0 {
            1.0 + position as f64 * self.inc_reg_up
        } else if position < 0 {
            1.0 + position as f64 * self.inc_reg_down
        } else {
            1.0
        }
    }

    pub fn module(&self) -> f64 {
        self.module_at(self.position)
    }

    /// Number of discrete positions this changer can traverse
    pub fn range(&self) -> usize {
        (self.max_position - self.min_position).max(0) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchData {
    pub name: String,
    pub from_bus: usize,
    pub to_bus: usize,
    pub active: bool,
    /// Series resistance
    pub r: f64,
    /// Series reactance
    pub x: f64,
    /// Total charging susceptance (split half per side)
    pub b: f64,
    /// Fixed tap magnitude, used when there is no tap changer
    pub tap_module: f64,
    /// Phase shift (radians)
    pub tap_angle: f64,
    pub tap_changer: Option<TapChanger>,
    /// Thermal rating in MVA
    pub rate: f64,
}

impl Default for BranchData {
    fn default() -> Self {
        Self {
            name: String::new(),
            from_bus: 0,
            to_bus: 0,
            active: true,
            r: 0.0,
            x: 0.0,
            b: 0.0,
            tap_module: 1.0,
            tap_angle: 0.0,
            tap_changer: None,
            rate: 9999.0,
        }
    }
}

impl BranchData {
    pub fn line(from_bus: usize, to_bus: usize, r: f64, x: f64, b: f64) -> Self {
        Self {
            name: format!("{}-{}", from_bus, to_bus),
            from_bus,
            to_bus,
            r,
            x,
            b,
            ..Self::default()
        }
    }

    /// Build a line from its series admittance `y = 1 / (r + jx)`.
    pub fn from_admittance(from_bus: usize, to_bus: usize, y: Complex64) -> Self {
        let z = y.inv();
        Self::line(from_bus, to_bus, z.re, z.im, 0.0)
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_tap(mut self, tap_module: f64, tap_angle: f64) -> Self {
        self.tap_module = tap_module;
        self.tap_angle = tap_angle;
        self
    }

    pub fn with_tap_changer(mut self, changer: TapChanger) -> Self {
        self.tap_module = changer.module();
        self.tap_changer = Some(changer);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Effective tap magnitude (changer position wins over the fixed value)
    pub fn effective_tap_module(&self) -> f64 {
        match &self.tap_changer {
            Some(changer) => changer.module(),
            None => self.tap_module,
        }
    }
}

/// Immutable input to one power-flow solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub name: String,
    /// Base power in MVA
    pub sbase: f64,
    pub buses: Vec<BusData>,
    pub branches: Vec<BranchData>,
    /// Voltage solution of a previous run, used as seed when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_voltage: Option<Vec<Complex64>>,
}

impl Default for NetworkSnapshot {
    fn default() -> Self {
        Self {
            name: String::new(),
            sbase: 100.0,
            buses: Vec::new(),
            branches: Vec::new(),
            previous_voltage: None,
        }
    }
}

impl NetworkSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Add a bus and return its index
    pub fn add_bus(&mut self, bus: BusData) -> usize {
        self.buses.push(bus);
        self.buses.len() - 1
    }

    /// Add a branch and return its index
    pub fn add_branch(&mut self, branch: BranchData) -> usize {
        self.branches.push(branch);
        self.branches.len() - 1
    }

    pub fn with_previous_voltage(mut self, voltage: Vec<Complex64>) -> Self {
        self.previous_voltage = Some(voltage);
        self
    }

    /// Check structural consistency before compiling.
    ///
    /// Rejects empty networks, branch terminals outside the bus range,
    /// self loops, zero series impedance on active branches, inverted limits
    /// and a previous-voltage vector of the wrong length.
    pub fn validate(&self) -> FlowResult<()> {
        let n = self.buses.len();
        if n == 0 {
            return Err(FlowError::Validation("network has no buses".into()));
        }
        if self.sbase.is_nan() || self.sbase <= 0.0 {
            return Err(FlowError::Validation(format!(
                "base power must be positive, got {}",
                self.sbase
            )));
        }

        for (i, bus) in self.buses.iter().enumerate() {
            if bus.q_min > bus.q_max {
                return Err(FlowError::Validation(format!(
                    "bus {} has Qmin {} above Qmax {}",
                    i, bus.q_min, bus.q_max
                )));
            }
            if bus.vm_min > bus.vm_max {
                return Err(FlowError::Validation(format!(
                    "bus {} has Vmin {} above Vmax {}",
                    i, bus.vm_min, bus.vm_max
                )));
            }
        }

        for (k, branch) in self.branches.iter().enumerate() {
            if branch.from_bus >= n || branch.to_bus >= n {
                return Err(FlowError::Validation(format!(
                    "branch {} references bus {}-{} but the network has {} buses",
                    k, branch.from_bus, branch.to_bus, n
                )));
            }
            if branch.from_bus == branch.to_bus {
                return Err(FlowError::Validation(format!(
                    "branch {} connects bus {} to itself",
                    k, branch.from_bus
                )));
            }
            if branch.active && branch.r == 0.0 && branch.x == 0.0 {
                return Err(FlowError::Validation(format!(
                    "branch {} has zero series impedance",
                    k
                )));
            }
            if let Some(changer) = &branch.tap_changer {
                if changer.min_position > changer.max_position {
                    return Err(FlowError::Validation(format!(
                        "branch {} has tap bounds [{}, {}] inverted",
                        k, changer.min_position, changer.max_position
                    )));
                }
                if changer.position < changer.min_position
                    || changer.position > changer.max_position
                {
                    return Err(FlowError::Validation(format!(
                        "branch {} tap position {} outside [{}, {}]",
                        k, changer.position, changer.min_position, changer.max_position
                    )));
                }
            }
        }

        if let Some(previous) = &self.previous_voltage {
            if previous.len() != n {
                return Err(FlowError::Validation(format!(
                    "previous voltage has {} entries for {} buses",
                    previous.len(),
                    n
                )));
            }
        }

        Ok(())
    }
}
