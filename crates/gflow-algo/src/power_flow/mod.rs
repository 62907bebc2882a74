//! Power Flow Engine
//!
//! Steady-state AC (and DC) power flow on a [`gflow_core::NetworkSnapshot`]:
//!
//! - [`inputs`]: compiled per-island arrays and admittances, plus the
//!   labelled structure export
//! - [`island`]: split the network into electrically connected islands
//! - [`bus_types`]: PQ/PV/slack index sets and slack promotion
//! - [`methods`]: the numerical methods behind [`SolverType`]
//! - [`outer_loop`], [`reactive`], [`taps`]: controls wrapped around an inner solve
//! - [`retry`]: fall back to other methods when the primary one fails
//! - [`results`]: branch flows, loading and limit checks, merged over islands
//! - [`driver`]: the entry point, [`PowerFlowDriver`]
//!
//! ## Reactive-Limit Enforcement
//!
//! With `enforce_reactive_limits`, a PV bus whose computed Q leaves
//! `[Qmin, Qmax]` is switched to PQ with Q clamped at the violated limit. It
//! returns to PV once its voltage recovers past the set point. The outer loop
//! re-solves until no bus switches and no tap moves.
//!
//! ```
//! use gflow_algo::power_flow::{PowerFlowDriver, PowerFlowOptions};
//! use gflow_core::{BranchData, BusData, Logger, NetworkSnapshot};
//! use num_complex::Complex64;
//!
//! let mut net = NetworkSnapshot::new("two-bus");
//! let s = net.add_bus(BusData::slack("S", 1.0));
//! let l = net.add_bus(BusData::pq("L", Complex64::new(-0.5, -0.2)));
//! net.add_branch(BranchData::line(s, l, 0.02, 0.04, 0.0));
//!
//! let driver = PowerFlowDriver::new(PowerFlowOptions::default());
//! let result = driver.run(&net, &mut Logger::default()).unwrap();
//! assert!(result.converged);
//! ```

pub mod bus_types;
pub mod driver;
pub mod inputs;
pub mod island;
pub mod methods;
pub mod options;
pub mod outer_loop;
pub mod reactive;
pub mod report;
pub mod results;
pub mod retry;
pub mod taps;

pub use bus_types::{classify, BusTypeSets};
pub use driver::PowerFlowDriver;
pub use inputs::{CalculationInputs, Structure, StructureData, StructureKind};
pub use island::split_islands;
pub use options::{
    LimitWeights, PowerFlowOptions, ReactivePowerControlMode, SolverType, TapBranchStrategy,
    TapControlMode,
};
pub use outer_loop::{run_outer_loop, SolveResult};
pub use report::{ConvergenceReport, ReportRow};
pub use results::{IslandResult, IslandSummary, LimitViolations, NetworkResult};
pub use retry::{solve_with_retry, RetryOutcome};
