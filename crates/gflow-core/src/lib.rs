//! # gflow-core: Network Model and Numerical Plumbing
//!
//! Provides the data structures and low-level services shared by the gflow
//! power-flow engine (`gflow-algo`).
//!
//! ## Design Philosophy
//!
//! A network is handed to the kernel as an immutable [`NetworkSnapshot`]:
//! - **Buses** carry their control mode ([`BusMode`]), net injections, voltage
//!   set point and limits
//! - **Branches** carry series impedance, charging, tap state and rating
//!
//! The solver never mutates the snapshot. Everything that changes during a run
//! (bus types after reactive-limit switching, tap positions) lives on per-island
//! copies inside `gflow-algo`.
//!
//! ## Quick Start
//!
//! ```rust
//! use gflow_core::*;
//! use num_complex::Complex64;
//!
//! let mut net = NetworkSnapshot::new("two-bus");
//! let slack = net.add_bus(BusData::slack("Slack", 1.0));
//! let load = net.add_bus(BusData::pq("Load", Complex64::new(-0.5, -0.2)));
//! net.add_branch(BranchData::line(slack, load, 0.02, 0.04, 0.0).with_rate(100.0));
//!
//! net.validate().unwrap();
//! assert_eq!(net.bus_count(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`snapshot`] - Bus/branch records and snapshot validation
//! - [`error`] - Unified [`FlowError`] type
//! - [`diagnostics`] - Issue collection and the injected [`DiagnosticSink`]
//! - [`graph_utils`] - Connected components over the bus-bus graph
//! - [`solver`] - Dense linear-system backends (faer LU, Gauss-Jordan)

pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod snapshot;
pub mod solver;

pub use diagnostics::{
    DiagnosticIssue, DiagnosticSink, Diagnostics, Logger, MemorySink, Severity, TracingSink,
};
pub use error::{FlowError, FlowResult};
pub use graph_utils::{connected_components, Component};
pub use snapshot::{BranchData, BusData, BusMode, NetworkSnapshot, TapChanger};
pub use solver::*;
