//! Power-flow configuration.
//!
//! [`PowerFlowOptions`] is a plain serde document: every field has a default,
//! so a JSON configuration only needs the keys it changes.
//!
//! ```
//! use gflow_algo::power_flow::{PowerFlowOptions, SolverType};
//!
//! let opts = PowerFlowOptions::from_json(r#"{ "solver_type": "iwamoto", "tolerance": 1e-8 }"#)
//!     .unwrap();
//! assert_eq!(opts.solver_type, SolverType::IwamotoNr);
//! assert_eq!(opts.max_iterations, 25);
//! ```

use gflow_core::{FlowError, FlowResult, LinearSolverKind, Logger};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Numerical method used for the inner solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SolverType {
    #[default]
    NewtonRaphson,
    LevenbergMarquardt,
    FastDecoupled,
    HolomorphicEmbedding,
    DcLinear,
    LinearAc,
    IwamotoNr,
    NewtonRaphsonCurrent,
}

impl FromStr for SolverType {
    type Err = FlowError;

    fn from_str(input: &str) -> FlowResult<Self> {
        let key: String = input
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "nr" | "newtonraphson" => Ok(SolverType::NewtonRaphson),
            "lm" | "levenbergmarquardt" => Ok(SolverType::LevenbergMarquardt),
            "fd" | "fdpf" | "fastdecoupled" => Ok(SolverType::FastDecoupled),
            "helm" | "holomorphicembedding" => Ok(SolverType::HolomorphicEmbedding),
            "dc" | "dclinear" => Ok(SolverType::DcLinear),
            "lacpf" | "linearac" => Ok(SolverType::LinearAc),
            "iwamoto" | "iwamotonr" => Ok(SolverType::IwamotoNr),
            "nrcurrent" | "nri" | "newtonraphsoncurrent" => Ok(SolverType::NewtonRaphsonCurrent),
            _ => Err(FlowError::Config(format!(
                "unknown solver '{}'; supported values: {}",
                input,
                Self::available().join(", ")
            ))),
        }
    }
}

impl SolverType {
    /// Parse a solver name, falling back to Levenberg-Marquardt on unknown input.
    pub fn from_str_or_fallback(input: &str, logger: &mut Logger) -> Self {
        match input.parse() {
            Ok(kind) => kind,
            Err(err) => {
                logger.warn("config", format!("{}; using levenberg_marquardt", err));
                SolverType::LevenbergMarquardt
            }
        }
    }

    pub fn available() -> &'static [&'static str] {
        &[
            "newton_raphson",
            "levenberg_marquardt",
            "fast_decoupled",
            "holomorphic_embedding",
            "dc_linear",
            "linear_ac",
            "iwamoto_nr",
            "newton_raphson_current",
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverType::NewtonRaphson => "newton_raphson",
            SolverType::LevenbergMarquardt => "levenberg_marquardt",
            SolverType::FastDecoupled => "fast_decoupled",
            SolverType::HolomorphicEmbedding => "holomorphic_embedding",
            SolverType::DcLinear => "dc_linear",
            SolverType::LinearAc => "linear_ac",
            SolverType::IwamotoNr => "iwamoto_nr",
            SolverType::NewtonRaphsonCurrent => "newton_raphson_current",
        }
    }
}

impl std::fmt::Display for SolverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Configuration documents never fail on the solver name. `from_json` keeps
// the unrecognised names so the driver can report them.
impl From<String> for SolverType {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(kind) => kind,
            Err(err) => {
                tracing::debug!("{}; using levenberg_marquardt", err);
                SolverType::LevenbergMarquardt
            }
        }
    }
}

impl From<SolverType> for String {
    fn from(value: SolverType) -> Self {
        value.as_str().to_string()
    }
}

/// How PV buses that hit a reactive limit are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReactivePowerControlMode {
    /// Switch PV↔PQ and clamp Q at the violated limit
    #[default]
    Direct,
    /// Nudge Q towards the limit with a logistic gain
    Iterative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TapControlMode {
    /// One tap step per outer iteration
    #[default]
    Iterative,
    /// Jump straight to the position closest to the set point
    Direct,
}

/// Which regulating branches are processed per outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TapBranchStrategy {
    /// Stop after the first branch that needs regulation
    #[default]
    FirstRegulated,
    AllRegulated,
}

/// Weights of the limit-violation score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitWeights {
    pub overload: f64,
    pub overvoltage: f64,
    pub undervoltage: f64,
}

impl Default for LimitWeights {
    fn default() -> Self {
        Self {
            overload: 1.0,
            overvoltage: 1.0,
            undervoltage: 1.0,
        }
    }
}

/// Power-flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowOptions {
    pub solver_type: SolverType,
    /// Method whose solution seeds the primary attempt
    pub auxiliary_solver_type: Option<SolverType>,
    pub retry_with_other_methods: bool,
    /// Mismatch tolerance (infinity norm, per-unit)
    pub tolerance: f64,
    /// Inner iterations per solve
    pub max_iterations: usize,
    /// Outer-loop cap; `None` uses `max(10, Σ tap ranges)`
    pub max_outer_iterations: Option<usize>,
    pub enforce_reactive_limits: bool,
    pub reactive_control_mode: ReactivePowerControlMode,
    /// Steepness of the logistic gain in iterative reactive control
    pub q_steepness_factor: f64,
    pub enforce_active_limits: bool,
    pub control_taps: bool,
    pub tap_control_mode: TapControlMode,
    pub tap_branch_strategy: TapBranchStrategy,
    pub verbose: bool,
    /// Allow the Iwamoto optimal multiplier
    pub robust: bool,
    pub seed_with_existing_solution: bool,
    pub multi_threaded: bool,
    /// Worker threads for island solving; 0 uses every core
    pub threads: usize,
    pub ignore_single_node_islands: bool,
    pub linear_solver: LinearSolverKind,
    pub limit_weights: LimitWeights,
    /// Solver names from the source document that fell back to Levenberg-Marquardt
    #[serde(skip)]
    pub unknown_solver_names: Vec<String>,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            solver_type: SolverType::NewtonRaphson,
            auxiliary_solver_type: None,
            retry_with_other_methods: true,
            tolerance: 1e-6,
            max_iterations: 25,
            max_outer_iterations: None,
            enforce_reactive_limits: false,
            reactive_control_mode: ReactivePowerControlMode::Direct,
            q_steepness_factor: 30.0,
            enforce_active_limits: false,
            control_taps: false,
            tap_control_mode: TapControlMode::Iterative,
            tap_branch_strategy: TapBranchStrategy::FirstRegulated,
            verbose: false,
            robust: true,
            seed_with_existing_solution: false,
            multi_threaded: false,
            threads: 0,
            ignore_single_node_islands: false,
            linear_solver: LinearSolverKind::Faer,
            limit_weights: LimitWeights::default(),
            unknown_solver_names: Vec::new(),
        }
    }
}

impl PowerFlowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> FlowResult<Self> {
        let invalid = |e: serde_json::Error| {
            FlowError::Config(format!("invalid power-flow options: {}", e))
        };
        let document: serde_json::Value = serde_json::from_str(json).map_err(invalid)?;
        let unknown: Vec<String> = ["solver_type", "auxiliary_solver_type"]
            .iter()
            .filter_map(|key| document.get(*key).and_then(|v| v.as_str()))
            .filter(|name| name.parse::<SolverType>().is_err())
            .map(str::to_string)
            .collect();

        let mut opts: Self = serde_json::from_value(document).map_err(invalid)?;
        opts.unknown_solver_names = unknown;
        opts.check()?;
        Ok(opts)
    }

    pub fn to_json(&self) -> FlowResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FlowError::Config(e.to_string()))
    }

    /// Reject values no solve can work with.
    pub fn check(&self) -> FlowResult<()> {
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(FlowError::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(FlowError::Config("max_iterations must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_solver(mut self, solver: SolverType) -> Self {
        self.solver_type = solver;
        self
    }

    pub fn with_auxiliary_solver(mut self, solver: Option<SolverType>) -> Self {
        self.auxiliary_solver_type = solver;
        self
    }

    pub fn with_retry(mut self, enable: bool) -> Self {
        self.retry_with_other_methods = enable;
        self
    }

    /// Set convergence tolerance
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_max_outer_iterations(mut self, max_outer: Option<usize>) -> Self {
        self.max_outer_iterations = max_outer;
        self
    }

    /// Enable or disable reactive-limit enforcement (PV-PQ switching)
    pub fn with_reactive_limits(mut self, enable: bool, mode: ReactivePowerControlMode) -> Self {
        self.enforce_reactive_limits = enable;
        self.reactive_control_mode = mode;
        self
    }

    pub fn with_active_limits(mut self, enable: bool) -> Self {
        self.enforce_active_limits = enable;
        self
    }

    pub fn with_tap_control(
        mut self,
        enable: bool,
        mode: TapControlMode,
        strategy: TapBranchStrategy,
    ) -> Self {
        self.control_taps = enable;
        self.tap_control_mode = mode;
        self.tap_branch_strategy = strategy;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_robust(mut self, robust: bool) -> Self {
        self.robust = robust;
        self
    }

    pub fn with_existing_solution_seed(mut self, enable: bool) -> Self {
        self.seed_with_existing_solution = enable;
        self
    }

    /// Solve islands on a worker pool (`threads == 0` uses every core)
    pub fn with_multi_threading(mut self, enable: bool, threads: usize) -> Self {
        self.multi_threaded = enable;
        self.threads = threads;
        self
    }

    pub fn with_ignore_single_node_islands(mut self, ignore: bool) -> Self {
        self.ignore_single_node_islands = ignore;
        self
    }

    pub fn with_linear_solver(mut self, kind: LinearSolverKind) -> Self {
        self.linear_solver = kind;
        self
    }

    pub fn with_limit_weights(mut self, weights: LimitWeights) -> Self {
        self.limit_weights = weights;
        self
    }
}
