use crate::expr::Var;
use crate::model::Model;
use crate::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Terminal status reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Optimal,
    /// A limit was hit but an incumbent exists
    Suboptimal,
    Infeasible,
    Unbounded,
    InfeasibleOrUnbounded,
    /// Time limit hit without any incumbent
    TimeLimit,
    /// Interrupted without any incumbent
    Interrupted,
    Other(String),
}

impl Status {
    pub fn has_solution(&self) -> bool {
        matches!(self, Status::Optimal | Status::Suboptimal)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Other(code) => write!(f, "other ({code})"),
            status => write!(f, "{}", format!("{status:?}").to_lowercase()),
        }
    }
}

/// Limits for a single solver run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Limits {
    pub time_limit: Option<Duration>,
    /// Relative MIP gap at which the search stops
    pub mip_gap: Option<f64>,
    pub threads: Option<i32>,
}

/// Shareable flag to stop a running solve from another thread
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Values of all variables of a model together with the objective value
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    values: Vec<f64>,
    objective: f64,
}

impl Solution {
    pub fn new(values: Vec<f64>, objective: f64) -> Self {
        Solution { values, objective }
    }

    /// Builds a solution from an assignment, evaluating the model's objective
    pub fn from_assignment(model: &Model, values: Vec<f64>) -> Result<Self> {
        let objective = model.objective_value(&values)?;
        Ok(Solution { values, objective })
    }

    pub fn value(&self, var: Var) -> Option<f64> {
        self.values.get(var.index()).copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub solution: Option<Solution>,
}

/// A MILP engine able to solve a recorded [`Model`]
pub trait Backend {
    /// Returns a short name for log messages
    fn name(&self) -> &str;

    /// Solves the model; raising `interrupt` stops the run and reports [`Status::Interrupted`]
    /// (or [`Status::Suboptimal`] if an incumbent exists)
    fn solve(&self, model: &Model, limits: &Limits, interrupt: &Interrupt) -> Result<Outcome>;
}
