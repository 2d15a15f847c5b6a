//! Solver-agnostic mixed-integer linear programs
//!
//! A [`Model`] records variables, constraints and an objective. A [`Backend`] solves it; with
//! the `gurobi` feature enabled, [`GurobiBackend`] does so using Gurobi.

mod expr;
#[cfg(feature = "gurobi")]
mod gurobi;
mod model;
mod solve;

pub use expr::{IneqExpr, LinExpr, Sense, Var};
#[cfg(feature = "gurobi")]
pub use gurobi::GurobiBackend;
pub use model::{Constr, Model, ModelSense, VarInfo, VarType, Violation};
pub use solve::{Backend, Interrupt, Limits, Outcome, Solution, Status};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("variable {0} does not belong to the model")]
    UnknownVar(Var),
    #[error("invalid bounds [{lb}, {ub}] for variable {name}")]
    InvalidBounds { name: String, lb: f64, ub: f64 },
    #[error("non-finite coefficient in {0}")]
    NonFinite(String),
    #[error("assignment has {got} values for {expected} variables")]
    AssignmentLength { got: usize, expected: usize },
    #[error("solver backend failed: {0}")]
    Backend(String),
    #[cfg(feature = "gurobi")]
    #[error(transparent)]
    Gurobi(#[from] grb::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
