use crate::problem::{StationId, VehicleId};
use std::fmt;

/// Malformed or inconsistent instance data, detected before any variable is created
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstanceError {
    #[error("need at least 3 stations (depot, swap station, sink), got {0}")]
    TooFewStations(usize),
    #[error("need at least one vehicle")]
    NoVehicles,
    #[error("driving time matrix has {rows} rows, expected {expected}")]
    MatrixRows { rows: usize, expected: usize },
    #[error("driving time matrix row {row} has {len} entries, expected {expected}")]
    MatrixColumns {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("driving time from {from} to {to} is {value}, expected a finite non-negative number")]
    DrivingTime {
        from: StationId,
        to: StationId,
        value: f64,
    },
    #[error("station {station}: {field} is {value}, expected a finite non-negative number")]
    StationValue {
        station: StationId,
        field: &'static str,
        value: f64,
    },
    #[error("station {station}: initial {field} {value} exceeds capacity {capacity}")]
    StationOverfull {
        station: StationId,
        field: &'static str,
        value: u32,
        capacity: u32,
    },
    #[error("vehicle {vehicle}: initial load {load} exceeds capacity {capacity}")]
    VehicleOverloaded {
        vehicle: VehicleId,
        load: u32,
        capacity: u32,
    },
    #[error("vehicle {vehicle}: start station {station} is not a depot or swap station")]
    StartStation {
        vehicle: VehicleId,
        station: StationId,
    },
    #[error("vehicle {vehicle}: driving time to start is {value}, expected a finite non-negative number")]
    DrivingToStart { vehicle: VehicleId, value: f64 },
    #[error("vehicles {first} and {second} both start at swap station {station}")]
    SharedStart {
        first: VehicleId,
        second: VehicleId,
        station: StationId,
    },
    #[error("{field} is {value}, expected a finite {expected} number")]
    Parameter {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("got {positions} positions for {stations} stations")]
    Positions { positions: usize, stations: usize },
    #[error("travel time lookup from {from} to {to} failed: {source}")]
    TravelTime {
        from: StationId,
        to: StationId,
        source: LookupError,
    },
}

/// Failure reported by a travel time lookup service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Reference to a decision variable that does not exist in the variable scheme
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("variable {family}{key:?} was never created")]
pub struct MissingVariable {
    pub family: &'static str,
    pub key: Vec<usize>,
}

/// Internal invariant violated while assembling the model
#[derive(Debug, thiserror::Error)]
pub enum ModelBuildError {
    #[error("big-M bound {name} is {value}, expected a finite non-negative number")]
    InvalidBound { name: &'static str, value: f64 },
    #[error(transparent)]
    MissingVariable(#[from] MissingVariable),
    #[error(transparent)]
    Model(#[from] milp::Error),
}

/// Terminal status of a solver run that did not produce a plan
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    #[error("model is infeasible")]
    Infeasible,
    #[error("model is unbounded")]
    Unbounded,
    #[error("model is infeasible or unbounded")]
    InfeasibleOrUnbounded,
    #[error("time limit reached without a feasible solution")]
    TimeLimit,
    #[error("solve interrupted without a feasible solution")]
    Interrupted,
    #[error("solver stopped with status {0}")]
    Status(String),
    #[error("solver reported a solution status but returned no values")]
    NoSolution,
    #[error("no solver backend is compiled in (build with --features gurobi)")]
    NoBackend,
    #[error(transparent)]
    Backend(#[from] milp::Error),
}

impl SolveError {
    /// Maps a status without a solution to its error
    pub fn from_status(status: &milp::Status) -> Self {
        match status {
            milp::Status::Infeasible => SolveError::Infeasible,
            milp::Status::Unbounded => SolveError::Unbounded,
            milp::Status::InfeasibleOrUnbounded => SolveError::InfeasibleOrUnbounded,
            milp::Status::TimeLimit => SolveError::TimeLimit,
            milp::Status::Interrupted => SolveError::Interrupted,
            milp::Status::Optimal | milp::Status::Suboptimal => SolveError::NoSolution,
            milp::Status::Other(code) => SolveError::Status(code.clone()),
        }
    }
}

/// Solved assignment that is internally inconsistent
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    MissingVariable(#[from] MissingVariable),
    #[error("solution has no value for variable {0}")]
    MissingValue(String),
    #[error("vehicle {vehicle} leaves station {station} {count} times")]
    Branching {
        vehicle: VehicleId,
        station: StationId,
        count: usize,
    },
    #[error("vehicle {vehicle} has selected arcs not connected to its route: {stations:?}")]
    DetachedCycle {
        vehicle: VehicleId,
        stations: Vec<StationId>,
    },
    #[error("route of vehicle {vehicle} does not lead from station {start} to the sink")]
    BrokenRoute { vehicle: VehicleId, start: StationId },
}

/// Plan sketch that does not describe routes of the model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SketchError {
    #[error("sketch has {got} vehicle routes, expected {expected}")]
    VehicleCount { got: usize, expected: usize },
    #[error("vehicle {vehicle} cannot travel from {from} to {to}")]
    NoArc {
        vehicle: VehicleId,
        from: StationId,
        to: StationId,
    },
    #[error("station {station} is visited more than once")]
    Revisit { station: StationId },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid instance: {0}")]
    Instance(#[from] InstanceError),
    #[error("building the model failed: {0}")]
    ModelBuild(#[from] ModelBuildError),
    #[error("solving failed: {0}")]
    Solve(#[from] SolveError),
    #[error("decoding the solution failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("invalid plan sketch: {0}")]
    Sketch(#[from] SketchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<MissingVariable> for Error {
    fn from(err: MissingVariable) -> Self {
        Error::ModelBuild(err.into())
    }
}

/// Display helper for lists of stations
pub(crate) struct Stations<'a>(pub &'a [StationId]);

impl fmt::Display for Stations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, station) in self.0.iter().enumerate() {
            if k > 0 {
                write!(f, " - ")?;
            }
            write!(f, "{station}")?;
        }
        Ok(())
    }
}
