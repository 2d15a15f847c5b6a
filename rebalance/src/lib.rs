//! MILP model for rebalancing bike-sharing stations
//!
//! [`build`] turns a validated [`Instance`] into a [`Formulation`]: the big-M bounds, the
//! variable scheme, six constraint families and the objective, recorded in a solver-agnostic
//! [`milp::Model`]. [`Formulation::solve`] hands the model to a [`milp::Backend`] and decodes
//! the assignment into a [`Plan`] of time-ordered vehicle routes.

use clap::{arg, Command};
use milp::{Backend, Constr, Interrupt, Limits, Model, ModelSense, Solution, Status};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

mod bounds;
mod constraints;
mod error;
mod objective;
mod problem;
mod route;
mod sketch;
mod solution;
mod variables;

pub use bounds::BigM;
pub use constraints::ConstraintCounts;
pub use error::{
    DecodeError, Error, InstanceError, LookupError, MissingVariable, ModelBuildError,
    SketchError, SolveError,
};
pub use problem::{
    DrivingTimes, EuclideanLookup, Instance, InstanceData, Position, Station, StationId,
    TravelTimeLookup, Vehicle, VehicleId, Weights,
};
pub use route::{Route, RouteLeg};
pub use sketch::{PlanSketch, Stop};
pub use solution::{Plan, Regime, StationReport, Totals, VehicleReport};
pub use variables::{is_arc, Variables};

/// Capabilities of a formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Track flat bikes as a second inventory and limit exchanges by them
    pub track_flat: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { track_flat: true }
    }
}

/// A built model together with the variable scheme needed to read its solutions
#[derive(Debug, Clone)]
pub struct Formulation {
    instance: Instance,
    options: Options,
    bigm: BigM,
    model: Model,
    vars: Variables,
    counts: ConstraintCounts,
}

/// Builds the rebalancing model for an instance
pub fn build(instance: &Instance, options: &Options) -> Result<Formulation, Error> {
    warn_zero_cycles(instance);

    let bigm = BigM::new(instance)?;
    let mut model = Model::new("rebalance");
    let vars = Variables::new(instance, &bigm, options, &mut model)?;
    let counts = constraints::add_all(instance, &vars, &bigm, &mut model)?;
    let objective = objective::objective(instance, &vars)?;
    model
        .set_objective(objective, ModelSense::Minimize)
        .map_err(ModelBuildError::from)?;

    debug!(%counts, "constraints per family");
    info!(
        variables = model.num_vars(),
        constraints = model.num_constrs(),
        track_flat = options.track_flat,
        "model built"
    );

    Ok(Formulation {
        instance: instance.clone(),
        options: *options,
        bigm,
        model,
        vars,
        counts,
    })
}

fn warn_zero_cycles(instance: &Instance) {
    if instance.parking_time() > 0.0 {
        return;
    }
    for i in instance.swap_stations() {
        for j in instance.swap_stations().filter(|j| *j > i) {
            if instance.driving_time(i, j) == 0.0 && instance.driving_time(j, i) == 0.0 {
                warn!(
                    i,
                    j, "zero-duration legs without parking time allow zero-time cycles"
                );
            }
        }
    }
}

impl Formulation {
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn bigm(&self) -> &BigM {
        &self.bigm
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn variables(&self) -> &Variables {
        &self.vars
    }

    pub fn counts(&self) -> &ConstraintCounts {
        &self.counts
    }

    /// Solves the model and decodes the result
    ///
    /// A limit reached with an incumbent is a success with status [`Status::Suboptimal`];
    /// every run without a solution ends in a [`SolveError`].
    pub fn solve(
        &self,
        backend: &dyn Backend,
        limits: &Limits,
        interrupt: &Interrupt,
    ) -> Result<Plan, Error> {
        info!(backend = backend.name(), ?limits, "solving");
        let outcome = backend
            .solve(&self.model, limits, interrupt)
            .map_err(SolveError::from)?;
        info!(status = %outcome.status, "solver finished");

        if !outcome.status.has_solution() {
            return Err(SolveError::from_status(&outcome.status).into());
        }
        let solution = outcome.solution.ok_or(SolveError::NoSolution)?;
        let plan = self.decode(&solution, outcome.status)?;
        info!(objective = plan.objective, "plan decoded");

        Ok(plan)
    }

    pub fn decode(&self, solution: &Solution, status: Status) -> Result<Plan, Error> {
        Ok(Plan::decode(&self.instance, &self.vars, solution, status)?)
    }

    /// Values of all variables for the given routes
    pub fn assignment_for(&self, sketch: &PlanSketch) -> Result<Vec<f64>, Error> {
        sketch::assignment(&self.instance, &self.vars, &self.model, sketch)
    }

    /// Passes the assignment of a sketch to the solver as MIP start
    pub fn warm_start(&mut self, sketch: &PlanSketch) -> Result<(), Error> {
        let values = self.assignment_for(sketch)?;
        let violated = self.violated_constraints(&values, 1e-6)?.len();
        if violated > 0 {
            warn!(violated, "warm start violates constraints");
        }
        self.model
            .set_starts(&values)
            .map_err(ModelBuildError::from)?;
        Ok(())
    }

    /// Decodes the plan a sketch leads to without solving
    pub fn evaluate(&self, sketch: &PlanSketch) -> Result<Plan, Error> {
        let values = self.assignment_for(sketch)?;
        let solution =
            Solution::from_assignment(&self.model, values).map_err(ModelBuildError::from)?;
        self.decode(&solution, Status::Other("evaluated".to_string()))
    }

    /// Constraints of the model violated by an assignment of all variables
    pub fn violated_constraints(&self, values: &[f64], tol: f64) -> Result<Vec<&Constr>, Error> {
        Ok(self
            .model
            .violated_constraints(values, tol)
            .map_err(ModelBuildError::from)?)
    }
}

pub struct Config {
    pub instance: PathBuf,
    pub output: Option<PathBuf>,
    pub warm_start: Option<PathBuf>,
    pub limits: Limits,
    pub options: Options,
}

fn cli() -> Command {
    Command::new("rebalance")
        .about("Plans rebalancing routes for bike-sharing stations")
        .arg(arg!(<INSTANCE> "Instance JSON file").value_parser(clap::value_parser!(PathBuf)))
        .arg(
            arg!(--"time-limit" <SECONDS> "Stop solving after this many seconds")
                .required(false)
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            arg!(--gap <GAP> "Stop at this relative MIP gap")
                .required(false)
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            arg!(--threads <THREADS> "Number of solver threads")
                .required(false)
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(arg!(--"no-flat" "Do not track flat bikes"))
        .arg(
            arg!(--"warm-start" <SKETCH> "Plan sketch JSON file used as MIP start")
                .required(false)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(-o --output <PLAN> "Write the plan as JSON to this file")
                .required(false)
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

impl Config {
    pub fn new(args: &[String]) -> Result<Config, clap::Error> {
        let matches = cli().try_get_matches_from(args)?;

        let time_limit = match matches.get_one::<f64>("time-limit") {
            Some(seconds) if !seconds.is_finite() || *seconds < 0.0 => {
                return Err(cli().error(
                    clap::error::ErrorKind::ValueValidation,
                    "time limit must be a non-negative number of seconds",
                ))
            }
            Some(seconds) => Some(Duration::from_secs_f64(*seconds)),
            None => None,
        };

        Ok(Config {
            instance: matches
                .get_one::<PathBuf>("INSTANCE")
                .cloned()
                .unwrap_or_default(),
            output: matches.get_one::<PathBuf>("output").cloned(),
            warm_start: matches.get_one::<PathBuf>("warm-start").cloned(),
            limits: Limits {
                time_limit,
                mip_gap: matches.get_one::<f64>("gap").copied(),
                threads: matches.get_one::<i32>("threads").copied(),
            },
            options: Options {
                track_flat: !matches.get_flag("no-flat"),
            },
        })
    }
}

#[cfg(feature = "gurobi")]
fn backend() -> Result<Box<dyn Backend>, SolveError> {
    let backend = milp::GurobiBackend::new().map_err(milp::Error::from)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "gurobi"))]
fn backend() -> Result<Box<dyn Backend>, SolveError> {
    Err(SolveError::NoBackend)
}

pub fn run(config: Config) -> Result<(), Error> {
    info!(path = ?config.instance, "reading instance");
    let data: InstanceData = serde_json::from_reader(BufReader::new(File::open(&config.instance)?))?;
    let instance = Instance::new(data)?;
    debug!("{instance}");

    let mut formulation = build(&instance, &config.options)?;
    if let Some(path) = &config.warm_start {
        info!(?path, "reading warm start");
        let sketch: PlanSketch = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        formulation.warm_start(&sketch)?;
    }

    let backend = backend()?;
    let plan = formulation.solve(backend.as_ref(), &config.limits, &Interrupt::new())?;
    println!("{plan}");

    if let Some(path) = &config.output {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), &plan)?;
        info!(?path, "plan written");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_command_line() {
        let config = Config::new(&args(&[
            "rebalance",
            "instance.json",
            "--time-limit",
            "30",
            "--gap",
            "0.01",
            "--no-flat",
            "-o",
            "plan.json",
        ]))
        .unwrap();
        assert_eq!(config.instance, PathBuf::from("instance.json"));
        assert_eq!(config.output, Some(PathBuf::from("plan.json")));
        assert_eq!(config.limits.time_limit, Some(Duration::from_secs(30)));
        assert_eq!(config.limits.mip_gap, Some(0.01));
        assert_eq!(config.limits.threads, None);
        assert!(!config.options.track_flat);
        assert_eq!(config.warm_start, None);
    }

    #[test]
    fn defaults_track_flat() {
        let config = Config::new(&args(&["rebalance", "instance.json"])).unwrap();
        assert!(config.options.track_flat);
        assert_eq!(config.limits, Limits::default());
    }

    #[test]
    fn requires_instance() {
        assert!(Config::new(&args(&["rebalance"])).is_err());
        assert!(Config::new(&args(&["rebalance", "i.json", "--time-limit", "-3"])).is_err());
    }

    #[test]
    fn rejects_partial_assignment() {
        let instance = Instance::new(problem::tests::toy_data()).unwrap();
        let formulation = build(&instance, &Options::default()).unwrap();
        let expected = formulation.model().num_vars();
        assert!(matches!(
            formulation.violated_constraints(&[0.0], 1e-6),
            Err(Error::ModelBuild(ModelBuildError::Model(milp::Error::AssignmentLength {
                got: 1,
                expected: e,
            }))) if e == expected
        ));
    }
}
