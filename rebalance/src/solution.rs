use crate::error::{DecodeError, Stations};
use crate::problem::{Instance, StationId, VehicleId, Weights};
use crate::route::{self, value, Route};
use crate::variables::Variables;
use milp::{Solution, Status};
use serde::{Serialize, Serializer};
use std::fmt;

/// Value above which a binary indicator counts as set
const SET: f64 = 0.5;

/// Temporal case of a swap station with respect to the horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Unvisited,
    BeforeHorizon,
    AfterHorizon,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Unvisited => write!(f, "unvisited"),
            Regime::BeforeHorizon => write!(f, "visited before horizon"),
            Regime::AfterHorizon => write!(f, "visited after horizon"),
        }
    }
}

/// State of a swap station at the horizon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationReport {
    pub station: StationId,
    pub regime: Regime,
    pub arrival: Option<f64>,
    pub quantity: u32,
    pub final_level: f64,
    pub final_flat_level: Option<f64>,
    pub deviation: f64,
    /// Clipped bikes counted against the plan
    pub violation: f64,
    pub served: f64,
    pub saturated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleReport {
    pub vehicle: VehicleId,
    pub finish_slack: f64,
    pub ending_load: u32,
    pub load_slack: f64,
}

/// Sums of the objective terms
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub violation: f64,
    pub deviation: f64,
    pub served: f64,
    pub finish_slack: f64,
}

impl Totals {
    pub fn objective(&self, weights: &Weights) -> f64 {
        weights.violation * self.violation + weights.deviation * self.deviation
            - weights.reward
                * (weights.deviation_reward * self.served
                    - weights.driving_times * self.finish_slack)
    }
}

fn serialize_status<S: Serializer>(status: &Status, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(status)
}

/// Decoded result of a successful solve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    #[serde(serialize_with = "serialize_status")]
    pub status: Status,
    pub objective: f64,
    pub routes: Vec<Route>,
    pub stations: Vec<StationReport>,
    pub vehicles: Vec<VehicleReport>,
    pub totals: Totals,
}

impl Plan {
    /// Reads routes and reports from a solved assignment
    pub fn decode(
        instance: &Instance,
        vars: &Variables,
        solution: &Solution,
        status: Status,
    ) -> Result<Plan, DecodeError> {
        let routes = route::decode(instance, vars, solution)?;

        let mut stations = Vec::new();
        for i in instance.swap_stations() {
            let visited = value(solution, vars.visited(i)?)? > SET;
            let late = value(solution, vars.late(i)?)? > SET;
            let regime = match (visited, late) {
                (false, _) => Regime::Unvisited,
                (true, false) => Regime::BeforeHorizon,
                (true, true) => Regime::AfterHorizon,
            };
            let mut quantity = 0;
            for (_, q) in vars.quantities(i) {
                quantity += route::integral(value(solution, q)?);
            }
            let final_flat_level = if vars.track_flat() {
                Some(value(solution, vars.final_flat_level(i)?)?)
            } else {
                None
            };
            stations.push(StationReport {
                station: i,
                regime,
                arrival: if visited {
                    Some(value(solution, vars.time(i)?)?)
                } else {
                    None
                },
                quantity,
                final_level: value(solution, vars.final_level(i)?)?,
                final_flat_level,
                deviation: value(solution, vars.deviation(i)?)?,
                violation: value(solution, vars.clipped(i)?)?
                    - value(solution, vars.clipped_late(i)?)?
                    + value(solution, vars.clipped_final(i)?)?,
                served: value(solution, vars.served(i)?)?,
                saturated: value(solution, vars.saturated(i)?)? > SET,
            });
        }

        let mut vehicles = Vec::new();
        for v in instance.all_vehicles() {
            vehicles.push(VehicleReport {
                vehicle: v,
                finish_slack: value(solution, vars.finish_slack(v)?)?,
                ending_load: route::integral(value(solution, vars.load(instance.sink(), v)?)?),
                load_slack: value(solution, vars.load_slack(v)?)?,
            });
        }

        let totals = Totals {
            violation: stations.iter().map(|report| report.violation).sum(),
            deviation: stations.iter().map(|report| report.deviation).sum(),
            served: stations.iter().map(|report| report.served).sum(),
            finish_slack: vehicles.iter().map(|report| report.finish_slack).sum(),
        };

        Ok(Plan {
            status,
            objective: solution.objective(),
            routes,
            stations,
            vehicles,
            totals,
        })
    }

    /// Objective value recomputed from the reports
    pub fn recompute_objective(&self, weights: &Weights) -> f64 {
        self.totals.objective(weights)
    }

    pub fn route(&self, v: VehicleId) -> Option<&Route> {
        self.routes.iter().find(|route| route.vehicle == v)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan ({}), objective {:.4}", self.status, self.objective)?;
        for route in &self.routes {
            writeln!(f, "  Vehicle {}: {}", route.vehicle, Stations(&route.stations()))?;
            for leg in &route.legs {
                writeln!(f, "    {leg}")?;
            }
        }
        for report in &self.stations {
            write!(
                f,
                "  Station {} {}: final level {:.2}, deviation {:.2}, violation {:.2}",
                report.station, report.regime, report.final_level, report.deviation, report.violation
            )?;
            if report.regime == Regime::AfterHorizon {
                write!(f, ", served {:.2}", report.served)?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "  Totals: violation {:.2}, deviation {:.2}, served {:.2}, finish slack {:.2}",
            self.totals.violation, self.totals.deviation, self.totals.served, self.totals.finish_slack
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::toy_data;
    use crate::route::tests::Fixture;
    use approx::assert_abs_diff_eq;

    fn scenario() -> Fixture {
        let mut fixture = Fixture::new(toy_data());
        let vars = fixture.vars.clone();
        fixture.select(0, 1, 0);
        fixture.select(1, 3, 0);
        fixture.set(vars.time(1).unwrap(), 10.0);
        fixture.set(vars.visited(1).unwrap(), 1.0);
        fixture.set(vars.final_level(1).unwrap(), 7.0);
        fixture.set(vars.deviation(1).unwrap(), 3.0);
        fixture.set(vars.final_level(2).unwrap(), 20.0);
        fixture.set(vars.deviation(2).unwrap(), 12.0);
        fixture.set(vars.clipped_final(2).unwrap(), 6.0);
        fixture
    }

    #[test]
    fn reports_regimes_and_totals() {
        let fixture = scenario();
        let plan = Plan::decode(
            &fixture.instance,
            &fixture.vars,
            &fixture.solution(),
            Status::Optimal,
        )
        .unwrap();

        assert_eq!(plan.stations[0].regime, Regime::BeforeHorizon);
        assert_eq!(plan.stations[0].arrival, Some(10.0));
        assert_eq!(plan.stations[1].regime, Regime::Unvisited);
        assert_eq!(plan.stations[1].arrival, None);
        assert_eq!(plan.stations[1].violation, 6.0);
        assert_eq!(plan.totals.deviation, 15.0);
        assert_eq!(plan.vehicles[0].ending_load, 0);
        assert_abs_diff_eq!(
            plan.recompute_objective(fixture.instance.weights()),
            6.0 + 15.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn serializes_status_as_text() {
        let fixture = scenario();
        let plan = Plan::decode(
            &fixture.instance,
            &fixture.vars,
            &fixture.solution(),
            Status::Suboptimal,
        )
        .unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["status"], "suboptimal");
        assert_eq!(json["stations"][1]["regime"], "unvisited");
        assert_eq!(json["routes"][0]["legs"][1]["to"], 3);
    }

    #[test]
    fn weights_enter_recomputed_objective() {
        let totals = Totals {
            violation: 1.0,
            deviation: 2.0,
            served: 3.0,
            finish_slack: 4.0,
        };
        let weights = Weights {
            violation: 10.0,
            deviation: 100.0,
            reward: 2.0,
            deviation_reward: 1.0,
            driving_times: 0.5,
        };
        assert_abs_diff_eq!(totals.objective(&weights), 10.0 + 200.0 - 2.0 * (3.0 - 2.0));
    }
}
