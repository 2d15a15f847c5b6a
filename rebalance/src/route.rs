use crate::error::DecodeError;
use crate::problem::{Instance, StationId, VehicleId};
use crate::variables::Variables;
use milp::{Solution, Var};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

extern crate partitions;

/// Arc values above this threshold count as selected
const SELECTED: f64 = 0.5;

/// One driven arc of a vehicle route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub from: StationId,
    pub to: StationId,
    /// Arrival time at `to`
    pub arrival: f64,
    pub driving_time: f64,
    /// Bikes exchanged at `from`
    pub quantity: u32,
}

impl fmt::Display for RouteLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (exchange {}, drive {}, arrive {:.2})",
            self.from, self.to, self.quantity, self.driving_time, self.arrival
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vehicle: VehicleId,
    pub legs: Vec<RouteLeg>,
}

impl Route {
    /// Stations in driving order, from the start to the sink
    pub fn stations(&self) -> Vec<StationId> {
        let mut stations = Vec::with_capacity(self.legs.len() + 1);
        if let Some(first) = self.legs.first() {
            stations.push(first.from);
        }
        stations.extend(self.legs.iter().map(|leg| leg.to));
        stations
    }

    pub fn total_driving_time(&self) -> f64 {
        self.legs.iter().map(|leg| leg.driving_time).sum()
    }

    pub fn total_quantity(&self) -> u32 {
        self.legs.iter().map(|leg| leg.quantity).sum()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vehicle {}:", self.vehicle)?;
        for leg in &self.legs {
            writeln!(f, "    {leg}")?;
        }
        Ok(())
    }
}

pub(crate) fn value(solution: &Solution, var: Var) -> Result<f64, DecodeError> {
    solution
        .value(var)
        .ok_or_else(|| DecodeError::MissingValue(var.to_string()))
}

pub(crate) fn integral(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

/// Reads the routes of all vehicles from a solved assignment
pub fn decode(
    instance: &Instance,
    vars: &Variables,
    solution: &Solution,
) -> Result<Vec<Route>, DecodeError> {
    instance
        .all_vehicles()
        .map(|vehicle| {
            let legs = decode_legs(instance, vars, solution, vehicle)?;
            Ok(Route { vehicle, legs })
        })
        .collect()
}

fn decode_legs(
    instance: &Instance,
    vars: &Variables,
    solution: &Solution,
    v: VehicleId,
) -> Result<Vec<RouteLeg>, DecodeError> {
    let mut selected = Vec::new();
    for &(i, j) in vars.arcs(v) {
        if value(solution, vars.route(i, j, v)?)? > SELECTED {
            trace!(vehicle = v, from = i, to = j, "selected arc");
            selected.push((i, j));
        }
    }
    check_path(instance, v, &selected)?;

    let depot = instance.depot();
    let sink = instance.sink();
    let time_at = |i: StationId| -> Result<f64, DecodeError> {
        if i == depot {
            value(solution, vars.depot_time(v)?)
        } else {
            value(solution, vars.time(i)?)
        }
    };

    let mut legs: Vec<RouteLeg> = Vec::with_capacity(selected.len());
    for (i, j) in selected {
        let quantity = if i == depot {
            0
        } else {
            integral(value(solution, vars.quantity(i, v)?)?)
        };
        let driving_time = instance.driving_time(i, j);
        let arrival = if j == sink {
            let handling = if i == depot {
                0.0
            } else {
                instance.handling_time() * f64::from(quantity)
            };
            time_at(i)? + instance.parking_time() + handling + driving_time
        } else {
            time_at(j)?
        };

        let leg = RouteLeg {
            from: i,
            to: j,
            arrival,
            driving_time,
            quantity,
        };
        let position = legs.partition_point(|other| other.arrival <= leg.arrival);
        legs.insert(position, leg);
    }

    Ok(legs)
}

/// Fails unless the selected arcs form one simple path from the start of `v` to the sink
fn check_path(
    instance: &Instance,
    v: VehicleId,
    selected: &[(StationId, StationId)],
) -> Result<(), DecodeError> {
    let start = instance.start_station(v);
    let sink = instance.sink();
    let n = instance.num_stations();

    let mut successor: Vec<Option<StationId>> = vec![None; n];
    let mut out_degree = vec![0; n];
    for &(i, j) in selected {
        out_degree[i] += 1;
        successor[i] = Some(j);
    }
    if let Some((station, &count)) = out_degree.iter().enumerate().find(|(_, count)| **count > 1) {
        return Err(DecodeError::Branching {
            vehicle: v,
            station,
            count,
        });
    }

    // arcs in components without the start cannot be reached
    let mut uf = partitions::partition_vec![(); n];
    for &(i, j) in selected {
        uf.union(i, j);
    }
    for set in uf.all_sets() {
        let mut stations = set.map(|(index, _)| index).collect::<Vec<_>>();
        if stations.len() > 1 && !stations.contains(&start) {
            stations.sort_unstable();
            return Err(DecodeError::DetachedCycle {
                vehicle: v,
                stations,
            });
        }
    }

    let mut current = start;
    let mut steps = 0;
    while current != sink {
        match successor[current] {
            Some(next) if steps < selected.len() => {
                current = next;
                steps += 1;
            }
            _ => return Err(DecodeError::BrokenRoute { vehicle: v, start }),
        }
    }
    if steps != selected.len() {
        return Err(DecodeError::BrokenRoute { vehicle: v, start });
    }

    Ok(())
}
