use crate::error::{Error, SketchError};
use crate::problem::{Instance, StationId, VehicleId};
use crate::route::Route;
use crate::variables::{is_arc, Variables};
use milp::{Model, Var};
use serde::{Deserialize, Serialize};
use tracing::warn;

const EPSILON: f64 = 1e-9;

/// A station served by a vehicle together with the number of bikes to exchange there
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub station: StationId,
    #[serde(default)]
    pub quantity: u32,
}

impl Stop {
    pub fn new(station: StationId, quantity: u32) -> Self {
        Stop { station, quantity }
    }
}

/// Routes given as ordered stops per vehicle
///
/// A route lists the stations a vehicle serves in order. The vehicle's start station is
/// prepended (exchanging nothing) if the route does not begin with it, and the sink is always
/// appended. Quantities at the depot are ignored since vehicles are refilled there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSketch {
    pub routes: Vec<Vec<Stop>>,
}

impl PlanSketch {
    pub fn new(routes: Vec<Vec<Stop>>) -> Self {
        PlanSketch { routes }
    }

    /// Sketch driving the decoded routes again
    pub fn from_routes(routes: &[Route]) -> Self {
        PlanSketch {
            routes: routes
                .iter()
                .map(|route| {
                    route
                        .legs
                        .iter()
                        .map(|leg| Stop::new(leg.from, leg.quantity))
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Visit {
    time: f64,
    quantity: u32,
}

struct Assignment(Vec<f64>);

impl Assignment {
    fn set(&mut self, var: Var, value: f64) {
        self.0[var.index()] = value;
    }
}

fn whole(value: f64) -> u32 {
    (value + EPSILON).floor().max(0.0) as u32
}

/// Completes a sketch into a value for every variable of the model
///
/// Vehicles arrive as early as possible, exchanges are capped by the bikes on board, the free
/// docks and (when tracked) the flat bikes at the station, and all inventory variables follow
/// the station dynamics.
pub fn assignment(
    instance: &Instance,
    vars: &Variables,
    lp: &Model,
    sketch: &PlanSketch,
) -> Result<Vec<f64>, Error> {
    if sketch.routes.len() != instance.num_vehicles() {
        return Err(SketchError::VehicleCount {
            got: sketch.routes.len(),
            expected: instance.num_vehicles(),
        }
        .into());
    }

    let depot = instance.depot();
    let sink = instance.sink();
    let horizon = instance.horizon();
    let mut values = Assignment(vec![0.0; lp.num_vars()]);
    let mut visits: Vec<Option<Visit>> = vec![None; instance.num_stations()];

    let mut seen = vec![false; instance.num_stations()];
    for (v, stops) in sketch.routes.iter().enumerate() {
        let vehicle = instance.vehicle(v);
        let stops = path(instance, v, stops)?;
        let mut depot_seen = false;
        for stop in &stops[..stops.len() - 1] {
            let flag = if stop.station == depot {
                &mut depot_seen
            } else {
                &mut seen[stop.station]
            };
            if *flag {
                return Err(SketchError::Revisit {
                    station: stop.station,
                }
                .into());
            }
            *flag = true;
        }

        let mut time = vehicle.driving_to_start;
        let mut load = vehicle.init_load;
        for pair in stops.windows(2) {
            let (i, j) = (pair[0].station, pair[1].station);
            values.set(vars.route(i, j, v)?, 1.0);
            values.set(vars.load(i, v)?, f64::from(load));

            let mut departure = time + instance.parking_time();
            let next_load = if i == depot {
                values.set(vars.depot_time(v)?, time);
                vehicle.capacity
            } else {
                let quantity = exchange(instance, vars, i, time, load, pair[0].quantity);
                values.set(vars.quantity(i, v)?, f64::from(quantity));
                visits[i] = Some(Visit { time, quantity });
                departure += instance.handling_time() * f64::from(quantity);
                if time > horizon {
                    if j == sink {
                        values.set(vars.finish_slack(v)?, time - horizon);
                    } else {
                        warn!(
                            vehicle = v,
                            station = i,
                            "visit after the horizon does not end the route"
                        );
                    }
                }
                load - quantity
            };

            time = departure + instance.driving_time(i, j);
            load = next_load;
        }
        values.set(vars.load(sink, v)?, f64::from(load));
        values.set(vars.load_slack(v)?, f64::from(vehicle.capacity - load));
    }

    for i in instance.swap_stations() {
        station_values(instance, vars, &mut values, i, visits[i])?;
    }

    Ok(values.0)
}

/// Stops of vehicle `v` from its start to the sink
fn path(instance: &Instance, v: VehicleId, stops: &[Stop]) -> Result<Vec<Stop>, SketchError> {
    let start = instance.start_station(v);
    let mut path = Vec::with_capacity(stops.len() + 2);
    if stops.first().map(|stop| stop.station) != Some(start) {
        path.push(Stop::new(start, 0));
    }
    path.extend_from_slice(stops);
    path.push(Stop::new(instance.sink(), 0));

    for pair in path.windows(2) {
        let (from, to) = (pair[0].station, pair[1].station);
        if !is_arc(instance, from, to, v) {
            return Err(SketchError::NoArc { vehicle: v, from, to });
        }
    }
    Ok(path)
}

/// Bikes actually exchanged at swap station `i` when `requested` are asked for
fn exchange(
    instance: &Instance,
    vars: &Variables,
    i: StationId,
    time: f64,
    load: u32,
    requested: u32,
) -> u32 {
    let station = instance.station(i);
    let (level, _) = station.drift(f64::from(station.init_load), time);
    let mut quantity = requested
        .min(load)
        .min(whole(f64::from(station.capacity) - level));
    if vars.track_flat() {
        let flat = f64::from(station.init_flat_load) + station.incoming_flat_rate * time;
        quantity = quantity.min(whole(flat));
    }
    quantity
}

fn station_values(
    instance: &Instance,
    vars: &Variables,
    values: &mut Assignment,
    i: StationId,
    visit: Option<Visit>,
) -> Result<(), Error> {
    let station = instance.station(i);
    let horizon = instance.horizon();
    let init_load = f64::from(station.init_load);
    let init_flat = f64::from(station.init_flat_load);
    let flat_rate = station.incoming_flat_rate;

    let (final_level, final_flat_level) = match visit {
        None => {
            let (final_level, clipped_final) = station.drift(init_load, horizon);
            values.set(vars.level(i)?, init_load);
            values.set(vars.clipped_final(i)?, clipped_final);
            if vars.track_flat() {
                values.set(vars.flat_level(i)?, init_flat);
            }
            (final_level, init_flat + flat_rate * horizon)
        }
        Some(Visit { time, quantity }) => {
            let quantity = f64::from(quantity);
            let (level, clipped) = station.drift(init_load, time);
            values.set(vars.time(i)?, time);
            values.set(vars.visited(i)?, 1.0);
            values.set(vars.level(i)?, level);
            values.set(vars.clipped(i)?, clipped);

            let flat_level = init_flat + flat_rate * time;
            if vars.track_flat() {
                values.set(vars.flat_level(i)?, flat_level);
            }

            if time > horizon {
                let (final_level, clipped_by_horizon) = station.drift(init_load, horizon);
                values.set(vars.late(i)?, 1.0);
                values.set(vars.clipped_late(i)?, (clipped - clipped_by_horizon).max(0.0));
                if clipped_by_horizon > EPSILON {
                    values.set(vars.saturated(i)?, 1.0);
                }
                values.set(vars.served(i)?, quantity.min(f64::from(station.capacity)));
                (final_level, init_flat + flat_rate * horizon)
            } else {
                let (final_level, clipped_final) = station.drift(level + quantity, horizon - time);
                values.set(vars.clipped_final(i)?, clipped_final);
                (final_level, flat_level - quantity + flat_rate * (horizon - time))
            }
        }
    };

    values.set(vars.final_level(i)?, final_level);
    values.set(vars.deviation(i)?, (station.ideal_state - final_level).abs());
    if vars.track_flat() {
        values.set(vars.final_flat_level(i)?, final_flat_level);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::toy_data;
    use crate::problem::{Instance, InstanceData, Vehicle};
    use crate::solution::Regime;
    use crate::{build, Formulation, Options};
    use approx::assert_abs_diff_eq;

    fn formulation(data: InstanceData) -> Formulation {
        build(&Instance::new(data).unwrap(), &Options::default()).unwrap()
    }

    fn value(values: &[f64], var: Result<Var, crate::MissingVariable>) -> f64 {
        values[var.unwrap().index()]
    }

    fn assert_feasible(formulation: &Formulation, values: &[f64]) {
        let violations = formulation.model().check(values, 1e-6).unwrap();
        let violated = formulation
            .violated_constraints(values, 1e-6)
            .unwrap()
            .iter()
            .map(|constr| constr.to_string())
            .collect::<Vec<_>>();
        assert!(violations.is_empty(), "{violations:?}: {violated:?}");
    }

    mod feasible {
        use super::*;

        #[test]
        fn visits_before_horizon() {
            let formulation = formulation(toy_data());
            let sketch = PlanSketch::new(vec![vec![Stop::new(2, 3), Stop::new(1, 5)]]);
            let values = formulation.assignment_for(&sketch).unwrap();
            assert_feasible(&formulation, &values);

            let vars = formulation.variables();
            assert_eq!(value(&values, vars.time(2)), 12.0);
            assert_eq!(value(&values, vars.time(1)), 16.0);
            // station 1 only holds four flat bikes
            assert_eq!(value(&values, vars.quantity(1, 0)), 4.0);
            assert_eq!(value(&values, vars.load(3, 0)), 3.0);
            assert_eq!(value(&values, vars.load_slack(0)), 7.0);
            assert_abs_diff_eq!(value(&values, vars.final_level(2)), 20.0);
            assert_abs_diff_eq!(
                value(&values, vars.clipped_final(2)),
                13.0,
                epsilon = 1e-9
            );
            assert_abs_diff_eq!(
                formulation.model().objective_value(&values).unwrap(),
                16.0 + 22.0,
                epsilon = 1e-9
            );
        }

        #[test]
        fn visits_after_horizon() {
            let mut data = toy_data();
            data.time_horizon = 14.0;
            let formulation = formulation(data);
            let sketch = PlanSketch::new(vec![vec![Stop::new(2, 3), Stop::new(1, 5)]]);
            let values = formulation.assignment_for(&sketch).unwrap();
            assert_feasible(&formulation, &values);

            let plan = formulation.evaluate(&sketch).unwrap();
            assert_eq!(plan.stations[0].regime, Regime::AfterHorizon);
            assert_eq!(plan.stations[1].regime, Regime::BeforeHorizon);
            assert_abs_diff_eq!(plan.stations[0].served, 4.0);
            assert_abs_diff_eq!(plan.vehicles[0].finish_slack, 2.0);
            assert_abs_diff_eq!(plan.objective, 19.0 - 4.0 + 2.0, epsilon = 1e-9);
            assert_abs_diff_eq!(
                plan.recompute_objective(formulation.instance().weights()),
                plan.objective,
                epsilon = 1e-9
            );
        }

        #[test]
        fn visit_at_horizon_is_not_late() {
            let mut data = toy_data();
            data.time_horizon = 12.0;
            let formulation = formulation(data);
            let sketch = PlanSketch::new(vec![vec![Stop::new(2, 3), Stop::new(1, 5)]]);
            let values = formulation.assignment_for(&sketch).unwrap();
            assert_feasible(&formulation, &values);

            let vars = formulation.variables();
            assert_eq!(value(&values, vars.time(2)), 12.0);
            assert_eq!(value(&values, vars.late(2)), 0.0);
            assert_eq!(value(&values, vars.late(1)), 1.0);
            assert_eq!(value(&values, vars.finish_slack(0)), 4.0);

            let plan = formulation.evaluate(&sketch).unwrap();
            assert_eq!(plan.stations[1].regime, Regime::BeforeHorizon);
            assert_eq!(plan.stations[0].regime, Regime::AfterHorizon);
        }

        #[test]
        fn late_start_saturates_station() {
            let mut data = toy_data();
            data.time_horizon = 30.0;
            data.vehicles[0] = Vehicle {
                capacity: 10,
                start_station: 2,
                init_load: 10,
                driving_to_start: 40.0,
            };
            let formulation = formulation(data);
            let values = formulation
                .assignment_for(&PlanSketch::new(vec![vec![]]))
                .unwrap();
            assert_feasible(&formulation, &values);

            let vars = formulation.variables();
            assert_eq!(value(&values, vars.saturated(2)), 1.0);
            assert_abs_diff_eq!(
                value(&values, vars.clipped_late(2)),
                3.0,
                epsilon = 1e-9
            );
            assert_abs_diff_eq!(
                formulation.model().objective_value(&values).unwrap(),
                2.0 + 22.0 + 10.0,
                epsilon = 1e-9
            );
        }

        #[test]
        fn depot_refills_vehicle() {
            let mut data = toy_data();
            data.vehicles[0].start_station = 2;
            data.vehicles[0].init_load = 5;
            let formulation = formulation(data);
            let sketch = PlanSketch::new(vec![vec![
                Stop::new(2, 3),
                Stop::new(0, 0),
                Stop::new(1, 6),
            ]]);
            let values = formulation.assignment_for(&sketch).unwrap();
            assert_feasible(&formulation, &values);

            let vars = formulation.variables();
            assert_eq!(value(&values, vars.depot_time(0)), 12.0);
            assert_eq!(value(&values, vars.load(0, 0)), 2.0);
            assert_eq!(value(&values, vars.load(1, 0)), 10.0);
            assert_eq!(value(&values, vars.quantity(1, 0)), 5.0);

            let plan = formulation.evaluate(&sketch).unwrap();
            assert_eq!(plan.routes[0].stations(), vec![2, 0, 1, 3]);
        }

        #[test]
        fn without_flat_tracking() {
            let instance = Instance::new(toy_data()).unwrap();
            let formulation = build(&instance, &Options { track_flat: false }).unwrap();
            let sketch = PlanSketch::new(vec![vec![Stop::new(1, 5)]]);
            let values = formulation.assignment_for(&sketch).unwrap();
            assert_feasible(&formulation, &values);
            assert_eq!(
                value(&values, formulation.variables().quantity(1, 0)),
                5.0
            );
        }

        #[test]
        fn replays_decoded_routes() {
            let formulation = formulation(toy_data());
            let sketch = PlanSketch::new(vec![vec![Stop::new(2, 3), Stop::new(1, 4)]]);
            let plan = formulation.evaluate(&sketch).unwrap();
            let replayed = PlanSketch::from_routes(&plan.routes);
            assert_eq!(
                replayed.routes[0],
                vec![Stop::new(0, 0), Stop::new(2, 3), Stop::new(1, 4)]
            );
            assert_eq!(formulation.evaluate(&replayed).unwrap().routes, plan.routes);
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn rejects_wrong_vehicle_count() {
            let formulation = formulation(toy_data());
            assert!(matches!(
                formulation.assignment_for(&PlanSketch::default()),
                Err(Error::Sketch(SketchError::VehicleCount {
                    got: 0,
                    expected: 1
                }))
            ));
        }

        #[test]
        fn rejects_missing_arc() {
            let formulation = formulation(toy_data());
            let sketch = PlanSketch::new(vec![vec![Stop::new(1, 0), Stop::new(1, 0)]]);
            assert!(matches!(
                formulation.assignment_for(&sketch),
                Err(Error::Sketch(SketchError::NoArc {
                    vehicle: 0,
                    from: 1,
                    to: 1
                }))
            ));
        }

        #[test]
        fn rejects_revisits() {
            let formulation = formulation(toy_data());
            let sketch = PlanSketch::new(vec![vec![
                Stop::new(1, 0),
                Stop::new(2, 0),
                Stop::new(1, 0),
            ]]);
            assert!(matches!(
                formulation.assignment_for(&sketch),
                Err(Error::Sketch(SketchError::Revisit { station: 1 }))
            ));

            // a depot start ends its route at the sink, never back at the depot
            let sketch = PlanSketch::new(vec![vec![Stop::new(1, 0), Stop::new(0, 0)]]);
            assert!(matches!(
                formulation.assignment_for(&sketch),
                Err(Error::Sketch(SketchError::NoArc {
                    vehicle: 0,
                    from: 1,
                    to: 0
                }))
            ));
        }

        #[test]
        fn rejects_second_depot_pass() {
            let mut data = toy_data();
            data.vehicles[0].start_station = 2;
            let formulation = formulation(data);
            let sketch = PlanSketch::new(vec![vec![
                Stop::new(0, 0),
                Stop::new(1, 0),
                Stop::new(0, 0),
                Stop::new(1, 0),
            ]]);
            assert!(matches!(
                formulation.assignment_for(&sketch),
                Err(Error::Sketch(SketchError::Revisit { station: 0 }))
            ));
        }

        #[test]
        fn parses_sketch_without_quantities() {
            let sketch: PlanSketch =
                serde_json::from_str(r#"{"routes": [[{"station": 2}, {"station": 1, "quantity": 3}]]}"#)
                    .unwrap();
            assert_eq!(sketch.routes[0], vec![Stop::new(2, 0), Stop::new(1, 3)]);
        }
    }
}
