//! The six constraint families of the rebalancing formulation
//!
//! Every family is a function of the instance, the variable scheme and the big-M bounds and
//! returns the number of constraints it added.

use crate::bounds::BigM;
use crate::error::ModelBuildError;
use crate::problem::Instance;
use crate::variables::Variables;
use milp::{c, LinExpr, Model, Var};
use std::fmt;

type Result<T> = std::result::Result<T, ModelBuildError>;

/// Number of constraints per family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintCounts {
    pub routing: usize,
    pub timing: usize,
    pub load: usize,
    pub inventory: usize,
    pub regimes: usize,
    pub support: usize,
}

impl ConstraintCounts {
    pub fn total(&self) -> usize {
        self.routing + self.timing + self.load + self.inventory + self.regimes + self.support
    }
}

impl fmt::Display for ConstraintCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "routing {}, timing {}, load {}, inventory {}, regimes {}, support {}",
            self.routing, self.timing, self.load, self.inventory, self.regimes, self.support
        )
    }
}

/// Adds all families to the model
pub fn add_all(
    instance: &Instance,
    vars: &Variables,
    bigm: &BigM,
    lp: &mut Model,
) -> Result<ConstraintCounts> {
    Ok(ConstraintCounts {
        routing: routing(instance, vars, lp)?,
        timing: timing(instance, vars, bigm, lp)?,
        load: load(instance, vars, bigm, lp)?,
        inventory: inventory(instance, vars, lp)?,
        regimes: regimes(instance, vars, bigm, lp)?,
        support: support(instance, vars, bigm, lp)?,
    })
}

fn sum(vars: impl IntoIterator<Item = Var>) -> LinExpr {
    let mut expr = LinExpr::new();
    for var in vars {
        expr.add_term(1.0, var);
    }
    expr
}

/// Returns `1 - sum(vars)`
fn complement(vars: impl IntoIterator<Item = Var>) -> LinExpr {
    let mut expr = LinExpr::from(1.0);
    expr.add_expr(-1.0, &sum(vars));
    expr
}

/// Adds `expr <= big_m * gate`
fn add_gated_upper(lp: &mut Model, name: &str, expr: LinExpr, big_m: f64, gate: &LinExpr) -> Result<()> {
    let mut lhs = expr;
    lhs.add_expr(-big_m, gate);
    lp.add_constr(name, c!(lhs <= 0))?;
    Ok(())
}

/// Adds `-big_m * gate <= expr <= big_m * gate`, i.e. `expr == 0` whenever `gate` is zero
fn add_gated_equality(
    lp: &mut Model,
    name: &str,
    expr: LinExpr,
    big_m: f64,
    gate: &LinExpr,
) -> Result<()> {
    let mut lower = expr.clone();
    lower.add_expr(big_m, gate);
    add_gated_upper(lp, &format!("{name}+"), expr, big_m, gate)?;
    lp.add_constr(&format!("{name}-"), c!(lower >= 0))?;
    Ok(())
}

/// Route structure: one path per vehicle from its start to the sink
pub fn routing(instance: &Instance, vars: &Variables, lp: &mut Model) -> Result<usize> {
    let before = lp.num_constrs();
    let depot = instance.depot();
    let sink = instance.sink();

    for v in instance.all_vehicles() {
        let start = instance.start_station(v);
        let mut leave_start = LinExpr::new();
        let mut reach_sink = LinExpr::new();
        let mut arc_count = LinExpr::new();
        for &(i, j) in vars.arcs(v) {
            let x = vars.route(i, j, v)?;
            if i == start {
                leave_start.add_term(1.0, x);
            }
            if j == sink {
                reach_sink.add_term(1.0, x);
            }
            arc_count.add_term(1.0, x);
        }
        lp.add_constr(&format!("leave_start[{v}]"), c!(leave_start == 1))?;
        lp.add_constr(&format!("reach_sink[{v}]"), c!(reach_sink == 1))?;
        let max_arcs = (instance.num_stations() - 1) as f64;
        lp.add_constr(&format!("arc_count[{v}]"), c!(arc_count <= max_arcs))?;

        for k in instance.all_origins().filter(|k| *k != start) {
            let mut flow = LinExpr::new();
            let mut inflow = LinExpr::new();
            for &(i, j) in vars.arcs(v) {
                if j == k {
                    flow.add_term(1.0, vars.route(i, j, v)?);
                    inflow.add_term(1.0, vars.route(i, j, v)?);
                } else if i == k {
                    flow.add_term(-1.0, vars.route(i, j, v)?);
                }
            }
            if flow.is_empty() {
                continue;
            }
            lp.add_constr(&format!("flow[{k},{v}]"), c!(flow == 0))?;
            if k == depot && !inflow.is_empty() {
                lp.add_constr(&format!("depot_once[{v}]"), c!(inflow <= 1))?;
            }
        }
    }

    for j in instance.swap_stations() {
        let mut visits = LinExpr::new();
        for v in instance.all_vehicles() {
            for &(from, to) in vars.arcs(v) {
                if to == j {
                    visits.add_term(1.0, vars.route(from, to, v)?);
                }
            }
        }
        if !visits.is_empty() {
            lp.add_constr(&format!("visit_once[{j}]"), c!(visits <= 1))?;
        }
    }

    Ok(lp.num_constrs() - before)
}

/// Arrival times along used arcs, start times and the horizon
pub fn timing(instance: &Instance, vars: &Variables, bigm: &BigM, lp: &mut Model) -> Result<usize> {
    let before = lp.num_constrs();
    let depot = instance.depot();
    let sink = instance.sink();
    let parking = instance.parking_time();
    let handling = instance.handling_time();

    // time spent at swap station i before leaving it: t[i] + P + h * Q[i]
    let departure = |i| -> Result<LinExpr> {
        let mut expr = LinExpr::from(vars.time(i)?);
        expr.add_constant(parking);
        for (_, q) in vars.quantities(i) {
            expr.add_term(handling, q);
        }
        Ok(expr)
    };

    for i in instance.swap_stations() {
        for j in instance.swap_stations().filter(|j| *j != i) {
            let used = instance
                .all_vehicles()
                .filter_map(|v| vars.route(i, j, v).ok())
                .collect::<Vec<_>>();
            if used.is_empty() {
                continue;
            }
            let mut expr = departure(i)?;
            expr.add_constant(instance.driving_time(i, j));
            expr.add_term(-1.0, vars.time(j)?);
            add_gated_upper(lp, &format!("arc_time[{i},{j}]"), expr, bigm.time, &complement(used))?;
        }
    }

    for v in instance.all_vehicles() {
        let depot_time = vars.depot_time(v)?;
        for &(i, j) in vars.arcs(v) {
            let x = vars.route(i, j, v)?;
            if j == depot {
                let mut expr = departure(i)?;
                expr.add_constant(instance.driving_time(i, j));
                expr.add_term(-1.0, depot_time);
                let name = format!("depot_in_time[{i},{v}]");
                add_gated_upper(lp, &name, expr, bigm.time, &complement([x]))?;
            } else if i == depot && j != sink {
                let mut expr = LinExpr::from(depot_time);
                expr.add_constant(parking + instance.driving_time(i, j));
                expr.add_term(-1.0, vars.time(j)?);
                let name = format!("depot_out_time[{j},{v}]");
                add_gated_upper(lp, &name, expr, bigm.time, &complement([x]))?;
            }
        }

        let start = instance.start_station(v);
        let start_time = if start == depot {
            depot_time
        } else {
            vars.time(start)?
        };
        let driving_to_start = instance.vehicle(v).driving_to_start;
        lp.add_constr(&format!("start_time[{v}]"), c!(start_time >= driving_to_start))?;

        let mut horizon = LinExpr::from(depot_time);
        if let Ok(x) = vars.route(depot, sink, v) {
            horizon.add_term(-bigm.horizon, x);
        }
        lp.add_constr(&format!("depot_horizon[{v}]"), c!(horizon <= instance.horizon()))?;

        let mut gate = LinExpr::from(depot_time);
        for &(i, j) in vars.arcs(v).iter().filter(|(i, _)| *i == depot) {
            gate.add_term(-bigm.latest_arrival, vars.route(i, j, v)?);
        }
        lp.add_constr(&format!("depot_time_gate[{v}]"), c!(gate <= 0))?;
    }

    for i in instance.swap_stations() {
        let t = vars.time(i)?;
        let mut horizon = LinExpr::from(t);
        let mut gate = LinExpr::from(t);
        for v in instance.all_vehicles() {
            for &(from, to) in vars.arcs(v).iter().filter(|(from, _)| *from == i) {
                let x = vars.route(from, to, v)?;
                if to == sink {
                    horizon.add_term(-bigm.horizon, x);
                }
                gate.add_term(-bigm.latest_arrival, x);
            }
        }
        lp.add_constr(&format!("horizon[{i}]"), c!(horizon <= instance.horizon()))?;
        lp.add_constr(&format!("time_gate[{i}]"), c!(gate <= 0))?;
    }

    Ok(lp.num_constrs() - before)
}

/// Vehicle loads along used arcs and the quantities they allow
pub fn load(instance: &Instance, vars: &Variables, bigm: &BigM, lp: &mut Model) -> Result<usize> {
    let before = lp.num_constrs();
    let depot = instance.depot();

    for v in instance.all_vehicles() {
        let vehicle = instance.vehicle(v);
        let capacity = f64::from(vehicle.capacity);
        let start_load = vars.load(vehicle.start_station, v)?;
        lp.add_constr(
            &format!("start_load[{v}]"),
            c!(start_load == f64::from(vehicle.init_load)),
        )?;

        for &(i, j) in vars.arcs(v) {
            let x = vars.route(i, j, v)?;
            let arrival_load = vars.load(j, v)?;
            if i == depot {
                // refilled to capacity when leaving the depot
                let mut lhs = LinExpr::from(arrival_load);
                lhs.add_term(-bigm.load, x);
                lp.add_constr(&format!("refill[{j},{v}]"), c!(lhs >= capacity - bigm.load))?;
            } else {
                let mut expr = LinExpr::from(arrival_load);
                expr.add_term(-1.0, vars.load(i, v)?);
                expr.add_term(1.0, vars.quantity(i, v)?);
                let name = format!("load_flow[{i},{j},{v}]");
                add_gated_equality(lp, &name, expr, bigm.load, &complement([x]))?;
            }
        }

        for i in instance.swap_stations() {
            let Ok(q) = vars.quantity(i, v) else {
                continue;
            };
            let mut on_hand = LinExpr::from(q);
            on_hand.add_term(-1.0, vars.load(i, v)?);
            lp.add_constr(&format!("load_on_hand[{i},{v}]"), c!(on_hand <= 0))?;

            let mut gate = LinExpr::from(q);
            for &(from, to) in vars.arcs(v).iter().filter(|(from, _)| *from == i) {
                gate.add_term(-capacity, vars.route(from, to, v)?);
            }
            lp.add_constr(&format!("load_gate[{i},{v}]"), c!(gate <= 0))?;
        }
    }

    Ok(lp.num_constrs() - before)
}

/// Linear inventory trajectories up to the visit
pub fn inventory(instance: &Instance, vars: &Variables, lp: &mut Model) -> Result<usize> {
    let before = lp.num_constrs();

    for i in instance.swap_stations() {
        let station = instance.station(i);
        let t = vars.time(i)?;

        let mut level = LinExpr::from(vars.level(i)?);
        level.add_term(-station.net_rate(), t);
        level.add_term(-station.clip_sign(), vars.clipped(i)?);
        lp.add_constr(&format!("level[{i}]"), c!(level == f64::from(station.init_load)))?;

        if vars.track_flat() {
            let flat_level = vars.flat_level(i)?;
            let mut flat = LinExpr::from(flat_level);
            flat.add_term(-station.incoming_flat_rate, t);
            lp.add_constr(
                &format!("flat_level[{i}]"),
                c!(flat == f64::from(station.init_flat_load)),
            )?;

            let mut supply = sum(vars.quantities(i).map(|(_, q)| q));
            if !supply.is_empty() {
                supply.add_term(-1.0, flat_level);
                lp.add_constr(&format!("flat_supply[{i}]"), c!(supply <= 0))?;
            }
        }
    }

    Ok(lp.num_constrs() - before)
}

/// Horizon inventories for the three regimes (unvisited, visited before, visited after the
/// horizon) and the split of clipped bikes
pub fn regimes(instance: &Instance, vars: &Variables, bigm: &BigM, lp: &mut Model) -> Result<usize> {
    let before = lp.num_constrs();
    let horizon = instance.horizon();
    let sink = instance.sink();

    for i in instance.swap_stations() {
        let station = instance.station(i);
        let capacity = f64::from(station.capacity);
        let net = station.net_rate();
        let sign = station.clip_sign();
        let flat_rate = station.incoming_flat_rate;
        let init_load = f64::from(station.init_load);
        let init_flat = f64::from(station.init_flat_load);

        let t = vars.time(i)?;
        let late = vars.late(i)?;
        let visited = vars.visited(i)?;
        let saturated = vars.saturated(i)?;
        let level = vars.level(i)?;
        let final_level = vars.final_level(i)?;
        let clipped = vars.clipped(i)?;
        let clipped_late = vars.clipped_late(i)?;
        let clipped_final = vars.clipped_final(i)?;
        let exchanged = sum(vars.quantities(i).map(|(_, q)| q));

        let mut departures = Vec::new();
        let mut last_stop = Vec::new();
        for v in instance.all_vehicles() {
            for &(from, to) in vars.arcs(v).iter().filter(|(from, _)| *from == i) {
                let x = vars.route(from, to, v)?;
                departures.push(x);
                if to == sink {
                    last_stop.push(x);
                }
            }
        }

        let mut visit = LinExpr::from(visited);
        visit.add_expr(-1.0, &sum(departures));
        lp.add_constr(&format!("visited[{i}]"), c!(visit == 0))?;

        let mut late_upper = LinExpr::from(t);
        late_upper.add_term(-bigm.horizon, late);
        lp.add_constr(&format!("late_upper[{i}]"), c!(late_upper <= horizon))?;
        let mut late_lower = LinExpr::from(t);
        late_lower.add_term(-horizon, late);
        lp.add_constr(&format!("late_lower[{i}]"), c!(late_lower >= 0))?;
        let mut late_last = LinExpr::from(late);
        late_last.add_expr(-1.0, &sum(last_stop));
        lp.add_constr(&format!("late_last[{i}]"), c!(late_last <= 0))?;

        let unvisited_gate = LinExpr::from(visited);
        let mut before_gate = complement([visited]);
        before_gate.add_term(1.0, late);
        let after_gate = complement([late]);

        // (a) never visited: extrapolate the initial state
        let mut expr = LinExpr::from(final_level);
        expr.add_term(-sign, clipped_final);
        expr.add_constant(-(init_load + net * horizon));
        add_gated_equality(lp, &format!("unvisited[{i}]"), expr, bigm.inventory, &unvisited_gate)?;

        // (b) visited before the horizon: extrapolate the state after the exchange
        let mut expr = LinExpr::from(final_level);
        expr.add_term(-1.0, level);
        expr.add_expr(-1.0, &exchanged);
        expr.add_term(net, t);
        expr.add_term(-sign, clipped_final);
        expr.add_constant(-net * horizon);
        add_gated_equality(lp, &format!("before_horizon[{i}]"), expr, bigm.inventory, &before_gate)?;

        // (c) visited after the horizon: the state at the horizon precedes the visit
        let mut expr = LinExpr::from(level);
        expr.add_term(-1.0, final_level);
        expr.add_term(-net, t);
        expr.add_term(-sign, clipped_late);
        expr.add_constant(net * horizon);
        add_gated_equality(lp, &format!("after_horizon[{i}]"), expr, bigm.inventory, &after_gate)?;

        if vars.track_flat() {
            let flat_level = vars.flat_level(i)?;
            let final_flat_level = vars.final_flat_level(i)?;

            let mut expr = LinExpr::from(final_flat_level);
            expr.add_constant(-(init_flat + flat_rate * horizon));
            add_gated_equality(lp, &format!("unvisited_flat[{i}]"), expr, bigm.flat, &unvisited_gate)?;

            let mut expr = LinExpr::from(final_flat_level);
            expr.add_term(-1.0, flat_level);
            expr.add_expr(1.0, &exchanged);
            expr.add_term(flat_rate, t);
            expr.add_constant(-flat_rate * horizon);
            add_gated_equality(lp, &format!("before_horizon_flat[{i}]"), expr, bigm.flat, &before_gate)?;

            let mut expr = LinExpr::from(flat_level);
            expr.add_term(-1.0, final_flat_level);
            expr.add_term(-flat_rate, t);
            expr.add_constant(flat_rate * horizon);
            add_gated_equality(lp, &format!("after_horizon_flat[{i}]"), expr, bigm.flat, &after_gate)?;
        }

        let mut saturated_late = LinExpr::from(saturated);
        saturated_late.add_term(-1.0, late);
        lp.add_constr(&format!("saturated_late[{i}]"), c!(saturated_late <= 0))?;
        let mut saturated_level = LinExpr::from(final_level);
        if net > 0.0 {
            saturated_level.add_term(-capacity, saturated);
            lp.add_constr(&format!("saturated_level[{i}]"), c!(saturated_level >= 0))?;
        } else {
            saturated_level.add_term(capacity, saturated);
            lp.add_constr(&format!("saturated_level[{i}]"), c!(saturated_level <= capacity))?;
        }

        // clipped bikes before the horizon only remain for stations saturated by then
        let mut split = LinExpr::from(clipped);
        split.add_term(-1.0, clipped_late);
        let mut gate = complement([late]);
        gate.add_term(1.0, saturated);
        add_gated_upper(lp, &format!("clip_split[{i}]"), split, bigm.violation, &gate)?;

        let clip_late_gate = LinExpr::from(clipped_late);
        add_gated_upper(
            lp,
            &format!("clip_late_gate[{i}]"),
            clip_late_gate,
            bigm.violation,
            &LinExpr::from(late),
        )?;
        let mut clip_late_part = LinExpr::from(clipped_late);
        clip_late_part.add_term(-1.0, clipped);
        lp.add_constr(&format!("clip_late_part[{i}]"), c!(clip_late_part <= 0))?;
    }

    Ok(lp.num_constrs() - before)
}

/// Deviation, served demand and per-vehicle slacks used by the objective
pub fn support(instance: &Instance, vars: &Variables, bigm: &BigM, lp: &mut Model) -> Result<usize> {
    let before = lp.num_constrs();
    let horizon = instance.horizon();
    let sink = instance.sink();

    for i in instance.swap_stations() {
        let station = instance.station(i);
        let deviation = vars.deviation(i)?;
        let final_level = vars.final_level(i)?;

        let mut below = LinExpr::from(deviation);
        below.add_term(1.0, final_level);
        lp.add_constr(&format!("deviation_below[{i}]"), c!(below >= station.ideal_state))?;
        let mut above = LinExpr::from(deviation);
        above.add_term(-1.0, final_level);
        lp.add_constr(&format!("deviation_above[{i}]"), c!(above >= -station.ideal_state))?;

        let served = vars.served(i)?;
        let mut by_quantity = LinExpr::from(served);
        by_quantity.add_expr(-1.0, &sum(vars.quantities(i).map(|(_, q)| q)));
        lp.add_constr(&format!("served_quantity[{i}]"), c!(by_quantity <= 0))?;
        let mut by_capacity = LinExpr::from(served);
        by_capacity.add_term(-f64::from(station.capacity), vars.late(i)?);
        lp.add_constr(&format!("served_late[{i}]"), c!(by_capacity <= 0))?;
    }

    for v in instance.all_vehicles() {
        let capacity = f64::from(instance.vehicle(v).capacity);
        let mut slack = LinExpr::from(vars.load_slack(v)?);
        slack.add_term(1.0, vars.load(sink, v)?);
        lp.add_constr(&format!("load_slack[{v}]"), c!(slack == capacity))?;

        let finish_slack = vars.finish_slack(v)?;
        for &(i, j) in vars.arcs(v) {
            if j != sink || !instance.is_swap_station(i) {
                continue;
            }
            let mut expr = LinExpr::from(finish_slack);
            expr.add_term(-1.0, vars.time(i)?);
            expr.add_constant(horizon);
            let mut gate = LinExpr::from(2.0);
            gate.add_term(-1.0, vars.late(i)?);
            gate.add_term(-1.0, vars.route(i, j, v)?);
            add_gated_equality(lp, &format!("finish_slack[{i},{v}]"), expr, bigm.finish, &gate)?;
        }
    }

    Ok(lp.num_constrs() - before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::toy_data;
    use crate::{build, Options};

    fn toy(track_flat: bool) -> crate::Formulation {
        let instance = Instance::new(toy_data()).unwrap();
        build(&instance, &Options { track_flat }).unwrap()
    }

    fn names(lp: &Model) -> Vec<&str> {
        lp.constraints().iter().map(|constr| constr.name()).collect()
    }

    #[test]
    fn counts_cover_model() {
        let formulation = toy(true);
        let counts = formulation.counts();
        assert_eq!(counts.total(), formulation.model().num_constrs());
        // leave_start, reach_sink, arc_count, two flows and two visit_once
        assert_eq!(counts.routing, 7);
        assert_eq!(counts.inventory, 6);
    }

    #[test]
    fn flat_tracking_adds_constraints() {
        let with_flat = toy(true);
        let without_flat = toy(false);
        assert_eq!(without_flat.counts().inventory, 2);
        assert_eq!(
            with_flat.counts().regimes - without_flat.counts().regimes,
            2 * 6
        );
        assert!(!names(without_flat.model()).contains(&"flat_supply[1]"));
    }

    #[test]
    fn gated_equalities_come_in_pairs() {
        let formulation = toy(true);
        let names = names(formulation.model());
        for name in ["unvisited[1]", "before_horizon[2]", "after_horizon_flat[1]", "finish_slack[2,0]"] {
            assert!(names.contains(&format!("{name}+").as_str()), "{name}");
            assert!(names.contains(&format!("{name}-").as_str()), "{name}");
        }
    }

    #[test]
    fn depot_constraints_only_with_depot_arcs() {
        let formulation = toy(true);
        let names = names(formulation.model());
        // the only vehicle starts at the depot and never returns to it
        assert!(!names.iter().any(|name| name.starts_with("depot_once")));
        assert!(!names.iter().any(|name| name.starts_with("depot_in_time")));
        assert!(names.contains(&"depot_out_time[1,0]"));
        assert!(names.contains(&"refill[3,0]"));
    }

    mod rejects {
        use super::*;
        use crate::problem::InstanceData;
        use crate::{Formulation, PlanSketch, Stop};
        use milp::Var;

        fn formulation(data: InstanceData) -> Formulation {
            build(&Instance::new(data).unwrap(), &Options::default()).unwrap()
        }

        /// Feasible values of the sketch with some variables overwritten
        fn perturbed(
            formulation: &Formulation,
            sketch: Vec<Vec<Stop>>,
            changes: &[(Var, f64)],
        ) -> Vec<String> {
            let mut values = formulation.assignment_for(&PlanSketch::new(sketch)).unwrap();
            assert!(formulation.violated_constraints(&values, 1e-6).unwrap().is_empty());
            for &(var, value) in changes {
                values[var.index()] = value;
            }
            formulation
                .violated_constraints(&values, 1e-6)
                .unwrap()
                .iter()
                .map(|constr| constr.name().to_string())
                .collect()
        }

        fn toy_route() -> Vec<Vec<Stop>> {
            vec![vec![Stop::new(2, 3), Stop::new(1, 5)]]
        }

        #[test]
        fn second_visit() {
            let mut data = toy_data();
            data.vehicles.push(data.vehicles[0].clone());
            let formulation = formulation(data);
            let vars = formulation.variables();
            let violated = perturbed(
                &formulation,
                vec![vec![Stop::new(1, 0)], vec![]],
                &[
                    (vars.route(0, 1, 1).unwrap(), 1.0),
                    (vars.route(1, 3, 1).unwrap(), 1.0),
                    (vars.route(0, 3, 1).unwrap(), 0.0),
                ],
            );
            assert!(violated.contains(&"visit_once[1]".to_string()), "{violated:?}");
        }

        #[test]
        fn exchange_beyond_load() {
            let formulation = formulation(toy_data());
            let vars = formulation.variables();
            // seven bikes are on board when reaching station 1
            let violated = perturbed(
                &formulation,
                toy_route(),
                &[(vars.quantity(1, 0).unwrap(), 8.0)],
            );
            assert!(violated.contains(&"load_on_hand[1,0]".to_string()), "{violated:?}");
        }

        #[test]
        fn late_visit_before_last_stop() {
            let formulation = formulation(toy_data());
            let vars = formulation.variables();
            let violated =
                perturbed(&formulation, toy_route(), &[(vars.late(2).unwrap(), 1.0)]);
            assert!(violated.contains(&"late_last[2]".to_string()), "{violated:?}");
        }

        #[test]
        fn unvisited_level_off_trend() {
            let formulation = formulation(toy_data());
            let vars = formulation.variables();
            let violated = perturbed(
                &formulation,
                vec![vec![Stop::new(1, 0)]],
                &[(vars.final_level(2).unwrap(), 15.0)],
            );
            assert!(violated.contains(&"unvisited[2]-".to_string()), "{violated:?}");
            assert!(!violated.contains(&"unvisited[2]+".to_string()), "{violated:?}");
        }

        #[test]
        fn arrival_before_driving_time() {
            let formulation = formulation(toy_data());
            let vars = formulation.variables();
            // station 2 is left at 12 and station 1 is four minutes away
            let violated =
                perturbed(&formulation, toy_route(), &[(vars.time(1).unwrap(), 10.0)]);
            assert!(violated.contains(&"arc_time[2,1]".to_string()), "{violated:?}");
        }
    }

    #[test]
    fn gate_releases_expression() {
        let mut lp = Model::new("gate");
        let x = lp.add_var("x", milp::VarType::Continuous, 0.0, 10.0).unwrap();
        let y = lp.add_var("y", milp::VarType::Binary, 0.0, 1.0).unwrap();
        add_gated_equality(&mut lp, "gated", LinExpr::from(x), 10.0, &LinExpr::from(y)).unwrap();
        assert!(lp.violated_constraints(&[0.0, 0.0], 1e-9).unwrap().is_empty());
        assert_eq!(lp.violated_constraints(&[3.0, 0.0], 1e-9).unwrap().len(), 1);
        assert!(lp.violated_constraints(&[3.0, 1.0], 1e-9).unwrap().is_empty());
    }
}
