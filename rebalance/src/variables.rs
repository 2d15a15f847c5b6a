use crate::bounds::BigM;
use crate::error::{MissingVariable, ModelBuildError};
use crate::problem::{Instance, StationId, VehicleId};
use crate::Options;
use milp::{Model, Var, VarType};

/// Returns whether vehicle `v` may drive from `i` to `j`
///
/// Routes leave the vehicle's start, never return to it, and end in the sink. A swap station
/// that is some vehicle's start is served by that vehicle only. The direct depot-sink arc is
/// reserved for vehicles starting at the depot.
pub fn is_arc(instance: &Instance, i: StationId, j: StationId, v: VehicleId) -> bool {
    let start = instance.start_station(v);
    let depot = instance.depot();
    let sink = instance.sink();
    if i == j || i >= sink || j > sink || j == start {
        return false;
    }
    if instance.vehicle_starting_at(j).is_some() {
        return false;
    }
    if matches!(instance.vehicle_starting_at(i), Some(owner) if owner != v) {
        return false;
    }
    if i == depot && j == sink {
        return start == depot;
    }
    true
}

/// All decision variables of one formulation, addressed by station and vehicle indices
#[derive(Debug, Clone)]
pub struct Variables {
    num_stations: usize,
    num_vehicles: usize,
    track_flat: bool,
    arcs: Vec<Vec<(StationId, StationId)>>,
    route: Vec<Option<Var>>,
    time: Vec<Option<Var>>,
    depot_time: Vec<Option<Var>>,
    quantity: Vec<Option<Var>>,
    load: Vec<Option<Var>>,
    level: Vec<Option<Var>>,
    flat_level: Vec<Option<Var>>,
    final_level: Vec<Option<Var>>,
    final_flat_level: Vec<Option<Var>>,
    clipped: Vec<Option<Var>>,
    clipped_late: Vec<Option<Var>>,
    clipped_final: Vec<Option<Var>>,
    late: Vec<Option<Var>>,
    visited: Vec<Option<Var>>,
    saturated: Vec<Option<Var>>,
    deviation: Vec<Option<Var>>,
    served: Vec<Option<Var>>,
    finish_slack: Vec<Option<Var>>,
    load_slack: Vec<Option<Var>>,
}

fn lookup(
    family: &'static str,
    vars: &[Option<Var>],
    index: Option<usize>,
    key: &[usize],
) -> Result<Var, MissingVariable> {
    index
        .and_then(|index| vars.get(index).copied().flatten())
        .ok_or_else(|| MissingVariable {
            family,
            key: key.to_vec(),
        })
}

#[allow(clippy::many_single_char_names)]
impl Variables {
    pub fn new(
        instance: &Instance,
        bigm: &BigM,
        options: &Options,
        lp: &mut Model,
    ) -> Result<Self, ModelBuildError> {
        let n = instance.num_stations();
        let num_vehicles = instance.num_vehicles();
        let horizon = instance.horizon();
        let mut vars = Variables {
            num_stations: n,
            num_vehicles,
            track_flat: options.track_flat,
            arcs: vec![Vec::new(); num_vehicles],
            route: vec![None; num_vehicles * n * n],
            time: vec![None; n],
            depot_time: vec![None; num_vehicles],
            quantity: vec![None; num_vehicles * n],
            load: vec![None; num_vehicles * n],
            level: vec![None; n],
            flat_level: vec![None; n],
            final_level: vec![None; n],
            final_flat_level: vec![None; n],
            clipped: vec![None; n],
            clipped_late: vec![None; n],
            clipped_final: vec![None; n],
            late: vec![None; n],
            visited: vec![None; n],
            saturated: vec![None; n],
            deviation: vec![None; n],
            served: vec![None; n],
            finish_slack: vec![None; num_vehicles],
            load_slack: vec![None; num_vehicles],
        };

        // route variables
        for v in instance.all_vehicles() {
            for i in instance.all_origins() {
                for j in instance.all_stations() {
                    if is_arc(instance, i, j, v) {
                        let var = lp.add_var(&format!("x[{i},{j},{v}]"), VarType::Binary, 0.0, 1.0)?;
                        vars.route[(v * n + i) * n + j] = Some(var);
                        vars.arcs[v].push((i, j));
                    }
                }
            }
        }

        // vehicle variables
        for v in instance.all_vehicles() {
            let capacity = f64::from(instance.vehicle(v).capacity);
            vars.depot_time[v] = Some(lp.add_var(
                &format!("tD[{v}]"),
                VarType::Continuous,
                0.0,
                bigm.latest_arrival,
            )?);
            for i in instance.all_stations() {
                vars.load[v * n + i] = Some(lp.add_var(
                    &format!("lV[{i},{v}]"),
                    VarType::Integer,
                    0.0,
                    capacity,
                )?);
                if instance.is_swap_station(i) && vars.arcs[v].iter().any(|(from, _)| *from == i) {
                    vars.quantity[v * n + i] = Some(lp.add_var(
                        &format!("q[{i},{v}]"),
                        VarType::Integer,
                        0.0,
                        capacity,
                    )?);
                }
            }
            vars.finish_slack[v] = Some(lp.add_var(
                &format!("tf[{v}]"),
                VarType::Continuous,
                0.0,
                bigm.horizon,
            )?);
            vars.load_slack[v] = Some(lp.add_var(
                &format!("sV[{v}]"),
                VarType::Continuous,
                0.0,
                capacity,
            )?);
        }

        // station variables
        let max_vehicle_capacity = instance.max_vehicle_capacity();
        for i in instance.swap_stations() {
            let station = instance.station(i);
            let capacity = f64::from(station.capacity);
            let rate = station.net_rate().abs();
            let mut add = |name: &str, vtype, ub: f64| lp.add_var(&format!("{name}[{i}]"), vtype, 0.0, ub);

            vars.time[i] = Some(add("t", VarType::Continuous, bigm.latest_arrival)?);
            vars.level[i] = Some(add("lB", VarType::Continuous, capacity)?);
            vars.final_level[i] = Some(add("sB", VarType::Continuous, capacity)?);
            vars.clipped[i] = Some(add("vS", VarType::Continuous, rate * bigm.latest_arrival)?);
            vars.clipped_late[i] = Some(add("vSF", VarType::Continuous, rate * bigm.latest_arrival)?);
            vars.clipped_final[i] = Some(add(
                "vSf",
                VarType::Continuous,
                max_vehicle_capacity + rate * horizon,
            )?);
            vars.late[i] = Some(add("delta", VarType::Binary, 1.0)?);
            vars.visited[i] = Some(add("gamma", VarType::Binary, 1.0)?);
            vars.saturated[i] = Some(add("omega", VarType::Binary, 1.0)?);
            vars.deviation[i] = Some(add("d", VarType::Continuous, station.ideal_state.max(capacity))?);
            vars.served[i] = Some(add("rD", VarType::Continuous, capacity)?);

            if options.track_flat {
                let flat = f64::from(station.init_flat_load);
                vars.flat_level[i] = Some(add(
                    "lF",
                    VarType::Continuous,
                    flat + station.incoming_flat_rate * bigm.latest_arrival,
                )?);
                vars.final_flat_level[i] = Some(add(
                    "sF",
                    VarType::Continuous,
                    flat + station.incoming_flat_rate * horizon,
                )?);
            }
        }

        Ok(vars)
    }

    pub fn num_stations(&self) -> usize {
        self.num_stations
    }

    pub fn num_vehicles(&self) -> usize {
        self.num_vehicles
    }

    pub fn track_flat(&self) -> bool {
        self.track_flat
    }

    /// Arcs of vehicle `v` in creation order (by origin, then destination)
    pub fn arcs(&self, v: VehicleId) -> &[(StationId, StationId)] {
        self.arcs.get(v).map(Vec::as_slice).unwrap_or(&[])
    }

    fn station_index(&self, i: StationId) -> Option<usize> {
        (i < self.num_stations).then_some(i)
    }

    fn vehicle_index(&self, v: VehicleId) -> Option<usize> {
        (v < self.num_vehicles).then_some(v)
    }

    fn station_vehicle_index(&self, i: StationId, v: VehicleId) -> Option<usize> {
        (i < self.num_stations && v < self.num_vehicles).then(|| v * self.num_stations + i)
    }

    /// `x[i,j,v]`: vehicle `v` drives from `i` to `j`
    pub fn route(&self, i: StationId, j: StationId, v: VehicleId) -> Result<Var, MissingVariable> {
        let n = self.num_stations;
        let index = (i < n && j < n && v < self.num_vehicles).then(|| (v * n + i) * n + j);
        lookup("x", &self.route, index, &[i, j, v])
    }

    /// `t[i]`: arrival time at swap station `i`
    pub fn time(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("t", &self.time, self.station_index(i), &[i])
    }

    /// `tD[v]`: time of vehicle `v` at the depot
    pub fn depot_time(&self, v: VehicleId) -> Result<Var, MissingVariable> {
        lookup("tD", &self.depot_time, self.vehicle_index(v), &[v])
    }

    /// `q[i,v]`: bikes exchanged by vehicle `v` at swap station `i`
    pub fn quantity(&self, i: StationId, v: VehicleId) -> Result<Var, MissingVariable> {
        let index = self.station_vehicle_index(i, v);
        lookup("q", &self.quantity, index, &[i, v])
    }

    /// `lV[i,v]`: load of vehicle `v` on arrival at `i`
    pub fn load(&self, i: StationId, v: VehicleId) -> Result<Var, MissingVariable> {
        let index = self.station_vehicle_index(i, v);
        lookup("lV", &self.load, index, &[i, v])
    }

    /// `lB[i]`: serviceable bikes at the visit
    pub fn level(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("lB", &self.level, self.station_index(i), &[i])
    }

    /// `lF[i]`: flat bikes at the visit
    pub fn flat_level(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("lF", &self.flat_level, self.station_index(i), &[i])
    }

    /// `sB[i]`: serviceable bikes at the horizon
    pub fn final_level(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("sB", &self.final_level, self.station_index(i), &[i])
    }

    /// `sF[i]`: flat bikes at the horizon
    pub fn final_flat_level(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("sF", &self.final_flat_level, self.station_index(i), &[i])
    }

    /// `vS[i]`: bikes clipped at the docks before the visit
    pub fn clipped(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("vS", &self.clipped, self.station_index(i), &[i])
    }

    /// `vSF[i]`: part of `vS[i]` clipped after the horizon
    pub fn clipped_late(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("vSF", &self.clipped_late, self.station_index(i), &[i])
    }

    /// `vSf[i]`: bikes clipped between the visit (or the start) and the horizon
    pub fn clipped_final(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("vSf", &self.clipped_final, self.station_index(i), &[i])
    }

    /// `delta[i]`: the visit happens after the horizon
    ///
    /// The model forces `delta = 1` only for `t > H`. A visit at exactly `t = H` admits both
    /// values; sketches and the decoder treat it as a visit before the horizon, which keeps
    /// the route open.
    pub fn late(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("delta", &self.late, self.station_index(i), &[i])
    }

    /// `gamma[i]`: some vehicle visits the station
    pub fn visited(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("gamma", &self.visited, self.station_index(i), &[i])
    }

    /// `omega[i]`: the station is saturated (full or empty) at the horizon
    pub fn saturated(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("omega", &self.saturated, self.station_index(i), &[i])
    }

    /// `d[i]`: deviation from the ideal state at the horizon
    pub fn deviation(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("d", &self.deviation, self.station_index(i), &[i])
    }

    /// `rD[i]`: demand served by a visit after the horizon
    pub fn served(&self, i: StationId) -> Result<Var, MissingVariable> {
        lookup("rD", &self.served, self.station_index(i), &[i])
    }

    /// `tf[v]`: how far past the horizon vehicle `v` serves its last station
    pub fn finish_slack(&self, v: VehicleId) -> Result<Var, MissingVariable> {
        lookup("tf", &self.finish_slack, self.vehicle_index(v), &[v])
    }

    /// `sV[v]`: free capacity of vehicle `v` at the sink
    pub fn load_slack(&self, v: VehicleId) -> Result<Var, MissingVariable> {
        lookup("sV", &self.load_slack, self.vehicle_index(v), &[v])
    }

    /// Exchange variables of all vehicles able to serve `i`
    pub fn quantities(&self, i: StationId) -> impl Iterator<Item = (VehicleId, Var)> + '_ {
        (0..self.num_vehicles).filter_map(move |v| self.quantity(i, v).ok().map(|var| (v, var)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::toy_data;
    use crate::problem::InstanceData;

    fn build(data: InstanceData, track_flat: bool) -> (Instance, Model, Variables) {
        let instance = Instance::new(data).unwrap();
        let bigm = BigM::new(&instance).unwrap();
        let mut lp = Model::new("test");
        let vars = Variables::new(&instance, &bigm, &Options { track_flat }, &mut lp).unwrap();
        (instance, lp, vars)
    }

    mod arcs {
        use super::*;

        #[test]
        fn depot_start_has_shortcut_but_no_return() {
            let (_, _, vars) = build(toy_data(), true);
            assert_eq!(
                vars.arcs(0),
                &[(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 1), (2, 3)]
            );
            assert!(vars.route(1, 0, 0).is_err());
            assert!(vars.route(0, 3, 0).is_ok());
        }

        #[test]
        fn swap_start_may_revisit_depot() {
            let mut data = toy_data();
            data.vehicles[0].start_station = 2;
            let (instance, _, vars) = build(data, true);
            assert!(is_arc(&instance, 2, 0, 0));
            assert!(is_arc(&instance, 0, 1, 0));
            assert!(!is_arc(&instance, 0, 3, 0));
            assert!(!is_arc(&instance, 1, 2, 0));
            assert_eq!(vars.arcs(0), &[(0, 1), (1, 0), (1, 3), (2, 0), (2, 1), (2, 3)]);
        }

        #[test]
        fn other_vehicles_stay_away_from_swap_starts() {
            let mut data = toy_data();
            let mut second = data.vehicles[0].clone();
            second.start_station = 1;
            data.vehicles.push(second);
            let (instance, _, vars) = build(data, true);
            assert!(!is_arc(&instance, 0, 1, 0));
            assert!(!is_arc(&instance, 1, 2, 0));
            assert!(is_arc(&instance, 1, 2, 1));
            assert!(vars.quantity(1, 0).is_err());
            assert!(vars.quantity(1, 1).is_ok());
            assert!(vars.quantity(2, 0).is_ok());
        }
    }

    mod families {
        use super::*;

        #[test]
        fn reports_missing_variables_by_key() {
            let (_, _, vars) = build(toy_data(), true);
            assert_eq!(
                vars.time(0),
                Err(MissingVariable {
                    family: "t",
                    key: vec![0]
                })
            );
            assert!(vars.time(3).is_err());
            assert!(vars.time(1).is_ok());
            assert!(vars.route(0, 1, 7).is_err());
            assert!(vars.load(3, 0).is_ok());
            assert!(vars.load(4, 0).is_err());
        }

        #[test]
        fn flat_track_is_optional() {
            let (_, with_flat, vars) = build(toy_data(), true);
            assert!(vars.flat_level(1).is_ok());
            assert!(vars.final_flat_level(2).is_ok());

            let (_, without_flat, vars) = build(toy_data(), false);
            assert!(vars.flat_level(1).is_err());
            assert!(vars.final_flat_level(2).is_err());
            assert!(vars.clipped_final(2).is_ok());
            assert_eq!(with_flat.num_vars(), without_flat.num_vars() + 4);
        }

        #[test]
        fn names_follow_family_and_key() {
            let (_, lp, vars) = build(toy_data(), true);
            assert_eq!(lp.var_name(vars.route(1, 3, 0).unwrap()), Some("x[1,3,0]"));
            assert_eq!(lp.var_name(vars.quantity(2, 0).unwrap()), Some("q[2,0]"));
            assert_eq!(lp.var_name(vars.late(2).unwrap()), Some("delta[2]"));
            assert_eq!(lp.var_name(vars.depot_time(0).unwrap()), Some("tD[0]"));
        }

        #[test]
        fn bounds_follow_capacities() {
            let (instance, lp, vars) = build(toy_data(), true);
            let bigm = BigM::new(&instance).unwrap();
            let info = |var| lp.var(var).unwrap().clone();
            assert_eq!(info(vars.final_level(1).unwrap()).ub, 20.0);
            assert_eq!(info(vars.load(2, 0).unwrap()).ub, 10.0);
            assert_eq!(info(vars.load(2, 0).unwrap()).vtype, VarType::Integer);
            assert_eq!(info(vars.time(1).unwrap()).ub, bigm.latest_arrival);
            assert_eq!(info(vars.finish_slack(0).unwrap()).ub, bigm.horizon);
        }
    }
}
