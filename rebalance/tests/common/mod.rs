#![allow(dead_code)]

use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::Rng;
use rebalance::{
    DrivingTimes, Formulation, Instance, InstanceData, Position, Station, Stop, Vehicle, Weights,
};

/// Depot, two swap stations and the sink with one vehicle starting at the depot
pub fn toy() -> InstanceData {
    let station = |capacity, ideal_state, init_load, rates: (f64, f64, f64)| Station {
        capacity,
        ideal_state,
        init_load,
        init_flat_load: 4,
        incoming_rate: rates.0,
        demand: rates.1,
        incoming_flat_rate: rates.2,
        position: None,
    };
    InstanceData {
        stations: vec![
            station(0, 0.0, 0, (0.0, 0.0, 0.0)),
            station(20, 10.0, 5, (0.1, 0.3, 0.05)),
            station(20, 8.0, 12, (0.4, 0.1, 0.02)),
            station(0, 0.0, 0, (0.0, 0.0, 0.0)),
        ],
        vehicles: vec![Vehicle {
            capacity: 10,
            start_station: 0,
            init_load: 10,
            driving_to_start: 0.0,
        }],
        driving_times: DrivingTimes::new(vec![
            vec![0.0, 10.0, 12.0, 5.0],
            vec![10.0, 0.0, 4.0, 8.0],
            vec![12.0, 4.0, 0.0, 9.0],
            vec![5.0, 8.0, 9.0, 0.0],
        ]),
        time_horizon: 60.0,
        parking_time: 0.0,
        handling_time: 0.0,
        weights: Weights::default(),
    }
}

/// Random instance with up to seven swap stations and three vehicles
pub fn random_instance<R: Rng>(rng: &mut R) -> Instance {
    let num_swap = rng.gen_range(3..=7);
    let num_stations = num_swap + 2;
    let coordinate = Uniform::new(0.0, 50.0);
    let positions = (0..num_stations)
        .map(|_| Position::new(coordinate.sample(rng), coordinate.sample(rng)))
        .collect::<Vec<_>>();

    let mut stations = Vec::with_capacity(num_stations);
    for i in 0..num_stations {
        if i == 0 || i == num_stations - 1 {
            stations.push(Station {
                capacity: 0,
                ideal_state: 0.0,
                init_load: 0,
                init_flat_load: 0,
                incoming_rate: 0.0,
                demand: 0.0,
                incoming_flat_rate: 0.0,
                position: Some(positions[i]),
            });
            continue;
        }
        let capacity = rng.gen_range(5..=30);
        stations.push(Station {
            capacity,
            ideal_state: rng.gen_range(0.0..=f64::from(capacity)),
            init_load: rng.gen_range(0..=capacity),
            init_flat_load: rng.gen_range(0..=capacity),
            incoming_rate: rng.gen_range(0.0..0.5),
            demand: rng.gen_range(0.0..0.5),
            incoming_flat_rate: rng.gen_range(0.0..0.1),
            position: Some(positions[i]),
        });
    }

    let matrix = positions
        .iter()
        .enumerate()
        .map(|(i, from)| {
            positions
                .iter()
                .enumerate()
                .map(|(j, to)| {
                    if i == j {
                        0.0
                    } else {
                        from.distance(to).round().max(1.0)
                    }
                })
                .collect()
        })
        .collect();

    let mut swap_starts = (1..=num_swap).collect::<Vec<_>>();
    swap_starts.shuffle(rng);
    let vehicles = (0..rng.gen_range(1..=3))
        .map(|v| {
            let capacity = rng.gen_range(5..=15);
            let start_station = if v > 0 && rng.gen_bool(0.5) {
                swap_starts.pop().unwrap_or(0)
            } else {
                0
            };
            Vehicle {
                capacity,
                start_station,
                init_load: rng.gen_range(0..=capacity),
                driving_to_start: rng.gen_range(0.0..10.0),
            }
        })
        .collect();

    let data = InstanceData {
        stations,
        vehicles,
        driving_times: DrivingTimes::new(matrix),
        time_horizon: rng.gen_range(30.0..120.0),
        parking_time: if rng.gen_bool(0.5) { 1.0 } else { 0.0 },
        handling_time: if rng.gen_bool(0.5) { 0.5 } else { 0.0 },
        weights: Weights::default(),
    };
    Instance::new(data).unwrap()
}

/// Random routes over the free swap stations, with depot revisits for vehicles starting
/// elsewhere
pub fn random_routes<R: Rng>(rng: &mut R, instance: &Instance) -> Vec<Vec<Stop>> {
    let mut free = instance
        .swap_stations()
        .filter(|i| instance.vehicle_starting_at(*i).is_none())
        .collect::<Vec<_>>();
    free.shuffle(rng);

    let mut routes = vec![Vec::new(); instance.num_vehicles()];
    for i in free {
        if rng.gen_bool(0.3) {
            continue;
        }
        let v = rng.gen_range(0..instance.num_vehicles());
        routes[v].push(Stop::new(i, rng.gen_range(0..=8)));
    }
    for (v, stops) in routes.iter_mut().enumerate() {
        if instance.start_station(v) != instance.depot() && !stops.is_empty() && rng.gen_bool(0.5)
        {
            let position = rng.gen_range(0..stops.len());
            stops.insert(position, Stop::new(instance.depot(), 0));
        }
    }
    routes
}

/// Cuts every route after its first stop past the horizon
///
/// A depot stop past the horizon is dropped together with everything after it, and so is a
/// depot stop that would end the route.
pub fn truncate_at_horizon(formulation: &Formulation, values: &[f64], routes: &mut [Vec<Stop>]) {
    let instance = formulation.instance();
    let vars = formulation.variables();
    for (v, stops) in routes.iter_mut().enumerate() {
        let arrival = |stop: &Stop| {
            let var = if stop.station == instance.depot() {
                vars.depot_time(v)
            } else {
                vars.time(stop.station)
            };
            values[var.unwrap().index()]
        };
        if let Some(k) = stops
            .iter()
            .position(|stop| arrival(stop) > instance.horizon())
        {
            let keep = if stops[k].station == instance.depot() {
                k
            } else {
                k + 1
            };
            stops.truncate(keep);
        }
        if stops.last().map(|stop| stop.station) == Some(instance.depot()) {
            stops.pop();
        }
    }
}
