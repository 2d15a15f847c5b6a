use crate::error::{InstanceError, LookupError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type StationId = usize;
pub type VehicleId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Position {
        Position { x, y }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        let xdist = self.x - other.x;
        let ydist = self.y - other.y;
        f64::sqrt(xdist * xdist + ydist * ydist)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Service estimating how long it takes to drive between two positions
pub trait TravelTimeLookup {
    fn duration(&self, from: &Position, to: &Position) -> Result<f64, LookupError>;
}

/// Rounded Euclidean distance divided by a constant speed
#[derive(Debug, Clone, Copy)]
pub struct EuclideanLookup {
    pub speed: f64,
}

impl TravelTimeLookup for EuclideanLookup {
    fn duration(&self, from: &Position, to: &Position) -> Result<f64, LookupError> {
        if self.speed.is_finite() && self.speed > 0.0 {
            Ok(from.distance(to).round() / self.speed)
        } else {
            Err(LookupError(format!("invalid speed {}", self.speed)))
        }
    }
}

/// Square matrix of driving times between stations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrivingTimes(Vec<Vec<f64>>);

impl DrivingTimes {
    pub fn new(matrix: Vec<Vec<f64>>) -> Self {
        DrivingTimes(matrix)
    }

    /// Queries the lookup for every ordered pair of distinct positions
    pub fn from_lookup<L: TravelTimeLookup + ?Sized>(
        positions: &[Position],
        lookup: &L,
    ) -> Result<Self, InstanceError> {
        let mut matrix = vec![vec![0.0; positions.len()]; positions.len()];
        for (i, from) in positions.iter().enumerate() {
            for (j, to) in positions.iter().enumerate() {
                if i != j {
                    matrix[i][j] = lookup
                        .duration(from, to)
                        .map_err(|source| InstanceError::TravelTime {
                            from: i,
                            to: j,
                            source,
                        })?;
                }
            }
        }
        Ok(DrivingTimes(matrix))
    }

    pub fn get(&self, i: StationId, j: StationId) -> f64 {
        self.0[i][j]
    }

    pub fn max(&self) -> f64 {
        self.0.iter().flatten().copied().fold(0.0, f64::max)
    }

    fn validate(&self, num_stations: usize) -> Result<(), InstanceError> {
        if self.0.len() != num_stations {
            return Err(InstanceError::MatrixRows {
                rows: self.0.len(),
                expected: num_stations,
            });
        }
        for (row, entries) in self.0.iter().enumerate() {
            if entries.len() != num_stations {
                return Err(InstanceError::MatrixColumns {
                    row,
                    len: entries.len(),
                    expected: num_stations,
                });
            }
            for (col, value) in entries.iter().enumerate() {
                if !value.is_finite() || *value < 0.0 {
                    return Err(InstanceError::DrivingTime {
                        from: row,
                        to: col,
                        value: *value,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub capacity: u32,
    pub ideal_state: f64,
    /// Serviceable bikes at the start of the horizon
    pub init_load: u32,
    /// Unserviceable ("flat") bikes at the start of the horizon
    pub init_flat_load: u32,
    pub incoming_rate: f64,
    pub demand: f64,
    pub incoming_flat_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Station {
    /// Returns the change of serviceable bikes per time unit
    pub fn net_rate(&self) -> f64 {
        self.incoming_rate - self.demand
    }

    /// Returns the sign with which clipped bikes enter the inventory balance
    ///
    /// A filling station (positive net rate) turns surplus bikes away (-1), a draining one
    /// fails to serve demand once empty (+1).
    pub fn clip_sign(&self) -> f64 {
        if self.net_rate() > 0.0 {
            -1.0
        } else {
            1.0
        }
    }

    /// Returns the serviceable level reached from `level` after `duration` without visits,
    /// clipped to the docks, together with the amount clipped
    pub fn drift(&self, level: f64, duration: f64) -> (f64, f64) {
        let natural = level + self.net_rate() * duration;
        let capacity = f64::from(self.capacity);
        if self.net_rate() > 0.0 {
            if natural > capacity {
                (capacity, natural - capacity)
            } else {
                (natural, 0.0)
            }
        } else if natural < 0.0 {
            (0.0, -natural)
        } else {
            (natural, 0.0)
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capacity {}, ideal {}, levels {}+{} flat, rates +{} -{} +{} flat",
            self.capacity,
            self.ideal_state,
            self.init_load,
            self.init_flat_load,
            self.incoming_rate,
            self.demand,
            self.incoming_flat_rate
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub capacity: u32,
    pub start_station: StationId,
    pub init_load: u32,
    /// Time needed to reach the start station before the horizon begins
    pub driving_to_start: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(rename = "w_violation")]
    pub violation: f64,
    #[serde(rename = "w_dev_obj")]
    pub deviation: f64,
    #[serde(rename = "w_reward")]
    pub reward: f64,
    #[serde(rename = "w_dev_reward")]
    pub deviation_reward: f64,
    #[serde(rename = "w_driving_times")]
    pub driving_times: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            violation: 1.0,
            deviation: 1.0,
            reward: 1.0,
            deviation_reward: 1.0,
            driving_times: 1.0,
        }
    }
}

/// Instance data exactly as handed over by a data provider, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceData {
    pub stations: Vec<Station>,
    pub vehicles: Vec<Vehicle>,
    pub driving_times: DrivingTimes,
    pub time_horizon: f64,
    pub parking_time: f64,
    pub handling_time: f64,
    #[serde(default)]
    pub weights: Weights,
}

/// Validated, immutable problem instance
///
/// Station 0 is the depot all vehicles may start from, the last station is the sink every
/// route ends in, and all stations in between are swap stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "InstanceData", into = "InstanceData")]
pub struct Instance {
    data: InstanceData,
}

impl TryFrom<InstanceData> for Instance {
    type Error = InstanceError;

    fn try_from(data: InstanceData) -> Result<Self, Self::Error> {
        Instance::new(data)
    }
}

impl From<Instance> for InstanceData {
    fn from(instance: Instance) -> Self {
        instance.data
    }
}

fn check_parameter(
    field: &'static str,
    value: f64,
    positive: bool,
) -> Result<(), InstanceError> {
    let ok = value.is_finite() && if positive { value > 0.0 } else { value >= 0.0 };
    if ok {
        Ok(())
    } else {
        Err(InstanceError::Parameter {
            field,
            value,
            expected: if positive { "positive" } else { "non-negative" },
        })
    }
}

impl Instance {
    pub fn new(data: InstanceData) -> Result<Instance, InstanceError> {
        let num_stations = data.stations.len();
        if num_stations < 3 {
            return Err(InstanceError::TooFewStations(num_stations));
        }
        if data.vehicles.is_empty() {
            return Err(InstanceError::NoVehicles);
        }
        data.driving_times.validate(num_stations)?;

        check_parameter("time_horizon", data.time_horizon, true)?;
        check_parameter("parking_time", data.parking_time, false)?;
        check_parameter("handling_time", data.handling_time, false)?;
        check_parameter("w_violation", data.weights.violation, false)?;
        check_parameter("w_dev_obj", data.weights.deviation, false)?;
        check_parameter("w_reward", data.weights.reward, false)?;
        check_parameter("w_dev_reward", data.weights.deviation_reward, false)?;
        check_parameter("w_driving_times", data.weights.driving_times, false)?;

        let sink = num_stations - 1;
        for (index, station) in data.stations.iter().enumerate() {
            let values = [
                ("ideal_state", station.ideal_state),
                ("incoming_rate", station.incoming_rate),
                ("demand", station.demand),
                ("incoming_flat_rate", station.incoming_flat_rate),
            ];
            for (field, value) in values {
                if !value.is_finite() || value < 0.0 {
                    return Err(InstanceError::StationValue {
                        station: index,
                        field,
                        value,
                    });
                }
            }
            if index != 0 && index != sink {
                if station.init_load > station.capacity {
                    return Err(InstanceError::StationOverfull {
                        station: index,
                        field: "load",
                        value: station.init_load,
                        capacity: station.capacity,
                    });
                }
                if station.init_flat_load > station.capacity {
                    return Err(InstanceError::StationOverfull {
                        station: index,
                        field: "flat load",
                        value: station.init_flat_load,
                        capacity: station.capacity,
                    });
                }
            }
        }

        let mut starts: HashMap<StationId, VehicleId> = HashMap::new();
        for (index, vehicle) in data.vehicles.iter().enumerate() {
            if vehicle.init_load > vehicle.capacity {
                return Err(InstanceError::VehicleOverloaded {
                    vehicle: index,
                    load: vehicle.init_load,
                    capacity: vehicle.capacity,
                });
            }
            if vehicle.start_station >= sink {
                return Err(InstanceError::StartStation {
                    vehicle: index,
                    station: vehicle.start_station,
                });
            }
            if !vehicle.driving_to_start.is_finite() || vehicle.driving_to_start < 0.0 {
                return Err(InstanceError::DrivingToStart {
                    vehicle: index,
                    value: vehicle.driving_to_start,
                });
            }
            if vehicle.start_station != 0 {
                if let Some(first) = starts.insert(vehicle.start_station, index) {
                    return Err(InstanceError::SharedStart {
                        first,
                        second: index,
                        station: vehicle.start_station,
                    });
                }
            }
        }

        Ok(Instance { data })
    }

    /// Builds an instance whose driving times come from a lookup service
    ///
    /// Every station needs a position; a failing lookup aborts construction.
    pub fn with_lookup<L: TravelTimeLookup + ?Sized>(
        mut data: InstanceData,
        lookup: &L,
    ) -> Result<Instance, InstanceError> {
        let positions = data
            .stations
            .iter()
            .filter_map(|station| station.position)
            .collect::<Vec<_>>();
        if positions.len() != data.stations.len() {
            return Err(InstanceError::Positions {
                positions: positions.len(),
                stations: data.stations.len(),
            });
        }
        data.driving_times = DrivingTimes::from_lookup(&positions, lookup)?;
        Instance::new(data)
    }

    pub fn data(&self) -> &InstanceData {
        &self.data
    }

    pub fn num_stations(&self) -> usize {
        self.data.stations.len()
    }

    pub fn num_vehicles(&self) -> usize {
        self.data.vehicles.len()
    }

    pub fn depot(&self) -> StationId {
        0
    }

    pub fn sink(&self) -> StationId {
        self.num_stations() - 1
    }

    pub fn is_swap_station(&self, i: StationId) -> bool {
        i != self.depot() && i < self.sink()
    }

    pub fn station(&self, i: StationId) -> &Station {
        &self.data.stations[i]
    }

    pub fn vehicle(&self, v: VehicleId) -> &Vehicle {
        &self.data.vehicles[v]
    }

    pub fn driving_time(&self, i: StationId, j: StationId) -> f64 {
        self.data.driving_times.get(i, j)
    }

    pub fn driving_times(&self) -> &DrivingTimes {
        &self.data.driving_times
    }

    pub fn horizon(&self) -> f64 {
        self.data.time_horizon
    }

    pub fn parking_time(&self) -> f64 {
        self.data.parking_time
    }

    pub fn handling_time(&self) -> f64 {
        self.data.handling_time
    }

    pub fn weights(&self) -> &Weights {
        &self.data.weights
    }

    pub fn start_station(&self, v: VehicleId) -> StationId {
        self.vehicle(v).start_station
    }

    /// Returns the vehicle starting at swap station `i`, if any
    pub fn vehicle_starting_at(&self, i: StationId) -> Option<VehicleId> {
        if !self.is_swap_station(i) {
            return None;
        }
        self.all_vehicles().find(|v| self.start_station(*v) == i)
    }

    pub fn all_stations(&self) -> impl Iterator<Item = StationId> {
        0..self.num_stations()
    }

    /// All stations a route can leave from (everything but the sink)
    pub fn all_origins(&self) -> impl Iterator<Item = StationId> {
        0..self.sink()
    }

    pub fn swap_stations(&self) -> impl Iterator<Item = StationId> {
        1..self.sink()
    }

    pub fn all_vehicles(&self) -> impl Iterator<Item = VehicleId> {
        0..self.num_vehicles()
    }

    pub fn max_vehicle_capacity(&self) -> f64 {
        self.data
            .vehicles
            .iter()
            .map(|vehicle| f64::from(vehicle.capacity))
            .fold(0.0, f64::max)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Instance with {} swap stations and {} vehicles, horizon {}, parking {}, handling {}:",
            self.num_stations() - 2,
            self.num_vehicles(),
            self.horizon(),
            self.parking_time(),
            self.handling_time()
        )?;
        for i in self.swap_stations() {
            writeln!(f, "    Station {i}: {}", self.station(i))?;
        }
        for v in self.all_vehicles() {
            let vehicle = self.vehicle(v);
            writeln!(
                f,
                "    Vehicle {v}: capacity {}, load {}, starts at {} after {}",
                vehicle.capacity, vehicle.init_load, vehicle.start_station, vehicle.driving_to_start
            )?;
        }
        Ok(())
    }
}
