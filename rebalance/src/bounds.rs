use crate::error::ModelBuildError;
use crate::problem::Instance;
use std::fmt;
use tracing::debug;

/// Linearization bounds derived from the instance data
///
/// Every constant is the largest value the gated expression can take while its gate is
/// inactive, given the variable bounds of the scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BigM {
    /// Latest time any vehicle can arrive anywhere
    pub latest_arrival: f64,
    /// Arc-gated time propagation
    pub time: f64,
    /// Release of the horizon for the last station of a route
    pub horizon: f64,
    /// Arc-gated load propagation
    pub load: f64,
    /// Serviceable inventory regimes
    pub inventory: f64,
    /// Flat inventory regimes
    pub flat: f64,
    /// Clipped serviceable bikes
    pub violation: f64,
    /// Finishing slack of a vehicle
    pub finish: f64,
}

impl BigM {
    pub fn new(instance: &Instance) -> Result<BigM, ModelBuildError> {
        let horizon = instance.horizon();
        let max_vehicle_capacity = instance.max_vehicle_capacity();
        let max_driving_time = instance.driving_times().max();
        let max_driving_to_start = instance
            .all_vehicles()
            .map(|v| instance.vehicle(v).driving_to_start)
            .fold(0.0, f64::max);

        let mut max_station_capacity: f64 = 0.0;
        let mut max_net_rate: f64 = 0.0;
        let mut max_flat_rate: f64 = 0.0;
        let mut max_flat_load: f64 = 0.0;
        for i in instance.swap_stations() {
            let station = instance.station(i);
            max_station_capacity = max_station_capacity.max(f64::from(station.capacity));
            max_net_rate = max_net_rate.max(station.net_rate().abs());
            max_flat_rate = max_flat_rate.max(station.incoming_flat_rate);
            max_flat_load = max_flat_load.max(f64::from(station.init_flat_load));
        }

        let service_time = instance.parking_time()
            + instance.handling_time() * max_vehicle_capacity
            + max_driving_time;
        let latest_arrival = horizon.max(max_driving_to_start) + service_time;
        let max_flat = max_flat_load + max_flat_rate * latest_arrival;

        let bigm = BigM {
            latest_arrival,
            time: latest_arrival + service_time,
            horizon: latest_arrival - horizon,
            load: max_vehicle_capacity,
            inventory: max_station_capacity
                + 2.0 * max_vehicle_capacity
                + 2.0 * max_net_rate * latest_arrival,
            flat: 2.0 * max_flat + max_vehicle_capacity + max_flat_rate * latest_arrival,
            violation: max_net_rate * latest_arrival,
            finish: latest_arrival,
        };
        bigm.check()?;
        debug!(%bigm, "derived big-M bounds");

        Ok(bigm)
    }

    fn named(&self) -> [(&'static str, f64); 8] {
        [
            ("latest_arrival", self.latest_arrival),
            ("time", self.time),
            ("horizon", self.horizon),
            ("load", self.load),
            ("inventory", self.inventory),
            ("flat", self.flat),
            ("violation", self.violation),
            ("finish", self.finish),
        ]
    }

    /// Fails on any bound that is negative or not finite
    pub fn check(&self) -> Result<(), ModelBuildError> {
        match self
            .named()
            .into_iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            Some((name, value)) => Err(ModelBuildError::InvalidBound { name, value }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for BigM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, (name, value)) in self.named().iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}
