use crate::compare_floats::max_of_2;
use crate::core::units::per_megawatt_hour_to_per_kilowatt_hour;
use crate::errors::ConfigurationError;
use crate::input::{AuxiliaryInput, Fuel, FuelInfo};

/// Fuel usage, cost and mass of the auxiliary heater for one hour
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AuxiliaryUsage {
    /// kWh of fuel, or of electricity for an electric heater
    pub fuel_usage: f64,
    /// £
    pub cost: f64,
    /// kg, zero for an electric heater
    pub mass: f64,
    /// kWh drawn from the grid
    pub grid_elec: f64,
}

/// A heater of last resort burning fuel (or using grid electricity) to meet
/// whatever heat demand remains.
#[derive(Clone, Debug, PartialEq)]
pub struct AuxiliaryHeater {
    fuel: Fuel,
    efficiency: f64,
    fuel_info: Option<FuelInfo>,
    /// kWh per hour
    capacity: f64,
}

impl AuxiliaryHeater {
    /// Arguments:
    /// * `fuel` - kind of fuel burnt
    /// * `efficiency` - heat delivered per unit of fuel energy
    /// * `fuel_info` - cost and energy density, required for non-electric fuels
    /// * `capacity` - maximum hourly heat output
    pub fn new(
        fuel: Fuel,
        efficiency: f64,
        fuel_info: Option<FuelInfo>,
        capacity: f64,
    ) -> Result<Self, ConfigurationError> {
        if fuel != Fuel::Electric && fuel_info.is_none() {
            return Err(ConfigurationError::Invalid(format!(
                "Auxiliary fuel {fuel} requires fuel_info with cost and energy_density"
            )));
        }
        if efficiency <= 0. {
            return Err(ConfigurationError::Invalid(format!(
                "Auxiliary efficiency must be positive, got {efficiency}"
            )));
        }

        Ok(Self {
            fuel,
            efficiency,
            fuel_info,
            capacity,
        })
    }

    /// Without an explicit capacity the heater is sized to the peak heat demand.
    pub fn from_input(
        input: &AuxiliaryInput,
        peak_heat_demand: f64,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            input.fuel.parse()?,
            input.efficiency,
            input.fuel_info,
            input.capacity.unwrap_or(peak_heat_demand),
        )
    }

    pub fn is_electric(&self) -> bool {
        self.fuel == Fuel::Electric
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn fuel_usage(&self, demand: f64) -> f64 {
        max_of_2(demand, 0.) / self.efficiency
    }

    /// Usage for the hour. Only heat not covered by renewable surplus is paid
    /// for, at the fuel cost or at the import price for an electric heater.
    ///
    /// Arguments:
    /// * `demand` - heat met by the heater (kWh)
    /// * `res_supplied` - part of `demand` run on renewable surplus (kWh)
    /// * `import_price` - £/MWh
    pub fn usage(&self, demand: f64, res_supplied: f64, import_price: f64) -> AuxiliaryUsage {
        let fuel_usage = self.fuel_usage(demand);
        let purchased = max_of_2(demand - res_supplied, 0.);

        match self.fuel_info {
            Some(FuelInfo {
                cost,
                energy_density,
            }) if !self.is_electric() => AuxiliaryUsage {
                fuel_usage,
                cost: purchased * cost,
                mass: if energy_density > 0. {
                    fuel_usage / energy_density
                } else {
                    0.
                },
                grid_elec: 0.,
            },
            _ => AuxiliaryUsage {
                fuel_usage,
                cost: purchased * per_megawatt_hour_to_per_kilowatt_hour(import_price),
                mass: 0.,
                grid_elec: purchased,
            },
        }
    }
}
