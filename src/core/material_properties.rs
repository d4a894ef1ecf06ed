//! Properties of water and of tank insulation materials.

use crate::core::units::{JOULES_PER_KILOJOULE, SECONDS_PER_HOUR};
use crate::input::Insulation;

/// Specific heat capacity of water in kJ/(kg.K), tabulated every 10 degC from 0 to 100 degC
const WATER_SPECIFIC_HEAT_CAPACITY_TABLE: [f64; 11] = [
    4.217, 4.192, 4.182, 4.178, 4.179, 4.181, 4.185, 4.190, 4.196, 4.205, 4.216,
];

/// J/(kg.K), used outside the tabulated range
pub const WATER_SPECIFIC_HEAT_CAPACITY_DEFAULT: f64 = 4180.;

/// Return specific heat capacity of water, in J/(kg.K)
///
/// The temperature is rounded to the nearest 10 degC (ties to even) and looked up
/// in the table above.
///
/// Arguments:
/// * `temp` - water temperature, in deg C
pub fn water_specific_heat_capacity(temp: f64) -> f64 {
    // also catches NaN
    if !(temp > 0.) {
        return WATER_SPECIFIC_HEAT_CAPACITY_DEFAULT;
    }

    let table_idx = (temp / 10.).round_ties_even() as usize;
    WATER_SPECIFIC_HEAT_CAPACITY_TABLE
        .get(table_idx)
        .map(|cp| cp * JOULES_PER_KILOJOULE as f64)
        .unwrap_or(WATER_SPECIFIC_HEAT_CAPACITY_DEFAULT)
}

/// Specific heat capacity of water in kJ/(kg.K)
pub fn water_specific_heat_capacity_kj(temp: f64) -> f64 {
    water_specific_heat_capacity(temp) / JOULES_PER_KILOJOULE as f64
}

/// Thermal conductivity of insulation, in W/(m.K)
pub fn insulation_thermal_conductivity(insulation: Insulation) -> f64 {
    match insulation {
        Insulation::Polyurethane => 0.025,
        Insulation::Fibreglass => 0.04,
        Insulation::Polystyrene => 0.035,
    }
}

/// Thermal conductivity of insulation over one hour, in J/(h.m.K)
pub fn insulation_thermal_conductivity_hourly(insulation: Insulation) -> f64 {
    insulation_thermal_conductivity(insulation) * SECONDS_PER_HOUR as f64
}
