use thiserror::Error;

pub const JOULES_PER_KILOWATT_HOUR: u32 = 3_600_000;
pub const KILOJOULES_PER_KILOWATT_HOUR: u32 = 3_600;
pub const JOULES_PER_KILOJOULE: u32 = 1_000;
pub const KILOWATT_HOURS_PER_MEGAWATT_HOUR: u32 = 1_000;
pub const LITRES_PER_CUBIC_METRE: u32 = 1_000;
pub const MILLIMETRES_IN_METRE: u32 = 1_000;
pub const MINUTES_PER_HOUR: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const HOURS_PER_YEAR: usize = 8_760;

const ZERO_CELSIUS_IN_KELVIN: f64 = 273.15;

pub(crate) fn celsius_to_kelvin(temp_c: f64) -> Result<f64, BelowAbsoluteZeroError> {
    if temp_c < -ZERO_CELSIUS_IN_KELVIN {
        Err(BelowAbsoluteZeroError::from_c(temp_c))
    } else {
        Ok(temp_c + ZERO_CELSIUS_IN_KELVIN)
    }
}

/// Convert a price per MWh into a price per kWh
pub(crate) fn per_megawatt_hour_to_per_kilowatt_hour(price: f64) -> f64 {
    price / KILOWATT_HOURS_PER_MEGAWATT_HOUR as f64
}

#[derive(Debug, Error)]
#[error("A temperature of {k}ºK/{}ºC was encountered, which is less than absolute zero", k - ZERO_CELSIUS_IN_KELVIN)]
pub(crate) struct BelowAbsoluteZeroError {
    k: f64,
}

impl BelowAbsoluteZeroError {
    fn from_c(c: f64) -> Self {
        Self {
            k: c + ZERO_CELSIUS_IN_KELVIN,
        }
    }
}
