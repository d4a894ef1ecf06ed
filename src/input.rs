use crate::errors::{ConfigurationError, LesaError};
use crate::simulation_time::SimulationTime;
use itertools::Itertools;
use serde::Deserialize;
use serde_valid::Validate;
use std::io::{BufReader, Read};
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

/// Malformed JSON is an invalid request; well-formed input breaking a range
/// constraint is a configuration error.
pub fn ingest_for_processing(json: impl Read) -> Result<Input, LesaError> {
    let reader = BufReader::new(json);

    let input: Input = serde_json::from_reader(reader).map_err(anyhow::Error::from)?;
    input
        .validate()
        .map_err(|errors| ConfigurationError::Invalid(errors.to_string()))?;

    Ok(input)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Input {
    pub simulation_time: SimulationTime,
    /// parsed as a [`ControllerType`]
    pub controller: String,
    #[validate]
    pub fixed_order: FixedOrderInput,
    #[validate]
    pub thermal_storage: ThermalStorageInput,
    #[validate]
    pub electrical_storage: ElectricalStorageInput,
    #[validate]
    pub heat_pump: HeatPumpInput,
    #[validate]
    pub auxiliary: AuxiliaryInput,
    #[validate]
    pub grid: GridInput,
    #[validate]
    pub demands: DemandsInput,
    pub time_series: TimeSeriesInput,
}

/// Parse one of a fixed set of named options, ignoring case and surrounding whitespace.
fn parse_named<T>(kind: &'static str, value: &str) -> Result<T, ConfigurationError>
where
    T: IntoEnumIterator + Into<&'static str> + Copy,
{
    T::iter()
        .find(|variant| {
            let name: &'static str = (*variant).into();
            name.eq_ignore_ascii_case(value.trim())
        })
        .ok_or_else(|| ConfigurationError::UnknownVariant {
            kind,
            value: value.to_owned(),
            expected: T::iter().map(Into::<&'static str>::into).join(", "),
        })
}

macro_rules! named_enum_from_str {
    ($enum_type:ty, $kind:literal) => {
        impl FromStr for $enum_type {
            type Err = ConfigurationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_named($kind, s)
            }
        }
    };
}

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, IntoStaticStr, PartialEq)]
pub enum ControllerType {
    #[strum(serialize = "Fixed order control")]
    FixedOrder,
    #[strum(serialize = "Model predictive control")]
    ModelPredictive,
}

named_enum_from_str!(ControllerType, "controller");

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, IntoStaticStr, PartialEq)]
pub enum Insulation {
    #[strum(serialize = "polyurethane")]
    Polyurethane,
    #[strum(serialize = "fibreglass")]
    Fibreglass,
    #[strum(serialize = "polystyrene")]
    Polystyrene,
}

named_enum_from_str!(Insulation, "insulation");

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, IntoStaticStr, PartialEq)]
pub enum TankLocation {
    Inside,
    Outside,
}

named_enum_from_str!(TankLocation, "location");

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, IntoStaticStr, PartialEq)]
pub enum Fuel {
    #[strum(serialize = "GAS")]
    Gas,
    #[strum(serialize = "WOOD CHIPS")]
    WoodChips,
    #[strum(serialize = "KEROSENE")]
    Kerosene,
    #[strum(serialize = "ELECTRIC")]
    Electric,
}

named_enum_from_str!(Fuel, "fuel");

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, IntoStaticStr, PartialEq)]
pub enum HeatPumpType {
    #[strum(serialize = "ASHP")]
    AirSource,
    #[strum(serialize = "GSHP")]
    GroundSource,
    #[strum(serialize = "WSHP")]
    WaterSource,
}

named_enum_from_str!(HeatPumpType, "heat pump type");

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FixedOrderInput {
    /// import price (£/MWh) above which the above-setpoint order applies
    pub import_setpoint: f64,
    /// ranks in execution order; defaults to 1, 2, ... 13
    #[serde(default)]
    pub order_above_setpoint: Option<Vec<usize>>,
    /// ranks in execution order; defaults to 1, 2, ... 15
    #[serde(default)]
    pub order_below_setpoint: Option<Vec<usize>>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ThermalStorageInput {
    /// litres
    #[validate(minimum = 0.)]
    pub capacity: f64,
    /// parsed as an [`Insulation`]
    pub insulation: String,
    /// parsed as a [`TankLocation`]
    pub location: String,
    #[validate(minimum = 2)]
    pub number_nodes: usize,
    #[validate]
    pub tank_openings: TankOpenings,
    #[validate]
    pub correction_factors: CorrectionFactors,
}

/// Openings and pipe connections through the tank insulation; diameters in mm
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct TankOpenings {
    #[validate(minimum = 0.)]
    pub tank_opening: f64,
    #[validate(minimum = 0.)]
    pub tank_opening_diameter: f64,
    #[validate(minimum = 0.)]
    pub uninsulated_connections: f64,
    #[validate(minimum = 0.)]
    pub uninsulated_connections_diameter: f64,
    #[validate(minimum = 0.)]
    pub insulated_connections: f64,
    #[validate(minimum = 0.)]
    pub insulated_connections_diameter: f64,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct CorrectionFactors {
    #[validate(minimum = 0.)]
    pub insulation_factor: f64,
    #[validate(minimum = 0.)]
    pub overall_factor: f64,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ElectricalStorageInput {
    /// kWh
    #[validate(minimum = 0.)]
    pub capacity: f64,
    /// fraction of capacity stored at the first simulated hour
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub initial_state: f64,
    #[validate(minimum = 0.)]
    pub charge_max: f64,
    #[validate(minimum = 0.)]
    pub discharge_max: f64,
    #[validate(exclusive_minimum = 0.)]
    #[validate(maximum = 1.)]
    pub charge_efficiency: f64,
    #[validate(exclusive_minimum = 0.)]
    #[validate(maximum = 1.)]
    pub discharge_efficiency: f64,
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub self_discharge: f64,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct HeatPumpInput {
    /// parsed as a [`HeatPumpType`]
    pub hp_type: String,
    /// thermal capacity, kW
    #[validate(minimum = 0.)]
    pub capacity: f64,
    /// drop in heat source temperature across the evaporator, K
    #[serde(default)]
    pub ambient_delta_t: f64,
    /// minutes
    #[validate(minimum = 0.)]
    #[validate(maximum = 60.)]
    pub minimum_runtime: f64,
    /// percentage of duty
    #[validate(minimum = 0.)]
    #[validate(maximum = 100.)]
    pub minimum_output: f64,
    pub performance_model: HeatPumpPerformanceModelInput,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum HeatPumpPerformanceModelInput {
    Simple {
        cop: f64,
    },
    Lorentz {
        /// cop at the rated conditions below
        cop: f64,
        flow_temp_spec: f64,
        return_temp_spec: f64,
        ambient_temp_in_spec: f64,
        ambient_temp_out_spec: f64,
        /// kW
        elec_capacity: f64,
    },
    /// Closed-form cop fitted to field trials of domestic units, reduced by a
    /// tenth at source temperatures of 5 deg C and below for defrosting
    #[serde(rename = "Generic regression")]
    GenericRegression,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AuxiliaryInput {
    /// parsed as a [`Fuel`]
    pub fuel: String,
    #[validate(exclusive_minimum = 0.)]
    pub efficiency: f64,
    /// required for all fuels other than electric
    #[serde(default)]
    pub fuel_info: Option<FuelInfo>,
    /// maximum heat output per hour (kWh); defaults to the peak heat demand
    #[serde(default)]
    pub capacity: Option<f64>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FuelInfo {
    /// £ per kWh of heat delivered
    pub cost: f64,
    /// kWh per kg
    pub energy_density: f64,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GridInput {
    /// £/MWh
    pub export_price: f64,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DemandsInput {
    /// temperature drop across the heat source when charging the tank, K
    #[validate(exclusive_minimum = 0.)]
    pub source_delta_t: f64,
    /// temperature of water returning from the heat network, deg C
    pub return_temp: f64,
}

/// Hourly series indexed by absolute hour of the year
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSeriesInput {
    /// kWh
    pub heat_demand: Vec<f64>,
    /// kWh
    pub elec_demand: Vec<f64>,
    /// kWh, wind and PV combined
    pub renewable_generation: Vec<f64>,
    /// heat pump flow temperature into the tank, deg C
    pub source_temp: Vec<f64>,
    /// heat network flow temperature, deg C
    pub flow_temp: Vec<f64>,
    /// £/MWh
    pub import_price: Vec<f64>,
    #[serde(default)]
    pub air_temperature: Option<Vec<f64>>,
    #[serde(default)]
    pub water_temperature: Option<Vec<f64>>,
}
