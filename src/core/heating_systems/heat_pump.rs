//! A heat pump characterised by an hourly coefficient of performance and duty
//! (maximum heat output per hour).

use crate::compare_floats::{min_of_2, min_of_3};
use crate::core::units::{celsius_to_kelvin, MINUTES_PER_HOUR};
use crate::errors::ConfigurationError;
use crate::input::{HeatPumpInput, HeatPumpPerformanceModelInput, HeatPumpType};
use anyhow::anyhow;
use serde::Serialize;
use std::sync::Arc;

/// Reported for every hour when the heat pump has no capacity, keeping the cop
/// strictly positive for the divisions downstream.
const ZERO_CAPACITY_COP: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HeatPumpPerformance {
    pub cop: f64,
    /// kWh per hour
    pub duty: f64,
}

/// Logarithmic mean of two temperatures in deg C, returned in K
fn log_mean_temperature(temp_in: f64, temp_out: f64) -> anyhow::Result<f64> {
    let temp_in_k = celsius_to_kelvin(temp_in)?;
    let temp_out_k = celsius_to_kelvin(temp_out)?;
    if is_close!(temp_in_k, temp_out_k, rel_tol = 1e-12) {
        return Ok(temp_in_k);
    }
    Ok((temp_in - temp_out) / (temp_in_k / temp_out_k).ln())
}

/// Ideal cop of a cycle with finite temperature glides on both sides
fn lorentz_cop(
    flow_temp: f64,
    return_temp: f64,
    ambient_temp_in: f64,
    ambient_temp_out: f64,
) -> anyhow::Result<f64> {
    let temp_high = log_mean_temperature(flow_temp, return_temp)?;
    let temp_low = log_mean_temperature(ambient_temp_in, ambient_temp_out)?;
    if temp_high <= temp_low {
        return Err(anyhow!(
            "Heat pump sink ({temp_high}K) must be hotter than its source ({temp_low}K)"
        ));
    }
    Ok(temp_high / (temp_high - temp_low))
}

/// Source temperature (deg C) at or below which defrosting reduces the cop
const DEFROST_TEMPERATURE: f64 = 5.;
const DEFROST_FACTOR: f64 = 0.9;

/// Quadratic fit of cop against the lift from source to flow temperature
fn generic_regression_cop(hp_type: HeatPumpType, flow_temp: f64, ambient_temp: f64) -> f64 {
    let lift = flow_temp - ambient_temp;
    let cop = match hp_type {
        HeatPumpType::AirSource => 6.81 - 0.121 * lift + 0.00063 * lift.powi(2),
        HeatPumpType::GroundSource | HeatPumpType::WaterSource => {
            8.77 - 0.15 * lift + 0.000734 * lift.powi(2)
        }
    };
    if ambient_temp <= DEFROST_TEMPERATURE {
        cop * DEFROST_FACTOR
    } else {
        cop
    }
}

#[derive(Clone, Debug)]
enum PerformanceModel {
    Simple {
        cop: f64,
    },
    Lorentz {
        /// ratio of rated cop to the ideal cop at the rated conditions
        efficiency: f64,
        cop_spec: f64,
        elec_capacity: f64,
    },
    GenericRegression,
}

#[derive(Clone, Debug)]
pub struct HeatPump {
    hp_type: HeatPumpType,
    /// kW thermal
    capacity: f64,
    /// drop in source temperature across the evaporator
    ambient_delta_t: f64,
    /// minutes
    minimum_runtime: f64,
    /// percent of duty
    minimum_output: f64,
    model: PerformanceModel,
    /// hourly source temperature: outdoor air for air source, water otherwise
    ambient_temp: Option<Arc<[f64]>>,
}

impl HeatPump {
    pub fn new(
        hp_type: HeatPumpType,
        capacity: f64,
        ambient_delta_t: f64,
        minimum_runtime: f64,
        minimum_output: f64,
        model: &HeatPumpPerformanceModelInput,
        ambient_temp: Option<Arc<[f64]>>,
    ) -> anyhow::Result<Self> {
        let model = match *model {
            HeatPumpPerformanceModelInput::Simple { cop } => PerformanceModel::Simple { cop },
            HeatPumpPerformanceModelInput::Lorentz {
                cop,
                flow_temp_spec,
                return_temp_spec,
                ambient_temp_in_spec,
                ambient_temp_out_spec,
                elec_capacity,
            } => {
                let ideal_cop_spec = lorentz_cop(
                    flow_temp_spec,
                    return_temp_spec,
                    ambient_temp_in_spec,
                    ambient_temp_out_spec,
                )?;
                PerformanceModel::Lorentz {
                    efficiency: cop / ideal_cop_spec,
                    cop_spec: cop,
                    elec_capacity,
                }
            }
            HeatPumpPerformanceModelInput::GenericRegression => PerformanceModel::GenericRegression,
        };

        Ok(Self {
            hp_type,
            capacity,
            ambient_delta_t,
            minimum_runtime,
            minimum_output,
            model,
            ambient_temp,
        })
    }

    pub fn from_input(
        input: &HeatPumpInput,
        air_temperature: Option<Arc<[f64]>>,
        water_temperature: Option<Arc<[f64]>>,
    ) -> Result<Self, ConfigurationError> {
        let hp_type: HeatPumpType = input.hp_type.parse()?;
        let ambient_temp = match hp_type {
            HeatPumpType::AirSource => air_temperature,
            HeatPumpType::GroundSource | HeatPumpType::WaterSource => water_temperature,
        };
        Self::new(
            hp_type,
            input.capacity,
            input.ambient_delta_t,
            input.minimum_runtime,
            input.minimum_output,
            &input.performance_model,
            ambient_temp,
        )
        .map_err(|err| ConfigurationError::Invalid(err.to_string()))
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Name of the hourly series the performance model reads, if any
    pub fn required_ambient_series(&self) -> Option<&'static str> {
        match (&self.model, self.hp_type) {
            (PerformanceModel::Simple { .. }, _) => None,
            (_, HeatPumpType::AirSource) => Some("air_temperature"),
            _ => Some("water_temperature"),
        }
    }

    /// Cop and duty for the given hour
    ///
    /// Arguments:
    /// * `hour` - absolute hour of the year, used to look up the source temperature
    /// * `flow_temp` - temperature delivered by the heat pump
    /// * `return_temp` - temperature of water returning to the heat pump
    pub fn performance(
        &self,
        hour: usize,
        flow_temp: f64,
        return_temp: f64,
    ) -> anyhow::Result<HeatPumpPerformance> {
        if self.capacity == 0. {
            return Ok(HeatPumpPerformance {
                cop: ZERO_CAPACITY_COP,
                duty: 0.,
            });
        }

        match self.model {
            PerformanceModel::Simple { cop } => Ok(HeatPumpPerformance {
                cop,
                duty: self.capacity,
            }),
            PerformanceModel::GenericRegression => Ok(HeatPumpPerformance {
                cop: generic_regression_cop(self.hp_type, flow_temp, self.ambient_temp_at(hour)?),
                duty: self.capacity,
            }),
            PerformanceModel::Lorentz {
                efficiency,
                cop_spec,
                elec_capacity,
            } => {
                let ambient_temp = self.ambient_temp_at(hour)?;
                let ideal_cop = lorentz_cop(
                    flow_temp,
                    return_temp,
                    ambient_temp,
                    ambient_temp - self.ambient_delta_t,
                )?;

                Ok(HeatPumpPerformance {
                    cop: efficiency * ideal_cop,
                    duty: min_of_2(cop_spec * elec_capacity, self.capacity),
                })
            }
        }
    }

    fn ambient_temp_at(&self, hour: usize) -> anyhow::Result<f64> {
        self.ambient_temp
            .as_ref()
            .and_then(|series| series.get(hour))
            .copied()
            .ok_or_else(|| anyhow!("No heat pump source temperature for hour {hour}"))
    }

    /// Electricity (kWh) needed to meet `heat_demand`, limited by the duty
    pub fn elec_usage(&self, heat_demand: f64, performance: HeatPumpPerformance) -> f64 {
        if performance.cop <= 0. {
            return 0.;
        }
        min_of_2(heat_demand, performance.duty) / performance.cop
    }

    /// Heat (kWh) produced from `elec_supply`, limited by the demand and the duty
    pub fn thermal_output(
        &self,
        elec_supply: f64,
        performance: HeatPumpPerformance,
        heat_demand: f64,
    ) -> f64 {
        min_of_3(elec_supply * performance.cop, heat_demand, performance.duty)
    }

    /// Smallest hourly output (kWh) the heat pump can run at
    pub fn minimum_output_threshold(&self, performance: HeatPumpPerformance) -> f64 {
        self.minimum_output / 100. * self.minimum_runtime / MINUTES_PER_HOUR as f64
            * performance.duty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn simple(capacity: f64) -> HeatPump {
        HeatPump::new(
            HeatPumpType::AirSource,
            capacity,
            5.,
            30.,
            50.,
            &HeatPumpPerformanceModelInput::Simple { cop: 3. },
            None,
        )
        .unwrap()
    }

    #[fixture]
    fn lorentz() -> HeatPump {
        HeatPump::new(
            HeatPumpType::AirSource,
            10.,
            5.,
            30.,
            50.,
            &HeatPumpPerformanceModelInput::Lorentz {
                cop: 3.5,
                flow_temp_spec: 50.,
                return_temp_spec: 40.,
                ambient_temp_in_spec: 7.,
                ambient_temp_out_spec: 2.,
                elec_capacity: 4.,
            },
            Some(vec![7., -3., 12.].into()),
        )
        .unwrap()
    }

    #[rstest]
    fn test_zero_capacity_performance() {
        assert_eq!(
            simple(0.).performance(0, 60., 40.).unwrap(),
            HeatPumpPerformance { cop: 0.5, duty: 0. }
        );
    }

    #[rstest]
    fn test_simple_performance() {
        assert_eq!(
            simple(8.).performance(100, 60., 40.).unwrap(),
            HeatPumpPerformance { cop: 3., duty: 8. }
        );
    }

    #[rstest]
    fn test_lorentz_matches_rated_cop_at_rated_conditions(lorentz: HeatPump) {
        let performance = lorentz.performance(0, 50., 40.).unwrap();
        assert_relative_eq!(performance.cop, 3.5, max_relative = 1e-12);
        // limited by elec capacity: 3.5 * 4 > 10
        assert_relative_eq!(performance.duty, 10.);
    }

    #[rstest]
    fn test_lorentz_cop_follows_source_temperature(lorentz: HeatPump) {
        let cold = lorentz.performance(1, 50., 40.).unwrap();
        let warm = lorentz.performance(2, 50., 40.).unwrap();
        assert!(cold.cop < 3.5);
        assert!(warm.cop > 3.5);
        // hotter flow reduces the cop
        assert!(lorentz.performance(0, 65., 40.).unwrap().cop < 3.5);
    }

    #[rstest]
    fn test_lorentz_requires_source_temperature(lorentz: HeatPump) {
        assert!(lorentz.performance(3, 50., 40.).is_err());
        assert_eq!(lorentz.required_ambient_series(), Some("air_temperature"));
        assert_eq!(simple(1.).required_ambient_series(), None);
    }

    fn generic_regression(hp_type: HeatPumpType, ambient_temp: Vec<f64>) -> HeatPump {
        HeatPump::new(
            hp_type,
            12.,
            5.,
            30.,
            50.,
            &HeatPumpPerformanceModelInput::GenericRegression,
            Some(ambient_temp.into()),
        )
        .unwrap()
    }

    #[rstest]
    // 6.81 - 0.121 * 45 + 0.00063 * 45^2
    #[case(HeatPumpType::AirSource, 10., 2.64075)]
    // defrosting: 0.9 * (6.81 - 0.121 * 50 + 0.00063 * 50^2)
    #[case(HeatPumpType::AirSource, 5., 2.10150)]
    // 8.77 - 0.15 * 45 + 0.000734 * 45^2
    #[case(HeatPumpType::GroundSource, 10., 3.50635)]
    #[case(HeatPumpType::WaterSource, 10., 3.50635)]
    // 0.9 * (8.77 - 0.15 * 57 + 0.000734 * 57^2)
    #[case(HeatPumpType::WaterSource, -2., 2.3442894)]
    fn test_generic_regression_performance(
        #[case] hp_type: HeatPumpType,
        #[case] ambient_temp: f64,
        #[case] expected_cop: f64,
    ) {
        let heat_pump = generic_regression(hp_type, vec![ambient_temp]);
        let performance = heat_pump.performance(0, 55., 40.).unwrap();
        assert_relative_eq!(performance.cop, expected_cop, max_relative = 1e-9);
        assert_eq!(performance.duty, 12.);
    }

    #[rstest]
    fn test_generic_regression_reads_source_series() {
        let air = generic_regression(HeatPumpType::AirSource, vec![10.]);
        assert_eq!(air.required_ambient_series(), Some("air_temperature"));
        assert!(air.performance(1, 55., 40.).is_err());
        assert_eq!(
            generic_regression(HeatPumpType::GroundSource, vec![10.]).required_ambient_series(),
            Some("water_temperature")
        );
    }

    #[rstest]
    fn test_from_input_parses_type() {
        let mut input = HeatPumpInput {
            hp_type: "gshp".to_owned(),
            capacity: 8.,
            ambient_delta_t: 3.,
            minimum_runtime: 30.,
            minimum_output: 50.,
            performance_model: HeatPumpPerformanceModelInput::GenericRegression,
        };
        let heat_pump = HeatPump::from_input(&input, None, Some(vec![10.].into())).unwrap();
        assert_relative_eq!(
            heat_pump.performance(0, 55., 40.).unwrap().cop,
            3.50635,
            max_relative = 1e-9
        );

        input.hp_type = "Air to water".to_owned();
        assert!(matches!(
            HeatPump::from_input(&input, None, None),
            Err(ConfigurationError::UnknownVariant {
                kind: "heat pump type",
                ..
            })
        ));
    }

    #[rstest]
    fn test_log_mean_temperature() {
        // (50 - 40) / ln(323.15 / 313.15)
        assert_relative_eq!(
            log_mean_temperature(50., 40.).unwrap(),
            10. / (323.15f64 / 313.15).ln(),
            max_relative = 1e-12
        );
        assert_relative_eq!(log_mean_temperature(40., 40.).unwrap(), 313.15);
    }

    #[rstest]
    fn test_elec_usage_and_thermal_output() {
        let heat_pump = simple(8.);
        let performance = HeatPumpPerformance { cop: 4., duty: 8. };
        assert_relative_eq!(heat_pump.elec_usage(6., performance), 1.5);
        assert_relative_eq!(heat_pump.elec_usage(20., performance), 2.);
        assert_relative_eq!(heat_pump.thermal_output(1., performance, 10.), 4.);
        assert_relative_eq!(heat_pump.thermal_output(1., performance, 3.), 3.);
        assert_relative_eq!(heat_pump.thermal_output(5., performance, 10.), 8.);
    }

    #[rstest]
    fn test_minimum_output_threshold() {
        let heat_pump = simple(8.);
        let performance = HeatPumpPerformance { cop: 3., duty: 8. };
        // 50% for 30 minutes
        assert_relative_eq!(heat_pump.minimum_output_threshold(performance), 2.);
    }
}
