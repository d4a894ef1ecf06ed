use crate::compare_floats::max_of_series;
use crate::core::controls::dispatch::{DispatchOrder, Regime};
use crate::core::controls::fixed_order::{FixedOrderController, HourInputs};
use crate::core::controls::timestep_result::TimestepResult;
use crate::core::energy_supply::elec_battery::ElectricBattery;
use crate::core::energy_supply::electrical_balance::ElectricalBalance;
use crate::core::heating_systems::auxiliary::AuxiliaryHeater;
use crate::core::heating_systems::heat_pump::HeatPump;
use crate::core::heating_systems::hot_water_tank::HotWaterTank;
use crate::errors::{ConfigurationError, LesaError, NotImplementedError};
use crate::input::{ControllerType, FixedOrderInput, Input, TankLocation, TimeSeriesInput};
use crate::simulation_time::{SimulationTime, HOURS_IN_DAY};
use std::sync::Arc;
use tracing::{debug, error, info};

fn configuration_error(error: ConfigurationError) -> LesaError {
    error!(%error, "Invalid configuration");
    error.into()
}

/// Check a series covers every absolute hour up to `required`.
fn check_series(
    name: &'static str,
    series: Option<&[f64]>,
    required: usize,
) -> Result<(), ConfigurationError> {
    match series {
        None => Err(ConfigurationError::MissingTimeSeries { name }),
        Some(series) if series.len() < required => Err(ConfigurationError::TimeSeriesTooShort {
            name,
            len: series.len(),
            required,
        }),
        Some(_) => Ok(()),
    }
}

fn dispatch_order(
    regime: Regime,
    ranks: Option<&[usize]>,
) -> Result<DispatchOrder, ConfigurationError> {
    match ranks {
        Some(ranks) => DispatchOrder::from_ranks(regime, ranks),
        None => Ok(DispatchOrder::default_for(regime)),
    }
}

fn dispatch_orders(
    input: &FixedOrderInput,
) -> Result<(DispatchOrder, DispatchOrder), ConfigurationError> {
    Ok((
        dispatch_order(
            Regime::AboveSetpoint,
            input.order_above_setpoint.as_deref(),
        )?,
        dispatch_order(
            Regime::BelowSetpoint,
            input.order_below_setpoint.as_deref(),
        )?,
    ))
}

/// Everything needed to simulate the configured window: the yearly series, the
/// precomputed electrical balance and the controller holding the storage state.
#[derive(Clone, Debug)]
pub struct Corpus {
    simulation_time: SimulationTime,
    time_series: TimeSeriesInput,
    electrical_balance: ElectricalBalance,
    controller: FixedOrderController,
}

impl Corpus {
    /// Build the system from validated input. All configuration problems are reported
    /// here, before any hour is simulated.
    pub fn from_inputs(input: &Input) -> Result<Self, LesaError> {
        let simulation_time = input.simulation_time;
        simulation_time
            .check_within_year()
            .map_err(configuration_error)?;

        let controller_type: ControllerType =
            input.controller.parse().map_err(configuration_error)?;
        if controller_type == ControllerType::ModelPredictive {
            error!(controller = %controller_type, "Unsupported controller");
            return Err(NotImplementedError::new(
                "Model predictive control is not available, use fixed order control",
            )
            .into());
        }

        let time_series = &input.time_series;
        let required = simulation_time.final_hour();
        for (name, series) in [
            ("heat_demand", &time_series.heat_demand),
            ("elec_demand", &time_series.elec_demand),
            ("renewable_generation", &time_series.renewable_generation),
            ("source_temp", &time_series.source_temp),
            ("flow_temp", &time_series.flow_temp),
            ("import_price", &time_series.import_price),
        ] {
            check_series(name, Some(series.as_slice()), required).map_err(configuration_error)?;
        }

        let air_temperature: Option<Arc<[f64]>> =
            time_series.air_temperature.as_deref().map(Arc::from);
        let water_temperature: Option<Arc<[f64]>> =
            time_series.water_temperature.as_deref().map(Arc::from);

        let tank = HotWaterTank::from_input(&input.thermal_storage, air_temperature.clone())
            .map_err(configuration_error)?;
        if tank.location() == TankLocation::Outside {
            check_series("air_temperature", air_temperature.as_deref(), required)
                .map_err(configuration_error)?;
        }

        let heat_pump = HeatPump::from_input(
            &input.heat_pump,
            air_temperature.clone(),
            water_temperature.clone(),
        )
        .map_err(configuration_error)?;
        let ambient_series = match heat_pump.required_ambient_series() {
            Some("air_temperature") => {
                check_series("air_temperature", air_temperature.as_deref(), required)
            }
            Some(_) => check_series("water_temperature", water_temperature.as_deref(), required),
            None => Ok(()),
        };
        ambient_series.map_err(configuration_error)?;

        let (order_above_setpoint, order_below_setpoint) =
            dispatch_orders(&input.fixed_order).map_err(configuration_error)?;

        let auxiliary = AuxiliaryHeater::from_input(
            &input.auxiliary,
            max_of_series(&time_series.heat_demand),
        )
        .map_err(configuration_error)?;

        let controller = FixedOrderController::new(
            tank,
            ElectricBattery::from_input(&input.electrical_storage),
            heat_pump,
            auxiliary,
            input.fixed_order.import_setpoint,
            order_above_setpoint,
            order_below_setpoint,
            input.demands.source_delta_t,
            input.demands.return_temp,
            input.grid.export_price,
        );

        Ok(Self {
            simulation_time,
            electrical_balance: ElectricalBalance::new(
                &time_series.renewable_generation,
                &time_series.elec_demand,
            ),
            time_series: time_series.clone(),
            controller,
        })
    }

    fn hour_inputs(&self, hour: usize) -> HourInputs {
        let series = &self.time_series;
        HourInputs {
            hour,
            heat_demand: series.heat_demand[hour],
            elec_demand: series.elec_demand[hour],
            generation: series.renewable_generation[hour],
            surplus: self.electrical_balance.surplus(hour),
            deficit: self.electrical_balance.deficit(hour),
            res_used: self.electrical_balance.res_used(hour),
            source_temp: series.source_temp[hour],
            flow_temp: series.flow_temp[hour],
            import_price: series.import_price[hour],
        }
    }

    /// Simulate every hour of the window from the initial storage state.
    pub fn run(&mut self) -> Result<Vec<TimestepResult>, LesaError> {
        self.controller.reset();
        info!(
            first_hour = self.simulation_time.first_hour(),
            timesteps = self.simulation_time.total_steps(),
            "Starting fixed order simulation"
        );

        let mut results = Vec::with_capacity(self.simulation_time.total_steps());
        for iteration in self.simulation_time.iter() {
            if iteration.hour_of_day() == 0 {
                debug!(day = iteration.hour / HOURS_IN_DAY, "Simulating day");
            }
            let inputs = self.hour_inputs(iteration.hour);
            results.push(self.controller.run_timestep(inputs)?);
        }

        info!(
            timesteps = results.len(),
            final_soc = self.controller.state().soc,
            "Simulation complete"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_series_checks() {
        assert_eq!(check_series("flow_temp", Some(&[1., 2., 3.][..]), 3), Ok(()));
        assert_eq!(
            check_series("flow_temp", Some(&[1., 2.][..]), 3),
            Err(ConfigurationError::TimeSeriesTooShort {
                name: "flow_temp",
                len: 2,
                required: 3,
            })
        );
        assert_eq!(
            check_series("air_temperature", None, 3),
            Err(ConfigurationError::MissingTimeSeries {
                name: "air_temperature"
            })
        );
    }

    #[rstest]
    fn test_default_dispatch_orders() {
        let (above, below) = dispatch_orders(&FixedOrderInput {
            import_setpoint: 100.,
            order_above_setpoint: None,
            order_below_setpoint: Some((1..=15).rev().collect()),
        })
        .unwrap();

        assert_eq!(above, DispatchOrder::default_for(Regime::AboveSetpoint));
        assert_eq!(
            below.operations().first(),
            Regime::BelowSetpoint.rank_table().last()
        );
    }
}
