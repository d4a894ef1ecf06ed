use crate::compare_floats::{max_of_2, min_of_2, min_of_3};
use crate::core::controls::dispatch::{
    Commitments, DispatchOrder, Operation, OperationOutcome, Regime, RunningChecks,
};
use crate::core::controls::timestep_result::{
    AuxiliaryResult, ElecDemandResult, ElectricalStorageResult, GridResult, HeatDemandResult,
    HeatPumpResult, MinimumOutputCorrection, RenewablesResult, ThermalStoreResult,
    TimestepResult,
};
use crate::core::energy_supply::elec_battery::ElectricBattery;
use crate::core::heating_systems::auxiliary::AuxiliaryHeater;
use crate::core::heating_systems::heat_pump::{HeatPump, HeatPumpPerformance};
use crate::core::heating_systems::hot_water_tank::{HotWaterTank, TankState};
use crate::core::units::per_megawatt_hour_to_per_kilowatt_hour;
use crate::errors::{LesaCoreError, LesaError};
use anyhow::anyhow;
use tracing::{debug, warn};

/// Heat pump output (kWh) at or below which the heat pump is considered off
pub const MINIMUM_OUTPUT_EPSILON: f64 = 1e-3;

/// Net tank flow (kWh) treated as no flow
const TANK_STANDBY_TOLERANCE: f64 = 1e-9;

const HEAT_PUMP_TO_DEMAND: [Operation; 3] = [
    Operation::HpResToDemand,
    Operation::HpImportToDemand,
    Operation::EsToHpToDemand,
];
const HEAT_PUMP_TO_TS: [Operation; 2] = [Operation::HpResToTs, Operation::HpImportToTs];
const HEAT_PUMP_OPERATIONS: [Operation; 5] = [
    Operation::HpResToDemand,
    Operation::HpImportToDemand,
    Operation::EsToHpToDemand,
    Operation::HpResToTs,
    Operation::HpImportToTs,
];
const TS_CHARGING: [Operation; 3] = [
    Operation::HpResToTs,
    Operation::EauxResToTs,
    Operation::HpImportToTs,
];

/// Values read from the yearly series for one hour
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HourInputs {
    /// absolute hour of the year
    pub hour: usize,
    pub heat_demand: f64,
    pub elec_demand: f64,
    pub generation: f64,
    pub surplus: f64,
    pub deficit: f64,
    pub res_used: f64,
    pub source_temp: f64,
    pub flow_temp: f64,
    /// £/MWh
    pub import_price: f64,
}

/// State carried from one hour to the next
#[derive(Clone, Debug, PartialEq)]
pub struct StorageState {
    pub nodes_temp: Vec<f64>,
    pub soc: f64,
}

#[derive(Clone, Copy, Debug)]
struct HourContext {
    inputs: HourInputs,
    performance: HeatPumpPerformance,
    max_charge: f64,
    max_discharge: f64,
}

/// Limits applied when checking the heat pump against its minimum output
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinimumOutputLimits {
    pub minimum_output: f64,
    pub cop: f64,
    pub max_charge: f64,
    pub max_discharge: f64,
    pub heat_demand: f64,
}

/// Enforce the heat pump's minimum output on the hour's commitments.
///
/// A heat pump running below its minimum is either topped up, sending the shortfall
/// to the thermal store on imported electricity, or switched off when the store
/// cannot take the shortfall. Switching off exports the renewables it would have
/// used, leaves battery energy in the battery and meets the heat demand from the
/// store and then the auxiliary heater.
pub fn apply_minimum_output(
    commitments: &mut Commitments,
    limits: &MinimumOutputLimits,
) -> MinimumOutputCorrection {
    let hp_total = commitments.heat_total(&HEAT_PUMP_OPERATIONS);
    if hp_total <= MINIMUM_OUTPUT_EPSILON || hp_total >= limits.minimum_output {
        return MinimumOutputCorrection::NotRequired;
    }

    let shortfall = limits.minimum_output - hp_total;
    let headroom = limits.max_charge - commitments.heat_total(&TS_CHARGING)
        + commitments.heat(Operation::TsToDemand);
    if shortfall <= headroom {
        commitments.commit(
            Operation::HpImportToTs,
            OperationOutcome::from_heat_pump(
                commitments.heat(Operation::HpImportToTs) + shortfall,
                limits.cop,
            ),
        );
        return MinimumOutputCorrection::ToppedUp;
    }

    let freed_res = commitments.elec_total(&[Operation::HpResToDemand, Operation::HpResToTs]);
    for operation in HEAT_PUMP_OPERATIONS {
        commitments.commit(operation, OperationOutcome::from_heat_pump(0., limits.cop));
    }
    commitments.commit(
        Operation::ResToExport,
        OperationOutcome::scalar(commitments.elec(Operation::ResToExport) + freed_res),
    );

    let heat_left = max_of_2(
        limits.heat_demand - commitments.heat(Operation::EauxResToDemand),
        0.,
    );
    let ts_to_demand = min_of_2(limits.max_discharge, heat_left);
    commitments.commit(Operation::TsToDemand, OperationOutcome::scalar(ts_to_demand));
    commitments.commit(
        Operation::AuxToDemand,
        OperationOutcome::scalar(heat_left - ts_to_demand),
    );

    MinimumOutputCorrection::ShutDown
}

fn calculation_error(error: anyhow::Error) -> LesaError {
    LesaCoreError::new(error).into()
}

/// Allocates the hour's energy flows by executing operations in a fixed priority
/// order, chosen by whether the import price is above the setpoint.
#[derive(Clone, Debug)]
pub struct FixedOrderController {
    tank: HotWaterTank,
    battery: ElectricBattery,
    heat_pump: HeatPump,
    auxiliary: AuxiliaryHeater,
    /// £/MWh
    import_setpoint: f64,
    order_above_setpoint: DispatchOrder,
    order_below_setpoint: DispatchOrder,
    source_delta_t: f64,
    return_temp: f64,
    /// £/MWh
    export_price: f64,
    state: StorageState,
}

impl FixedOrderController {
    pub fn new(
        tank: HotWaterTank,
        battery: ElectricBattery,
        heat_pump: HeatPump,
        auxiliary: AuxiliaryHeater,
        import_setpoint: f64,
        order_above_setpoint: DispatchOrder,
        order_below_setpoint: DispatchOrder,
        source_delta_t: f64,
        return_temp: f64,
        export_price: f64,
    ) -> Self {
        let state = StorageState {
            nodes_temp: tank.init_temps(return_temp),
            soc: battery.init_state(),
        };

        Self {
            tank,
            battery,
            heat_pump,
            auxiliary,
            import_setpoint,
            order_above_setpoint,
            order_below_setpoint,
            source_delta_t,
            return_temp,
            export_price,
            state,
        }
    }

    /// Tank nodes at the return temperature and the battery at its initial charge
    pub fn reset(&mut self) {
        self.state = StorageState {
            nodes_temp: self.tank.init_temps(self.return_temp),
            soc: self.battery.init_state(),
        };
    }

    pub fn state(&self) -> &StorageState {
        &self.state
    }

    pub fn order(&self, regime: Regime) -> &DispatchOrder {
        match regime {
            Regime::AboveSetpoint => &self.order_above_setpoint,
            Regime::BelowSetpoint => &self.order_below_setpoint,
        }
    }

    /// Dispatch one hour, advance the tank and battery, and report what happened.
    pub fn run_timestep(&mut self, inputs: HourInputs) -> Result<TimestepResult, LesaError> {
        let hour = inputs.hour;
        let regime = Regime::for_price(inputs.import_price, self.import_setpoint);
        let performance = self
            .heat_pump
            .performance(hour, inputs.source_temp, self.return_temp)
            .map_err(calculation_error)?;

        let max_charge = self
            .tank
            .max_energy_in_out(
                TankState::Charging,
                &self.state.nodes_temp,
                inputs.source_temp,
                inputs.flow_temp,
                self.return_temp,
                hour,
            )
            .map_err(calculation_error)?;
        let max_discharge = self
            .tank
            .max_energy_in_out(
                TankState::Discharging,
                &self.state.nodes_temp,
                inputs.source_temp,
                inputs.flow_temp,
                self.return_temp,
                hour,
            )
            .map_err(calculation_error)?;

        let context = HourContext {
            inputs,
            performance,
            max_charge,
            max_discharge,
        };
        let mut commitments = self.dispatch(self.order(regime), &context)?;

        let minimum_output = self.heat_pump.minimum_output_threshold(performance);
        let correction = apply_minimum_output(
            &mut commitments,
            &MinimumOutputLimits {
                minimum_output,
                cop: performance.cop,
                max_charge,
                max_discharge,
                heat_demand: inputs.heat_demand,
            },
        );
        if correction == MinimumOutputCorrection::ShutDown {
            warn!(
                hour,
                minimum_output,
                "Heat pump below minimum output and thermal store full, switching off"
            );
        }

        // thermal store
        let charge_from_hp = commitments.heat_total(&HEAT_PUMP_TO_TS);
        let charge_from_aux = commitments.heat(Operation::EauxResToTs);
        let ts_discharge = commitments.heat(Operation::TsToDemand);
        let net_flow = charge_from_hp + charge_from_aux - ts_discharge;
        let (tank_state, thermal_output, demand) =
            if is_close!(net_flow, 0., abs_tol = TANK_STANDBY_TOLERANCE) {
                (TankState::Standby, 0., 0.)
            } else if net_flow > 0. {
                (TankState::Charging, net_flow, 0.)
            } else {
                (TankState::Discharging, 0., -net_flow)
            };
        let final_nodes_temp = self
            .tank
            .new_nodes_temp(
                tank_state,
                &self.state.nodes_temp,
                inputs.source_temp,
                self.source_delta_t,
                inputs.flow_temp,
                self.return_temp,
                thermal_output,
                demand,
                hour,
            )
            .map_err(calculation_error)?
            .pop()
            .ok_or_else(|| calculation_error(anyhow!("Tank update for hour {hour} was empty")))?;

        // battery
        let initial_soc = self.state.soc;
        let charge_from_res = commitments.elec(Operation::ResToEs);
        let charge_from_import = commitments.elec(Operation::ImportToEs);
        let discharge_to_demand = commitments.elec(Operation::EsToDemand);
        let discharge_to_hp = commitments.elec(Operation::EsToHpToDemand);
        let charge_total = charge_from_res + charge_from_import;
        let discharge_total = discharge_to_demand + discharge_to_hp;
        let battery_match = charge_total - discharge_total;
        let final_soc = self.battery.new_soc(battery_match, initial_soc);

        // auxiliary
        let aux_to_demand = commitments.heat(Operation::AuxToDemand);
        let eaux_to_demand = commitments.heat(Operation::EauxResToDemand);
        let aux_usage = self.auxiliary.usage(
            aux_to_demand + eaux_to_demand + charge_from_aux,
            eaux_to_demand + charge_from_aux,
            inputs.import_price,
        );
        let aux_grid_elec = aux_usage.grid_elec;

        // grid
        let import_for_elec_demand = commitments.elec(Operation::ImportToDemand);
        let import_for_hp = commitments.elec(Operation::HpImportToDemand)
            + commitments.elec(Operation::HpImportToTs);
        let total_import =
            import_for_elec_demand + import_for_hp + charge_from_import + aux_grid_elec;
        let export = commitments.elec(Operation::ResToExport);
        let import_cost = total_import * per_megawatt_hour_to_per_kilowatt_hour(inputs.import_price);
        let export_income = export * per_megawatt_hour_to_per_kilowatt_hour(self.export_price);

        let hp_to_demand = commitments.heat_total(&HEAT_PUMP_TO_DEMAND);
        let elec_from_res =
            commitments.elec_total(&[Operation::HpResToDemand, Operation::HpResToTs]);

        let result = TimestepResult {
            hour,
            regime,
            elec_demand: ElecDemandResult {
                elec_demand: inputs.elec_demand,
                res_to_demand: commitments.elec(Operation::ResToDemand),
                es_to_demand: discharge_to_demand,
                import_to_demand: import_for_elec_demand,
            },
            heat_demand: HeatDemandResult {
                heat_demand: inputs.heat_demand,
                hp_to_demand,
                ts_to_demand: ts_discharge,
                aux_to_demand: aux_to_demand + eaux_to_demand,
            },
            renewables: RenewablesResult {
                generation: inputs.generation,
                res_used: inputs.res_used,
                surplus: inputs.surplus,
                res_to_hp: elec_from_res,
                res_to_eaux: eaux_to_demand + charge_from_aux,
                res_to_es: charge_from_res,
                res_to_export: export,
            },
            heat_pump: HeatPumpResult {
                cop: performance.cop,
                duty: performance.duty,
                minimum_output,
                hp_to_demand,
                hp_to_ts: charge_from_hp,
                hp_total: hp_to_demand + charge_from_hp,
                elec_from_res,
                elec_from_import: import_for_hp,
                elec_from_es: discharge_to_hp,
                elec_total: commitments.elec_total(&HEAT_PUMP_OPERATIONS),
                minimum_output_correction: correction,
            },
            thermal_store: ThermalStoreResult {
                max_charge,
                max_discharge,
                charge_from_hp,
                charge_from_aux,
                discharge: ts_discharge,
                state: tank_state,
                final_nodes_temp: final_nodes_temp.clone(),
            },
            auxiliary: AuxiliaryResult {
                to_demand: aux_to_demand + eaux_to_demand,
                to_ts: charge_from_aux,
                fuel_usage: aux_usage.fuel_usage,
                cost: aux_usage.cost,
                mass: aux_usage.mass,
                grid_elec: aux_usage.grid_elec,
            },
            electrical_storage: ElectricalStorageResult {
                initial_soc,
                charge_from_res,
                charge_from_import,
                charge_total,
                discharge_to_demand,
                discharge_to_hp,
                discharge_total,
                final_soc,
                losses: self.battery.total_losses(battery_match, initial_soc),
            },
            grid: GridResult {
                import_price: inputs.import_price,
                import_for_elec_demand,
                import_for_hp,
                import_for_es: charge_from_import,
                import_for_aux: aux_grid_elec,
                total_import,
                export,
                import_cost,
                export_income,
                cashflow: export_income - import_cost,
            },
        };

        debug!(
            hour,
            %regime,
            hp_total = result.heat_pump.hp_total,
            top_node_temp = final_nodes_temp.first().copied().unwrap_or_default(),
            final_soc,
            "Dispatched hour"
        );

        self.state = StorageState {
            nodes_temp: final_nodes_temp,
            soc: final_soc,
        };

        Ok(result)
    }

    fn dispatch(
        &self,
        order: &DispatchOrder,
        context: &HourContext,
    ) -> Result<Commitments, LesaError> {
        let mut checks = RunningChecks {
            elec_unmet: context.inputs.deficit,
            heat_unmet: context.inputs.heat_demand,
            res_left: context.inputs.surplus,
            soc: self.state.soc,
            aux_left: self.auxiliary.capacity(),
            ..Default::default()
        };
        let mut commitments = Commitments::default();

        for &operation in order.operations() {
            let outcome = self.quantity(operation, context, &checks);
            checks.apply(operation, outcome);
            checks.check(context.inputs.hour, operation)?;
            commitments.commit(operation, outcome);
        }

        Ok(commitments)
    }

    /// What `operation` would commit given the energy still unallocated
    fn quantity(
        &self,
        operation: Operation,
        context: &HourContext,
        checks: &RunningChecks,
    ) -> OperationOutcome {
        let performance = context.performance;
        let duty_left = max_of_2(performance.duty - checks.hp_usage, 0.);
        let tank_headroom =
            max_of_2(context.max_charge - checks.ts_charge + checks.ts_discharge, 0.);
        let hp_outcome = |heat: f64| {
            let heat = if self.heat_pump.capacity() > 0. {
                max_of_2(heat, 0.)
            } else {
                0.
            };
            OperationOutcome::HeatElec {
                heat,
                elec: self.heat_pump.elec_usage(heat, performance),
            }
        };
        let hp_output = |elec_supply: f64, heat_demand: f64| {
            min_of_2(
                self.heat_pump
                    .thermal_output(elec_supply, performance, heat_demand),
                duty_left,
            )
        };
        let electric_aux = self.auxiliary.is_electric();
        let soc_before_charge = max_of_2(checks.soc - checks.es_charge, 0.);

        match operation {
            Operation::ResToDemand => OperationOutcome::scalar(context.inputs.res_used),
            Operation::EsToDemand => {
                OperationOutcome::scalar(min_of_2(checks.elec_unmet, checks.soc))
            }
            Operation::ImportToDemand => OperationOutcome::scalar(checks.elec_unmet),
            Operation::HpResToDemand => hp_outcome(hp_output(checks.res_left, checks.heat_unmet)),
            Operation::EauxResToDemand if electric_aux => OperationOutcome::scalar(min_of_3(
                checks.aux_left,
                checks.res_left,
                checks.heat_unmet,
            )),
            Operation::HpImportToDemand => hp_outcome(min_of_2(checks.heat_unmet, duty_left)),
            Operation::TsToDemand => OperationOutcome::scalar(min_of_2(
                checks.heat_unmet,
                max_of_2(
                    context.max_discharge - checks.ts_discharge + checks.ts_charge,
                    0.,
                ),
            )),
            Operation::EsToHpToDemand => hp_outcome(hp_output(checks.soc, checks.heat_unmet)),
            Operation::AuxToDemand => OperationOutcome::scalar(checks.heat_unmet),
            Operation::HpResToTs => hp_outcome(hp_output(checks.res_left, tank_headroom)),
            Operation::EauxResToTs if electric_aux => OperationOutcome::scalar(min_of_3(
                checks.aux_left,
                checks.res_left,
                tank_headroom,
            )),
            Operation::EauxResToDemand | Operation::EauxResToTs => OperationOutcome::scalar(0.),
            Operation::HpImportToTs => hp_outcome(min_of_2(duty_left, tank_headroom)),
            Operation::ResToEs => OperationOutcome::scalar(self.battery.max_charge_input(
                checks.res_left,
                soc_before_charge,
                checks.es_charge,
            )),
            Operation::ImportToEs => OperationOutcome::scalar(
                self.battery
                    .charge_input_left(soc_before_charge, checks.es_charge),
            ),
            Operation::ResToExport => OperationOutcome::scalar(checks.res_left),
        }
    }
}
