use crate::core::controls::dispatch::Regime;
use crate::core::heating_systems::hot_water_tank::TankState;
use anyhow::bail;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// What the minimum output rule did to the heat pump this hour
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimumOutputCorrection {
    #[default]
    NotRequired,
    /// extra output sent to the thermal store
    ToppedUp,
    /// heat pump switched off for the hour
    ShutDown,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ElecDemandResult {
    pub elec_demand: f64,
    pub res_to_demand: f64,
    pub es_to_demand: f64,
    pub import_to_demand: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HeatDemandResult {
    pub heat_demand: f64,
    pub hp_to_demand: f64,
    pub ts_to_demand: f64,
    /// auxiliary heat, including electric auxiliary heat from renewables
    pub aux_to_demand: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RenewablesResult {
    pub generation: f64,
    pub res_used: f64,
    pub surplus: f64,
    pub res_to_hp: f64,
    pub res_to_eaux: f64,
    pub res_to_es: f64,
    pub res_to_export: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HeatPumpResult {
    pub cop: f64,
    pub duty: f64,
    pub minimum_output: f64,
    pub hp_to_demand: f64,
    pub hp_to_ts: f64,
    pub hp_total: f64,
    pub elec_from_res: f64,
    pub elec_from_import: f64,
    pub elec_from_es: f64,
    pub elec_total: f64,
    pub minimum_output_correction: MinimumOutputCorrection,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThermalStoreResult {
    pub max_charge: f64,
    pub max_discharge: f64,
    pub charge_from_hp: f64,
    pub charge_from_aux: f64,
    pub discharge: f64,
    pub state: TankState,
    pub final_nodes_temp: Vec<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AuxiliaryResult {
    pub to_demand: f64,
    pub to_ts: f64,
    pub fuel_usage: f64,
    pub cost: f64,
    pub mass: f64,
    pub grid_elec: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ElectricalStorageResult {
    pub initial_soc: f64,
    pub charge_from_res: f64,
    pub charge_from_import: f64,
    pub charge_total: f64,
    pub discharge_to_demand: f64,
    pub discharge_to_hp: f64,
    pub discharge_total: f64,
    pub final_soc: f64,
    pub losses: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GridResult {
    pub import_price: f64,
    pub import_for_elec_demand: f64,
    pub import_for_hp: f64,
    pub import_for_es: f64,
    pub import_for_aux: f64,
    pub total_import: f64,
    pub export: f64,
    pub import_cost: f64,
    pub export_income: f64,
    pub cashflow: f64,
}

/// Everything the controller decided and computed for one hour (energies in kWh,
/// money in £)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimestepResult {
    pub hour: usize,
    pub regime: Regime,
    pub elec_demand: ElecDemandResult,
    pub heat_demand: HeatDemandResult,
    pub renewables: RenewablesResult,
    pub heat_pump: HeatPumpResult,
    pub thermal_store: ThermalStoreResult,
    pub auxiliary: AuxiliaryResult,
    pub electrical_storage: ElectricalStorageResult,
    pub grid: GridResult,
}

impl TimestepResult {
    /// Flatten into named columns: nested fields are joined with `.` and array
    /// elements keyed by their index.
    pub fn flatten(&self) -> anyhow::Result<IndexMap<String, Value>> {
        let mut columns = IndexMap::new();
        flatten_into(&mut columns, None, serde_json::to_value(self)?)?;
        Ok(columns)
    }
}

fn flatten_into(
    columns: &mut IndexMap<String, Value>,
    prefix: Option<&str>,
    value: Value,
) -> anyhow::Result<()> {
    let key = |name: &str| match prefix {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_owned(),
    };

    match value {
        Value::Object(fields) => {
            for (name, field) in fields {
                flatten_into(columns, Some(&key(&name)), field)?;
            }
        }
        Value::Array(items) => {
            for (index, item) in items.into_iter().enumerate() {
                flatten_into(columns, Some(&key(&index.to_string())), item)?;
            }
        }
        scalar => {
            let Some(prefix) = prefix else {
                bail!("Cannot flatten a bare value into named columns");
            };
            columns.insert(prefix.to_owned(), scalar);
        }
    }

    Ok(())
}
