use crate::compare_floats::{max_of_2, min_of_2};
use crate::core::material_properties::{
    insulation_thermal_conductivity_hourly, water_specific_heat_capacity,
    water_specific_heat_capacity_kj,
};
use crate::core::units::{
    JOULES_PER_KILOWATT_HOUR, KILOJOULES_PER_KILOWATT_HOUR, LITRES_PER_CUBIC_METRE,
    MILLIMETRES_IN_METRE, SECONDS_PER_HOUR,
};
use crate::errors::ConfigurationError;
use crate::input::{
    CorrectionFactors, Insulation, TankLocation, TankOpenings, ThermalStorageInput,
};
use anyhow::{anyhow, bail};
use nalgebra::DVector;
use ode_solvers::{dop_shared::OutputType, Dopri5, System};
use serde::Serialize;
use std::f64::consts::PI;
use std::sync::Arc;

type State = DVector<f64>;
type Time = f64;

const HEIGHT_TO_RADIUS_RATIO: f64 = 2.5;
const RADIUS_TO_INSULATION_THICKNESS_RATIO: f64 = 8.;

/// deg C, used when the tank sits inside a heated space
const INSIDE_AMBIENT_TEMP: f64 = 15.;

// Standing losses through openings and connections, in kWh/day per unit of the
// quantities below. Dividing by this converts kWh/day to W.
const KWH_PER_DAY_IN_WATTS: f64 = 0.024;
/// per m2 of opening area
const TANK_OPENING_LOSS_FACTOR: f64 = 27.;
/// per m of connection diameter
const UNINSULATED_CONNECTION_LOSS_FACTOR: f64 = 5.;
const INSULATED_CONNECTION_LOSS_FACTOR: f64 = 3.5;

// Dopri5 settings for the unit-time node equations
const RELATIVE_TOLERANCE: f64 = 1e-6;
const ABSOLUTE_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TankState {
    Charging,
    Discharging,
    Standby,
}

/// External dimensions of the cylindrical tank, in m
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TankDimensions {
    /// external radius including insulation
    pub width: f64,
    pub height: f64,
    pub insulation_thickness: f64,
}

impl TankDimensions {
    fn from_capacity(capacity: f64) -> Self {
        let volume = capacity / LITRES_PER_CUBIC_METRE as f64;
        let width = 2. * (volume / (HEIGHT_TO_RADIUS_RATIO * PI)).cbrt();
        let height = 0.5 * HEIGHT_TO_RADIUS_RATIO * width;

        Self {
            width,
            height,
            insulation_thickness: width / RADIUS_TO_INSULATION_THICKNESS_RATIO,
        }
    }
}

/// Coefficients of dT_i/dt = a*T_i + b*T_(i-1) + c*T_(i+1) + d, per unit time
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct NodeCoefficients {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

/// The coupled node equations for one unit-time step
struct StratifiedTank<'a> {
    coefficients: &'a [NodeCoefficients],
}

impl<'a> System<Time, State> for StratifiedTank<'a> {
    fn system(&self, _x: Time, y: &State, dy: &mut State) {
        let last = self.coefficients.len() - 1;
        for (node, coefficients) in self.coefficients.iter().enumerate() {
            let above = if node == 0 { 0. } else { y[node - 1] };
            let below = if node == last { 0. } else { y[node + 1] };
            dy[node] = coefficients.a * y[node]
                + coefficients.b * above
                + coefficients.c * below
                + coefficients.d;
        }
    }
}

/// Mixing indicators for flows entering from above/below a node and leaving to the
/// node above/below it
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct MixingFlags {
    charging_from_top: bool,
    charging_to_bottom: bool,
    discharging_to_top: bool,
    discharging_from_bottom: bool,
}

/// Hottest-first index of the node the source flow enters: the first node no hotter
/// than the source.
fn charging_node(state: TankState, nodes_temp: &[f64], source_temp: f64) -> Option<usize> {
    match state {
        TankState::Charging => nodes_temp.iter().position(|&temp| temp <= source_temp),
        _ => None,
    }
}

/// Only the top node can supply the network, and only when hot enough.
fn discharging_node(state: TankState, nodes_temp: &[f64], flow_temp: f64) -> Option<usize> {
    match state {
        TankState::Discharging if nodes_temp.first().is_some_and(|&top| flow_temp <= top) => {
            Some(0)
        }
        _ => None,
    }
}

fn mixing_flags(
    state: TankState,
    node: usize,
    bottom_node: usize,
    charging_node: Option<usize>,
    discharging_node: Option<usize>,
) -> MixingFlags {
    let number_nodes = bottom_node + 1;
    match state {
        TankState::Charging => {
            let entry = charging_node.unwrap_or(number_nodes);
            MixingFlags {
                charging_from_top: node > entry,
                charging_to_bottom: node != bottom_node && node >= entry,
                ..Default::default()
            }
        }
        TankState::Discharging => {
            let exit = discharging_node.unwrap_or(number_nodes);
            MixingFlags {
                discharging_to_top: node != 0 && node > exit,
                discharging_from_bottom: node != bottom_node && node >= exit,
                ..Default::default()
            }
        }
        TankState::Standby => MixingFlags::default(),
    }
}

/// Integrate the node equations over one unit of time from `nodes_temp`, then
/// restore hottest-first ordering.
fn integrate_unit_step(
    coefficients: &[NodeCoefficients],
    nodes_temp: &[f64],
) -> anyhow::Result<Vec<f64>> {
    let system = StratifiedTank { coefficients };
    let y0 = State::from_column_slice(nodes_temp);

    let x = 0.;
    let x_end = 1.;
    let dx = x_end - x;
    let safety_factor = 0.9;
    let beta = 0.;
    let fac_min = 0.2;
    let fac_max = 10.;
    let h_max = x_end - x;
    let h = 0.;
    let n_max = 100000;
    let n_stiff = 1000;
    let mut stepper = Dopri5::from_param(
        system,
        x,
        x_end,
        dx,
        y0,
        RELATIVE_TOLERANCE,
        ABSOLUTE_TOLERANCE,
        safety_factor,
        beta,
        fac_min,
        fac_max,
        h_max,
        h,
        n_max,
        n_stiff,
        OutputType::Sparse,
    );

    stepper
        .integrate()
        .map_err(|err| anyhow!("Tank node integration failed: {err:?}"))?;

    let mut new_temps: Vec<f64> = stepper
        .y_out()
        .last()
        .ok_or_else(|| anyhow!("Tank node integration produced no output"))?
        .iter()
        .copied()
        .collect();
    new_temps.sort_by(|a, b| b.total_cmp(a));

    Ok(new_temps)
}

/// Mass of water (kg) circulated through the heat source to deliver `thermal_output`
fn source_mass_flow(thermal_output: f64, source_temp: f64, source_delta_t: f64) -> f64 {
    if source_delta_t <= 0. {
        return 0.;
    }
    thermal_output * KILOJOULES_PER_KILOWATT_HOUR as f64
        / (water_specific_heat_capacity_kj(source_temp) * source_delta_t)
}

fn network_mass_flow(demand: f64, flow_temp: f64, return_temp: f64) -> f64 {
    let delta_t = flow_temp - return_temp;
    if delta_t <= 0. {
        return 0.;
    }
    demand * KILOJOULES_PER_KILOWATT_HOUR as f64
        / (water_specific_heat_capacity_kj(flow_temp) * delta_t)
}

/// A stratified hot water thermal store, discretised into `number_nodes` fully mixed
/// layers ordered hottest (top) first.
#[derive(Clone, Debug)]
pub struct HotWaterTank {
    /// litres
    capacity: f64,
    insulation: Insulation,
    location: TankLocation,
    number_nodes: usize,
    tank_openings: TankOpenings,
    correction_factors: CorrectionFactors,
    dimensions: TankDimensions,
    /// hourly outdoor air temperature, needed when the tank is outside
    air_temperature: Option<Arc<[f64]>>,
}

impl HotWaterTank {
    pub fn new(
        capacity: f64,
        insulation: Insulation,
        location: TankLocation,
        number_nodes: usize,
        tank_openings: TankOpenings,
        correction_factors: CorrectionFactors,
        air_temperature: Option<Arc<[f64]>>,
    ) -> Result<Self, ConfigurationError> {
        // a top and a bottom node are needed to stratify
        if number_nodes < 2 {
            return Err(ConfigurationError::Invalid(format!(
                "Thermal store needs at least 2 nodes, got {number_nodes}"
            )));
        }

        Ok(Self {
            capacity,
            insulation,
            location,
            number_nodes,
            tank_openings,
            correction_factors,
            dimensions: TankDimensions::from_capacity(capacity),
            air_temperature,
        })
    }

    pub fn from_input(
        input: &ThermalStorageInput,
        air_temperature: Option<Arc<[f64]>>,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            input.capacity,
            input.insulation.parse()?,
            input.location.parse()?,
            input.number_nodes,
            input.tank_openings,
            input.correction_factors,
            air_temperature,
        )
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn location(&self) -> TankLocation {
        self.location
    }

    pub fn dimensions(&self) -> TankDimensions {
        self.dimensions
    }

    /// Mass of water in each node, in kg
    pub fn node_mass(&self) -> f64 {
        self.capacity / self.number_nodes as f64
    }

    pub fn init_temps(&self, initial_temp: f64) -> Vec<f64> {
        vec![initial_temp; self.number_nodes]
    }

    fn ambient_temp(&self, hour: usize) -> anyhow::Result<f64> {
        match self.location {
            TankLocation::Inside => Ok(INSIDE_AMBIENT_TEMP),
            TankLocation::Outside => self
                .air_temperature
                .as_ref()
                .ok_or_else(|| anyhow!("Tank located outside requires an air temperature series"))?
                .get(hour)
                .copied()
                .ok_or_else(|| anyhow!("No air temperature available for hour {hour}")),
        }
    }

    /// Heat loss coefficient of the whole tank shell, in J/(h.K)
    pub fn heat_loss_coefficient(&self) -> f64 {
        if self.capacity <= 0. {
            return 0.;
        }
        let TankDimensions {
            width,
            height,
            insulation_thickness,
        } = self.dimensions;
        let inner_radius = width - insulation_thickness;
        let outer_radius = width;

        self.correction_factors.overall_factor
            * self.correction_factors.insulation_factor
            * insulation_thermal_conductivity_hourly(self.insulation)
            / (outer_radius - inner_radius)
            * PI
            * (inner_radius.powi(2) + height * (outer_radius + inner_radius))
    }

    /// Standing losses through openings and pipe connections, in J/h
    pub fn connection_losses(&self) -> f64 {
        let TankOpenings {
            tank_opening,
            tank_opening_diameter,
            uninsulated_connections,
            uninsulated_connections_diameter,
            insulated_connections,
            insulated_connections_diameter,
        } = self.tank_openings;
        let mm_in_m = MILLIMETRES_IN_METRE as f64;

        let opening_loss = (tank_opening_diameter / mm_in_m).powi(2)
            * PI
            * tank_opening
            * TANK_OPENING_LOSS_FACTOR
            / (4. * KWH_PER_DAY_IN_WATTS);
        let uninsulated_loss = uninsulated_connections_diameter / mm_in_m
            * uninsulated_connections
            * UNINSULATED_CONNECTION_LOSS_FACTOR
            / KWH_PER_DAY_IN_WATTS;
        let insulated_loss = insulated_connections_diameter / mm_in_m
            * insulated_connections
            * INSULATED_CONNECTION_LOSS_FACTOR
            / KWH_PER_DAY_IN_WATTS;

        (opening_loss + uninsulated_loss + insulated_loss) * SECONDS_PER_HOUR as f64
    }

    /// Mass of water (kg) moved through the tank to carry the heat difference
    /// between what the source delivers and what the network draws.
    ///
    /// Arguments:
    /// * `thermal_output` - heat delivered by the source (kWh)
    /// * `demand` - heat drawn by the network (kWh)
    /// * `temp_tank_bottom`, `temp_tank_top` - current boundary node temperatures
    pub fn mass_flow(
        &self,
        state: TankState,
        flow_temp: f64,
        return_temp: f64,
        source_temp: f64,
        source_delta_t: f64,
        thermal_output: f64,
        demand: f64,
        temp_tank_bottom: f64,
        temp_tank_top: f64,
    ) -> f64 {
        let source_heat = source_mass_flow(thermal_output, source_temp, source_delta_t)
            * source_delta_t;
        let network_heat =
            network_mass_flow(demand, flow_temp, return_temp) * (flow_temp - return_temp);

        let mass_flow = match state {
            TankState::Charging => {
                let delta_t = source_temp - temp_tank_bottom;
                if delta_t <= 0. {
                    return 0.;
                }
                (source_heat - network_heat) / delta_t
            }
            TankState::Discharging => {
                let delta_t = temp_tank_top - return_temp;
                if delta_t <= 0. {
                    return 0.;
                }
                (network_heat - source_heat).abs() / delta_t
            }
            TankState::Standby => 0.,
        };

        max_of_2(mass_flow, 0.)
    }

    fn node_coefficients(
        &self,
        state: TankState,
        nodes_temp: &[f64],
        source_temp: f64,
        flow_temp: f64,
        return_temp: f64,
        mass_flow: f64,
        step_hours: f64,
        ambient_temp: f64,
    ) -> Vec<NodeCoefficients> {
        let number_nodes = self.number_nodes as f64;
        let node_mass = self.node_mass();
        let bottom_node = self.number_nodes - 1;
        let charging_node = charging_node(state, nodes_temp, source_temp);
        let discharging_node = discharging_node(state, nodes_temp, flow_temp);

        // Shell and connection losses are shared evenly between the nodes and
        // scaled to the sub-step, in J/K and J.
        let loss_coefficient = self.heat_loss_coefficient() * step_hours / number_nodes;
        let connection_loss = self.correction_factors.overall_factor
            * self.connection_losses()
            * step_hours
            / number_nodes;
        let flow_ratio = mass_flow / node_mass;

        nodes_temp
            .iter()
            .enumerate()
            .map(|(node, &temp)| {
                let heat_capacity = node_mass * water_specific_heat_capacity(temp);
                let flags = mixing_flags(state, node, bottom_node, charging_node, discharging_node);
                let source_in = charging_node == Some(node);
                let network_out = discharging_node == Some(node);
                let return_in = discharging_node.is_some() && node == bottom_node;
                let source_out = charging_node.is_some() && node == bottom_node;

                let outflows = [
                    network_out,
                    flags.discharging_to_top,
                    flags.charging_to_bottom,
                    source_out,
                ]
                .into_iter()
                .filter(|&flow| flow)
                .count() as f64;

                NodeCoefficients {
                    a: -outflows * flow_ratio - loss_coefficient / heat_capacity,
                    b: f64::from(u8::from(flags.charging_from_top)) * flow_ratio,
                    c: f64::from(u8::from(flags.discharging_from_bottom)) * flow_ratio,
                    d: (f64::from(u8::from(source_in)) * source_temp
                        + f64::from(u8::from(return_in)) * return_temp)
                        * flow_ratio
                        + (loss_coefficient * ambient_temp - connection_loss) / heat_capacity,
                }
            })
            .collect()
    }

    fn check_nodes(&self, nodes_temp: &[f64]) -> anyhow::Result<()> {
        if nodes_temp.len() != self.number_nodes {
            bail!(
                "Expected {} node temperatures, got {}",
                self.number_nodes,
                nodes_temp.len()
            );
        }
        Ok(())
    }

    /// Node temperatures after each sub-step of the hour, the last entry being the
    /// state at the end of the hour.
    ///
    /// The hour is split into as many sub-steps as nodes the total flow would displace
    /// (at least one, at most `number_nodes`), and no sub-step moves more than a
    /// node's mass.
    pub fn new_nodes_temp(
        &self,
        state: TankState,
        nodes_temp: &[f64],
        source_temp: f64,
        source_delta_t: f64,
        flow_temp: f64,
        return_temp: f64,
        thermal_output: f64,
        demand: f64,
        hour: usize,
    ) -> anyhow::Result<Vec<Vec<f64>>> {
        if self.capacity == 0. {
            return Ok(vec![nodes_temp.to_vec()]);
        }
        self.check_nodes(nodes_temp)?;

        let ambient_temp = self.ambient_temp(hour)?;
        let node_mass = self.node_mass();
        let bottom_node = self.number_nodes - 1;

        let total_mass_flow = self.mass_flow(
            state,
            flow_temp,
            return_temp,
            source_temp,
            source_delta_t,
            thermal_output,
            demand,
            nodes_temp[bottom_node],
            nodes_temp[0],
        );
        // NaN casts to zero
        let sub_steps =
            ((total_mass_flow / node_mass).ceil() as usize).clamp(1, self.number_nodes);
        let step_hours = 1. / sub_steps as f64;

        let mut temps = nodes_temp.to_vec();
        let mut history = Vec::with_capacity(sub_steps);
        for _ in 0..sub_steps {
            let mass_flow = min_of_2(
                self.mass_flow(
                    state,
                    flow_temp,
                    return_temp,
                    source_temp,
                    source_delta_t,
                    thermal_output * step_hours,
                    demand * step_hours,
                    temps[bottom_node],
                    temps[0],
                ),
                node_mass,
            );
            let coefficients = self.node_coefficients(
                state,
                &temps,
                source_temp,
                flow_temp,
                return_temp,
                mass_flow,
                step_hours,
                ambient_temp,
            );
            temps = integrate_unit_step(&coefficients, &temps)?;
            history.push(temps.clone());
        }

        Ok(history)
    }

    /// Maximum energy (kWh) the tank can absorb (`Charging`) or release
    /// (`Discharging`) in one hour, found by pushing a full node of water through the
    /// tank at each of `number_nodes - 1` steps.
    pub fn max_energy_in_out(
        &self,
        state: TankState,
        nodes_temp: &[f64],
        source_temp: f64,
        flow_temp: f64,
        return_temp: f64,
        hour: usize,
    ) -> anyhow::Result<f64> {
        if self.capacity == 0. {
            return Ok(0.);
        }
        self.check_nodes(nodes_temp)?;

        let saturated = match state {
            TankState::Charging => nodes_temp.iter().all(|&temp| temp >= source_temp),
            TankState::Discharging => nodes_temp.iter().all(|&temp| temp <= return_temp),
            TankState::Standby => true,
        };
        if saturated {
            return Ok(0.);
        }

        let ambient_temp = self.ambient_temp(hour)?;
        let node_mass = self.node_mass();
        let bottom_node = self.number_nodes - 1;
        let specific_heat = water_specific_heat_capacity(source_temp);
        let steps = self.number_nodes - 1;
        let step_hours = 1. / steps as f64;

        let mut temps = nodes_temp.to_vec();
        let mut energy = 0.;
        for _ in 0..steps {
            let (temp_top, temp_bottom) = (temps[0], temps[bottom_node]);
            energy += match state {
                TankState::Charging if source_temp > temp_bottom => {
                    node_mass * specific_heat * (source_temp - temp_bottom)
                }
                TankState::Discharging if temp_top >= flow_temp => {
                    max_of_2(node_mass * specific_heat * (temp_top - return_temp), 0.)
                }
                _ => 0.,
            };

            let coefficients = self.node_coefficients(
                state,
                &temps,
                source_temp,
                flow_temp,
                return_temp,
                node_mass,
                step_hours,
                ambient_temp,
            );
            temps = integrate_unit_step(&coefficients, &temps)?;
        }

        Ok(energy / JOULES_PER_KILOWATT_HOUR as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn tank_with(capacity: f64, location: TankLocation, air: Option<Arc<[f64]>>) -> HotWaterTank {
        HotWaterTank::new(
            capacity,
            Insulation::Polyurethane,
            location,
            5,
            TankOpenings {
                tank_opening: 1.,
                tank_opening_diameter: 50.,
                uninsulated_connections: 2.,
                uninsulated_connections_diameter: 20.,
                insulated_connections: 3.,
                insulated_connections_diameter: 15.,
            },
            CorrectionFactors {
                insulation_factor: 1.,
                overall_factor: 1.,
            },
            air,
        )
        .unwrap()
    }

    #[fixture]
    fn tank() -> HotWaterTank {
        tank_with(1000., TankLocation::Inside, None)
    }

    fn assert_sorted_descending(temps: &[f64]) {
        for pair in temps.windows(2) {
            assert!(pair[0] >= pair[1], "temperatures not sorted: {temps:?}");
        }
    }

    fn stored_energy(tank: &HotWaterTank, temps: &[f64]) -> f64 {
        temps
            .iter()
            .map(|&temp| tank.node_mass() * water_specific_heat_capacity(temp) * temp)
            .sum::<f64>()
            / JOULES_PER_KILOWATT_HOUR as f64
    }

    #[rstest]
    fn test_dimensions(tank: HotWaterTank) {
        let dimensions = tank.dimensions();
        assert_relative_eq!(dimensions.width, 1.0061591983208718, max_relative = 1e-9);
        assert_relative_eq!(dimensions.height, 1.2576989979010897, max_relative = 1e-9);
        assert_relative_eq!(
            dimensions.insulation_thickness,
            0.12576989979010897,
            max_relative = 1e-9
        );
    }

    #[rstest]
    fn test_heat_loss_coefficient(tank: HotWaterTank) {
        assert_relative_eq!(
            tank.heat_loss_coefficient(),
            7076.559676629852,
            max_relative = 1e-9
        );
        assert_eq!(
            tank_with(0., TankLocation::Inside, None).heat_loss_coefficient(),
            0.
        );
    }

    #[rstest]
    fn test_connection_losses(tank: HotWaterTank) {
        // 17.1 W
        assert_relative_eq!(
            tank.connection_losses(),
            61577.15640439917,
            max_relative = 1e-9
        );
    }

    #[rstest]
    fn test_charging_and_discharging_nodes() {
        let temps = [70., 55., 40., 30.];
        assert_eq!(charging_node(TankState::Charging, &temps, 50.), Some(2));
        assert_eq!(charging_node(TankState::Charging, &temps, 25.), None);
        assert_eq!(charging_node(TankState::Discharging, &temps, 50.), None);
        assert_eq!(discharging_node(TankState::Discharging, &temps, 65.), Some(0));
        assert_eq!(discharging_node(TankState::Discharging, &temps, 75.), None);
        assert_eq!(discharging_node(TankState::Standby, &temps, 65.), None);
    }

    #[rstest]
    fn test_mass_flow(tank: HotWaterTank) {
        assert_relative_eq!(
            tank.mass_flow(TankState::Charging, 65., 40., 70., 5., 10., 0., 40., 40.),
            286.39618138424817,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            tank.mass_flow(TankState::Discharging, 65., 40., 70., 5., 0., 5., 70., 70.),
            143.36917562724017,
            max_relative = 1e-9
        );
        // source no hotter than the bottom of the tank
        assert_eq!(
            tank.mass_flow(TankState::Charging, 65., 40., 50., 5., 10., 0., 55., 70.),
            0.
        );
        // network draws more than the source delivers while charging
        assert_eq!(
            tank.mass_flow(TankState::Charging, 65., 40., 70., 5., 1., 10., 40., 70.),
            0.
        );
        assert_eq!(
            tank.mass_flow(TankState::Standby, 65., 40., 70., 5., 10., 10., 40., 70.),
            0.
        );
    }

    #[rstest]
    fn test_zero_capacity_tank_is_unchanged() {
        let tank = tank_with(0., TankLocation::Inside, None);
        let temps = vec![50.; 5];
        let result = tank
            .new_nodes_temp(TankState::Charging, &temps, 70., 5., 65., 40., 10., 0., 0)
            .unwrap();
        assert_eq!(result, vec![temps.clone()]);
        assert_eq!(
            tank.max_energy_in_out(TankState::Charging, &temps, 70., 65., 40., 0)
                .unwrap(),
            0.
        );
    }

    #[rstest]
    fn test_no_discharge_from_cold_tank(tank: HotWaterTank) {
        assert_eq!(
            tank.max_energy_in_out(TankState::Discharging, &[40.; 5], 70., 65., 65., 0)
                .unwrap(),
            0.
        );
    }

    #[rstest]
    fn test_no_charge_into_full_tank(tank: HotWaterTank) {
        assert_eq!(
            tank.max_energy_in_out(TankState::Charging, &[70.; 5], 70., 65., 40., 0)
                .unwrap(),
            0.
        );
        assert_eq!(
            tank.max_energy_in_out(TankState::Standby, &[50.; 5], 70., 65., 40., 0)
                .unwrap(),
            0.
        );
    }

    #[rstest]
    fn test_max_energy_in_is_bounded(tank: HotWaterTank) {
        // four steps each pushing 200 kg of 70 degC water over a 40 degC bottom node
        let upper_bound = 4. * 200. * 4190. * 30. / 3_600_000.;
        let energy = tank
            .max_energy_in_out(TankState::Charging, &[40.; 5], 70., 65., 40., 0)
            .unwrap();
        assert!(energy > 0.5 * upper_bound, "{energy}");
        assert!(energy <= upper_bound * 1.0001, "{energy}");
    }

    #[rstest]
    fn test_max_energy_out_of_hot_tank(tank: HotWaterTank) {
        let energy = tank
            .max_energy_in_out(TankState::Discharging, &[70.; 5], 70., 65., 40., 0)
            .unwrap();
        // the first step alone releases a full node at 70 degC
        assert!(energy >= 200. * 4190. * 30. / 3_600_000. * 0.99, "{energy}");
        assert!(energy <= 4. * 200. * 4190. * 30. / 3_600_000., "{energy}");
    }

    #[rstest]
    fn test_charging_raises_temperatures(tank: HotWaterTank) {
        let temps = vec![40.; 5];
        let history = tank
            .new_nodes_temp(TankState::Charging, &temps, 70., 5., 65., 40., 10., 0., 0)
            .unwrap();

        // 286 kg over 200 kg nodes
        assert_eq!(history.len(), 2);
        let final_temps = history.last().unwrap();
        assert_sorted_descending(final_temps);
        assert!(final_temps[0] > 40. && final_temps[0] <= 70.);
        assert!(final_temps.iter().all(|&temp| temp > 39.5));
        assert!(stored_energy(&tank, final_temps) > stored_energy(&tank, &temps));
    }

    #[rstest]
    fn test_discharging_cools_bottom(tank: HotWaterTank) {
        let temps = vec![70.; 5];
        let history = tank
            .new_nodes_temp(TankState::Discharging, &temps, 70., 5., 65., 40., 0., 5., 0)
            .unwrap();

        assert_eq!(history.len(), 1);
        let final_temps = &history[0];
        assert_sorted_descending(final_temps);
        assert!(final_temps[4] < 69.);
        assert!(final_temps[0] > 69.);
        assert!(stored_energy(&tank, final_temps) < stored_energy(&tank, &temps));
    }

    #[rstest]
    fn test_standby_only_loses_heat(tank: HotWaterTank) {
        let temps = vec![60.; 5];
        let history = tank
            .new_nodes_temp(TankState::Standby, &temps, 70., 5., 65., 40., 0., 0., 0)
            .unwrap();

        assert_eq!(history.len(), 1);
        let final_temps = &history[0];
        assert_sorted_descending(final_temps);
        assert!(final_temps.iter().all(|&temp| temp < 60. && temp > 59.8));
    }

    #[rstest]
    fn test_standby_at_ambient_loses_connection_losses(tank: HotWaterTank) {
        let ambient = INSIDE_AMBIENT_TEMP;
        let history = tank
            .new_nodes_temp(TankState::Standby, &[ambient; 5], 70., 5., 65., 40., 0., 0., 0)
            .unwrap();

        // dT/dt = -k (T - Ta) - q for every node, starting from Ta
        let heat_capacity = tank.node_mass() * water_specific_heat_capacity(ambient);
        let k = tank.heat_loss_coefficient() / 5. / heat_capacity;
        let q = tank.connection_losses() / 5. / heat_capacity;
        let expected = ambient - q / k * (1. - (-k).exp());
        for &temp in &history[0] {
            assert!(temp < ambient);
            assert_relative_eq!(temp, expected, epsilon = 1e-6);
        }

        // the whole tank loses its connection losses over the hour
        let lost: f64 = history[0]
            .iter()
            .map(|&temp| (ambient - temp) * heat_capacity)
            .sum();
        assert_relative_eq!(lost, tank.connection_losses(), max_relative = 1e-2);
    }

    #[rstest]
    fn test_sealed_tank_at_ambient_holds_temperature() {
        let sealed = HotWaterTank::new(
            1000.,
            Insulation::Polyurethane,
            TankLocation::Inside,
            5,
            TankOpenings::default(),
            CorrectionFactors {
                insulation_factor: 1.,
                overall_factor: 1.,
            },
            None,
        )
        .unwrap();
        let history = sealed
            .new_nodes_temp(TankState::Standby, &[15.; 5], 70., 5., 65., 40., 0., 0., 0)
            .unwrap();
        for &temp in &history[0] {
            assert_relative_eq!(temp, 15., epsilon = 1e-9);
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    fn test_rejects_fewer_than_two_nodes(#[case] number_nodes: usize) {
        assert!(matches!(
            HotWaterTank::new(
                1000.,
                Insulation::Polyurethane,
                TankLocation::Inside,
                number_nodes,
                TankOpenings::default(),
                CorrectionFactors {
                    insulation_factor: 1.,
                    overall_factor: 1.,
                },
                None,
            ),
            Err(ConfigurationError::Invalid(_))
        ));
    }

    #[rstest]
    fn test_from_input_parses_names() {
        let input = ThermalStorageInput {
            capacity: 500.,
            insulation: "Fibreglass".to_owned(),
            location: "outside".to_owned(),
            number_nodes: 4,
            tank_openings: TankOpenings::default(),
            correction_factors: CorrectionFactors {
                insulation_factor: 1.,
                overall_factor: 1.,
            },
        };
        let tank = HotWaterTank::from_input(&input, None).unwrap();
        assert_eq!(tank.location(), TankLocation::Outside);

        let input = ThermalStorageInput {
            insulation: "aerogel".to_owned(),
            ..input
        };
        assert!(matches!(
            HotWaterTank::from_input(&input, None),
            Err(ConfigurationError::UnknownVariant {
                kind: "insulation",
                ..
            })
        ));
    }

    #[rstest]
    fn test_outside_tank_uses_air_temperature(tank: HotWaterTank) {
        let outside = tank_with(
            1000.,
            TankLocation::Outside,
            Some(vec![-5.; 24].into()),
        );
        let temps = vec![60.; 5];
        let inside_temps = tank
            .new_nodes_temp(TankState::Standby, &temps, 70., 5., 65., 40., 0., 0., 3)
            .unwrap();
        let outside_temps = outside
            .new_nodes_temp(TankState::Standby, &temps, 70., 5., 65., 40., 0., 0., 3)
            .unwrap();
        assert!(outside_temps[0][0] < inside_temps[0][0]);
    }

    #[rstest]
    fn test_outside_tank_without_air_temperature_fails() {
        let outside = tank_with(1000., TankLocation::Outside, None);
        assert!(outside
            .new_nodes_temp(TankState::Standby, &[60.; 5], 70., 5., 65., 40., 0., 0., 0)
            .is_err());
    }

    #[rstest]
    fn test_wrong_number_of_nodes_fails(tank: HotWaterTank) {
        assert!(tank
            .new_nodes_temp(TankState::Standby, &[60.; 3], 70., 5., 65., 40., 0., 0., 0)
            .is_err());
    }
}
