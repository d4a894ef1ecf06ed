use crate::compare_floats::{clip, max_of_2, min_of_2};
use crate::input::ElectricalStorageInput;

/// An object to represent a single-node electric battery
///
/// All quantities are in kWh per hourly timestep. A positive `energy_match`
/// means energy offered to the battery, a negative one energy requested from it.
#[derive(Clone, Debug, PartialEq)]
pub struct ElectricBattery {
    /// the maximum capacity of the battery (kWh)
    capacity: f64,
    /// initial state of charge as a fraction of capacity (between 0 & 1)
    initial_state: f64,
    /// the maximum energy that can be stored in one timestep (kWh)
    charge_max: f64,
    /// the maximum energy that can be drawn in one timestep (kWh)
    discharge_max: f64,
    charge_efficiency: f64,
    discharge_efficiency: f64,
    /// fraction of the state of charge lost each timestep
    self_discharge: f64,
}

/// Arguments:
/// * `capacity` - the maximum capacity of the battery (kWh)
/// * `initial_state` - state of charge at the start of the simulation, as a fraction of capacity
/// * `charge_max` - the maximum charge per timestep (kWh)
/// * `discharge_max` - the maximum discharge per timestep (kWh)
/// * `charge_efficiency` - one way charging efficiency (between 0 & 1)
/// * `discharge_efficiency` - one way discharging efficiency (between 0 & 1)
/// * `self_discharge` - fraction of stored energy lost per timestep (between 0 & 1)
impl ElectricBattery {
    pub fn new(
        capacity: f64,
        initial_state: f64,
        charge_max: f64,
        discharge_max: f64,
        charge_efficiency: f64,
        discharge_efficiency: f64,
        self_discharge: f64,
    ) -> Self {
        Self {
            capacity,
            initial_state,
            charge_max,
            discharge_max,
            charge_efficiency,
            discharge_efficiency,
            self_discharge,
        }
    }

    pub fn from_input(input: &ElectricalStorageInput) -> Self {
        Self::new(
            input.capacity,
            input.initial_state,
            input.charge_max,
            input.discharge_max,
            input.charge_efficiency,
            input.discharge_efficiency,
            input.self_discharge,
        )
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// State of charge at the start of the simulation (kWh)
    pub fn init_state(&self) -> f64 {
        self.initial_state * self.capacity
    }

    /// Energy stored when `energy_match` is offered, limited by the charge rate.
    pub fn max_charging(&self, energy_match: f64) -> f64 {
        clip(energy_match * self.charge_efficiency, 0., self.charge_max)
    }

    /// Energy drawn (negative) when `energy_match` is requested, limited by the discharge rate.
    pub fn max_discharging(&self, energy_match: f64) -> f64 {
        clip(
            energy_match * self.discharge_efficiency,
            -self.discharge_max,
            0.,
        )
    }

    pub fn self_loss(&self, soc: f64) -> f64 {
        soc * self.self_discharge
    }

    /// State of charge at the end of the timestep
    ///
    /// Arguments:
    /// * `energy_match` - net energy offered to (positive) or requested from (negative) the battery
    /// * `soc` - state of charge at the start of the timestep
    pub fn new_soc(&self, energy_match: f64, soc: f64) -> f64 {
        clip(
            soc + self.max_charging(energy_match) + self.max_discharging(energy_match)
                - self.self_loss(soc),
            0.,
            self.capacity,
        )
    }

    pub fn charging(&self, energy_match: f64, soc: f64) -> f64 {
        if energy_match >= 0. {
            self.new_soc(energy_match, soc) - soc
        } else {
            0.
        }
    }

    pub fn discharging(&self, energy_match: f64, soc: f64) -> f64 {
        if energy_match < 0. {
            self.new_soc(energy_match, soc) - soc
        } else {
            0.
        }
    }

    /// Input energy needed to fill the battery from `soc`, limited by the charge rate.
    pub fn charge_to_capacity(&self, soc: f64) -> f64 {
        if self.charge_efficiency <= 0. {
            return 0.;
        }
        let storable = min_of_2(
            self.capacity - soc + self.self_loss(soc),
            self.charge_max,
        );
        storable.max(0.) / self.charge_efficiency
    }

    /// Input energy the battery can still take this timestep, when `charged` has
    /// already been committed to it from a state of charge `soc`
    pub fn charge_input_left(&self, soc: f64, charged: f64) -> f64 {
        max_of_2(self.charge_to_capacity(soc) - charged, 0.)
    }

    /// Input energy accepted from an `available` supply
    pub fn max_charge_input(&self, available: f64, soc: f64, charged: f64) -> f64 {
        min_of_2(available, self.charge_input_left(soc, charged)).max(0.)
    }

    /// Conversion and standing losses over the timestep; reporting only. When
    /// charging, the input equals the change in charge plus these losses.
    pub fn total_losses(&self, energy_match: f64, soc: f64) -> f64 {
        let self_loss = self.self_loss(soc);
        let conversion = if energy_match >= 0. {
            let stored = max_of_2(self.charging(energy_match, soc) + self_loss, 0.);
            if self.charge_efficiency > 0. {
                stored * (1. - self.charge_efficiency) / self.charge_efficiency
            } else {
                0.
            }
        } else {
            (1. - self.discharge_efficiency) * self.discharging(energy_match, soc).abs()
        };
        conversion + self_loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    #[fixture]
    pub fn battery() -> ElectricBattery {
        ElectricBattery::new(100., 0.5, 20., 15., 0.95, 0.9, 0.01)
    }

    #[rstest]
    fn test_init_state(battery: ElectricBattery) {
        assert_relative_eq!(battery.init_state(), 50.);
    }

    #[rstest]
    fn test_max_charging(battery: ElectricBattery) {
        // rate limited
        assert_relative_eq!(battery.max_charging(30.), 20.);
        // efficiency limited
        assert_relative_eq!(battery.max_charging(10.), 9.5, max_relative = 1e-12);
        // nothing offered
        assert_eq!(battery.max_charging(-10.), 0.);
    }

    #[rstest]
    fn test_max_discharging(battery: ElectricBattery) {
        assert_relative_eq!(battery.max_discharging(-30.), -15.);
        assert_relative_eq!(battery.max_discharging(-10.), -9., max_relative = 1e-12);
        assert_eq!(battery.max_discharging(10.), 0.);
    }

    #[rstest]
    fn test_new_soc_when_charging_above_rate(battery: ElectricBattery) {
        // 50 + min(30 * 0.95, 20) - 50 * 0.01
        assert_relative_eq!(battery.new_soc(30., 50.), 69.5, max_relative = 1e-12);
    }

    #[rstest]
    fn test_new_soc_is_bounded(battery: ElectricBattery) {
        assert_relative_eq!(battery.new_soc(1000., 99.), 100.);
        assert_eq!(battery.new_soc(-1000., 5.), 0.);

        for soc in [0., 12.5, 50., 99.9, 100.] {
            for energy_match in [-500., -7.3, 0., 3.1, 500.] {
                let new_soc = battery.new_soc(energy_match, soc);
                assert!((0. ..=100.).contains(&new_soc));
            }
            assert!(battery.new_soc(0., soc) <= soc);
        }
    }

    #[rstest]
    fn test_charging_and_discharging_signs(battery: ElectricBattery) {
        assert_relative_eq!(battery.charging(10., 50.), 9., max_relative = 1e-12);
        assert_eq!(battery.charging(-10., 50.), 0.);
        assert_relative_eq!(battery.discharging(-10., 50.), -9.5, max_relative = 1e-12);
        assert_eq!(battery.discharging(10., 50.), 0.);
    }

    #[rstest]
    fn test_charge_to_capacity(battery: ElectricBattery) {
        // limited by headroom: (100 - 95 + 0.95) / 0.95
        assert_relative_eq!(
            battery.charge_to_capacity(95.),
            5.95 / 0.95,
            max_relative = 1e-12
        );
        // limited by charge rate
        assert_relative_eq!(
            battery.charge_to_capacity(10.),
            20. / 0.95,
            max_relative = 1e-12
        );

        // filling with exactly that input reaches capacity
        let input = battery.charge_to_capacity(95.);
        assert_relative_eq!(battery.new_soc(input, 95.), 100., max_relative = 1e-12);
    }

    #[rstest]
    fn test_max_charge_input(battery: ElectricBattery) {
        assert_relative_eq!(battery.max_charge_input(3., 50., 0.), 3.);
        assert_relative_eq!(
            battery.max_charge_input(50., 50., 0.),
            20. / 0.95,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn test_charge_already_committed_uses_up_rate(battery: ElectricBattery) {
        let limit = 20. / 0.95;
        assert_relative_eq!(
            battery.charge_input_left(10., 5.),
            limit - 5.,
            max_relative = 1e-12
        );
        assert_eq!(battery.charge_input_left(10., limit), 0.);
        assert_eq!(battery.max_charge_input(50., 10., limit + 1.), 0.);
        assert_relative_eq!(
            battery.max_charge_input(50., 10., 15.),
            limit - 15.,
            max_relative = 1e-12
        );
    }

    #[rstest]
    #[case(10., 50.)]
    #[case(20. / 0.95, 10.)]
    #[case(5.95 / 0.95, 95.)]
    fn test_charged_energy_is_stored_or_lost(
        battery: ElectricBattery,
        #[case] input: f64,
        #[case] soc: f64,
    ) {
        let stored = battery.new_soc(input, soc) - soc;
        assert_relative_eq!(
            stored + battery.total_losses(input, soc),
            input,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn test_total_losses(battery: ElectricBattery) {
        // charging 10: stores 9.5, self loss 0.5, net change 9.0
        assert_relative_eq!(
            battery.total_losses(10., 50.),
            9.5 * 0.05 / 0.95 + 0.5,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            battery.total_losses(-10., 50.),
            0.1 * 9.5 + 0.5,
            max_relative = 1e-12
        );
    }
}
