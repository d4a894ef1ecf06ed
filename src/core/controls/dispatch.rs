use crate::compare_floats::max_of_2;
use crate::errors::{ConfigurationError, InvariantViolation};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use strum::{Display, EnumIter};

/// Tolerance below zero a running check may reach before an operation is
/// considered to have over-committed energy.
pub const RUNNING_CHECK_TOLERANCE: f64 = 1e-6;

/// The micro-operations the fixed-order controller can commit each hour
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Hash, PartialEq, Serialize)]
pub enum Operation {
    #[strum(serialize = "RES to demand")]
    ResToDemand,
    #[strum(serialize = "ES to demand")]
    EsToDemand,
    #[strum(serialize = "Import to demand")]
    ImportToDemand,
    #[strum(serialize = "HP RES to demand")]
    HpResToDemand,
    #[strum(serialize = "EAUX RES to demand")]
    EauxResToDemand,
    #[strum(serialize = "HP import to demand")]
    HpImportToDemand,
    #[strum(serialize = "TS to demand")]
    TsToDemand,
    #[strum(serialize = "ES to HP to demand")]
    EsToHpToDemand,
    #[strum(serialize = "AUX to demand")]
    AuxToDemand,
    #[strum(serialize = "HP RES to TS")]
    HpResToTs,
    #[strum(serialize = "EAUX RES to TS")]
    EauxResToTs,
    #[strum(serialize = "HP import to TS")]
    HpImportToTs,
    #[strum(serialize = "RES to ES")]
    ResToEs,
    #[strum(serialize = "Import to ES")]
    ImportToEs,
    #[strum(serialize = "RES to export")]
    ResToExport,
}

const ABOVE_SETPOINT_RANKS: [Operation; 13] = [
    Operation::ResToDemand,
    Operation::EsToDemand,
    Operation::ImportToDemand,
    Operation::HpResToDemand,
    Operation::EauxResToDemand,
    Operation::TsToDemand,
    Operation::EsToHpToDemand,
    Operation::HpImportToDemand,
    Operation::AuxToDemand,
    Operation::HpResToTs,
    Operation::EauxResToTs,
    Operation::ResToEs,
    Operation::ResToExport,
];

const BELOW_SETPOINT_RANKS: [Operation; 15] = [
    Operation::ResToDemand,
    Operation::ImportToDemand,
    Operation::EsToDemand,
    Operation::HpResToDemand,
    Operation::EauxResToDemand,
    Operation::HpImportToDemand,
    Operation::TsToDemand,
    Operation::EsToHpToDemand,
    Operation::AuxToDemand,
    Operation::HpResToTs,
    Operation::EauxResToTs,
    Operation::HpImportToTs,
    Operation::ResToEs,
    Operation::ImportToEs,
    Operation::ResToExport,
];

/// Whether grid electricity is priced above the import setpoint this hour
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    #[strum(serialize = "above setpoint")]
    AboveSetpoint,
    #[strum(serialize = "below setpoint")]
    BelowSetpoint,
}

impl Regime {
    pub fn for_price(import_price: f64, import_setpoint: f64) -> Self {
        if import_price > import_setpoint {
            Regime::AboveSetpoint
        } else {
            Regime::BelowSetpoint
        }
    }

    /// Operation for each rank, rank 1 first
    pub fn rank_table(&self) -> &'static [Operation] {
        match self {
            Regime::AboveSetpoint => &ABOVE_SETPOINT_RANKS,
            Regime::BelowSetpoint => &BELOW_SETPOINT_RANKS,
        }
    }

    fn order_name(&self) -> &'static str {
        match self {
            Regime::AboveSetpoint => "order_above_setpoint",
            Regime::BelowSetpoint => "order_below_setpoint",
        }
    }
}

/// The sequence in which operations are executed for one regime
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOrder {
    regime: Regime,
    operations: Vec<Operation>,
}

impl DispatchOrder {
    /// Build an order from 1-based ranks into the regime's table. The ranks must be a
    /// permutation of 1..=N.
    pub fn from_ranks(regime: Regime, ranks: &[usize]) -> Result<Self, ConfigurationError> {
        let table = regime.rank_table();
        let is_permutation = ranks.len() == table.len()
            && ranks
                .iter()
                .copied()
                .sorted_unstable()
                .eq(1..=table.len());
        if !is_permutation {
            return Err(ConfigurationError::InvalidDispatchOrder {
                name: regime.order_name(),
                expected_len: table.len(),
                ranks: ranks.to_vec(),
            });
        }

        Ok(Self {
            regime,
            operations: ranks.iter().map(|rank| table[rank - 1]).collect(),
        })
    }

    /// Ranks executed in ascending order
    pub fn default_for(regime: Regime) -> Self {
        Self {
            regime,
            operations: regime.rank_table().to_vec(),
        }
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}

/// Quantity committed by an operation, in kWh. Heat pump operations record both
/// the heat delivered and the electricity consumed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OperationOutcome {
    Scalar(f64),
    HeatElec { heat: f64, elec: f64 },
}

impl OperationOutcome {
    pub fn scalar(value: f64) -> Self {
        OperationOutcome::Scalar(max_of_2(value, 0.))
    }

    /// Heat from a heat pump running at `cop`
    pub fn from_heat_pump(heat: f64, cop: f64) -> Self {
        let heat = max_of_2(heat, 0.);
        OperationOutcome::HeatElec {
            heat,
            elec: if cop > 0. { heat / cop } else { 0. },
        }
    }

    pub fn heat(&self) -> f64 {
        match *self {
            OperationOutcome::Scalar(value) => value,
            OperationOutcome::HeatElec { heat, .. } => heat,
        }
    }

    pub fn elec(&self) -> f64 {
        match *self {
            OperationOutcome::Scalar(value) => value,
            OperationOutcome::HeatElec { elec, .. } => elec,
        }
    }
}

/// Energy still to be allocated during the hour, updated as each operation commits
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningChecks {
    pub elec_unmet: f64,
    pub heat_unmet: f64,
    /// renewable surplus not yet used
    pub res_left: f64,
    /// heat already produced by the heat pump
    pub hp_usage: f64,
    pub ts_charge: f64,
    pub ts_discharge: f64,
    pub soc: f64,
    /// input energy already committed to charging the battery
    pub es_charge: f64,
    pub aux_left: f64,
}

impl RunningChecks {
    pub fn apply(&mut self, operation: Operation, outcome: OperationOutcome) {
        let heat = outcome.heat();
        let elec = outcome.elec();
        match operation {
            Operation::ResToDemand => {}
            Operation::EsToDemand => {
                self.elec_unmet -= elec;
                self.soc -= elec;
            }
            Operation::ImportToDemand => self.elec_unmet -= elec,
            Operation::HpResToDemand => {
                self.heat_unmet -= heat;
                self.res_left -= elec;
                self.hp_usage += heat;
            }
            Operation::EauxResToDemand => {
                self.heat_unmet -= heat;
                self.res_left -= elec;
                self.aux_left -= heat;
            }
            Operation::HpImportToDemand => {
                self.heat_unmet -= heat;
                self.hp_usage += heat;
            }
            Operation::TsToDemand => {
                self.heat_unmet -= heat;
                self.ts_discharge += heat;
            }
            Operation::EsToHpToDemand => {
                self.heat_unmet -= heat;
                self.hp_usage += heat;
                self.soc -= elec;
            }
            Operation::AuxToDemand => {
                self.heat_unmet -= heat;
                self.aux_left -= heat;
            }
            Operation::HpResToTs => {
                self.res_left -= elec;
                self.hp_usage += heat;
                self.ts_charge += heat;
            }
            Operation::EauxResToTs => {
                self.res_left -= elec;
                self.ts_charge += heat;
                self.aux_left -= heat;
            }
            Operation::HpImportToTs => {
                self.hp_usage += heat;
                self.ts_charge += heat;
            }
            Operation::ResToEs => {
                self.res_left -= elec;
                self.soc += elec;
                self.es_charge += elec;
            }
            Operation::ImportToEs => {
                self.soc += elec;
                self.es_charge += elec;
            }
            Operation::ResToExport => self.res_left -= elec,
        }
    }

    /// Fail if committing `operation` drove any remaining quantity materially negative.
    pub fn check(&self, hour: usize, operation: Operation) -> Result<(), InvariantViolation> {
        [
            ("elec_unmet", self.elec_unmet),
            ("heat_unmet", self.heat_unmet),
            ("res_left", self.res_left),
            ("soc", self.soc),
            ("aux_left", self.aux_left),
        ]
        .into_iter()
        .find(|(_, value)| *value < -RUNNING_CHECK_TOLERANCE)
        .map_or(Ok(()), |(check, value)| {
            Err(InvariantViolation {
                hour,
                operation,
                check,
                value,
            })
        })
    }
}

/// Quantities committed by each operation during the hour, in execution order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Commitments(IndexMap<Operation, OperationOutcome>);

impl Commitments {
    pub fn commit(&mut self, operation: Operation, outcome: OperationOutcome) {
        self.0.insert(operation, outcome);
    }

    pub fn get(&self, operation: Operation) -> Option<OperationOutcome> {
        self.0.get(&operation).copied()
    }

    /// Heat committed by the operation, zero if it did not run
    pub fn heat(&self, operation: Operation) -> f64 {
        self.get(operation).map_or(0., |outcome| outcome.heat())
    }

    pub fn elec(&self, operation: Operation) -> f64 {
        self.get(operation).map_or(0., |outcome| outcome.elec())
    }

    pub fn heat_total(&self, operations: &[Operation]) -> f64 {
        operations.iter().map(|&operation| self.heat(operation)).sum()
    }

    pub fn elec_total(&self, operations: &[Operation]) -> f64 {
        operations.iter().map(|&operation| self.elec(operation)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_operation_names() {
        assert_eq!(Operation::HpResToTs.to_string(), "HP RES to TS");
        assert_eq!(Operation::EsToHpToDemand.to_string(), "ES to HP to demand");
    }

    #[rstest]
    #[case(150., 100., Regime::AboveSetpoint)]
    #[case(100., 100., Regime::BelowSetpoint)]
    #[case(20., 100., Regime::BelowSetpoint)]
    fn test_regime_for_price(
        #[case] price: f64,
        #[case] setpoint: f64,
        #[case] expected: Regime,
    ) {
        assert_eq!(Regime::for_price(price, setpoint), expected);
    }

    #[rstest]
    fn test_rank_tables() {
        let above = Regime::AboveSetpoint.rank_table();
        assert_eq!(above.len(), 13);
        assert_eq!(above[5], Operation::TsToDemand);
        assert!(!above.contains(&Operation::HpImportToTs));
        assert!(!above.contains(&Operation::ImportToEs));

        let below = Regime::BelowSetpoint.rank_table();
        assert_eq!(below.len(), 15);
        assert_eq!(below[1], Operation::ImportToDemand);
        assert_eq!(below[11], Operation::HpImportToTs);
    }

    #[rstest]
    fn test_order_from_ranks() {
        let order = DispatchOrder::from_ranks(
            Regime::AboveSetpoint,
            &[3, 1, 2, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13],
        )
        .unwrap();
        assert_eq!(
            &order.operations()[..3],
            &[
                Operation::ImportToDemand,
                Operation::ResToDemand,
                Operation::EsToDemand
            ]
        );
        assert_eq!(
            DispatchOrder::from_ranks(Regime::BelowSetpoint, &(1..=15).collect::<Vec<_>>())
                .unwrap(),
            DispatchOrder::default_for(Regime::BelowSetpoint)
        );
    }

    #[rstest]
    #[case(vec![1, 2, 3])]
    #[case(vec![1, 1, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13])]
    #[case(vec![0, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13])]
    #[case(vec![2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14])]
    fn test_order_must_be_permutation(#[case] ranks: Vec<usize>) {
        assert_eq!(
            DispatchOrder::from_ranks(Regime::AboveSetpoint, &ranks),
            Err(ConfigurationError::InvalidDispatchOrder {
                name: "order_above_setpoint",
                expected_len: 13,
                ranks,
            })
        );
    }

    #[rstest]
    fn test_outcomes() {
        let outcome = OperationOutcome::from_heat_pump(6., 3.);
        assert_relative_eq!(outcome.heat(), 6.);
        assert_relative_eq!(outcome.elec(), 2.);
        assert_eq!(OperationOutcome::scalar(-1e-12).heat(), 0.);
        assert_eq!(OperationOutcome::from_heat_pump(5., 0.).elec(), 0.);
    }

    #[fixture]
    fn checks() -> RunningChecks {
        RunningChecks {
            elec_unmet: 2.,
            heat_unmet: 10.,
            res_left: 3.,
            soc: 5.,
            aux_left: 20.,
            ..Default::default()
        }
    }

    #[rstest]
    fn test_heat_pump_from_renewables(mut checks: RunningChecks) {
        checks.apply(
            Operation::HpResToDemand,
            OperationOutcome::from_heat_pump(6., 3.),
        );
        assert_relative_eq!(checks.heat_unmet, 4.);
        assert_relative_eq!(checks.res_left, 1.);
        assert_relative_eq!(checks.hp_usage, 6.);
        assert!(checks.check(0, Operation::HpResToDemand).is_ok());
    }

    #[rstest]
    fn test_battery_to_heat_pump(mut checks: RunningChecks) {
        checks.apply(
            Operation::EsToHpToDemand,
            OperationOutcome::from_heat_pump(9., 3.),
        );
        assert_relative_eq!(checks.soc, 2.);
        assert_relative_eq!(checks.heat_unmet, 1.);
        assert_relative_eq!(checks.hp_usage, 9.);
    }

    #[rstest]
    fn test_tank_charge_and_discharge(mut checks: RunningChecks) {
        checks.apply(Operation::TsToDemand, OperationOutcome::scalar(4.));
        checks.apply(Operation::EauxResToTs, OperationOutcome::scalar(2.));
        assert_relative_eq!(checks.ts_discharge, 4.);
        assert_relative_eq!(checks.ts_charge, 2.);
        assert_relative_eq!(checks.aux_left, 18.);
        assert_relative_eq!(checks.res_left, 1.);
    }

    #[rstest]
    fn test_battery_charging_accumulates(mut checks: RunningChecks) {
        checks.apply(Operation::ResToEs, OperationOutcome::scalar(2.));
        checks.apply(Operation::ImportToEs, OperationOutcome::scalar(1.5));
        assert_relative_eq!(checks.es_charge, 3.5);
        assert_relative_eq!(checks.soc, 8.5);
        assert_relative_eq!(checks.res_left, 1.);
    }

    #[rstest]
    fn test_over_commitment_is_reported(mut checks: RunningChecks) {
        checks.apply(Operation::ResToExport, OperationOutcome::scalar(3.5));
        assert_eq!(
            checks.check(7, Operation::ResToExport),
            Err(InvariantViolation {
                hour: 7,
                operation: Operation::ResToExport,
                check: "res_left",
                value: -0.5,
            })
        );
    }

    #[rstest]
    fn test_commitments_default_to_zero() {
        let mut commitments = Commitments::default();
        commitments.commit(
            Operation::HpImportToTs,
            OperationOutcome::from_heat_pump(4., 2.),
        );
        assert_eq!(commitments.heat(Operation::HpImportToTs), 4.);
        assert_eq!(commitments.elec(Operation::HpImportToTs), 2.);
        assert_eq!(commitments.heat(Operation::HpResToTs), 0.);
        assert_eq!(
            commitments.elec_total(&[Operation::HpImportToTs, Operation::ResToEs]),
            2.
        );
    }
}
