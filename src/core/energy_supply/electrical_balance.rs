use crate::compare_floats::{max_of_2, min_of_2};
use std::iter::zip;

/// Hour-by-hour comparison of renewable generation against electrical demand.
///
/// The surplus is the positive part of generation minus demand and the deficit
/// its negative part. `res_used` is the renewable generation consumed
/// directly by the electrical demand.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElectricalBalance {
    surplus: Vec<f64>,
    deficit: Vec<f64>,
    res_used: Vec<f64>,
}

impl ElectricalBalance {
    /// Arguments:
    /// * `renewable_generation` - total renewable generation per hour (kWh)
    /// * `elec_demand` - electrical demand per hour (kWh)
    ///
    /// The shorter of the two series determines the number of hours covered.
    pub fn new(renewable_generation: &[f64], elec_demand: &[f64]) -> Self {
        let mut balance = Self::default();

        for (&generation, &demand) in zip(renewable_generation, elec_demand) {
            let energy_match = generation - demand;
            balance.surplus.push(max_of_2(energy_match, 0.));
            balance.deficit.push(max_of_2(-energy_match, 0.));
            balance.res_used.push(min_of_2(generation, demand));
        }

        balance
    }

    pub fn surplus(&self, hour: usize) -> f64 {
        self.surplus[hour]
    }

    pub fn deficit(&self, hour: usize) -> f64 {
        self.deficit[hour]
    }

    pub fn res_used(&self, hour: usize) -> f64 {
        self.res_used[hour]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn balance() -> ElectricalBalance {
        ElectricalBalance::new(&[5., 2., 0., 3.], &[3., 2., 4., 0.])
    }

    #[rstest]
    fn should_split_match_into_surplus_and_deficit(balance: ElectricalBalance) {
        assert_eq!(
            (0..4).map(|h| balance.surplus(h)).collect::<Vec<_>>(),
            vec![2., 0., 0., 3.]
        );
        assert_eq!(
            (0..4).map(|h| balance.deficit(h)).collect::<Vec<_>>(),
            vec![0., 0., 4., 0.]
        );
    }

    #[rstest]
    fn should_use_renewables_directly_up_to_demand(balance: ElectricalBalance) {
        assert_eq!(
            (0..4).map(|h| balance.res_used(h)).collect::<Vec<_>>(),
            vec![3., 2., 0., 0.]
        );
        // generation is fully accounted for by direct use plus surplus
        for (hour, generation) in [5., 2., 0., 3.].into_iter().enumerate() {
            assert_eq!(balance.res_used(hour) + balance.surplus(hour), generation);
        }
    }
}
