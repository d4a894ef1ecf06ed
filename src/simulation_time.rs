use crate::core::units::HOURS_PER_YEAR;
use crate::errors::ConfigurationError;
use serde::Deserialize;

pub const HOURS_IN_DAY: usize = 24;

/// The simulated window: `timesteps` consecutive hours starting at `first_hour`
/// (an absolute hour of the year).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationTime {
    #[serde(default)]
    first_hour: usize,
    timesteps: usize,
}

impl SimulationTime {
    pub fn new(first_hour: usize, timesteps: usize) -> Self {
        Self {
            first_hour,
            timesteps,
        }
    }

    pub fn first_hour(&self) -> usize {
        self.first_hour
    }

    /// Hour following the last simulated hour
    pub fn final_hour(&self) -> usize {
        self.first_hour + self.timesteps
    }

    pub fn total_steps(&self) -> usize {
        self.timesteps
    }

    /// Check the window lies within a single year.
    pub fn check_within_year(&self) -> Result<(), ConfigurationError> {
        if self.final_hour() > HOURS_PER_YEAR {
            return Err(ConfigurationError::WindowOutOfRange {
                final_hour: self.final_hour(),
                hours_per_year: HOURS_PER_YEAR,
            });
        }
        Ok(())
    }

    pub(crate) fn iter(&self) -> SimulationTimeIterator {
        SimulationTimeIterator {
            current_index: 0,
            simulation_time: *self,
        }
    }
}

#[derive(Clone)]
pub struct SimulationTimeIterator {
    current_index: usize,
    simulation_time: SimulationTime,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationTimeIteration {
    /// position within the simulated window
    pub index: usize,
    /// absolute hour of the year, used to index the yearly series
    pub hour: usize,
}

impl SimulationTimeIteration {
    pub fn hour_of_day(&self) -> usize {
        self.hour % HOURS_IN_DAY
    }
}

impl Iterator for SimulationTimeIterator {
    type Item = SimulationTimeIteration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.simulation_time.timesteps {
            return None;
        }
        let iteration = SimulationTimeIteration {
            index: self.current_index,
            hour: self.simulation_time.first_hour + self.current_index,
        };
        self.current_index += 1;
        Some(iteration)
    }
}
