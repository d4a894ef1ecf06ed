pub mod controls;
pub mod energy_supply;
pub mod heating_systems;
pub mod material_properties;
pub mod units;
