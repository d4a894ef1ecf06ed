pub mod auxiliary;
pub mod heat_pump;
pub mod hot_water_tank;
