pub mod elec_battery;
pub mod electrical_balance;
