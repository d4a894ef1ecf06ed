pub mod dispatch;
pub mod fixed_order;
pub mod timestep_result;
