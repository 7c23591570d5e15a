pub mod backend;
pub mod subsystem;
pub mod factory;
