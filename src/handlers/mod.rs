pub mod check;
pub mod config_handler;
pub mod harvest;
