pub mod app;
pub mod broker;
pub mod config;
pub mod control;
pub mod core;
pub mod progress;
pub mod scheduler;
pub mod state;
pub mod worker;
