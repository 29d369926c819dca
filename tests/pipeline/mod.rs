pub mod configuration;
pub mod end_to_end;
pub mod reconnect;
pub mod stop_and_drain;
