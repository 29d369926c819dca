//! Application module: command line, pipeline assembly and startup

pub mod cli;
mod error;
pub mod pipeline;
pub mod startup;

pub use error::{AppError, AppResult};
pub use pipeline::Pipeline;

#[cfg(test)]
mod tests;
