// Library exports for testing
pub mod cli;
pub mod commands;
pub mod context;
pub mod repl;
pub mod startup;
pub mod state;
pub mod tasks;
pub mod utils;
