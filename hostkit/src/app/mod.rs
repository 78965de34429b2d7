//! Process wiring and command-line surface

pub mod cli;
pub mod options;
pub mod state;
