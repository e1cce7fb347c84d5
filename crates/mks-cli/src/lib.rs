//! Command line front end for Markable Studio projects.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod summary;
pub mod types;
