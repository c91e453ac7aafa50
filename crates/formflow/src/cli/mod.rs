//! Command handlers for the `formflow` admin CLI.

pub mod config;
pub mod form;
pub mod output;
pub mod submission;
