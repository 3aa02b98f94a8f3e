//! Output adapters for the command line.

pub mod report;
