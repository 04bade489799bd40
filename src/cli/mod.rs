//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Report rendering (text tables, JSON)

mod args;
mod output;

pub use args::Args;
pub use output::{OutputFormat, ReportFormatter};
