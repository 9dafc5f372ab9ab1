//! Utility functions.
//!
//! Collection of helper functions used across the crate.

pub mod parser;

pub use parser::{format_duration, parse_duration};
