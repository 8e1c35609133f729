//! CLI command implementations.

pub mod schedules;
pub mod uploads;
