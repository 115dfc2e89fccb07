//! Shared domain types for the PagePulse project.

pub mod config;
pub mod entries;
pub mod events;
pub mod layout;
pub mod metrics;

mod errors;

pub use errors::{PulseError, Result};
