//! # Cronflow Core
//!
//! Shared building blocks for the Cronflow workspace:
//! - [`config`] — TOML configuration with per-field defaults
//! - [`error`] — the error taxonomy every crate reports through
//! - [`traits`] — seams between the scheduler and the remote CI client

pub mod config;
pub mod error;
pub mod traits;

pub use config::CronflowConfig;
pub use error::{CronflowError, Result};
pub use traits::WorkflowTrigger;
