//! Shared types for the Marlet controller
//!
//! This crate contains the data records that flow through the acquisition-to-actuation
//! loop, the controller configuration, and the error taxonomy shared by every crate in
//! the workspace.

pub mod config;
pub mod data;
pub mod error;

// Re-export commonly used types
pub use config::*;
pub use data::*;
pub use error::*;
