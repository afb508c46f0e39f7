//! Signal conditioning and decision logic for the Marlet controller.
//!
//! Both stages are synchronous and allocation-free per sample; they are driven by the
//! control loop one conditioned sample at a time.

pub mod decision;
pub mod filters;

pub use decision::{DecisionEngine, PowerWindow};
pub use filters::{Coefficients, FilterCascade, Section};
