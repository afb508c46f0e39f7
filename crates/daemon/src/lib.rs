// Re-export modules for library use
pub mod actuator;
pub mod audit;
pub mod config;
pub mod control_loop;
pub mod dispatcher;

pub use actuator::{Actuator, ChaosActuator, ChaosConfig, LoopbackActuator};
pub use audit::AuditLog;
pub use control_loop::{ControlLoop, ControllerError, LoopSummary};
pub use dispatcher::{DispatchStats, Dispatcher};
