//! Decision cycle: pure state machine plus its tokio driver.

mod driver;
mod state_machine;

pub use driver::{CommandSink, CycleDriver, DriverConfig};
pub use state_machine::{
    CycleAction, CycleEvent, CyclePhase, CycleSettings, DecisionCycle, DecisionRequest,
    VisualRequest,
};
