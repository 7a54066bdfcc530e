//! State machine module.

mod driver;
pub mod error;
pub mod handlers;
pub mod machine;


pub use driver::{Completion, DfuMachine};
pub use error::{DfuError, ErrorKind};
pub use handlers::{HandlerContext, handle_phase};
pub use machine::{DfuContext, DfuPhase, DfuStatus, TimingConfig, Transition};
