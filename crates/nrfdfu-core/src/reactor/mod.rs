//! Event loop collaborator.
//!
//! The machine never blocks. It registers interest in readability or
//! writability, arms one-shot timers, and returns; whoever owns the loop
//! calls back into the machine with the matching [`Event`].

pub mod manual;
pub mod poll;
pub mod traits;

pub use manual::ManualReactor;
pub use poll::PollReactor;
pub use traits::{Event, Interest, Reactor, TimerId};
