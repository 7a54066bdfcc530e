//! Reactor trait and the events it delivers.

use std::fmt;
use std::io;
use std::time::Duration;

/// Readiness the machine is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

/// The machine's one-shot timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Board settling into its bootloader after reset.
    Settle,
    /// Device validating and activating the last image.
    PostValidate,
    /// A pending read or write stalled.
    RequestTimeout,
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerId::Settle => write!(f, "settle"),
            TimerId::PostValidate => write!(f, "post-validate"),
            TimerId::RequestTimeout => write!(f, "request-timeout"),
        }
    }
}

/// Wake-up delivered back to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Readable,
    Writable,
    TimerExpired(TimerId),
}

/// Event loop operations the machine relies on.
///
/// At most one interest is registered at a time. Timers must be created
/// before they are armed and are closed exactly once.
pub trait Reactor {
    fn register(&mut self, interest: Interest) -> io::Result<()>;

    fn deregister(&mut self) -> io::Result<()>;

    fn create_timer(&mut self, id: TimerId) -> io::Result<()>;

    /// Fire `id` once after `after`. Re-arming replaces the deadline.
    fn arm_timer(&mut self, id: TimerId, after: Duration) -> io::Result<()>;

    fn disarm_timer(&mut self, id: TimerId) -> io::Result<()>;

    fn close_timer(&mut self, id: TimerId);
}

pub(crate) fn unknown_timer(id: TimerId) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("timer {} not created", id))
}
