//! Transport layer module.

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::{MockTransport, Responder};
pub use serial::SerialTransport;
pub use traits::{Transport, TransportError};
