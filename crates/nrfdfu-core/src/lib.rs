//! nrfdfu-core: Nordic nRF52 secure DFU over a SLIP-framed serial link.
//!
//! The crate drives a target's serial bootloader through reset, ping,
//! MTU negotiation and an installed-version probe, then streams each
//! image's init packet and firmware as CRC-checked objects.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Buffer / SLIP / CRC**: byte buffers, SLIP framing, seeded CRC-32
//! - **File view**: windowed reads of image files
//! - **Protocol**: opcodes, request encoding, response parsing
//! - **Transport**: serial port abstraction (serialport, mock)
//! - **Control**: RESET and DFU_MODE lines
//! - **Reactor**: readiness and timer events for the non-blocking machine
//! - **State**: the DFU machine and its phase handlers
//! - **Events**: Observer pattern for progress reporting
//! - **Session**: Blocking orchestrator for real hardware
//!
//! # Example
//!
//! ```no_run
//! use nrfdfu_core::image::{FirmwareType, ImageDescriptor};
//! use nrfdfu_core::session::{DfuSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     port: "/dev/ttyUSB0".to_string(),
//!     images: vec![ImageDescriptor::new(
//!         "app.dat",
//!         "app.bin",
//!         FirmwareType::Application,
//!         2,
//!     )],
//!     ..Default::default()
//! };
//!
//! let mut session = DfuSession::new(config);
//! session.run().expect("DFU failed");
//! ```

pub mod buffer;
pub mod control;
pub mod crc32;
pub mod events;
pub mod file_view;
pub mod image;
pub mod protocol;
pub mod reactor;
pub mod session;
pub mod slip;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use buffer::{BufferError, BytesBuffer};
pub use control::{ControlLines, Level, Line, RecordingLines, SysfsGpioLines};
pub use crc32::Crc32;
pub use events::{DfuEvent, DfuObserver, LogLevel, NullObserver, TracingObserver};
pub use file_view::{FileView, FileViewError};
pub use image::{FirmwareType, ImageDescriptor};
pub use reactor::{Event, Interest, ManualReactor, PollReactor, Reactor, TimerId};
pub use session::{DfuSession, SessionConfig};
pub use state::{DfuError, DfuMachine, DfuPhase, DfuStatus, ErrorKind, TimingConfig};
pub use transport::{MockTransport, SerialTransport, Transport, TransportError};
