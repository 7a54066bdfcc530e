//! Event system for front-end decoupling.
//!
//! Lets a CLI (or anything else) follow a DFU session without reaching
//! into the machine.

use std::fmt;

use crate::image::FirmwareType;
use crate::protocol::{ObjectType, OpCode};
use crate::state::{DfuPhase, DfuStatus};

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by the DFU machine.
#[derive(Debug, Clone, PartialEq)]
pub enum DfuEvent {
    /// Phase changed.
    PhaseChanged { from: DfuPhase, to: DfuPhase },
    /// Device slot reported an installed image.
    InstalledImage {
        slot: u8,
        image_type: u8,
        version: u32,
    },
    /// An image is about to be written.
    ImageStarted {
        index: usize,
        firmware_type: FirmwareType,
        version: u32,
        installed_version: Option<u32>,
    },
    /// Bytes of the current object type acknowledged by CRC check.
    Progress {
        object: ObjectType,
        current: u64,
        total: u64,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Frame sent or received.
    Packet {
        direction: PacketDirection,
        opcode: OpCode,
        length: usize,
    },
    /// Session finished; the completion callback runs right after.
    Complete { status: DfuStatus },
}

/// Frame direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving DFU events.
pub trait DfuObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DfuEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DfuObserver for NullObserver {
    fn on_event(&self, _event: &DfuEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DfuObserver for TracingObserver {
    fn on_event(&self, event: &DfuEvent) {
        match event {
            DfuEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            DfuEvent::InstalledImage {
                slot,
                image_type,
                version,
            } => {
                tracing::info!(slot, image_type, version, "Installed image");
            }
            DfuEvent::ImageStarted {
                index,
                firmware_type,
                version,
                installed_version,
            } => match installed_version {
                Some(old) => tracing::info!(
                    index,
                    kind = %firmware_type,
                    from = old,
                    to = version,
                    "Updating image"
                ),
                None => tracing::info!(index, kind = %firmware_type, version, "Adding image"),
            },
            DfuEvent::Progress {
                object,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(object = %object, progress = %format!("{}%", pct), "Progress");
            }
            DfuEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            DfuEvent::Packet {
                direction,
                opcode,
                length,
            } => {
                tracing::trace!(dir = %direction, opcode = %opcode, len = length, "Frame");
            }
            DfuEvent::Complete { status } => match status {
                DfuStatus::Success => tracing::info!("DFU complete"),
                DfuStatus::Failure => tracing::error!("DFU failed"),
            },
        }
    }
}
