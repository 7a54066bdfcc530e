//! Phases, transitions and per-run state of the DFU machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::BytesBuffer;
use crate::crc32::Crc32;
use crate::file_view::FileView;
use crate::image::FirmwareType;
use crate::protocol::constants::*;
use crate::reactor::poll::DEFAULT_POLL_TICK;
use crate::reactor::{Interest, Reactor, TimerId};
use crate::slip::SlipDecodeState;

/// Phase of the DFU machine.
///
/// Each non-terminal phase has a handler. Phases named `*Done` or
/// `*Selected` (and `CrcCheck`) run once their response has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DfuPhase {
    /// No session has been started.
    #[default]
    Idle,
    Start,
    InitTimerExpired,
    PingDone,
    PrnDone,
    MtuDone,
    QueryFirmware,
    FirmwareVersionDone,
    SelectNextImage,
    InitPacketStart,
    InitPacketSelected,
    FirmwareStart,
    FirmwareSelected,
    StreamWindow,
    CreateDone,
    SendChunk,
    RequestCrc,
    CrcCheck,
    ExecuteDone,
    PostValidate,
    PostValidateDone,
    Success,
    Failed,
}

impl DfuPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DfuPhase::Success | DfuPhase::Failed)
    }
}

impl fmt::Display for DfuPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DfuPhase::Idle => "IDLE",
            DfuPhase::Start => "START",
            DfuPhase::InitTimerExpired => "INIT_TIMER_EXPIRED",
            DfuPhase::PingDone => "PING_DONE",
            DfuPhase::PrnDone => "PRN_DONE",
            DfuPhase::MtuDone => "MTU_DONE",
            DfuPhase::QueryFirmware => "QUERY_FIRMWARE",
            DfuPhase::FirmwareVersionDone => "FW_VERSION_DONE",
            DfuPhase::SelectNextImage => "SELECT_NEXT_IMAGE",
            DfuPhase::InitPacketStart => "INIT_PACKET_START",
            DfuPhase::InitPacketSelected => "INIT_PACKET_SELECTED",
            DfuPhase::FirmwareStart => "FIRMWARE_START",
            DfuPhase::FirmwareSelected => "FIRMWARE_SELECTED",
            DfuPhase::StreamWindow => "STREAM_WINDOW",
            DfuPhase::CreateDone => "CREATE_DONE",
            DfuPhase::SendChunk => "SEND_CHUNK",
            DfuPhase::RequestCrc => "REQUEST_CRC",
            DfuPhase::CrcCheck => "CRC_CHECK",
            DfuPhase::ExecuteDone => "EXECUTE_DONE",
            DfuPhase::PostValidate => "POST_VALIDATE",
            DfuPhase::PostValidateDone => "POST_VALIDATE_DONE",
            DfuPhase::Success => "SUCCESS",
            DfuPhase::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Timers created at `Start` and closed when the run ends.
pub const ALL_TIMERS: [TimerId; 3] = [
    TimerId::Settle,
    TimerId::PostValidate,
    TimerId::RequestTimeout,
];

/// Outcome handed to the completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuStatus {
    Success,
    Failure,
}

/// What the driver does after a phase handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Send TX, then run the next phase.
    LaunchWrite,
    /// Send TX, read one response frame, then run the next phase.
    LaunchWriteThenRead,
    /// Read one response frame, then run the next phase.
    LaunchRead,
    /// Run the next phase now.
    MoveImmediately,
    /// Suspend until a timer fires.
    WaitAsync,
}

/// I/O in flight between suspensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingIo {
    Write { then_read: bool },
    Read,
}

/// Timer durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub settle_ms: u64,
    pub post_validate_application_ms: u64,
    pub post_validate_softdevice_ms: u64,
    pub request_timeout_ms: u64,
    /// Longest sleep of the polling event loop.
    pub poll_tick_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            post_validate_application_ms: DEFAULT_POST_VALIDATE_APPLICATION.as_millis() as u64,
            post_validate_softdevice_ms: DEFAULT_POST_VALIDATE_SOFTDEVICE.as_millis() as u64,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            poll_tick_ms: DEFAULT_POLL_TICK.as_millis() as u64,
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_tick(&self) -> Duration {
        Duration::from_millis(self.poll_tick_ms)
    }

    /// Wait after the last object of an image of type `kind` is executed.
    pub fn post_validate(&self, kind: FirmwareType) -> Duration {
        match kind {
            FirmwareType::Application => Duration::from_millis(self.post_validate_application_ms),
            FirmwareType::Softdevice => Duration::from_millis(self.post_validate_softdevice_ms),
        }
    }
}

/// Per-session runtime state.
///
/// Buffers, the file view and timers belong to one run (one image); the
/// image cursor, probe state and nonce survive restarts between images.
#[derive(Debug, Default)]
pub struct DfuContext {
    pub phase: DfuPhase,

    pub tx: BytesBuffer,
    pub rx: BytesBuffer,
    /// Negotiated MTU (preamble size until `MtuGet` answers).
    pub mtu: usize,
    pub max_object_size: u32,

    /// Running CRC of the object type being written.
    pub crc: Crc32,
    pub object_type: Option<ObjectType>,
    pub file_view: Option<FileView>,
    pub offset_into_window: usize,
    pub chunk_size: usize,
    /// Phase to enter once the whole file has been executed.
    pub file_continue: DfuPhase,

    pub current_image: Option<usize>,
    pub next_image: usize,
    pub probe_slot: u8,
    pub versions_probed: bool,

    pub ping_nonce: u8,
    /// Opcode whose response is expected next.
    pub request: Option<OpCode>,

    pub io: Option<PendingIo>,
    pub bytes_sent: usize,
    pub bytes_read: usize,
    pub decode_state: SlipDecodeState,
    pub watch: Option<Interest>,
    pub timers_created: bool,
}

impl DfuContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to a new phase.
    pub fn goto_phase(&mut self, next: DfuPhase) -> DfuPhase {
        tracing::debug!(from = %self.phase, to = %next, "State transition");
        std::mem::replace(&mut self.phase, next)
    }

    /// Close timers, drop the watch and free buffers and the open file.
    ///
    /// The image cursor and probe state are kept so a restart continues
    /// with the next image.
    pub fn release_resources(&mut self, reactor: &mut dyn Reactor) {
        if self.watch.take().is_some()
            && let Err(e) = reactor.deregister()
        {
            tracing::warn!(error = %e, "Failed to deregister watch");
        }
        if self.timers_created {
            for id in ALL_TIMERS {
                reactor.close_timer(id);
            }
            self.timers_created = false;
        }
        self.release_buffers();
    }

    fn release_buffers(&mut self) {
        self.tx = BytesBuffer::new();
        self.rx = BytesBuffer::new();
        self.file_view = None;
        self.io = None;
        self.request = None;
        self.object_type = None;
    }

    /// Bytes of the current image window.
    pub fn window_extent(&self) -> usize {
        self.file_view.as_ref().map_or(0, |v| v.window_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goto_phase_returns_previous() {
        let mut ctx = DfuContext::new();
        assert_eq!(ctx.goto_phase(DfuPhase::Start), DfuPhase::Idle);
        assert_eq!(ctx.phase, DfuPhase::Start);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(DfuPhase::Success.is_terminal());
        assert!(DfuPhase::Failed.is_terminal());
        assert!(!DfuPhase::PostValidateDone.is_terminal());
    }

    #[test]
    fn test_timing_defaults() {
        let timing = TimingConfig::default();
        assert_eq!(timing.settle(), Duration::from_secs(1));
        assert_eq!(timing.request_timeout(), Duration::from_secs(5));
        assert_eq!(
            timing.post_validate(FirmwareType::Application),
            Duration::from_secs(1)
        );
        assert_eq!(
            timing.post_validate(FirmwareType::Softdevice),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_release_resources_keeps_cursor() {
        use crate::reactor::ManualReactor;

        let mut reactor = ManualReactor::new();
        let mut ctx = DfuContext::new();
        for id in ALL_TIMERS {
            reactor.create_timer(id).unwrap();
        }
        ctx.timers_created = true;
        reactor.register(Interest::Readable).unwrap();
        ctx.watch = Some(Interest::Readable);
        ctx.tx = BytesBuffer::with_capacity(64).unwrap();
        ctx.next_image = 2;

        ctx.release_resources(&mut reactor);

        assert_eq!(ctx.tx.capacity(), 0);
        assert_eq!(ctx.next_image, 2);
        assert_eq!(reactor.open_timers(), 0);
        assert_eq!(reactor.interest(), None);

        // A second release closes nothing twice.
        ctx.release_resources(&mut reactor);
        assert_eq!(reactor.closed_timers(), 3);
    }
}
