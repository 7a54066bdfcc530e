//! The DFU machine: phase dispatch, non-blocking I/O and termination.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::buffer::hex;
use crate::control::{ControlLines, Level, Line};
use crate::events::{DfuEvent, DfuObserver, PacketDirection};
use crate::image::ImageDescriptor;
use crate::protocol::{OpCode, RESPONSE_HEADER_LEN, check_header};
use crate::reactor::{Event, Interest, Reactor, TimerId};
use crate::slip::{self, SlipDecodeState};
use crate::transport::{Transport, TransportError};

use super::error::DfuError;
use super::handlers::{HandlerContext, handle_phase};
use super::machine::{DfuContext, DfuPhase, DfuStatus, PendingIo, TimingConfig, Transition};

/// Called exactly once per `program` call.
pub type Completion = Box<dyn FnOnce(DfuStatus)>;

/// Nordic secure DFU over a SLIP serial link.
///
/// The machine owns its transport and control lines for its whole life and
/// is driven entirely through [`DfuMachine::program`] and
/// [`DfuMachine::handle_event`]; it never blocks.
pub struct DfuMachine<T: Transport, C: ControlLines, O: DfuObserver> {
    transport: T,
    lines: C,
    observer: Arc<O>,
    timing: TimingConfig,
    asset_root: PathBuf,
    images: Vec<ImageDescriptor>,
    run: DfuContext,
    completion: Option<Completion>,
    last_error: Option<DfuError>,
}

impl<T: Transport, C: ControlLines, O: DfuObserver> DfuMachine<T, C, O> {
    pub fn new(
        transport: T,
        lines: C,
        observer: Arc<O>,
        timing: TimingConfig,
        asset_root: impl AsRef<Path>,
    ) -> Self {
        Self {
            transport,
            lines,
            observer,
            timing,
            asset_root: asset_root.as_ref().to_path_buf(),
            images: Vec::new(),
            run: DfuContext::new(),
            completion: None,
            last_error: None,
        }
    }

    /// Begin writing `images`, in order.
    ///
    /// Returns as soon as the machine is waiting on the reactor. `completion`
    /// runs exactly once, possibly before this call returns. A call made
    /// while a session is running fails immediately and leaves that session
    /// alone.
    pub fn program(
        &mut self,
        images: Vec<ImageDescriptor>,
        completion: impl FnOnce(DfuStatus) + 'static,
        reactor: &mut dyn Reactor,
    ) {
        if self.is_running() {
            warn!(phase = %self.run.phase, "DFU already in progress, rejecting request");
            completion(DfuStatus::Failure);
            return;
        }

        info!(images = images.len(), "Starting DFU session");
        self.images = images;
        self.last_error = None;
        self.run = DfuContext::new();
        self.completion = Some(Box::new(completion));
        self.goto(DfuPhase::Start);
        self.advance(reactor);
    }

    /// Resume the machine with an event from the reactor.
    pub fn handle_event(&mut self, event: Event, reactor: &mut dyn Reactor) {
        if !self.is_running() {
            debug!(?event, "Event while idle, ignoring");
            return;
        }

        let result = match event {
            Event::Readable | Event::Writable => self.resume_io(reactor),
            Event::TimerExpired(TimerId::RequestTimeout) if self.run.io.is_some() => {
                Err(DfuError::Timeout {
                    phase: self.run.phase,
                })
            }
            Event::TimerExpired(TimerId::Settle)
                if self.run.phase == DfuPhase::InitTimerExpired =>
            {
                self.drive(reactor)
            }
            Event::TimerExpired(TimerId::PostValidate)
                if self.run.phase == DfuPhase::PostValidateDone =>
            {
                self.drive(reactor)
            }
            Event::TimerExpired(id) => {
                debug!(timer = %id, phase = %self.run.phase, "Stale timer, ignoring");
                Ok(())
            }
        };
        self.settle(result, reactor);
    }

    pub fn is_running(&self) -> bool {
        self.completion.is_some()
    }

    pub fn phase(&self) -> DfuPhase {
        self.run.phase
    }

    /// Error that ended the last session, if it failed.
    pub fn last_error(&self) -> Option<&DfuError> {
        self.last_error.as_ref()
    }

    /// Images of the current or last session, with their update decisions.
    pub fn images(&self) -> &[ImageDescriptor] {
        &self.images
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Hand back the transport and control lines.
    pub fn into_parts(self) -> (T, C) {
        (self.transport, self.lines)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn advance(&mut self, reactor: &mut dyn Reactor) {
        let result = self.drive(reactor);
        self.settle(result, reactor);
    }

    /// Record a failure and finish once a terminal phase is reached.
    ///
    /// `Success` still waits for a pending write (the closing `Abort`) to
    /// drain; `Failed` finishes at once.
    fn settle(&mut self, result: Result<(), DfuError>, reactor: &mut dyn Reactor) {
        if let Err(e) = result {
            error!(phase = %self.run.phase, kind = %e.kind(), error = %e, "DFU failed");
            self.last_error = Some(e);
            self.goto(DfuPhase::Failed);
        }
        let done = match self.run.phase {
            DfuPhase::Failed => true,
            DfuPhase::Success => self.run.io.is_none(),
            _ => false,
        };
        if done && self.completion.is_some() {
            self.finish(reactor);
        }
    }

    /// Run phase handlers until the machine has to wait.
    fn drive(&mut self, reactor: &mut dyn Reactor) -> Result<(), DfuError> {
        loop {
            if self.run.phase.is_terminal() {
                return Ok(());
            }

            let transition = {
                let mut ctx = HandlerContext {
                    transport: &mut self.transport,
                    lines: &mut self.lines,
                    observer: self.observer.as_ref(),
                    reactor: &mut *reactor,
                    timing: &self.timing,
                    asset_root: &self.asset_root,
                    images: &mut self.images,
                    run: &mut self.run,
                };
                handle_phase(&mut ctx)?
            };

            match transition {
                Transition::MoveImmediately => continue,
                Transition::WaitAsync => return Ok(()),
                Transition::LaunchWrite => self.start_write(false),
                Transition::LaunchWriteThenRead => self.start_write(true),
                Transition::LaunchRead => self.start_read(),
            }
            if !self.pump_io(reactor)? {
                return Ok(());
            }
        }
    }

    // ========================================================================
    // I/O
    // ========================================================================

    fn start_write(&mut self, then_read: bool) {
        self.run.bytes_sent = 0;
        self.run.io = Some(PendingIo::Write { then_read });
    }

    fn start_read(&mut self) {
        self.run.rx.reset();
        self.run.bytes_read = 0;
        self.run.decode_state = SlipDecodeState::Decoding;
        self.run.io = Some(PendingIo::Read);
    }

    fn resume_io(&mut self, reactor: &mut dyn Reactor) -> Result<(), DfuError> {
        if self.run.watch.take().is_some() {
            reactor.deregister()?;
        }
        reactor.disarm_timer(TimerId::RequestTimeout)?;

        if self.run.io.is_none() {
            return Ok(());
        }
        if self.pump_io(reactor)? {
            self.drive(reactor)?;
        }
        Ok(())
    }

    /// Wait for `interest`, bounded by the request timeout.
    fn suspend(&mut self, interest: Interest, reactor: &mut dyn Reactor) -> Result<(), DfuError> {
        reactor.register(interest)?;
        self.run.watch = Some(interest);
        reactor.arm_timer(TimerId::RequestTimeout, self.timing.request_timeout())?;
        Ok(())
    }

    /// Move bytes until the pending I/O completes (`true`) or would block
    /// (`false`, the machine is then suspended).
    fn pump_io(&mut self, reactor: &mut dyn Reactor) -> Result<bool, DfuError> {
        loop {
            match self.run.io {
                None => return Ok(true),
                Some(PendingIo::Write { then_read }) => {
                    let sent = self.run.bytes_sent;
                    if sent == self.run.tx.len() {
                        if then_read {
                            self.start_read();
                        } else {
                            self.run.io = None;
                        }
                        continue;
                    }
                    match self.transport.write(&self.run.tx.as_slice()[sent..]) {
                        Ok(0) | Err(TransportError::WouldBlock) => {
                            self.suspend(Interest::Writable, reactor)?;
                            return Ok(false);
                        }
                        Ok(n) => self.run.bytes_sent += n,
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(PendingIo::Read) => {
                    let mut byte = [0u8; 1];
                    match self.transport.read(&mut byte) {
                        Ok(0) | Err(TransportError::WouldBlock) => {
                            self.suspend(Interest::Readable, reactor)?;
                            return Ok(false);
                        }
                        Ok(_) => {
                            if self.receive_byte(byte[0])? {
                                self.run.io = None;
                            }
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Feed one byte to the decoder. `true` once a valid response is in RX
    /// with its header removed.
    fn receive_byte(&mut self, byte: u8) -> Result<bool, DfuError> {
        self.run.bytes_read += 1;
        if self.run.bytes_read > self.run.mtu {
            return Err(DfuError::FrameTooLong { mtu: self.run.mtu });
        }

        let done = slip::feed_byte(byte, &mut self.run.rx, &mut self.run.decode_state)?;
        if self.run.decode_state == SlipDecodeState::Discarding {
            return Err(DfuError::Framing);
        }
        if !done {
            return Ok(false);
        }
        if self.run.rx.is_empty() {
            // Leading END of the next frame.
            return Ok(false);
        }

        let expected = self.run.request.unwrap_or(OpCode::Ping);
        debug!(
            expected = %expected,
            bytes = %hex(self.run.rx.as_slice()),
            "Response"
        );
        self.observer.on_event(&DfuEvent::Packet {
            direction: PacketDirection::Rx,
            opcode: expected,
            length: self.run.rx.len(),
        });

        if let Err(e) = check_header(&self.run.rx, expected) {
            warn!(error = %e, "Rejected response");
            return Err(e.into());
        }
        self.run.rx.shift_left(RESPONSE_HEADER_LEN)?;
        Ok(true)
    }

    // ========================================================================
    // Termination
    // ========================================================================

    fn goto(&mut self, next: DfuPhase) {
        let from = self.run.goto_phase(next);
        self.observer
            .on_event(&DfuEvent::PhaseChanged { from, to: next });
    }

    /// Release everything, let the target boot, then report.
    fn finish(&mut self, reactor: &mut dyn Reactor) {
        let status = match self.run.phase {
            DfuPhase::Success => DfuStatus::Success,
            _ => DfuStatus::Failure,
        };

        self.run.release_resources(reactor);

        for (line, level) in [
            (Line::DfuMode, Level::High),
            (Line::Reset, Level::Low),
            (Line::Reset, Level::High),
        ] {
            if let Err(e) = self.lines.set(line, level) {
                error!(error = %e, "Failed to release target");
            }
        }

        self.observer.on_event(&DfuEvent::Complete { status });
        if let Some(completion) = self.completion.take() {
            completion(status);
        }
    }
}
