//! Phase handlers - one function per machine phase.
//!
//! This module is split into submodules by functionality:
//! - `preamble`: reset, ping, PRN, MTU and installed-version probing
//! - `select`: image selection, object select and post-validation
//! - `transfer`: object create, chunked writes, CRC check and execute

mod preamble;
mod select;
mod transfer;

use std::path::Path;

use crate::buffer::hex;
use crate::control::ControlLines;
use crate::events::{DfuEvent, DfuObserver, LogLevel, PacketDirection};
use crate::image::ImageDescriptor;
use crate::protocol::{OpCode, Request};
use crate::reactor::Reactor;
use crate::transport::Transport;

use super::error::DfuError;
use super::machine::{DfuContext, DfuPhase, TimingConfig, Transition};

use preamble::{
    handle_firmware_version_done, handle_init_timer_expired, handle_mtu_done, handle_ping_done,
    handle_prn_done, handle_query_firmware, handle_start,
};
use select::{
    handle_firmware_selected, handle_firmware_start, handle_init_packet_selected,
    handle_init_packet_start, handle_post_validate, handle_post_validate_done,
    handle_select_next_image,
};
use transfer::{
    handle_crc_check, handle_create_done, handle_execute_done, handle_request_crc,
    handle_send_chunk, handle_stream_window,
};

/// Handler context containing all resources.
pub struct HandlerContext<'a, T: Transport, C: ControlLines, O: DfuObserver> {
    pub transport: &'a mut T,
    pub lines: &'a mut C,
    pub observer: &'a O,
    pub reactor: &'a mut dyn Reactor,
    pub timing: &'a TimingConfig,
    /// Directory image paths are resolved against.
    pub asset_root: &'a Path,
    pub images: &'a mut [ImageDescriptor],
    pub run: &'a mut DfuContext,
}

impl<T: Transport, C: ControlLines, O: DfuObserver> HandlerContext<'_, T, C, O> {
    pub(crate) fn emit(&self, event: DfuEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(DfuEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub(crate) fn goto(&mut self, next: DfuPhase) {
        let from = self.run.goto_phase(next);
        self.emit(DfuEvent::PhaseChanged { from, to: next });
    }

    /// Encode `request` into the TX buffer and remember which response to
    /// expect.
    pub(crate) fn prepare(&mut self, request: Request<'_>) -> Result<(), DfuError> {
        let opcode = request.opcode();
        request.encode_into(&mut self.run.tx)?;
        self.run.request = opcode.expects_response().then_some(opcode);

        if opcode != OpCode::ObjectWrite {
            tracing::debug!(opcode = %opcode, bytes = %hex(self.run.tx.as_slice()), "Request");
        }
        self.run.tx.dump("tx");
        self.emit(DfuEvent::Packet {
            direction: PacketDirection::Tx,
            opcode,
            length: self.run.tx.len(),
        });
        Ok(())
    }
}

/// Run the handler for the current phase.
pub fn handle_phase<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    match ctx.run.phase {
        DfuPhase::Start => handle_start(ctx),
        DfuPhase::InitTimerExpired => handle_init_timer_expired(ctx),
        DfuPhase::PingDone => handle_ping_done(ctx),
        DfuPhase::PrnDone => handle_prn_done(ctx),
        DfuPhase::MtuDone => handle_mtu_done(ctx),
        DfuPhase::QueryFirmware => handle_query_firmware(ctx),
        DfuPhase::FirmwareVersionDone => handle_firmware_version_done(ctx),
        DfuPhase::SelectNextImage => handle_select_next_image(ctx),
        DfuPhase::InitPacketStart => handle_init_packet_start(ctx),
        DfuPhase::InitPacketSelected => handle_init_packet_selected(ctx),
        DfuPhase::FirmwareStart => handle_firmware_start(ctx),
        DfuPhase::FirmwareSelected => handle_firmware_selected(ctx),
        DfuPhase::StreamWindow => handle_stream_window(ctx),
        DfuPhase::CreateDone => handle_create_done(ctx),
        DfuPhase::SendChunk => handle_send_chunk(ctx),
        DfuPhase::RequestCrc => handle_request_crc(ctx),
        DfuPhase::CrcCheck => handle_crc_check(ctx),
        DfuPhase::ExecuteDone => handle_execute_done(ctx),
        DfuPhase::PostValidate => handle_post_validate(ctx),
        DfuPhase::PostValidateDone => handle_post_validate_done(ctx),
        // Terminal and idle phases are never dispatched.
        DfuPhase::Idle | DfuPhase::Success | DfuPhase::Failed => Ok(Transition::WaitAsync),
    }
}
