//! Preamble handlers: reset into the bootloader, ping, PRN, MTU and the
//! installed-image probe.

use tracing::{debug, info};

use crate::buffer::BytesBuffer;
use crate::control::{ControlLines, Level, Line};
use crate::events::{DfuEvent, DfuObserver, LogLevel};
use crate::protocol::constants::*;
use crate::protocol::response::{self, FirmwareVersionResponse};
use crate::protocol::Request;
use crate::reactor::TimerId;
use crate::state::error::DfuError;
use crate::state::machine::{ALL_TIMERS, DfuPhase, Transition};
use crate::transport::Transport;

use super::HandlerContext;

/// Start - allocate per-run resources and reset the target into DFU mode.
pub fn handle_start<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    ctx.run.tx = BytesBuffer::with_capacity(PREAMBLE_MTU_SIZE)?;
    ctx.run.rx = BytesBuffer::with_capacity(PREAMBLE_MTU_SIZE)?;
    ctx.run.mtu = PREAMBLE_MTU_SIZE;

    ctx.run.timers_created = true;
    for id in ALL_TIMERS {
        ctx.reactor.create_timer(id)?;
    }
    ctx.run.ping_nonce = 0;

    info!("Resetting target into bootloader");
    ctx.lines.set(Line::Reset, Level::Low)?;
    ctx.lines.set(Line::DfuMode, Level::Low)?;
    ctx.lines.set(Line::Reset, Level::High)?;

    ctx.reactor.arm_timer(TimerId::Settle, ctx.timing.settle())?;
    ctx.goto(DfuPhase::InitTimerExpired);
    Ok(Transition::WaitAsync)
}

/// Settle timer fired - flush boot noise and ping.
pub fn handle_init_timer_expired<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let mut scratch = [0u8; 64];
    let mut drained = 0usize;
    loop {
        match ctx.transport.read(&mut scratch) {
            Ok(0) => break,
            Ok(n) => drained += n,
            Err(e) if e.is_would_block() => break,
            Err(e) => return Err(e.into()),
        }
    }
    if drained > 0 {
        debug!(drained, "Discarded stale input");
    }

    ctx.run.ping_nonce = ctx.run.ping_nonce.wrapping_add(1);
    ctx.prepare(Request::Ping {
        nonce: ctx.run.ping_nonce,
    })?;
    ctx.goto(DfuPhase::PingDone);
    Ok(Transition::LaunchWriteThenRead)
}

/// Ping reply - the nonce must come back unchanged.
pub fn handle_ping_done<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let got = response::parse_ping(&ctx.run.rx)?;
    let sent = ctx.run.ping_nonce;
    if got != sent {
        return Err(DfuError::PingMismatch { sent, got });
    }
    debug!(nonce = sent, "Bootloader answered ping");

    ctx.prepare(Request::PrnSet { prn: PRN_DISABLED })?;
    ctx.goto(DfuPhase::PrnDone);
    Ok(Transition::LaunchWriteThenRead)
}

pub fn handle_prn_done<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    response::parse_empty(&ctx.run.rx, OpCode::PrnSet)?;

    ctx.prepare(Request::MtuGet)?;
    ctx.goto(DfuPhase::MtuDone);
    Ok(Transition::LaunchWriteThenRead)
}

/// MTU reply - size both buffers to it.
pub fn handle_mtu_done<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let mtu = response::parse_mtu(&ctx.run.rx)?;
    if (mtu as usize) < PREAMBLE_MTU_SIZE {
        return Err(DfuError::MtuTooSmall {
            mtu,
            min: PREAMBLE_MTU_SIZE,
        });
    }

    ctx.run.tx.resize(mtu as usize)?;
    ctx.run.rx.resize(mtu as usize)?;
    ctx.run.mtu = mtu as usize;
    info!(mtu, chunk = chunk_size_for_mtu(mtu as usize), "MTU negotiated");

    if ctx.run.versions_probed {
        ctx.goto(DfuPhase::SelectNextImage);
    } else {
        ctx.run.probe_slot = 0;
        ctx.goto(DfuPhase::QueryFirmware);
    }
    Ok(Transition::MoveImmediately)
}

pub fn handle_query_firmware<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    ctx.prepare(Request::FirmwareVersion {
        index: ctx.run.probe_slot,
    })?;
    ctx.goto(DfuPhase::FirmwareVersionDone);
    Ok(Transition::LaunchWriteThenRead)
}

/// Version reply - mark descriptors the device already runs.
pub fn handle_firmware_version_done<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let slot = ctx.run.probe_slot;
    let Some(installed) = FirmwareVersionResponse::parse(&ctx.run.rx)? else {
        debug!(slot, "No image in slot, probe finished");
        ctx.run.versions_probed = true;
        ctx.goto(DfuPhase::SelectNextImage);
        return Ok(Transition::MoveImmediately);
    };

    ctx.emit(DfuEvent::InstalledImage {
        slot,
        image_type: installed.image_type,
        version: installed.version,
    });

    for image in ctx.images.iter_mut() {
        if image.firmware_type.as_u8() == installed.image_type {
            image.installed_version = Some(installed.version);
        }
        if image.matches(installed.image_type, installed.version) {
            image.needs_update = false;
            info!(
                kind = %image.firmware_type,
                version = image.version,
                "Image already installed, skipping"
            );
        }
    }

    if slot >= MAX_IMAGE_SLOT {
        ctx.log(LogLevel::Warn, "Every image slot is occupied, probe stopped");
        ctx.run.versions_probed = true;
        ctx.goto(DfuPhase::SelectNextImage);
    } else {
        ctx.run.probe_slot = slot + 1;
        ctx.goto(DfuPhase::QueryFirmware);
    }
    Ok(Transition::MoveImmediately)
}
