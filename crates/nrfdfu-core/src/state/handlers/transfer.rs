//! Object transfer handlers (Create, Write, CrcGet, Execute).

use tracing::{debug, info};

use crate::control::ControlLines;
use crate::events::{DfuEvent, DfuObserver, PacketDirection};
use crate::file_view::FileViewError;
use crate::protocol::constants::*;
use crate::protocol::response::{self, CrcResponse};
use crate::protocol::Request;
use crate::state::error::DfuError;
use crate::state::machine::{DfuPhase, Transition};
use crate::transport::Transport;

use super::HandlerContext;

/// Create an object covering the current window.
pub fn handle_stream_window<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let object = ctx.run.object_type.ok_or(DfuError::NothingSelected)?;
    let extent = ctx.run.window_extent();

    if extent == 0 {
        debug!(object = %object, "Empty file, nothing to stream");
        ctx.run.file_view = None;
        let next = ctx.run.file_continue;
        ctx.goto(next);
        return Ok(Transition::MoveImmediately);
    }

    ctx.prepare(Request::ObjectCreate {
        object_type: object,
        size: extent as u32,
    })?;
    ctx.goto(DfuPhase::CreateDone);
    Ok(Transition::LaunchWriteThenRead)
}

pub fn handle_create_done<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    response::parse_empty(&ctx.run.rx, OpCode::ObjectCreate)?;

    ctx.run.chunk_size = chunk_size_for_mtu(ctx.run.mtu);
    ctx.run.offset_into_window = 0;
    ctx.goto(DfuPhase::SendChunk);
    Ok(Transition::MoveImmediately)
}

/// Write the next chunk of the window. The device does not answer writes.
pub fn handle_send_chunk<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let run = &mut *ctx.run;
    let view = run.file_view.as_ref().ok_or(DfuError::NothingSelected)?;
    let window = view.window()?;

    let start = run.offset_into_window;
    let len = run.chunk_size.min(window.len() - start);
    let chunk = &window[start..start + len];

    Request::ObjectWrite(chunk).encode_into(&mut run.tx)?;
    run.crc.update(chunk);
    run.request = None;
    run.offset_into_window += len;
    run.tx.dump("tx");

    let more = run.offset_into_window < window.len();
    let frame_len = run.tx.len();
    ctx.emit(DfuEvent::Packet {
        direction: PacketDirection::Tx,
        opcode: OpCode::ObjectWrite,
        length: frame_len,
    });

    // With more to send the phase stays SendChunk and runs again once this
    // frame is out.
    if !more {
        ctx.goto(DfuPhase::RequestCrc);
    }
    Ok(Transition::LaunchWrite)
}

pub fn handle_request_crc<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    ctx.prepare(Request::CrcGet)?;
    ctx.goto(DfuPhase::CrcCheck);
    Ok(Transition::LaunchWriteThenRead)
}

/// CRC reply - offset and checksum must match what was sent.
pub fn handle_crc_check<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let reply = CrcResponse::parse(&ctx.run.rx)?;
    let expected_offset = ctx
        .run
        .file_view
        .as_ref()
        .and_then(|view| view.window_end())
        .ok_or(FileViewError::NoWindow)?;
    let expected_crc = ctx.run.crc.value();

    if u64::from(reply.offset) != expected_offset {
        return Err(DfuError::OffsetMismatch {
            expected: expected_offset,
            reported: reply.offset,
        });
    }
    if reply.crc != expected_crc {
        return Err(DfuError::CrcMismatch {
            expected: expected_crc,
            reported: reply.crc,
        });
    }
    debug!(offset = reply.offset, crc = %format!("0x{:08X}", reply.crc), "CRC verified");

    ctx.prepare(Request::ObjectExecute)?;
    ctx.goto(DfuPhase::ExecuteDone);
    Ok(Transition::LaunchWriteThenRead)
}

/// Object committed - move to the next window or finish the file.
pub fn handle_execute_done<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    response::parse_empty(&ctx.run.rx, OpCode::ObjectExecute)?;

    let object = ctx.run.object_type.ok_or(DfuError::NothingSelected)?;
    let view = ctx
        .run
        .file_view
        .as_mut()
        .ok_or(DfuError::NothingSelected)?;
    let end = view.window_end().ok_or(FileViewError::NoWindow)?;
    let total = view.file_size();

    if end < total {
        view.move_window(end)?;
        ctx.emit(DfuEvent::Progress {
            object,
            current: end,
            total,
        });
        ctx.goto(DfuPhase::StreamWindow);
    } else {
        ctx.run.file_view = None;
        ctx.emit(DfuEvent::Progress {
            object,
            current: end,
            total,
        });
        info!(object = %object, bytes = total, "Object type complete");
        let next = ctx.run.file_continue;
        ctx.goto(next);
    }
    Ok(Transition::MoveImmediately)
}
