//! Image selection, object select and post-validation handlers.

use tracing::{debug, info};

use crate::control::ControlLines;
use crate::crc32::Crc32;
use crate::events::{DfuEvent, DfuObserver};
use crate::file_view::FileView;
use crate::protocol::{ObjectType, Request, SelectResponse};
use crate::reactor::TimerId;
use crate::state::error::DfuError;
use crate::state::machine::{DfuPhase, Transition};
use crate::transport::Transport;

use super::HandlerContext;

/// Pick the next image that needs writing, or leave the bootloader.
pub fn handle_select_next_image<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let next = ctx
        .images
        .iter()
        .enumerate()
        .skip(ctx.run.next_image)
        .find(|(_, image)| image.needs_update)
        .map(|(index, _)| index);

    let Some(index) = next else {
        info!("No images left to write, leaving bootloader");
        ctx.prepare(Request::Abort)?;
        ctx.goto(DfuPhase::Success);
        return Ok(Transition::LaunchWrite);
    };

    ctx.run.current_image = Some(index);
    ctx.run.next_image = index + 1;

    let image = &ctx.images[index];
    ctx.emit(DfuEvent::ImageStarted {
        index,
        firmware_type: image.firmware_type,
        version: image.version,
        installed_version: image.installed_version,
    });
    ctx.goto(DfuPhase::InitPacketStart);
    Ok(Transition::MoveImmediately)
}

pub fn handle_init_packet_start<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    ctx.run.object_type = Some(ObjectType::Command);
    ctx.prepare(Request::ObjectSelect {
        object_type: ObjectType::Command,
    })?;
    ctx.goto(DfuPhase::InitPacketSelected);
    Ok(Transition::LaunchWriteThenRead)
}

pub fn handle_init_packet_selected<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    open_selected(ctx, ObjectType::Command)?;
    ctx.run.file_continue = DfuPhase::FirmwareStart;
    ctx.goto(DfuPhase::StreamWindow);
    Ok(Transition::MoveImmediately)
}

pub fn handle_firmware_start<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    ctx.run.object_type = Some(ObjectType::Data);
    ctx.prepare(Request::ObjectSelect {
        object_type: ObjectType::Data,
    })?;
    ctx.goto(DfuPhase::FirmwareSelected);
    Ok(Transition::LaunchWriteThenRead)
}

pub fn handle_firmware_selected<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    open_selected(ctx, ObjectType::Data)?;
    ctx.run.file_continue = DfuPhase::PostValidate;
    ctx.goto(DfuPhase::StreamWindow);
    Ok(Transition::MoveImmediately)
}

/// Validate a select reply and load the first window of the matching file.
fn open_selected<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
    object: ObjectType,
) -> Result<(), DfuError> {
    let select = SelectResponse::parse(&ctx.run.rx)?;
    debug!(
        object = %object,
        max_size = select.max_size,
        offset = select.offset,
        crc = %format!("0x{:08X}", select.crc),
        "Object selected"
    );
    if select.offset != 0 {
        return Err(DfuError::NonZeroSelectOffset {
            object,
            offset: select.offset,
        });
    }
    ctx.run.crc = Crc32::with_seed(select.crc);
    ctx.run.max_object_size = select.max_size;

    let image = ctx
        .run
        .current_image
        .and_then(|index| ctx.images.get(index))
        .ok_or(DfuError::NothingSelected)?;
    let relative = match object {
        ObjectType::Command => &image.init_packet,
        ObjectType::Data => &image.firmware,
    };
    let path = ctx.asset_root.join(relative);

    let mut view = FileView::open(&path, select.max_size as usize)?;
    let size = view.file_size();
    let too_large = match object {
        ObjectType::Command => size > select.max_size as u64,
        ObjectType::Data => size > 0 && select.max_size == 0,
    };
    if too_large {
        return Err(DfuError::ObjectTooLarge {
            object,
            size,
            max: select.max_size,
        });
    }

    view.move_window(0)?;
    info!(object = %object, path = %path.display(), size, "Streaming file");
    ctx.run.file_view = Some(view);
    Ok(())
}

/// Last object executed - give the device time to validate the image.
pub fn handle_post_validate<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let kind = ctx
        .run
        .current_image
        .and_then(|index| ctx.images.get(index))
        .map(|image| image.firmware_type)
        .ok_or(DfuError::NothingSelected)?;
    let delay = ctx.timing.post_validate(kind);
    info!(kind = %kind, delay_ms = delay.as_millis() as u64, "Waiting for image validation");

    ctx.reactor.arm_timer(TimerId::PostValidate, delay)?;
    ctx.goto(DfuPhase::PostValidateDone);
    Ok(Transition::WaitAsync)
}

/// Post-validate timer fired - restart for the next image or finish.
pub fn handle_post_validate_done<T: Transport, C: ControlLines, O: DfuObserver>(
    ctx: &mut HandlerContext<'_, T, C, O>,
) -> Result<Transition, DfuError> {
    let pending = ctx
        .images
        .iter()
        .skip(ctx.run.next_image)
        .any(|image| image.needs_update);

    if pending {
        info!("Restarting bootloader for the next image");
        ctx.run.release_resources(&mut *ctx.reactor);
        ctx.goto(DfuPhase::Start);
    } else {
        ctx.goto(DfuPhase::Success);
    }
    Ok(Transition::MoveImmediately)
}
