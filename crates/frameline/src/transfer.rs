//! # Uploads
//!
//! Host to device writes. The only way to change a [Buffer]'s content after creation is [fill], which requires a [SyncToken].
//!
//! Host visible buffers are written directly. Everything else is written through a transient staging buffer and a copy command:
//!
//! ```text
//! [consumer reads (previous use)] --WAR barrier--> [copy staging -> target] --RAW barrier--> [consumer reads (this frame)]
//! ```
//!
//! With [SyncToken::BarriersOnCurrentFrame] the copy is submitted *by ownership* to the current frame, so it executes before every command
//! buffer submitted after it. Submit uploads before the command buffers that read the data.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use crate::{
    allocator::MemoryUsage,
    context::Device,
    error::{ConfigurationError, DeviceError, FrameError, SubmissionError},
    recorder::Recorder,
    resources::{Buffer, BufferKind, CommandBuffer},
    submission::SubmissionQueue,
    sync::{BarrierBuilder, SyncToken},
};

///Writes `data` to the start of `buffer`, synchronised as stated by `token`.
///
/// Fails before anything is written if `data` is empty or does not fit, or if `token` asks for barriers but no frame is in progress.
pub fn fill<T: Pod>(
    buffer: &Arc<Buffer>,
    data: &[T],
    token: SyncToken<'_>,
) -> Result<(), FrameError> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    if bytes.is_empty() {
        return Err(ConfigurationError::EmptyData.into());
    }
    if bytes.len() as u64 > buffer.desc.size {
        return Err(DeviceError::OutOfBounds {
            offset: 0,
            requested: bytes.len() as u64,
            size: buffer.desc.size,
        }
        .into());
    }
    if let SyncToken::BarriersOnCurrentFrame(queue) = &token {
        if queue.current_slot().is_none() {
            return Err(SubmissionError::NoFrameInProgress.into());
        }
    }

    #[cfg(feature = "profiling")]
    puffin::profile_function!();

    if buffer.usage.is_host_visible() {
        fill_mapped(buffer, bytes, token)
    } else {
        fill_staged(buffer, bytes, token)
    }
}

///Creates a buffer of `kind` that fits `data` and fills it.
pub fn create_and_fill<T: Pod>(
    device: &Arc<dyn Device>,
    kind: BufferKind,
    usage: MemoryUsage,
    data: &[T],
    name: Option<&str>,
    token: SyncToken<'_>,
) -> Result<Arc<Buffer>, FrameError> {
    let buffer = Arc::new(Buffer::for_data::<T>(device, kind, data.len(), usage, name)?);
    fill(&buffer, data, token)?;
    Ok(buffer)
}

fn fill_mapped(buffer: &Arc<Buffer>, bytes: &[u8], token: SyncToken<'_>) -> Result<(), FrameError> {
    match token {
        SyncToken::WaitIdle => {
            buffer.device.wait_idle()?;
            buffer.write_unsynchronized(0, bytes)?;
        }
        SyncToken::BarriersOnCurrentFrame(queue) => {
            //The slot's fence was waited for, so only the current frame can read the buffer after this point.
            buffer.write_unsynchronized(0, bytes)?;

            let (dst_stage, dst_access) = buffer.meta.consumer_scope();
            let mut barrier = BarrierBuilder::new();
            barrier.buffer_barrier(
                buffer.inner,
                0,
                vk::WHOLE_SIZE,
                vk::AccessFlags2::HOST_WRITE,
                vk::PipelineStageFlags2::HOST,
                dst_access,
                dst_stage,
            );

            let mut cb = CommandBuffer::new(&buffer.device)?;
            let mut recorder = Recorder::begin(&mut cb);
            recorder
                .pipeline_barrier(&barrier)?
                .capture(buffer.clone());
            recorder.finish()?;
            queue.submit_ownership(cb)?;
        }
    }
    Ok(())
}

fn fill_staged(buffer: &Arc<Buffer>, bytes: &[u8], token: SyncToken<'_>) -> Result<(), FrameError> {
    let device = &buffer.device;
    let staging = Arc::new(Buffer::new_staging_for_data(
        device,
        Some("frameline staging buffer"),
        bytes,
    )?);
    let cb = record_staged_copy(device, &staging, buffer, bytes.len() as u64)?;

    match token {
        SyncToken::WaitIdle => {
            device.submit(&[cb.inner], None)?;
            device.wait_idle()?;
        }
        SyncToken::BarriersOnCurrentFrame(queue) => submit_to_frame(queue, cb)?,
    }
    Ok(())
}

fn submit_to_frame(queue: &mut SubmissionQueue, cb: CommandBuffer) -> Result<(), FrameError> {
    #[cfg(feature = "logging")]
    log::trace!(
        "Submitting upload {:?} to frame on slot {:?}",
        cb.inner,
        queue.current_slot()
    );
    queue.submit_ownership(cb)
}

fn record_staged_copy(
    device: &Arc<dyn Device>,
    staging: &Arc<Buffer>,
    target: &Arc<Buffer>,
    size: u64,
) -> Result<CommandBuffer, FrameError> {
    let (consumer_stage, consumer_access) = target.meta.consumer_scope();

    //previous reads must finish before the copy overwrites the content
    let mut before = BarrierBuilder::new();
    before.buffer_barrier(
        target.inner,
        0,
        size,
        consumer_access,
        consumer_stage,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::PipelineStageFlags2::TRANSFER,
    );

    let mut after = BarrierBuilder::new();
    after.buffer_barrier(
        target.inner,
        0,
        size,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::PipelineStageFlags2::TRANSFER,
        consumer_access,
        consumer_stage,
    );

    let mut cb = CommandBuffer::new(device)?;
    let mut recorder = Recorder::begin(&mut cb);
    recorder
        .pipeline_barrier(&before)?
        .copy_buffer(staging, target, size)?
        .pipeline_barrier(&after)?;
    recorder.finish()?;
    Ok(cb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimDevice;

    fn gpu_vertices(device: &Arc<dyn Device>, count: usize) -> Arc<Buffer> {
        Arc::new(Buffer::new_vertex::<[f32; 2]>(device, count, MemoryUsage::GpuOnly, None).unwrap())
    }

    #[test]
    fn wait_idle_upload_is_complete_on_return() {
        let sim = SimDevice::with_latency(8);
        let device = sim.clone().into_device();
        let data = [[1.0f32, 2.0], [3.0, 4.0]];
        let buffer = create_and_fill(
            &device,
            BufferKind::Vertex,
            MemoryUsage::GpuOnly,
            &data,
            None,
            SyncToken::WaitIdle,
        )
        .unwrap();

        assert_eq!(sim.pending_submissions(), 0);
        assert_eq!(
            sim.buffer_contents(buffer.inner).unwrap(),
            bytemuck::cast_slice::<_, u8>(&data).to_vec()
        );
        assert_eq!(sim.barrier_count(), 2);
        //staging buffer and upload command buffer are gone
        assert_eq!(sim.live_buffers(), 1);
        assert_eq!(sim.live_command_buffers(), 0);
        assert!(sim.hazards().is_empty());
    }

    #[test]
    fn barrier_upload_becomes_part_of_the_frame() {
        let sim = SimDevice::with_latency(8);
        let device = sim.clone().into_device();
        let mut queue = SubmissionQueue::new(&device, 2).unwrap();
        let buffer = gpu_vertices(&device, 1);

        queue.begin_frame(0).unwrap();
        fill(
            &buffer,
            &[[5.0f32, 6.0]],
            SyncToken::BarriersOnCurrentFrame(&mut queue),
        )
        .unwrap();
        assert_eq!(queue.pending(), 1);
        assert_eq!(sim.buffer_contents(buffer.inner).unwrap(), vec![0u8; 8]);

        queue.end_frame().unwrap();
        queue.wait_idle().unwrap();
        assert_eq!(
            sim.buffer_contents(buffer.inner).unwrap(),
            bytemuck::cast_slice::<f32, u8>(&[5.0, 6.0]).to_vec()
        );
        assert!(sim.hazards().is_empty());
    }

    #[test]
    fn host_visible_barrier_write_is_immediate() {
        let sim = SimDevice::new();
        let device = sim.clone().into_device();
        let mut queue = SubmissionQueue::new(&device, 1).unwrap();
        let buffer = Arc::new(
            Buffer::new_vertex::<u32>(&device, 2, MemoryUsage::CpuToGpu, None).unwrap(),
        );

        queue.begin_frame(0).unwrap();
        fill(&buffer, &[7u32, 8], SyncToken::BarriersOnCurrentFrame(&mut queue)).unwrap();
        assert_eq!(
            sim.buffer_contents(buffer.inner).unwrap(),
            bytemuck::cast_slice::<u32, u8>(&[7, 8]).to_vec()
        );
        //the host write barrier
        assert_eq!(queue.pending(), 1);
        queue.end_frame().unwrap();
    }

    #[test]
    fn invalid_fills_write_nothing() {
        let sim = SimDevice::new();
        let device = sim.clone().into_device();
        let mut queue = SubmissionQueue::new(&device, 1).unwrap();
        let buffer = gpu_vertices(&device, 1);

        assert!(matches!(
            fill::<[f32; 2]>(&buffer, &[], SyncToken::WaitIdle),
            Err(FrameError::Configuration(ConfigurationError::EmptyData))
        ));
        assert!(matches!(
            fill(&buffer, &[[0.0f32; 2]; 2], SyncToken::WaitIdle),
            Err(FrameError::Device(DeviceError::OutOfBounds {
                requested: 16,
                size: 8,
                ..
            }))
        ));
        assert!(matches!(
            fill(
                &buffer,
                &[[0.0f32; 2]],
                SyncToken::BarriersOnCurrentFrame(&mut queue)
            ),
            Err(FrameError::Submission(SubmissionError::NoFrameInProgress))
        ));
        assert_eq!(sim.live_buffers(), 1);
        assert_eq!(sim.live_command_buffers(), 0);
    }
}
