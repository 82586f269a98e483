//! # Software device
//!
//! [SimDevice] implements [Device] without any GPU. Submissions are queued on a software timeline and executed in order
//! once the host waits for them, or once more than `latency` submissions are outstanding. Executing a command buffer replays its
//! [Command]s: buffer copies move bytes, draws snapshot the bound vertex and index data *at execution time*.
//!
//! Since execution is deferred the device can observe host behaviour a real driver would only show as corruption or validation
//! errors. Each of those is recorded as a [Hazard]. A correctly synchronised program produces none.
//!
//! Used for headless runs and all tests of this crate.

use std::{collections::VecDeque, sync::Arc, sync::Mutex};

use ahash::{AHashMap, AHashSet};
use ash::vk::{self, Handle};
use bytemuck::Pod;

use crate::{
    allocator::MemoryUsage,
    command::Command,
    context::{lock, Device},
    error::DeviceError,
    resources::{Attachment, BufDesc, ImgDesc, PipelineConfig, RenderTarget},
};

///Host behaviour that races with device work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hazard {
    ///Host wrote to a buffer a pending submission accesses.
    HostWriteWhileInUse { buffer: vk::Buffer },
    ///A command buffer was freed before its execution finished.
    FreedWhilePending(vk::CommandBuffer),
    ///A command buffer was re-encoded before its execution finished.
    EncodedWhilePending(vk::CommandBuffer),
    ///An object was destroyed while a pending submission references it.
    DestroyedWhileInUse { handle: u64, kind: &'static str },
    ResetFenceWhilePending(vk::Fence),
    ///Submission with a fence that was not reset.
    SubmittedSignaledFence(vk::Fence),
}

///Draw as it was executed, including the vertex and index data that was bound at that moment.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    ///Id of the submission the draw was part of. Ids increase with every submit.
    pub submission: u64,
    pub command_buffer: vk::CommandBuffer,
    pub framebuffer: Option<vk::Framebuffer>,
    pub pipeline: Option<vk::Pipeline>,
    pub vertex_buffer: Option<vk::Buffer>,
    pub index_buffer: Option<vk::Buffer>,
    pub index_type: vk::IndexType,
    pub index_count: u32,
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
}

impl DrawCall {
    ///Reinterprets the vertex data as `V`s.
    pub fn vertices<V: Pod>(&self) -> Vec<V> {
        bytemuck::pod_collect_to_vec(&self.vertex_data)
    }

    pub fn indices(&self) -> Vec<u32> {
        match self.index_type {
            vk::IndexType::UINT16 => bytemuck::pod_collect_to_vec::<u8, u16>(&self.index_data)
                .into_iter()
                .map(u32::from)
                .collect(),
            _ => bytemuck::pod_collect_to_vec(&self.index_data),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferOp {
    Copy,
    Blit(vk::Filter),
}

///Image copy or blit as it was executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferCall {
    pub submission: u64,
    pub op: TransferOp,
    pub src: vk::Image,
    ///Aspect of `src` that was read.
    pub src_aspect: vk::ImageAspectFlags,
    pub dst: vk::Image,
}

struct SimBuffer {
    usage: MemoryUsage,
    data: Vec<u8>,
}

struct PendingSubmission {
    id: u64,
    command_buffers: Vec<(vk::CommandBuffer, Arc<[Command]>)>,
    fence: Option<vk::Fence>,
}

impl PendingSubmission {
    fn references(&self, raw: u64) -> bool {
        self.command_buffers
            .iter()
            .any(|(_, cmds)| cmds.iter().any(|c| command_references(c, raw)))
    }
}

fn command_references(command: &Command, raw: u64) -> bool {
    let mut found = false;
    command.for_each_buffer(|b| found |= b.as_raw() == raw);
    command.for_each_image(|i| found |= i.as_raw() == raw);
    match command {
        Command::BeginRenderPass {
            render_pass,
            framebuffer,
            ..
        } => found || render_pass.as_raw() == raw || framebuffer.as_raw() == raw,
        Command::BindPipeline { pipeline } => found || pipeline.as_raw() == raw,
        _ => found,
    }
}

#[derive(Default)]
struct SimState {
    next_handle: u64,
    next_submission: u64,
    buffers: AHashMap<vk::Buffer, SimBuffer>,
    images: AHashMap<vk::Image, ImgDesc>,
    render_targets: AHashMap<vk::Framebuffer, vk::RenderPass>,
    pipelines: AHashSet<vk::Pipeline>,
    command_buffers: AHashMap<vk::CommandBuffer, Option<Arc<[Command]>>>,
    fences: AHashMap<vk::Fence, bool>,
    pending: VecDeque<PendingSubmission>,

    executed: Vec<vk::CommandBuffer>,
    draws: Vec<DrawCall>,
    transfers: Vec<TransferCall>,
    barriers: usize,
    hazards: Vec<Hazard>,

    lost: bool,
    reject_next: Option<vk::Result>,
}

impl SimState {
    fn mint(&mut self) -> u64 {
        //zero is the null handle
        self.next_handle += 1;
        self.next_handle
    }

    fn hazard(&mut self, hazard: Hazard) {
        #[cfg(feature = "logging")]
        log::warn!("Software device hazard: {:?}", hazard);
        self.hazards.push(hazard);
    }

    fn in_use(&self, raw: u64) -> bool {
        self.pending.iter().any(|p| p.references(raw))
    }

    fn check_destroy(&mut self, raw: u64, kind: &'static str) {
        if self.in_use(raw) {
            self.hazard(Hazard::DestroyedWhileInUse { handle: raw, kind });
        }
    }

    fn command_buffer_pending(&self, cb: vk::CommandBuffer) -> bool {
        self.pending
            .iter()
            .any(|p| p.command_buffers.iter().any(|(hdl, _)| *hdl == cb))
    }

    fn buffer_bytes(&self, buffer: Option<vk::Buffer>) -> Vec<u8> {
        buffer
            .and_then(|b| self.buffers.get(&b))
            .map(|b| b.data.clone())
            .unwrap_or_default()
    }

    ///Executes the oldest pending submission. Returns false if nothing was pending.
    fn execute_next(&mut self) -> bool {
        let Some(submission) = self.pending.pop_front() else {
            return false;
        };

        for (cb, commands) in submission.command_buffers.iter() {
            self.replay(submission.id, *cb, commands);
            self.executed.push(*cb);
        }

        if let Some(fence) = submission.fence {
            if let Some(signaled) = self.fences.get_mut(&fence) {
                *signaled = true;
            }
        }
        true
    }

    fn replay(&mut self, submission: u64, cb: vk::CommandBuffer, commands: &[Command]) {
        let mut framebuffer = None;
        let mut pipeline = None;
        let mut vertex_buffer = None;
        let mut index_buffer = None;
        let mut index_type = vk::IndexType::UINT32;

        for cmd in commands {
            match cmd {
                Command::BeginRenderPass { framebuffer: fb, .. } => framebuffer = Some(*fb),
                Command::EndRenderPass => framebuffer = None,
                Command::BindPipeline { pipeline: p } => pipeline = Some(*p),
                Command::BindVertexBuffer { buffer, .. } => vertex_buffer = Some(*buffer),
                Command::BindIndexBuffer {
                    buffer,
                    index_type: ty,
                    ..
                } => {
                    index_buffer = Some(*buffer);
                    index_type = *ty;
                }
                Command::DrawIndexed { index_count, .. } => {
                    let draw = DrawCall {
                        submission,
                        command_buffer: cb,
                        framebuffer,
                        pipeline,
                        vertex_buffer,
                        index_buffer,
                        index_type,
                        index_count: *index_count,
                        vertex_data: self.buffer_bytes(vertex_buffer),
                        index_data: self.buffer_bytes(index_buffer),
                    };
                    self.draws.push(draw);
                }
                Command::PipelineBarrier { .. } => self.barriers += 1,
                Command::CopyBuffer { src, dst, region } => {
                    let src_range = region.src_offset as usize
                        ..(region.src_offset + region.size) as usize;
                    let bytes = self
                        .buffers
                        .get(src)
                        .and_then(|b| b.data.get(src_range))
                        .map(|b| b.to_vec());
                    let dst_range = region.dst_offset as usize
                        ..(region.dst_offset + region.size) as usize;
                    match (bytes, self.buffers.get_mut(dst)) {
                        (Some(bytes), Some(dst)) if dst_range.end <= dst.data.len() => {
                            dst.data[dst_range].copy_from_slice(&bytes)
                        }
                        _ => {
                            #[cfg(feature = "logging")]
                            log::error!("Invalid buffer copy {:?} -> {:?}, skipping", src, dst);
                        }
                    }
                }
                Command::CopyImage { src, dst } => self.transfers.push(TransferCall {
                    submission,
                    op: TransferOp::Copy,
                    src: src.image,
                    src_aspect: src.aspect,
                    dst: dst.image,
                }),
                Command::BlitImage { src, dst, filter } => self.transfers.push(TransferCall {
                    submission,
                    op: TransferOp::Blit(*filter),
                    src: src.image,
                    src_aspect: src.aspect,
                    dst: dst.image,
                }),
            }
        }
    }
}

///Deterministic software [Device]. See the [module](self) documentation.
pub struct SimDevice {
    name: String,
    latency: usize,
    state: Mutex<SimState>,
}

impl SimDevice {
    ///Device that keeps up to two submissions outstanding.
    pub fn new() -> Arc<Self> {
        Self::with_latency(2)
    }

    ///Device that starts executing once more than `latency` submissions are outstanding.
    pub fn with_latency(latency: usize) -> Arc<Self> {
        Arc::new(SimDevice {
            name: format!("frameline software device (latency {})", latency),
            latency,
            state: Mutex::new(SimState::default()),
        })
    }

    pub fn into_device(self: Arc<Self>) -> Arc<dyn Device> {
        self
    }

    ///Marks the device as lost. All pending work is dropped without signaling its fences.
    pub fn lose_device(&self) {
        let mut state = lock(&self.state);
        state.lost = true;
        state.pending.clear();
    }

    pub fn is_lost(&self) -> bool {
        lock(&self.state).lost
    }

    ///Lets the next call to [submit](Device::submit) fail with `result`.
    pub fn reject_next_submit(&self, result: vk::Result) {
        lock(&self.state).reject_next = Some(result);
    }

    ///Executes up to `count` pending submissions. Returns how many were executed.
    pub fn step(&self, count: usize) -> usize {
        let mut state = lock(&self.state);
        (0..count).take_while(|_| state.execute_next()).count()
    }

    pub fn pending_submissions(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn live_command_buffers(&self) -> usize {
        lock(&self.state).command_buffers.len()
    }

    pub fn live_buffers(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    pub fn live_images(&self) -> usize {
        lock(&self.state).images.len()
    }

    ///Current content of `buffer`, as seen by the device.
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        lock(&self.state).buffers.get(&buffer).map(|b| b.data.clone())
    }

    ///All command buffers in execution order.
    pub fn executed_command_buffers(&self) -> Vec<vk::CommandBuffer> {
        lock(&self.state).executed.clone()
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        lock(&self.state).draws.clone()
    }

    pub fn transfers(&self) -> Vec<TransferCall> {
        lock(&self.state).transfers.clone()
    }

    ///Number of executed pipeline barriers.
    pub fn barrier_count(&self) -> usize {
        lock(&self.state).barriers
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        lock(&self.state).hazards.clone()
    }
}

impl Device for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_buffer(
        &self,
        desc: &BufDesc,
        usage: MemoryUsage,
        _name: Option<&str>,
    ) -> Result<vk::Buffer, DeviceError> {
        let mut state = lock(&self.state);
        let handle = vk::Buffer::from_raw(state.mint());
        state.buffers.insert(
            handle,
            SimBuffer {
                usage,
                data: vec![0; desc.size as usize],
            },
        );
        Ok(handle)
    }

    fn write_buffer(
        &self,
        buffer: vk::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        let in_use = state.in_use(buffer.as_raw());
        let target = state
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownHandle(buffer.as_raw()))?;

        if !target.usage.is_host_visible() {
            return Err(DeviceError::NotMapable);
        }
        let size = target.data.len() as u64;
        if offset + data.len() as u64 > size {
            return Err(DeviceError::OutOfBounds {
                offset,
                requested: data.len() as u64,
                size,
            });
        }
        target.data[offset as usize..offset as usize + data.len()].copy_from_slice(data);

        if in_use {
            state.hazard(Hazard::HostWriteWhileInUse { buffer });
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = lock(&self.state);
        state.check_destroy(buffer.as_raw(), "buffer");
        state.buffers.remove(&buffer);
    }

    fn create_image(&self, desc: &ImgDesc, _name: Option<&str>) -> Result<vk::Image, DeviceError> {
        let mut state = lock(&self.state);
        let handle = vk::Image::from_raw(state.mint());
        state.images.insert(handle, desc.clone());
        Ok(handle)
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = lock(&self.state);
        state.check_destroy(image.as_raw(), "image");
        state.images.remove(&image);
    }

    fn create_render_target(
        &self,
        attachments: &[Attachment],
        extent: vk::Extent2D,
    ) -> Result<RenderTarget, DeviceError> {
        let mut state = lock(&self.state);
        for att in attachments {
            let desc = state
                .images
                .get(&att.image.inner)
                .ok_or(DeviceError::UnknownHandle(att.image.inner.as_raw()))?;
            if desc.extent != extent {
                return Err(DeviceError::VkError(vk::Result::ERROR_VALIDATION_FAILED_EXT));
            }
        }

        let render_pass = vk::RenderPass::from_raw(state.mint());
        let framebuffer = vk::Framebuffer::from_raw(state.mint());
        state.render_targets.insert(framebuffer, render_pass);
        Ok(RenderTarget {
            render_pass,
            framebuffer,
        })
    }

    fn destroy_render_target(&self, target: RenderTarget) {
        let mut state = lock(&self.state);
        state.check_destroy(target.framebuffer.as_raw(), "framebuffer");
        state.render_targets.remove(&target.framebuffer);
    }

    fn create_graphics_pipeline(
        &self,
        _config: &PipelineConfig,
        target: &RenderTarget,
        _attachments: &[Attachment],
    ) -> Result<vk::Pipeline, DeviceError> {
        let mut state = lock(&self.state);
        if state.render_targets.get(&target.framebuffer) != Some(&target.render_pass) {
            return Err(DeviceError::UnknownHandle(target.render_pass.as_raw()));
        }
        let pipeline = vk::Pipeline::from_raw(state.mint());
        state.pipelines.insert(pipeline);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut state = lock(&self.state);
        state.check_destroy(pipeline.as_raw(), "pipeline");
        state.pipelines.remove(&pipeline);
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer, DeviceError> {
        let mut state = lock(&self.state);
        let handle = vk::CommandBuffer::from_raw(state.mint());
        state.command_buffers.insert(handle, None);
        Ok(handle)
    }

    fn encode(
        &self,
        command_buffer: vk::CommandBuffer,
        commands: &[Command],
    ) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        if !state.command_buffers.contains_key(&command_buffer) {
            return Err(DeviceError::UnknownHandle(command_buffer.as_raw()));
        }
        if state.command_buffer_pending(command_buffer) {
            state.hazard(Hazard::EncodedWhilePending(command_buffer));
        }
        state
            .command_buffers
            .insert(command_buffer, Some(Arc::from(commands)));
        Ok(())
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        let mut state = lock(&self.state);
        if state.command_buffer_pending(command_buffer) {
            state.hazard(Hazard::FreedWhilePending(command_buffer));
        }
        state.command_buffers.remove(&command_buffer);
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, DeviceError> {
        let mut state = lock(&self.state);
        let handle = vk::Fence::from_raw(state.mint());
        state.fences.insert(handle, signaled);
        Ok(handle)
    }

    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool, DeviceError> {
        let state = lock(&self.state);
        if state.lost {
            return Err(DeviceError::Lost);
        }
        state
            .fences
            .get(&fence)
            .copied()
            .ok_or(DeviceError::UnknownHandle(fence.as_raw()))
    }

    fn wait_fence(&self, fence: vk::Fence, _timeout: u64) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        if state.lost {
            return Err(DeviceError::Lost);
        }

        loop {
            match state.fences.get(&fence).copied() {
                None => return Err(DeviceError::UnknownHandle(fence.as_raw())),
                Some(true) => return Ok(()),
                Some(false) => {}
            }
            //Nothing left that could signal the fence, a real device would block forever.
            if !state.pending.iter().any(|p| p.fence == Some(fence)) {
                return Err(DeviceError::Timeout);
            }
            state.execute_next();
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        if state.lost {
            return Err(DeviceError::Lost);
        }
        if state.pending.iter().any(|p| p.fence == Some(fence)) {
            state.hazard(Hazard::ResetFenceWhilePending(fence));
        }
        let signaled = state
            .fences
            .get_mut(&fence)
            .ok_or(DeviceError::UnknownHandle(fence.as_raw()))?;
        *signaled = false;
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = lock(&self.state);
        if state.pending.iter().any(|p| p.fence == Some(fence)) {
            state.hazard(Hazard::DestroyedWhileInUse {
                handle: fence.as_raw(),
                kind: "fence",
            });
        }
        state.fences.remove(&fence);
    }

    fn submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        signal: Option<vk::Fence>,
    ) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        if state.lost {
            return Err(DeviceError::Lost);
        }
        if let Some(result) = state.reject_next.take() {
            return Err(result.into());
        }

        let mut snapshot = Vec::with_capacity(command_buffers.len());
        for cb in command_buffers {
            match state.command_buffers.get(cb) {
                None => return Err(DeviceError::UnknownHandle(cb.as_raw())),
                Some(None) => {
                    return Err(DeviceError::VkError(
                        vk::Result::ERROR_VALIDATION_FAILED_EXT,
                    ))
                }
                Some(Some(commands)) => snapshot.push((*cb, commands.clone())),
            }
        }

        if let Some(fence) = signal {
            match state.fences.get(&fence).copied() {
                None => return Err(DeviceError::UnknownHandle(fence.as_raw())),
                Some(true) => state.hazard(Hazard::SubmittedSignaledFence(fence)),
                Some(false) => {}
            }
        }

        let id = state.next_submission;
        state.next_submission += 1;
        state.pending.push_back(PendingSubmission {
            id,
            command_buffers: snapshot,
            fence: signal,
        });

        while state.pending.len() > self.latency {
            state.execute_next();
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        if state.lost {
            return Err(DeviceError::Lost);
        }
        while state.execute_next() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        recorder::Recorder,
        resources::{Buffer, BufferKind, CommandBuffer},
    };
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(SimDevice: Send, Sync);
    }

    fn copy_buffer(
        device: &Arc<dyn Device>,
        src: &Arc<Buffer>,
        dst: &Arc<Buffer>,
    ) -> CommandBuffer {
        let mut cb = CommandBuffer::new(device).unwrap();
        let mut rec = Recorder::begin(&mut cb);
        rec.copy_buffer(src, dst, src.desc.size).unwrap();
        rec.finish().unwrap();
        cb
    }

    #[test]
    fn execution_is_deferred_until_waited() {
        let sim = SimDevice::with_latency(4);
        let device = sim.clone().into_device();
        let src = Arc::new(
            Buffer::for_data::<u32>(&device, BufferKind::Generic, 2, MemoryUsage::CpuToGpu, None)
                .unwrap(),
        );
        let dst = Arc::new(
            Buffer::for_data::<u32>(&device, BufferKind::Generic, 2, MemoryUsage::GpuOnly, None)
                .unwrap(),
        );
        src.write_unsynchronized(0, bytemuck::cast_slice(&[1u32, 2]))
            .unwrap();

        let cb = copy_buffer(&device, &src, &dst);
        let fence = device.create_fence(false).unwrap();
        device.submit(&[cb.inner], Some(fence)).unwrap();

        assert_eq!(sim.pending_submissions(), 1);
        assert!(!device.fence_signaled(fence).unwrap());
        assert_eq!(sim.buffer_contents(dst.inner).unwrap(), vec![0u8; 8]);

        device.wait_fence(fence, u64::MAX).unwrap();
        assert_eq!(
            sim.buffer_contents(dst.inner).unwrap(),
            bytemuck::cast_slice::<u32, u8>(&[1, 2]).to_vec()
        );
        assert!(sim.hazards().is_empty());
        device.destroy_fence(fence);
    }

    #[test]
    fn latency_bounds_outstanding_work() {
        let sim = SimDevice::with_latency(1);
        let device = sim.clone().into_device();
        let src = Arc::new(
            Buffer::for_data::<u8>(&device, BufferKind::Generic, 4, MemoryUsage::CpuToGpu, None)
                .unwrap(),
        );
        let dst = Arc::new(
            Buffer::for_data::<u8>(&device, BufferKind::Generic, 4, MemoryUsage::GpuOnly, None)
                .unwrap(),
        );
        let cb = copy_buffer(&device, &src, &dst);
        for _ in 0..3 {
            device.submit(&[cb.inner], None).unwrap();
        }
        assert_eq!(sim.pending_submissions(), 1);
        assert_eq!(sim.executed_command_buffers().len(), 2);
        assert_eq!(sim.step(5), 1);
    }

    #[test]
    fn detects_host_write_and_free_while_pending() {
        let sim = SimDevice::with_latency(4);
        let device = sim.clone().into_device();
        let src = Arc::new(
            Buffer::for_data::<u8>(&device, BufferKind::Generic, 4, MemoryUsage::CpuToGpu, None)
                .unwrap(),
        );
        let dst = Arc::new(
            Buffer::for_data::<u8>(&device, BufferKind::Generic, 4, MemoryUsage::GpuOnly, None)
                .unwrap(),
        );
        let cb = copy_buffer(&device, &src, &dst);
        device.submit(&[cb.inner], None).unwrap();

        src.write_unsynchronized(0, &[9, 9, 9, 9]).unwrap();
        let handle = cb.inner;
        drop(cb);

        assert_eq!(
            sim.hazards(),
            vec![
                Hazard::HostWriteWhileInUse { buffer: src.inner },
                Hazard::FreedWhilePending(handle)
            ]
        );
    }

    #[test]
    fn waiting_for_unsubmitted_fence_times_out() {
        let device = SimDevice::new().into_device();
        let fence = device.create_fence(false).unwrap();
        assert!(matches!(
            device.wait_fence(fence, 1_000),
            Err(DeviceError::Timeout)
        ));
        let signaled = device.create_fence(true).unwrap();
        device.wait_fence(signaled, 0).unwrap();
    }

    #[test]
    fn lost_device_fails_waits() {
        let sim = SimDevice::new();
        let device = sim.clone().into_device();
        let fence = device.create_fence(true).unwrap();
        sim.lose_device();
        assert!(matches!(device.wait_fence(fence, 0), Err(DeviceError::Lost)));
        assert!(matches!(device.wait_idle(), Err(DeviceError::Lost)));
        assert!(matches!(device.submit(&[], None), Err(DeviceError::Lost)));
    }

    #[test]
    fn gpu_only_buffers_are_not_mapable() {
        let device = SimDevice::new().into_device();
        let buffer =
            Buffer::for_data::<u8>(&device, BufferKind::Generic, 4, MemoryUsage::GpuOnly, None)
                .unwrap();
        assert!(matches!(
            device.write_buffer(buffer.inner, 0, &[1]),
            Err(DeviceError::NotMapable)
        ));
    }
}
