//! ## Context
//!
//! Every frameline object is created from, and released through, a [Device]. The trait collects the complete GPU
//! surface the frame core needs: buffers, images, framebuffers, graphics pipelines, command buffers, fences and a single queue.
//!
//! There is no global context. Objects keep an `Arc<dyn Device>` and hand it on to whatever they create. Two implementations exist:
//!
//! - [VulkanDevice]: the real thing, wraps an [ash::Device] and a [gpu-allocator](gpu_allocator) instance.
//! - [SimDevice](crate::sim::SimDevice): deterministic software timeline, used for headless runs and tests.
//!
//! All handles crossing the trait are raw Vulkan handles. The software device mints its own handle values.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ash::vk;

mod queue;
pub use queue::Queue;

mod vulkan;
pub use vulkan::VulkanDevice;

use crate::{
    allocator::MemoryUsage,
    command::Command,
    error::DeviceError,
    resources::{Attachment, BufDesc, ImgDesc, PipelineConfig, RenderTarget},
};

///Capability set of a device. See the [module](self) documentation.
pub trait Device: Send + Sync {
    ///Human readable name of the device.
    fn name(&self) -> &str;

    fn create_buffer(
        &self,
        desc: &BufDesc,
        usage: MemoryUsage,
        name: Option<&str>,
    ) -> Result<vk::Buffer, DeviceError>;
    ///Host write into `buffer` at `offset`. Fails with [DeviceError::NotMapable] if the buffer's memory is not host visible.
    ///
    /// Does not synchronise. Callers have to make sure the device does not access the region at the same time.
    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8])
        -> Result<(), DeviceError>;
    fn destroy_buffer(&self, buffer: vk::Buffer);

    fn create_image(&self, desc: &ImgDesc, name: Option<&str>) -> Result<vk::Image, DeviceError>;
    fn destroy_image(&self, image: vk::Image);

    ///Creates render pass and framebuffer for `attachments`. All attachments have the extent `extent`.
    fn create_render_target(
        &self,
        attachments: &[Attachment],
        extent: vk::Extent2D,
    ) -> Result<RenderTarget, DeviceError>;
    fn destroy_render_target(&self, target: RenderTarget);

    ///Creates a pipeline compatible to `target`'s render pass. `attachments` are the attachments `target` was created for.
    fn create_graphics_pipeline(
        &self,
        config: &PipelineConfig,
        target: &RenderTarget,
        attachments: &[Attachment],
    ) -> Result<vk::Pipeline, DeviceError>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer, DeviceError>;
    ///Encodes `commands` into `command_buffer`. Anything previously encoded is replaced.
    fn encode(
        &self,
        command_buffer: vk::CommandBuffer,
        commands: &[Command],
    ) -> Result<(), DeviceError>;
    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer);

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, DeviceError>;
    ///Returns true if the fence is signaled. Never blocks.
    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool, DeviceError>;
    ///Blocks until `fence` is signaled or `timeout` (in nanoseconds) is reached.
    fn wait_fence(&self, fence: vk::Fence, timeout: u64) -> Result<(), DeviceError>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<(), DeviceError>;
    fn destroy_fence(&self, fence: vk::Fence);

    ///Submits `command_buffers` in order as one batch. If given, `signal` is signaled once all of them have finished.
    fn submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        signal: Option<vk::Fence>,
    ) -> Result<(), DeviceError>;
    ///Blocks until all submitted work has finished.
    fn wait_idle(&self) -> Result<(), DeviceError>;
}

///Locks `mutex`, recovering the guard if another thread panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
