//! # Synchronisation
//!
//! ## Sync tokens
//!
//! Every write from the host to device visible memory has to state how it is ordered against device work that might still read the
//! old content. This is expressed by a [SyncToken] that [fill](crate::transfer::fill) and [create_and_fill](crate::transfer::create_and_fill)
//! take by value. There is no default.
//!
//! - [SyncToken::WaitIdle]: blocks until the device has finished *all* work. Expensive, use it for one-time uploads only.
//! - [SyncToken::BarriersOnCurrentFrame]: records the write (or the copy that performs it) together with memory barriers into a transient
//!   command buffer that becomes part of the current frame's submission. Since the [SubmissionQueue] already waited for the previous use of the
//!   frame's in-flight slot, the write is ordered against exactly that frame, not against everything.
//!
//! ## Fences
//!
//! Host/device synchronisation uses one [Fence] per in-flight slot. Waiting for it blocks the host until the slot's previous submission
//! has finished.
//!
//! ## Memory barriers
//!
//! Those are used to control access to a buffer or image region. They are collected in a [BarrierBuilder] and recorded as one
//! pipeline barrier. Try to pack as many barriers in one call as possible.

use std::{fmt::Debug, sync::Arc};

use ash::vk;
use tinyvec::TinyVec;

use crate::{
    command::{BufferBarrier, Command, ImageBarrier},
    context::Device,
    error::DeviceError,
    submission::SubmissionQueue,
};

///Synchronisation requirement of a host write. See the [module](self) documentation.
pub enum SyncToken<'a> {
    WaitIdle,
    BarriersOnCurrentFrame(&'a mut SubmissionQueue),
}

impl<'a> Debug for SyncToken<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncToken::WaitIdle => write!(f, "WaitIdle"),
            SyncToken::BarriersOnCurrentFrame(queue) => {
                write!(f, "BarriersOnCurrentFrame({:?})", queue.current_slot())
            }
        }
    }
}

///Host/device fence, destroyed when dropped.
pub struct Fence {
    pub inner: vk::Fence,
    pub device: Arc<dyn Device>,
}

impl Fence {
    pub fn new(device: &Arc<dyn Device>, signaled: bool) -> Result<Self, DeviceError> {
        let inner = device.create_fence(signaled)?;
        Ok(Fence {
            inner,
            device: device.clone(),
        })
    }

    ///Blocks until the fence is signaled, or `timeout` nanoseconds have passed.
    pub fn wait(&self, timeout: u64) -> Result<(), DeviceError> {
        self.device.wait_fence(self.inner, timeout)
    }

    pub fn reset(&self) -> Result<(), DeviceError> {
        self.device.reset_fence(self.inner)
    }

    pub fn is_signaled(&self) -> Result<bool, DeviceError> {
        self.device.fence_signaled(self.inner)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.inner)
    }
}

impl Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

///Barrier building helper. Lets you add barriers for images and buffers
/// via a simple builder API.
///
/// Uses tinyvec internally. [Self::STACK_ALLOCATION] barriers of each type are kept on the stack, the builder
/// however can outgrow that value.
#[derive(Debug, Default, Clone)]
pub struct BarrierBuilder {
    pub images: TinyVec<[ImageBarrier; STACK_BARRIERS]>,
    pub buffers: TinyVec<[BufferBarrier; STACK_BARRIERS]>,
}

const STACK_BARRIERS: usize = 6;

impl BarrierBuilder {
    ///Ammount of barriers that can be stack allocated.
    pub const STACK_ALLOCATION: usize = STACK_BARRIERS;

    pub fn new() -> Self {
        Self::default()
    }

    ///Adds a buffer barrier.
    ///
    /// The `buffer` handle has to stay alive until the barrier was executed. Recording the barrier through
    /// a [Recorder](crate::recorder::Recorder) does not capture the buffer, use [capture](crate::recorder::Recorder::capture) for that.
    pub fn buffer_barrier(
        &mut self,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        src_access_mask: vk::AccessFlags2,
        src_pipeline_stage: vk::PipelineStageFlags2,
        dst_access_mask: vk::AccessFlags2,
        dst_pipeline_stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        self.buffers.push(BufferBarrier {
            buffer,
            offset,
            size,
            src_stage: src_pipeline_stage,
            src_access: src_access_mask,
            dst_stage: dst_pipeline_stage,
            dst_access: dst_access_mask,
        });
        self
    }

    ///Adds an image barrier. Same lifetime rules as for [Self::buffer_barrier] apply.
    pub fn image_barrier(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        src_access_mask: vk::AccessFlags2,
        src_pipeline_stage: vk::PipelineStageFlags2,
        src_layout: vk::ImageLayout,
        dst_access_mask: vk::AccessFlags2,
        dst_pipeline_stage: vk::PipelineStageFlags2,
        dst_layout: vk::ImageLayout,
    ) -> &mut Self {
        let item = ImageBarrier {
            image,
            aspect,
            src_stage: src_pipeline_stage,
            src_access: src_access_mask,
            old_layout: src_layout,
            dst_stage: dst_pipeline_stage,
            dst_access: dst_access_mask,
            new_layout: dst_layout,
        };

        #[cfg(feature = "logging")]
        log::trace!("full_transition[{:?}] {:?}", image, item);

        self.images.push(item);
        self
    }

    ///Pushes only a layout transition, waiting for and blocking all commands.
    pub fn image_layout_transition(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        src_layout: vk::ImageLayout,
        dst_layout: vk::ImageLayout,
    ) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!("layout[{:?}] {:?} -> {:?}", image, src_layout, dst_layout);

        self.images.push(ImageBarrier {
            image,
            aspect,
            src_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
            src_access: vk::AccessFlags2::MEMORY_WRITE,
            old_layout: src_layout,
            dst_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
            dst_access: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            new_layout: dst_layout,
        });
        self
    }

    ///Returns true if at least one barrier has been added.
    pub fn has_barrier(&self) -> bool {
        !self.images.is_empty() || !self.buffers.is_empty()
    }

    ///Converts the collected barriers into a single command.
    pub fn to_command(&self) -> Command {
        Command::PipelineBarrier {
            buffers: self.buffers.iter().copied().collect(),
            images: self.images.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Fence: Send, Sync);
        assert_impl_all!(BarrierBuilder: Send, Sync);
    }

    #[test]
    fn builder_outgrows_stack() {
        let mut builder = BarrierBuilder::new();
        assert!(!builder.has_barrier());
        for i in 0..(BarrierBuilder::STACK_ALLOCATION as u64 + 2) {
            builder.buffer_barrier(
                vk::Buffer::from_raw(i + 1),
                0,
                vk::WHOLE_SIZE,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
                vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
            );
        }
        builder.image_layout_transition(
            vk::Image::from_raw(1),
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        match builder.to_command() {
            Command::PipelineBarrier { buffers, images } => {
                assert_eq!(buffers.len(), BarrierBuilder::STACK_ALLOCATION + 2);
                assert_eq!(images.len(), 1);
                assert_eq!(images[0].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
