//! # Presentation
//!
//! Frameline does not create surfaces or swapchains. Whatever shows the rendered image implements [Window]: it knows the
//! resolution and the number of frames in flight, and can record the transfer of an attachment into its presentable image.
//!
//! The transfer is returned as recorded transient [CommandBuffer] that is meant to be submitted by ownership after the
//! frame's draw commands.
//!
//! [OffscreenWindow] keeps one presentable image per in-flight index and is used for headless runs.

use std::sync::Arc;

use ash::vk;

use crate::{
    context::Device,
    error::{FrameError, SubmissionError},
    inflight::InFlightSet,
    recorder::Recorder,
    resources::{Attachment, CommandBuffer, Image, ImgDesc},
    sync::BarrierBuilder,
};

pub trait Window {
    ///Extent of the presentable images.
    fn resolution(&self) -> vk::Extent2D;
    fn frames_in_flight(&self) -> usize;
    ///Number of presented frames so far.
    fn current_frame(&self) -> u64;
    fn in_flight_index_for_frame(&self, frame: u64) -> usize {
        (frame % self.frames_in_flight().max(1) as u64) as usize
    }
    fn current_in_flight_index(&self) -> usize {
        self.in_flight_index_for_frame(self.current_frame())
    }

    ///Records a copy of `attachment` into the presentable image of in-flight index `index`. The attachment is expected in the layout
    /// its render pass left it in, and is returned to that layout.
    fn copy_to_swapchain_image(
        &self,
        attachment: &Attachment,
        index: usize,
    ) -> Result<CommandBuffer, FrameError>;
    ///Same as [copy_to_swapchain_image](Self::copy_to_swapchain_image), but scales to the presentable image.
    fn blit_to_swapchain_image(
        &self,
        attachment: &Attachment,
        index: usize,
    ) -> Result<CommandBuffer, FrameError>;

    ///Presents the current frame and advances [current_frame](Self::current_frame).
    fn present(&mut self) -> Result<(), FrameError>;
    fn set_cursor_pos(&mut self, x: f64, y: f64);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TransferKind {
    Copy,
    Blit,
}

///Window without surface. Presenting only advances the frame counter.
pub struct OffscreenWindow {
    device: Arc<dyn Device>,
    resolution: vk::Extent2D,
    images: InFlightSet<Arc<Image>>,
    frame: u64,
    cursor: (f64, f64),
}

impl OffscreenWindow {
    pub fn new(
        device: &Arc<dyn Device>,
        resolution: vk::Extent2D,
        frames_in_flight: usize,
        format: vk::Format,
    ) -> Result<Self, FrameError> {
        let images = InFlightSet::try_new(frames_in_flight, |idx| {
            let name = format!("presentable image {}", idx);
            Ok::<_, FrameError>(Arc::new(Image::new(
                device,
                ImgDesc::presentable_2d(resolution.width, resolution.height, format),
                Some(&name),
            )?))
        })?;

        #[cfg(feature = "logging")]
        log::info!(
            "Created offscreen window {}x{} with {} frames in flight",
            resolution.width,
            resolution.height,
            frames_in_flight
        );

        Ok(OffscreenWindow {
            device: device.clone(),
            resolution,
            images,
            frame: 0,
            cursor: (0.0, 0.0),
        })
    }

    pub fn presentable_image(&self, index: usize) -> Option<&Arc<Image>> {
        self.images.at(index)
    }

    pub fn cursor_pos(&self) -> (f64, f64) {
        self.cursor
    }

    fn record_transfer(
        &self,
        attachment: &Attachment,
        index: usize,
        kind: TransferKind,
    ) -> Result<CommandBuffer, FrameError> {
        let dst = self
            .images
            .at(index)
            .ok_or(SubmissionError::InvalidSlot {
                index,
                count: self.images.len(),
            })?
            .clone();
        let src = &attachment.image;

        let src_layout = attachment.desc.final_layout();
        let src_access = if attachment.desc.is_depth() {
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
        } else {
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
        };

        let mut before = BarrierBuilder::new();
        before
            .image_barrier(
                src.inner,
                src.aspect(),
                src_access,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                src_layout,
                vk::AccessFlags2::TRANSFER_READ,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )
            .image_barrier(
                dst.inner,
                dst.aspect(),
                vk::AccessFlags2::NONE,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::ImageLayout::UNDEFINED,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

        //attachment back to where the render pass expects it, presentable image to present
        let mut after = BarrierBuilder::new();
        after
            .image_barrier(
                src.inner,
                src.aspect(),
                vk::AccessFlags2::TRANSFER_READ,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                src_access,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                src_layout,
            )
            .image_barrier(
                dst.inner,
                dst.aspect(),
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags2::empty(),
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );

        let mut cb = CommandBuffer::new(&self.device)?;
        let mut recorder = Recorder::begin(&mut cb);
        recorder.pipeline_barrier(&before)?;
        match kind {
            TransferKind::Copy => recorder.copy_image(src, &dst)?,
            TransferKind::Blit => {
                //depth formats can't be filtered linearly
                let filter = if attachment.desc.is_depth() {
                    vk::Filter::NEAREST
                } else {
                    vk::Filter::LINEAR
                };
                recorder.blit_image(src, &dst, filter)?
            }
        };
        recorder.pipeline_barrier(&after)?;
        recorder.finish()?;

        Ok(cb)
    }
}

impl Window for OffscreenWindow {
    fn resolution(&self) -> vk::Extent2D {
        self.resolution
    }

    fn frames_in_flight(&self) -> usize {
        self.images.len()
    }

    fn current_frame(&self) -> u64 {
        self.frame
    }

    fn copy_to_swapchain_image(
        &self,
        attachment: &Attachment,
        index: usize,
    ) -> Result<CommandBuffer, FrameError> {
        self.record_transfer(attachment, index, TransferKind::Copy)
    }

    fn blit_to_swapchain_image(
        &self,
        attachment: &Attachment,
        index: usize,
    ) -> Result<CommandBuffer, FrameError> {
        self.record_transfer(attachment, index, TransferKind::Blit)
    }

    fn present(&mut self) -> Result<(), FrameError> {
        #[cfg(feature = "logging")]
        log::trace!(
            "Presenting frame {} from slot {}",
            self.frame,
            self.current_in_flight_index()
        );
        self.frame += 1;
        Ok(())
    }

    fn set_cursor_pos(&mut self, x: f64, y: f64) {
        self.cursor = (x, y);
    }
}
