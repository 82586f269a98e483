//! # Commands
//!
//! Backend neutral representation of everything frameline records into a command buffer. A [Recorder](crate::recorder::Recorder)
//! collects [Command]s, the [Device](crate::context::Device) encodes them into its native command buffer. The
//! [VulkanDevice](crate::context::VulkanDevice) translates them 1:1 into `vkCmd*` calls.
//!
//! Keeping the recorded list around has two benefits: a recorded sequence can be compared to another one (re-recording with the same
//! bindings yields an equal sequence) and a software device can replay it.

use ash::vk;
use smallvec::SmallVec;

///Value an attachment is cleared to when its load operation is `Clear`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    pub fn to_vk(&self) -> vk::ClearValue {
        match self {
            ClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32: *float32 },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: *depth,
                    stencil: *stencil,
                },
            },
        }
    }
}

///Execution and memory dependency on a buffer region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub offset: u64,
    pub size: u64,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl BufferBarrier {
    pub fn to_vk(&self) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .buffer(self.buffer)
            .offset(self.offset)
            .size(self.size)
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
    }
}

///Execution and memory dependency on a whole image, possibly including a layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub new_layout: vk::ImageLayout,
}

impl ImageBarrier {
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .image(self.image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(self.aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .old_layout(self.old_layout)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

///One side of an image copy or blit. Always covers mip level 0, layer 0. The source is expected in
/// `TRANSFER_SRC_OPTIMAL`, the destination in `TRANSFER_DST_OPTIMAL`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageTransfer {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub width: u32,
    pub height: u32,
}

impl ImageTransfer {
    pub fn subresource_layers(&self) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers::default()
            .aspect_mask(self.aspect)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1)
    }

    ///Blit offsets spanning the whole region.
    pub fn blit_offsets(&self) -> [vk::Offset3D; 2] {
        [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: (self.width as i32).max(1),
                y: (self.height as i32).max(1),
                z: 1,
            },
        ]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
        clear_values: SmallVec<[ClearValue; 4]>,
    },
    EndRenderPass,
    BindPipeline {
        pipeline: vk::Pipeline,
    },
    BindVertexBuffer {
        binding: u32,
        buffer: vk::Buffer,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    PipelineBarrier {
        buffers: SmallVec<[BufferBarrier; 2]>,
        images: SmallVec<[ImageBarrier; 2]>,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        region: BufferRegion,
    },
    CopyImage {
        src: ImageTransfer,
        dst: ImageTransfer,
    },
    BlitImage {
        src: ImageTransfer,
        dst: ImageTransfer,
        filter: vk::Filter,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::BeginRenderPass { .. } => "begin_render_pass",
            Command::EndRenderPass => "end_render_pass",
            Command::BindPipeline { .. } => "bind_pipeline",
            Command::BindVertexBuffer { .. } => "bind_vertex_buffer",
            Command::BindIndexBuffer { .. } => "bind_index_buffer",
            Command::DrawIndexed { .. } => "draw_indexed",
            Command::PipelineBarrier { .. } => "pipeline_barrier",
            Command::CopyBuffer { .. } => "copy_buffer",
            Command::CopyImage { .. } => "copy_image",
            Command::BlitImage { .. } => "blit_image",
        }
    }

    ///Calls `f` for every buffer this command reads or writes.
    pub fn for_each_buffer(&self, mut f: impl FnMut(vk::Buffer)) {
        match self {
            Command::BindVertexBuffer { buffer, .. } | Command::BindIndexBuffer { buffer, .. } => {
                f(*buffer)
            }
            Command::CopyBuffer { src, dst, .. } => {
                f(*src);
                f(*dst);
            }
            Command::PipelineBarrier { buffers, .. } => {
                for b in buffers.iter() {
                    f(b.buffer)
                }
            }
            _ => {}
        }
    }

    ///Calls `f` for every image this command reads or writes.
    pub fn for_each_image(&self, mut f: impl FnMut(vk::Image)) {
        match self {
            Command::CopyImage { src, dst } | Command::BlitImage { src, dst, .. } => {
                f(src.image);
                f(dst.image);
            }
            Command::PipelineBarrier { images, .. } => {
                for i in images.iter() {
                    f(i.image)
                }
            }
            _ => {}
        }
    }
}

///Immutable list of commands of a finished recording.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordedCommands(pub(crate) Vec<Command>);

impl RecordedCommands {
    pub fn commands(&self) -> &[Command] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    ///Number of indexed draws in this sequence.
    pub fn draw_count(&self) -> usize {
        self.0
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed { .. }))
            .count()
    }

    ///True if any command in this sequence references `buffer`.
    pub fn references_buffer(&self, buffer: vk::Buffer) -> bool {
        let mut found = false;
        for cmd in self.0.iter() {
            cmd.for_each_buffer(|b| found |= b == buffer);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn copy_references_both_buffers() {
        let src = vk::Buffer::from_raw(1);
        let dst = vk::Buffer::from_raw(2);
        let rec = RecordedCommands(vec![Command::CopyBuffer {
            src,
            dst,
            region: BufferRegion {
                src_offset: 0,
                dst_offset: 0,
                size: 4,
            },
        }]);
        assert!(rec.references_buffer(src));
        assert!(rec.references_buffer(dst));
        assert!(!rec.references_buffer(vk::Buffer::from_raw(3)));
        assert_eq!(rec.draw_count(), 0);
    }

    #[test]
    fn blit_offsets_never_zero() {
        let t = ImageTransfer {
            image: vk::Image::null(),
            aspect: vk::ImageAspectFlags::COLOR,
            width: 0,
            height: 64,
        };
        let [lo, hi] = t.blit_offsets();
        assert_eq!((lo.x, lo.y, lo.z), (0, 0, 0));
        assert_eq!((hi.x, hi.y, hi.z), (1, 64, 1));
    }
}
