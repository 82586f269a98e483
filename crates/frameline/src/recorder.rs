//! # Recording
//!
//! A [Recorder] collects [Command]s for one [CommandBuffer] and validates their order. Everything a command references is captured
//! (an [Arc] clone) by the buffer once [finish](Recorder::finish) was called, which is why the recording functions take
//! `&Arc<T>` instead of raw handles.
//!
//! Recorded buffers are immutable. Changing the *content* of a bound resource does not require re-recording, since the device binds
//! by handle. Changing *which* resource is bound (or the pipeline) does.

use std::{any::Any, sync::Arc};

use ash::vk;

use crate::{
    command::{BufferRegion, Command, ImageTransfer, RecordedCommands},
    context::Device,
    error::{CommandBufferError, FrameError},
    inflight::InFlightSet,
    presentation::Window,
    resources::{Buffer, BufferMeta, CommandBuffer, Framebuffer, GraphicsPipeline, Image},
    sync::BarrierBuilder,
};

pub struct Recorder<'a> {
    //hosting command buffer
    buffer: &'a mut CommandBuffer,
    commands: Vec<Command>,
    captured: Vec<Box<dyn Any + Send + Sync>>,
    render_pass: Option<vk::Framebuffer>,
    bound_pipeline: Option<vk::Pipeline>,
    has_finished_recording: bool,
}

impl<'a> Recorder<'a> {
    ///Starts a new recording for `buffer`. The previous recording stays valid until [finish](Self::finish) is called.
    pub fn begin(buffer: &'a mut CommandBuffer) -> Self {
        Recorder {
            buffer,
            commands: Vec::new(),
            captured: Vec::new(),
            render_pass: None,
            bound_pipeline: None,
            has_finished_recording: false,
        }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.buffer.device
    }

    ///Keeps `resource` alive for as long as the recorded buffer lives.
    pub fn capture<T: Any + Send + Sync>(&mut self, resource: T) -> &mut Self {
        self.captured.push(Box::new(resource));
        self
    }

    pub fn begin_render_pass(
        &mut self,
        framebuffer: &Arc<Framebuffer>,
    ) -> Result<&mut Self, CommandBufferError> {
        if self.render_pass.is_some() {
            return Err(CommandBufferError::NestedRenderPass);
        }

        self.commands.push(Command::BeginRenderPass {
            render_pass: framebuffer.target.render_pass,
            framebuffer: framebuffer.target.framebuffer,
            width: framebuffer.extent.width,
            height: framebuffer.extent.height,
            clear_values: framebuffer.clear_values(),
        });
        self.render_pass = Some(framebuffer.target.framebuffer);
        self.bound_pipeline = None;
        self.captured.push(Box::new(framebuffer.clone()));
        Ok(self)
    }

    pub fn end_render_pass(&mut self) -> Result<&mut Self, CommandBufferError> {
        if self.render_pass.take().is_none() {
            return Err(CommandBufferError::OutsideRenderPass("end_render_pass"));
        }
        self.commands.push(Command::EndRenderPass);
        Ok(self)
    }

    pub fn bind_pipeline(
        &mut self,
        pipeline: &Arc<GraphicsPipeline>,
    ) -> Result<&mut Self, CommandBufferError> {
        if self.render_pass.is_none() {
            return Err(CommandBufferError::OutsideRenderPass("bind_pipeline"));
        }
        if self.bound_pipeline != Some(pipeline.pipeline) {
            self.commands.push(Command::BindPipeline {
                pipeline: pipeline.pipeline,
            });
            self.bound_pipeline = Some(pipeline.pipeline);
            self.captured.push(Box::new(pipeline.clone()));
        }
        Ok(self)
    }

    ///Binds `pipeline`, `vertex_buffer` at binding 0 and `index_buffer`, then draws all indices of `index_buffer`.
    pub fn draw_indexed(
        &mut self,
        pipeline: &Arc<GraphicsPipeline>,
        vertex_buffer: &Arc<Buffer>,
        index_buffer: &Arc<Buffer>,
    ) -> Result<&mut Self, CommandBufferError> {
        if self.render_pass.is_none() {
            return Err(CommandBufferError::OutsideRenderPass("draw_indexed"));
        }
        if !matches!(vertex_buffer.meta, BufferMeta::Vertex { .. }) {
            return Err(CommandBufferError::WrongBufferKind {
                expected: "vertex buffer",
            });
        }
        let (index_type, index_count) = match index_buffer.meta {
            BufferMeta::Index { index_type, count } => (index_type, count),
            _ => {
                return Err(CommandBufferError::WrongBufferKind {
                    expected: "index buffer",
                })
            }
        };

        self.bind_pipeline(pipeline)?;
        self.commands.push(Command::BindVertexBuffer {
            binding: 0,
            buffer: vertex_buffer.inner,
            offset: 0,
        });
        self.commands.push(Command::BindIndexBuffer {
            buffer: index_buffer.inner,
            offset: 0,
            index_type,
        });
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count: 1,
            first_index: 0,
            vertex_offset: 0,
            first_instance: 0,
        });
        self.captured.push(Box::new(vertex_buffer.clone()));
        self.captured.push(Box::new(index_buffer.clone()));
        Ok(self)
    }

    ///Records all barriers of `barriers` as one pipeline barrier. Does nothing if `barriers` is empty.
    pub fn pipeline_barrier(
        &mut self,
        barriers: &BarrierBuilder,
    ) -> Result<&mut Self, CommandBufferError> {
        if barriers.has_barrier() {
            self.commands.push(barriers.to_command());
        }
        Ok(self)
    }

    ///Copies `size` bytes from `src` to `dst`, both starting at offset 0.
    pub fn copy_buffer(
        &mut self,
        src: &Arc<Buffer>,
        dst: &Arc<Buffer>,
        size: u64,
    ) -> Result<&mut Self, CommandBufferError> {
        if self.render_pass.is_some() {
            return Err(CommandBufferError::InsideRenderPass("copy_buffer"));
        }
        self.commands.push(Command::CopyBuffer {
            src: src.inner,
            dst: dst.inner,
            region: BufferRegion {
                src_offset: 0,
                dst_offset: 0,
                size,
            },
        });
        self.captured.push(Box::new(src.clone()));
        self.captured.push(Box::new(dst.clone()));
        Ok(self)
    }

    ///Copies the whole of `src` (in `TRANSFER_SRC_OPTIMAL`) to `dst` (in `TRANSFER_DST_OPTIMAL`).
    pub fn copy_image(
        &mut self,
        src: &Arc<Image>,
        dst: &Arc<Image>,
    ) -> Result<&mut Self, CommandBufferError> {
        if self.render_pass.is_some() {
            return Err(CommandBufferError::InsideRenderPass("copy_image"));
        }
        let (src_t, dst_t) = Self::transfer_regions(src, dst);
        self.commands.push(Command::CopyImage {
            src: src_t,
            dst: dst_t,
        });
        self.captured.push(Box::new(src.clone()));
        self.captured.push(Box::new(dst.clone()));
        Ok(self)
    }

    ///Blits the whole of `src` onto the whole of `dst`, scaling if the extents differ. Same layout rules as for [Self::copy_image].
    pub fn blit_image(
        &mut self,
        src: &Arc<Image>,
        dst: &Arc<Image>,
        filter: vk::Filter,
    ) -> Result<&mut Self, CommandBufferError> {
        if self.render_pass.is_some() {
            return Err(CommandBufferError::InsideRenderPass("blit_image"));
        }
        let (src_t, dst_t) = Self::transfer_regions(src, dst);
        self.commands.push(Command::BlitImage {
            src: src_t,
            dst: dst_t,
            filter,
        });
        self.captured.push(Box::new(src.clone()));
        self.captured.push(Box::new(dst.clone()));
        Ok(self)
    }

    fn transfer_regions(src: &Image, dst: &Image) -> (ImageTransfer, ImageTransfer) {
        (
            ImageTransfer {
                image: src.inner,
                aspect: src.aspect(),
                width: src.extent().width,
                height: src.extent().height,
            },
            ImageTransfer {
                image: dst.inner,
                aspect: dst.aspect(),
                width: dst.extent().width,
                height: dst.extent().height,
            },
        )
    }

    ///Finishes recording. Encodes the commands into the command buffer, which from now on owns all captured resources.
    pub fn finish(mut self) -> Result<(), FrameError> {
        self.has_finished_recording = true;
        if self.render_pass.is_some() {
            return Err(CommandBufferError::UnterminatedRenderPass.into());
        }

        let commands = RecordedCommands(std::mem::take(&mut self.commands));
        let captured = std::mem::take(&mut self.captured);

        #[cfg(feature = "logging")]
        log::trace!(
            "Finished recording {:?}: {} commands, {} captured resources",
            self.buffer.inner,
            commands.len(),
            captured.len()
        );

        self.buffer.set_recording(commands, captured)?;
        Ok(())
    }
}

///Dropping a recorder without finishing discards everything that was recorded. The command buffer keeps its previous recording.
impl<'a> Drop for Recorder<'a> {
    fn drop(&mut self) {
        if !self.has_finished_recording {
            #[cfg(feature = "logging")]
            log::error!(
                "Recorder for {:?} dropped without finishing, discarding {} commands",
                self.buffer.inner,
                self.commands.len()
            );
        }
    }
}

///Allocates one command buffer per in-flight slot of `window` and calls `record` for each of them with the slot's index.
///
/// The returned set is aligned with every other [InFlightSet] created for `window`.
pub fn record_for_all_in_flight_frames(
    device: &Arc<dyn Device>,
    window: &dyn Window,
    mut record: impl FnMut(&mut Recorder<'_>, usize) -> Result<(), FrameError>,
) -> Result<InFlightSet<CommandBuffer>, FrameError> {
    InFlightSet::for_window(window, |index| {
        let mut buffer = CommandBuffer::new(device)?;
        let mut recorder = Recorder::begin(&mut buffer);
        record(&mut recorder, index)?;
        recorder.finish()?;
        Ok(buffer)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allocator::MemoryUsage,
        resources::{
            AttachmentDesc, AttachmentUsage, OnLoad, OnStore, PipelineConfig, DEFAULT_COLOR_FORMAT,
        },
        sim::SimDevice,
    };

    struct Scene {
        framebuffer: Arc<Framebuffer>,
        pipeline: Arc<GraphicsPipeline>,
        vertices: Arc<Buffer>,
        indices: Arc<Buffer>,
    }

    fn scene(device: &Arc<dyn Device>) -> Scene {
        let extent = vk::Extent2D {
            width: 8,
            height: 8,
        };
        let framebuffer = Arc::new(
            Framebuffer::new(
                device,
                &[AttachmentDesc::define(
                    DEFAULT_COLOR_FORMAT,
                    OnLoad::Clear,
                    AttachmentUsage::Color(0),
                    OnStore::Store,
                )],
                extent,
            )
            .unwrap(),
        );
        let config = PipelineConfig::builder()
            .vertex_input::<[f32; 3]>()
            .attribute(0, vk::Format::R32G32B32_SFLOAT, 0)
            .vertex_shader(vec![0u32; 4])
            .fragment_shader(vec![0u32; 4])
            .viewport(extent)
            .build()
            .unwrap();
        let pipeline = Arc::new(GraphicsPipeline::new(device, config, &framebuffer).unwrap());
        let vertices = Arc::new(
            Buffer::new_vertex::<[f32; 3]>(device, 3, MemoryUsage::GpuOnly, None).unwrap(),
        );
        let indices =
            Arc::new(Buffer::new_index::<u16>(device, 3, MemoryUsage::GpuOnly, None).unwrap());
        Scene {
            framebuffer,
            pipeline,
            vertices,
            indices,
        }
    }

    fn record_draw(buffer: &mut CommandBuffer, scene: &Scene) -> Result<(), FrameError> {
        let mut rec = Recorder::begin(buffer);
        rec.begin_render_pass(&scene.framebuffer)?
            .draw_indexed(&scene.pipeline, &scene.vertices, &scene.indices)?
            .end_render_pass()?;
        rec.finish()
    }

    #[test]
    fn draw_sequence() {
        let device = SimDevice::new().into_device();
        let scene = scene(&device);
        let mut cb = CommandBuffer::new(&device).unwrap();
        record_draw(&mut cb, &scene).unwrap();

        let names: Vec<_> = cb
            .recorded()
            .unwrap()
            .commands()
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(
            names,
            [
                "begin_render_pass",
                "bind_pipeline",
                "bind_vertex_buffer",
                "bind_index_buffer",
                "draw_indexed",
                "end_render_pass"
            ]
        );
        //framebuffer, pipeline, vertex and index buffer
        assert_eq!(cb.captured_count(), 4);
        assert!(matches!(
            cb.recorded().unwrap().commands()[4],
            Command::DrawIndexed { index_count: 3, .. }
        ));
    }

    #[test]
    fn rerecording_is_idempotent() {
        let device = SimDevice::new().into_device();
        let scene = scene(&device);
        let mut a = CommandBuffer::new(&device).unwrap();
        let mut b = CommandBuffer::new(&device).unwrap();
        record_draw(&mut a, &scene).unwrap();
        record_draw(&mut b, &scene).unwrap();
        assert_eq!(a.recorded(), b.recorded());

        let first = a.recorded().cloned();
        record_draw(&mut a, &scene).unwrap();
        assert_eq!(a.recorded().cloned(), first);
    }

    #[test]
    fn invalid_orders() {
        let device = SimDevice::new().into_device();
        let scene = scene(&device);
        let mut cb = CommandBuffer::new(&device).unwrap();

        {
            let mut rec = Recorder::begin(&mut cb);
            assert_eq!(
                rec.draw_indexed(&scene.pipeline, &scene.vertices, &scene.indices)
                    .err(),
                Some(CommandBufferError::OutsideRenderPass("draw_indexed"))
            );
            rec.begin_render_pass(&scene.framebuffer).unwrap();
            assert_eq!(
                rec.begin_render_pass(&scene.framebuffer).err(),
                Some(CommandBufferError::NestedRenderPass)
            );
            assert_eq!(
                rec.draw_indexed(&scene.pipeline, &scene.indices, &scene.indices)
                    .err(),
                Some(CommandBufferError::WrongBufferKind {
                    expected: "vertex buffer"
                })
            );
            assert!(matches!(
                rec.finish(),
                Err(FrameError::CommandBuffer(
                    CommandBufferError::UnterminatedRenderPass
                ))
            ));
        }
        assert!(!cb.is_recorded());
    }

    #[test]
    fn dropped_recorder_keeps_previous_recording() {
        let device = SimDevice::new().into_device();
        let scene = scene(&device);
        let mut cb = CommandBuffer::new(&device).unwrap();
        record_draw(&mut cb, &scene).unwrap();
        let before = cb.recorded().cloned();
        {
            let mut rec = Recorder::begin(&mut cb);
            rec.pipeline_barrier(&BarrierBuilder::new()).unwrap();
        }
        assert_eq!(cb.recorded().cloned(), before);
    }
}
