//! Renders a rotating pyramid into an offscreen framebuffer (color + depth) and transfers one of its attachments into the window's
//! presentable image every frame.
//!
//! The pyramid's vertices are animated on the host and written to the vertex buffer of the current in-flight slot while rendering.
//! The draw command buffers are recorded once, one per slot, and never change.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use frameline::{
    allocator::MemoryUsage,
    ash::vk,
    driver::{Element, Frame, InitContext, UpdateContext},
    inflight::InFlightSet,
    input::KeyCode,
    overlay::{Overlay, Tunable},
    recorder::record_for_all_in_flight_frames,
    resources::{
        AttachmentDesc, AttachmentUsage, Buffer, BufferKind, CommandBuffer, Framebuffer,
        GraphicsPipeline, OnLoad, OnStore, PipelineConfig, ShaderSource, DEFAULT_COLOR_FORMAT,
        DEFAULT_DEPTH_FORMAT,
    },
    sync::SyncToken,
    transfer::{create_and_fill, fill},
    FrameError,
};
use glam::{Mat4, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

const fn vtx(pos: [f32; 3], color: [f32; 3]) -> Vertex {
    Vertex { pos, color }
}

pub const PYRAMID_VERTICES: [Vertex; 12] = [
    //front
    vtx([0.0, -0.5, 0.5], [1.0, 0.0, 0.0]),
    vtx([0.3, 0.5, 0.2], [0.5, 0.5, 0.5]),
    vtx([-0.3, 0.5, 0.2], [0.5, 0.5, 0.5]),
    //right
    vtx([0.0, -0.5, 0.5], [1.0, 0.0, 0.0]),
    vtx([0.3, 0.5, 0.8], [0.6, 0.6, 0.6]),
    vtx([0.3, 0.5, 0.2], [0.6, 0.6, 0.6]),
    //back
    vtx([0.0, -0.5, 0.5], [1.0, 0.0, 0.0]),
    vtx([-0.3, 0.5, 0.8], [0.5, 0.5, 0.5]),
    vtx([0.3, 0.5, 0.8], [0.5, 0.5, 0.5]),
    //left
    vtx([0.0, -0.5, 0.5], [1.0, 0.0, 0.0]),
    vtx([-0.3, 0.5, 0.2], [0.4, 0.4, 0.4]),
    vtx([-0.3, 0.5, 0.8], [0.4, 0.4, 0.4]),
];

pub const PYRAMID_INDICES: [u16; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

pub const TRANSLATION_LABEL: &str = "Translation";
pub const ROTATION_SPEED_LABEL: &str = "Rotation Speed";
pub const ATTACHMENT_LABEL: &str = "Attachment";
pub const TRANSFER_LABEL: &str = "Transfer";

///Moves `vertices` to their position at `seconds`: a rotation of `90° * seconds * speed` around the vertical axis through the
/// pyramid's tip at `z = 0.5`, then a shift by `-translation_y` along Y.
pub fn animate(vertices: &[Vertex], seconds: f32, speed: f32, translation_y: f32) -> Vec<Vertex> {
    let angle = 90.0f32.to_radians() * seconds * speed;
    let rotation = Mat4::from_rotation_y(angle);
    let translate_z = Mat4::from_translation(Vec3::new(0.0, 0.0, -0.5));
    let translate_y = Mat4::from_translation(Vec3::new(0.0, -translation_y, 0.0));
    let transform = translate_y * translate_z.inverse() * rotation * translate_z;

    vertices
        .iter()
        .map(|v| Vertex {
            pos: transform.transform_point3(Vec3::from(v.pos)).to_array(),
            color: v.color,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Blit,
}

///Parameters the overlay changes. Cloning shares them.
#[derive(Clone, Debug)]
pub struct Settings {
    pub translation_y: Tunable<f32>,
    pub rotation_speed: Tunable<f32>,
    ///Framebuffer attachment that is transferred, 0 color, 1 depth.
    pub attachment: Tunable<usize>,
    ///0 copy, 1 blit.
    pub transfer: Tunable<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            translation_y: Tunable::new(0.0),
            rotation_speed: Tunable::new(1.0),
            attachment: Tunable::new(0),
            transfer: Tunable::new(0),
        }
    }
}

impl Settings {
    pub fn transfer_mode(&self) -> TransferMode {
        if self.transfer.get() == 0 {
            TransferMode::Copy
        } else {
            TransferMode::Blit
        }
    }

    fn register(&self, overlay: &mut Overlay) {
        let translation = self.translation_y.clone();
        let speed = self.rotation_speed.clone();
        let attachment = self.attachment.clone();
        let transfer = self.transfer.clone();

        overlay.add("framebuffer settings", move |ui, stats| {
            ui.begin_window("Info & Settings");
            ui.text(&format!("{:.3} ms/frame", stats.ms_per_frame));
            ui.text(&format!("{:.1} FPS", stats.fps));
            translation.update(|t| ui.slider_f32(TRANSLATION_LABEL, -1.0, 1.0, t));
            speed.update(|s| ui.input_f32(ROTATION_SPEED_LABEL, s));

            ui.separator();
            ui.text("Which attachment to copy/blit:");
            attachment.update(|a| {
                ui.combo(
                    ATTACHMENT_LABEL,
                    &["Color attachment at index 0", "Depth attachment at index 1"],
                    a,
                )
            });
            ui.text("Which transfer operation to use:");
            transfer.update(|m| ui.combo(TRANSFER_LABEL, &["Copy", "Blit"], m));
            ui.end_window();
        });
    }
}

struct GpuState {
    framebuffer: Arc<Framebuffer>,
    vertex_buffers: InFlightSet<Arc<Buffer>>,
    draw_buffers: InFlightSet<CommandBuffer>,
}

pub struct FramebufferApp {
    settings: Settings,
    vertex_shader: ShaderSource,
    fragment_shader: ShaderSource,
    gpu: Option<GpuState>,
}

impl FramebufferApp {
    ///App using the shaders compiled by the build script.
    pub fn new(settings: Settings) -> Self {
        Self::with_shaders(
            settings,
            concat!(env!("OUT_DIR"), "/passthrough.vert.spv"),
            concat!(env!("OUT_DIR"), "/color.frag.spv"),
        )
    }

    pub fn with_shaders(
        settings: Settings,
        vertex_shader: impl Into<ShaderSource>,
        fragment_shader: impl Into<ShaderSource>,
    ) -> Self {
        FramebufferApp {
            settings,
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
            gpu: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl Element for FramebufferApp {
    fn name(&self) -> &str {
        "framebuffer app"
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), FrameError> {
        let device = ctx.device;
        let resolution = ctx.window.resolution();

        //written every frame in render()
        let vertex_buffers = InFlightSet::for_window(ctx.window, |idx| {
            let name = format!("pyramid vertices {}", idx);
            Ok(Arc::new(Buffer::new_vertex::<Vertex>(
                device,
                PYRAMID_VERTICES.len(),
                MemoryUsage::GpuOnly,
                Some(&name),
            )?))
        })?;

        //never changes, so a single wait is fine
        let index_buffer = create_and_fill(
            device,
            BufferKind::Index,
            MemoryUsage::GpuOnly,
            &PYRAMID_INDICES,
            Some("pyramid indices"),
            SyncToken::WaitIdle,
        )?;

        let framebuffer = Arc::new(Framebuffer::new(
            device,
            &[
                AttachmentDesc::define(
                    DEFAULT_COLOR_FORMAT,
                    OnLoad::Clear,
                    AttachmentUsage::Color(0),
                    OnStore::Store,
                ),
                AttachmentDesc::define(
                    DEFAULT_DEPTH_FORMAT,
                    OnLoad::Clear,
                    AttachmentUsage::DepthStencil,
                    OnStore::Store,
                ),
            ],
            resolution,
        )?);

        let config = PipelineConfig::builder()
            .vertex_input::<Vertex>()
            .attribute(0, vk::Format::R32G32B32_SFLOAT, 0)
            .attribute(1, vk::Format::R32G32B32_SFLOAT, 12)
            .vertex_shader(self.vertex_shader.clone())
            .fragment_shader(self.fragment_shader.clone())
            .front_face(vk::FrontFace::CLOCKWISE)
            .viewport(resolution)
            .build()?;
        let pipeline = Arc::new(GraphicsPipeline::new(device, config, &framebuffer)?);

        let draw_buffers = record_for_all_in_flight_frames(device, ctx.window, |rec, idx| {
            rec.begin_render_pass(&framebuffer)?
                .draw_indexed(&pipeline, &vertex_buffers[idx], &index_buffer)?
                .end_render_pass()?;
            Ok(())
        })?;

        self.settings.register(ctx.overlay);

        log::info!(
            "Framebuffer app ready: {}x{}, {} frames in flight",
            resolution.width,
            resolution.height,
            vertex_buffers.len()
        );

        self.gpu = Some(GpuState {
            framebuffer,
            vertex_buffers,
            draw_buffers,
        });
        Ok(())
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), FrameError> {
        if ctx.input().key_pressed(KeyCode::KeyC) {
            let resolution = ctx.window().resolution();
            ctx.window_mut().set_cursor_pos(
                resolution.width as f64 / 2.0,
                resolution.height as f64 / 2.0,
            );
        }
        if ctx.input().key_pressed(KeyCode::Escape) {
            ctx.stop();
        }
        Ok(())
    }

    fn render(&mut self, frame: &mut Frame<'_>) -> Result<(), FrameError> {
        let gpu = self
            .gpu
            .as_ref()
            .ok_or_else(|| FrameError::Other("framebuffer app is not initialized".to_owned()))?;

        let vertices = animate(
            &PYRAMID_VERTICES,
            frame.time().seconds(),
            self.settings.rotation_speed.get(),
            self.settings.translation_y.get(),
        );

        let idx = frame.in_flight_index();
        fill(
            &gpu.vertex_buffers[idx],
            &vertices,
            frame.with_barriers_on_current_frame(),
        )?;
        frame.submit_command_buffer_ref(&gpu.draw_buffers[idx])?;

        let attachment = gpu
            .framebuffer
            .attachment_at(self.settings.attachment.get())?;
        let transfer = match self.settings.transfer_mode() {
            TransferMode::Copy => frame.window().copy_to_swapchain_image(attachment, idx)?,
            TransferMode::Blit => frame.window().blit_to_swapchain_image(attachment, idx)?,
        };
        frame.submit_command_buffer_ownership(transfer)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use frameline::{
        context::Device,
        driver::{DriverConfig, FrameDriver},
        input::ScriptedInput,
        overlay::{HeadlessUi, UiValue},
        presentation::{OffscreenWindow, Window},
        sim::{SimDevice, TransferOp},
        timer::FrameClock,
    };

    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 64,
        height: 48,
    };
    const STEP: Duration = Duration::from_millis(16);

    fn driver(sim: &Arc<SimDevice>, frames_in_flight: usize, input: ScriptedInput) -> FrameDriver {
        let device: Arc<dyn Device> = sim.clone().into_device();
        let window =
            OffscreenWindow::new(&device, EXTENT, frames_in_flight, DEFAULT_COLOR_FORMAT).unwrap();
        FrameDriver::new(device, Box::new(window), Box::new(input)).with_config(
            DriverConfig::default()
                .with_max_frames(2)
                .with_clock(FrameClock::simulated(STEP)),
        )
    }

    fn app(settings: Settings) -> FramebufferApp {
        FramebufferApp::with_shaders(settings, vec![0u32; 4], vec![0u32; 4])
    }

    fn assert_close(a: &[Vertex], b: &[Vertex]) {
        assert_eq!(a.len(), b.len());
        for (a, b) in a.iter().zip(b) {
            for i in 0..3 {
                assert!((a.pos[i] - b.pos[i]).abs() < 1e-5, "{:?} != {:?}", a, b);
            }
            assert_eq!(a.color, b.color);
        }
    }

    #[test]
    fn no_rotation_at_start() {
        assert_close(&animate(&PYRAMID_VERTICES, 0.0, 1.0, 0.0), &PYRAMID_VERTICES);
    }

    #[test]
    fn quarter_turn_around_pyramid_tip() {
        //one second at speed one is 90°
        let turned = animate(&PYRAMID_VERTICES, 1.0, 1.0, 0.0);
        assert_close(&turned[..1], &PYRAMID_VERTICES[..1]);
        assert_close(
            &turned[1..2],
            &[vtx([-0.3, 0.5, 0.2], PYRAMID_VERTICES[1].color)],
        );

        let shifted = animate(&PYRAMID_VERTICES, 0.0, 1.0, 0.25);
        assert!((shifted[0].pos[1] - (-0.75)).abs() < 1e-6);
    }

    #[test]
    fn draws_observe_each_frames_angle() {
        let sim = SimDevice::new();
        let settings = Settings::default();
        let mut driver = driver(&sim, 2, ScriptedInput::new())
            .with_element(app(settings))
            .unwrap();
        driver.run().unwrap();

        let draws = sim.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].indices(), (0..12).collect::<Vec<u32>>());
        assert_ne!(draws[0].vertex_buffer, draws[1].vertex_buffer);

        let frame_0 = animate(&PYRAMID_VERTICES, 0.0, 1.0, 0.0);
        let frame_1 = animate(&PYRAMID_VERTICES, STEP.as_secs_f32(), 1.0, 0.0);
        assert_eq!(draws[0].vertices::<Vertex>(), frame_0);
        assert_eq!(draws[1].vertices::<Vertex>(), frame_1);
        assert!(sim.hazards().is_empty(), "{:?}", sim.hazards());
    }

    #[test]
    fn overlay_selects_attachment_and_transfer() {
        let cases = [
            (0, 0, vk::ImageAspectFlags::COLOR, TransferOp::Copy),
            (1, 0, vk::ImageAspectFlags::DEPTH, TransferOp::Copy),
            (0, 1, vk::ImageAspectFlags::COLOR, TransferOp::Blit(vk::Filter::LINEAR)),
            (1, 1, vk::ImageAspectFlags::DEPTH, TransferOp::Blit(vk::Filter::NEAREST)),
        ];

        let mut sources = Vec::new();
        for (attachment, transfer, aspect, op) in cases {
            let sim = SimDevice::new();
            let mut ui = HeadlessUi::new();
            ui.inject(ATTACHMENT_LABEL, UiValue::Index(attachment));
            ui.inject(TRANSFER_LABEL, UiValue::Index(transfer));

            let settings = Settings::default();
            let mut driver = driver(&sim, 2, ScriptedInput::new())
                .with_ui(Box::new(ui))
                .with_element(app(settings.clone()))
                .unwrap();
            driver.run().unwrap();

            assert_eq!(settings.attachment.get(), attachment);
            let transfers = sim.transfers();
            assert_eq!(transfers.len(), 2);
            //frame 0 renders with the defaults, the UI changes apply from frame 1 on
            assert_eq!(transfers[0].op, TransferOp::Copy);
            assert_eq!(transfers[0].src_aspect, vk::ImageAspectFlags::COLOR);
            assert_eq!(transfers[1].op, op);
            assert_eq!(transfers[1].src_aspect, aspect);
            assert_ne!(transfers[0].dst, transfers[1].dst);
            sources.push(transfers[1].src);
        }
        //same sequence of handles in every run, so color and depth sources differ
        assert_ne!(sources[0], sources[1]);
        assert_eq!(sources[0], sources[2]);
        assert_eq!(sources[1], sources[3]);
    }

    #[test]
    fn escape_stops_before_rendering() {
        let sim = SimDevice::new();
        let input = ScriptedInput::new()
            .press_at(0, KeyCode::KeyC)
            .press_at(1, KeyCode::Escape);
        let mut driver = driver(&sim, 2, input)
            .with_element(app(Settings::default()))
            .unwrap();
        driver.run().unwrap();

        //tick 0 renders, tick 1 stops before rendering
        assert_eq!(driver.frames_rendered(), 1);
        assert_eq!(driver.window().current_frame(), 1);
        assert_eq!(sim.pending_submissions(), 0);
    }

    #[test]
    fn invalid_attachment_ends_the_run() {
        let sim = SimDevice::new();
        let settings = Settings::default();
        settings.attachment.set(2);
        let mut driver = driver(&sim, 2, ScriptedInput::new())
            .with_element(app(settings))
            .unwrap();
        assert!(matches!(
            driver.run(),
            Err(FrameError::Configuration(_))
        ));
        assert_eq!(sim.live_command_buffers(), 0);
    }
}
