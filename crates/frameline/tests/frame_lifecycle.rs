//! Full frames on the software device.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use frameline::{
    allocator::MemoryUsage,
    ash::vk,
    context::Device,
    driver::{DriverConfig, DriverState, Element, Frame, FrameDriver, InitContext},
    inflight::InFlightSet,
    input::ScriptedInput,
    presentation::OffscreenWindow,
    recorder::{record_for_all_in_flight_frames, Recorder},
    resources::{
        AttachmentDesc, AttachmentUsage, Buffer, BufferKind, CommandBuffer, Framebuffer,
        GraphicsPipeline, OnLoad, OnStore, PipelineConfig, DEFAULT_COLOR_FORMAT,
    },
    sim::{Hazard, SimDevice},
    submission::SubmissionQueue,
    sync::SyncToken,
    timer::FrameClock,
    transfer::{create_and_fill, fill},
    DeviceError, FrameError,
};

type Vertex = [f32; 3];

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 16,
    height: 16,
};

struct Resources {
    vertices: InFlightSet<Arc<Buffer>>,
    draws: InFlightSet<CommandBuffer>,
}

///Writes the frame number into the vertex buffer of the frame's slot and draws it.
#[derive(Default)]
struct SlotWriter {
    resources: Option<Resources>,
    ///(frame, in-flight index, written buffer)
    written: Arc<Mutex<Vec<(u64, usize, vk::Buffer)>>>,
    lose_device_at: Option<(u64, Arc<SimDevice>)>,
}

impl Element for SlotWriter {
    fn name(&self) -> &str {
        "slot writer"
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), FrameError> {
        let device = ctx.device;
        let framebuffer = Arc::new(Framebuffer::new(
            device,
            &[AttachmentDesc::define(
                DEFAULT_COLOR_FORMAT,
                OnLoad::Clear,
                AttachmentUsage::Color(0),
                OnStore::Store,
            )],
            ctx.window.resolution(),
        )?);
        let config = PipelineConfig::builder()
            .vertex_input::<Vertex>()
            .attribute(0, vk::Format::R32G32B32_SFLOAT, 0)
            .vertex_shader(vec![0u32; 4])
            .fragment_shader(vec![0u32; 4])
            .viewport(ctx.window.resolution())
            .build()?;
        let pipeline = Arc::new(GraphicsPipeline::new(device, config, &framebuffer)?);
        let indices = create_and_fill(
            device,
            BufferKind::Index,
            MemoryUsage::GpuOnly,
            &[0u16, 1, 2],
            Some("indices"),
            SyncToken::WaitIdle,
        )?;

        let vertices = InFlightSet::for_window(ctx.window, |idx| {
            let name = format!("vertices {}", idx);
            Ok(Arc::new(Buffer::new_vertex::<Vertex>(
                device,
                3,
                MemoryUsage::GpuOnly,
                Some(&name),
            )?))
        })?;
        let draws = record_for_all_in_flight_frames(device, ctx.window, |rec, idx| {
            rec.begin_render_pass(&framebuffer)?
                .draw_indexed(&pipeline, &vertices[idx], &indices)?
                .end_render_pass()?;
            Ok(())
        })?;

        self.resources = Some(Resources { vertices, draws });
        Ok(())
    }

    fn render(&mut self, frame: &mut Frame<'_>) -> Result<(), FrameError> {
        let resources = self
            .resources
            .as_ref()
            .ok_or_else(|| FrameError::Other("not initialized".to_owned()))?;
        let idx = frame.in_flight_index();
        let value = frame.frame() as f32;

        fill(
            &resources.vertices[idx],
            &[[value; 3]; 3],
            frame.with_barriers_on_current_frame(),
        )?;
        frame.submit_command_buffer_ref(&resources.draws[idx])?;

        self.written
            .lock()
            .unwrap()
            .push((frame.frame(), idx, resources.vertices[idx].inner));

        if let Some((at, sim)) = &self.lose_device_at {
            if *at == frame.frame() {
                sim.lose_device();
            }
        }
        Ok(())
    }
}

fn driver(sim: &Arc<SimDevice>, frames_in_flight: usize, max_frames: u64) -> FrameDriver {
    let device = sim.clone().into_device();
    let window =
        OffscreenWindow::new(&device, EXTENT, frames_in_flight, DEFAULT_COLOR_FORMAT).unwrap();
    FrameDriver::new(device, Box::new(window), Box::new(ScriptedInput::new())).with_config(
        DriverConfig::default()
            .with_max_frames(max_frames)
            .with_clock(FrameClock::simulated(Duration::from_millis(16))),
    )
}

#[test]
fn writes_are_seen_by_their_slot_only() {
    for frames_in_flight in 1..=3 {
        let sim = SimDevice::with_latency(frames_in_flight);
        let element = SlotWriter::default();
        let written = element.written.clone();
        let mut driver = driver(&sim, frames_in_flight, 7)
            .with_element(element)
            .unwrap();
        driver.run().unwrap();

        let written = written.lock().unwrap();
        let draws = sim.draws();
        assert_eq!(draws.len(), 7);
        for (draw, (frame, idx, buffer)) in draws.iter().zip(written.iter()) {
            assert_eq!(*idx, (*frame % frames_in_flight as u64) as usize);
            assert_eq!(draw.vertex_buffer, Some(*buffer));
            assert_eq!(draw.vertices::<Vertex>(), vec![[*frame as f32; 3]; 3]);
            assert_eq!(draw.indices(), vec![0, 1, 2]);
        }
        assert!(sim.hazards().is_empty(), "{:?}", sim.hazards());

        //teardown released everything the element created
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(sim.pending_submissions(), 0);
        assert_eq!(sim.live_command_buffers(), 0);
        assert_eq!(sim.live_buffers(), 0);
    }
}

#[test]
fn single_slot_has_no_pending_work_after_begin() {
    let sim = SimDevice::with_latency(8);
    let device = sim.clone().into_device();
    let mut queue = SubmissionQueue::new(&device, 1).unwrap();
    let buffer = Arc::new(
        Buffer::new_vertex::<Vertex>(&device, 1, MemoryUsage::GpuOnly, None).unwrap(),
    );

    for frame in 0..4u32 {
        queue.begin_frame(0).unwrap();
        assert_eq!(sim.pending_submissions(), 0);

        fill(
            &buffer,
            &[[frame as f32; 3]],
            SyncToken::BarriersOnCurrentFrame(&mut queue),
        )
        .unwrap();
        queue.end_frame().unwrap();
        assert_eq!(sim.pending_submissions(), 1);
    }
    queue.wait_idle().unwrap();
    assert!(sim.hazards().is_empty());
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn flagged_copy(device: &Arc<dyn Device>, dst: &Arc<Buffer>) -> (CommandBuffer, Arc<AtomicBool>) {
    let src = create_and_fill(
        device,
        BufferKind::Generic,
        MemoryUsage::CpuToGpu,
        &[1u32, 2, 3, 4],
        None,
        SyncToken::WaitIdle,
    )
    .unwrap();
    let dropped = Arc::new(AtomicBool::new(false));

    let mut cb = CommandBuffer::new(device).unwrap();
    let mut rec = Recorder::begin(&mut cb);
    rec.copy_buffer(&src, dst, 16)
        .unwrap()
        .capture(DropFlag(dropped.clone()));
    rec.finish().unwrap();
    (cb, dropped)
}

#[test]
fn transient_buffer_lives_until_wait_idle() {
    let sim = SimDevice::with_latency(8);
    let device = sim.clone().into_device();
    let mut queue = SubmissionQueue::new(&device, 2).unwrap();
    let dst = Arc::new(
        Buffer::for_data::<u32>(&device, BufferKind::Generic, 4, MemoryUsage::GpuToCpu, None)
            .unwrap(),
    );

    let (cb, dropped) = flagged_copy(&device, &dst);
    queue.begin_frame(0).unwrap();
    queue.submit_ownership(cb).unwrap();
    queue.end_frame().unwrap();

    assert!(!dropped.load(Ordering::SeqCst));
    assert_eq!(sim.pending_submissions(), 1);
    assert_eq!(queue.retiring(), 1);

    queue.wait_idle().unwrap();
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(queue.retiring(), 0);
    assert_eq!(
        sim.buffer_contents(dst.inner).unwrap(),
        bytemuck::cast_slice::<u32, u8>(&[1, 2, 3, 4]).to_vec()
    );
    assert!(sim.hazards().is_empty());
}

#[test]
fn transient_buffer_retires_with_its_slot() {
    let sim = SimDevice::with_latency(8);
    let device = sim.clone().into_device();
    let mut queue = SubmissionQueue::new(&device, 2).unwrap();
    let dst = Arc::new(
        Buffer::for_data::<u32>(&device, BufferKind::Generic, 4, MemoryUsage::GpuToCpu, None)
            .unwrap(),
    );

    let (cb, dropped) = flagged_copy(&device, &dst);
    queue.begin_frame(0).unwrap();
    queue.submit_ownership(cb).unwrap();
    queue.end_frame().unwrap();

    //the other slot does not wait for slot 0
    queue.begin_frame(1).unwrap();
    queue.end_frame().unwrap();
    assert!(!dropped.load(Ordering::SeqCst));

    queue.begin_frame(0).unwrap();
    assert!(dropped.load(Ordering::SeqCst));
    //only the frame of slot 0 had to finish
    assert_eq!(sim.pending_submissions(), 1);
    queue.end_frame().unwrap();
    queue.wait_idle().unwrap();
    assert!(!sim
        .hazards()
        .iter()
        .any(|h| matches!(h, Hazard::FreedWhilePending(_))));
}

#[test]
fn lost_device_stops_the_driver() {
    let sim = SimDevice::new();
    let element = SlotWriter {
        lose_device_at: Some((3, sim.clone())),
        ..Default::default()
    };
    let written = element.written.clone();
    let mut driver = driver(&sim, 2, 10).with_element(element).unwrap();

    let err = driver.run().unwrap_err();
    assert!(err.is_device_lost());
    assert!(matches!(err, FrameError::Device(DeviceError::Lost)));
    assert_eq!(driver.state(), DriverState::Stopped);
    assert_eq!(driver.frames_rendered(), 3);
    assert_eq!(written.lock().unwrap().len(), 4);
}

///Submits one flagged copy by ownership on the last frame and records what it sees while being finalized.
struct LastFrameCopy {
    sim: Arc<SimDevice>,
    last_frame: u64,
    dst: Option<Arc<Buffer>>,
    copy: Option<CommandBuffer>,
    dropped: Arc<AtomicBool>,
    ///(copy freed, pending submissions, destination contents)
    at_finalize: Arc<Mutex<Option<(bool, usize, Option<Vec<u8>>)>>>,
}

impl Element for LastFrameCopy {
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), FrameError> {
        let dst = Arc::new(Buffer::for_data::<u32>(
            ctx.device,
            BufferKind::Generic,
            4,
            MemoryUsage::GpuToCpu,
            None,
        )?);
        let (copy, dropped) = flagged_copy(ctx.device, &dst);
        self.dst = Some(dst);
        self.copy = Some(copy);
        self.dropped = dropped;
        Ok(())
    }

    fn render(&mut self, frame: &mut Frame<'_>) -> Result<(), FrameError> {
        if frame.frame() == self.last_frame {
            if let Some(copy) = self.copy.take() {
                frame.submit_command_buffer_ownership(copy)?;
            }
        }
        Ok(())
    }

    fn finalize(&mut self, _device: &Arc<dyn Device>) -> Result<(), FrameError> {
        let contents = self
            .dst
            .as_ref()
            .and_then(|dst| self.sim.buffer_contents(dst.inner));
        *self.at_finalize.lock().unwrap() = Some((
            self.dropped.load(Ordering::SeqCst),
            self.sim.pending_submissions(),
            contents,
        ));
        Ok(())
    }
}

#[test]
fn shutdown_frees_last_transient_buffer_after_completion() {
    let sim = SimDevice::with_latency(8);
    let at_finalize = Arc::new(Mutex::new(None));
    let element = LastFrameCopy {
        sim: sim.clone(),
        last_frame: 2,
        dst: None,
        copy: None,
        dropped: Arc::new(AtomicBool::new(false)),
        at_finalize: at_finalize.clone(),
    };
    let mut driver = driver(&sim, 2, 3).with_element(element).unwrap();
    driver.run().unwrap();

    assert_eq!(driver.frames_rendered(), 3);
    assert_eq!(driver.state(), DriverState::Stopped);
    let (freed, pending, contents) = at_finalize.lock().unwrap().take().unwrap();
    assert!(freed);
    assert_eq!(pending, 0);
    assert_eq!(
        contents.unwrap(),
        bytemuck::cast_slice::<u32, u8>(&[1, 2, 3, 4]).to_vec()
    );
    assert!(!sim
        .hazards()
        .iter()
        .any(|h| matches!(h, Hazard::FreedWhilePending(_))));
    assert_eq!(sim.live_command_buffers(), 0);
}
