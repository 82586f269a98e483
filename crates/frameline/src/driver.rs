//! # Frame driver
//!
//! The [FrameDriver] owns the device, the window, the input and the UI, and runs a set of [Element]s through their lifecycle:
//!
//! ```text
//! Uninitialized --initialize--> Initialized --> [Updating <-> Rendering] --> Stopped
//! ```
//!
//! Per loop iteration the clock is advanced, the [UpdateTimer] decides how many update ticks run (input is polled before each one),
//! and one frame is rendered on the window's current in-flight index. All per-frame resources are touched while rendering only.
//!
//! Errors of any element or of the device end the run. The driver is the single place where they are caught: the error is
//! logged, the device is waited for and the elements are finalized and dropped in reverse order before the error is returned.

use std::{sync::Arc, time::Duration};

use crate::{
    context::Device,
    error::{DriverError, FrameError, SubmissionError},
    input::Input,
    overlay::{FrameStats, HeadlessUi, Overlay, Ui},
    presentation::Window,
    resources::CommandBuffer,
    submission::SubmissionQueue,
    sync::SyncToken,
    timer::{FrameClock, FrameTime, UpdateTimer, VaryingUpdateTimer},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverState {
    Uninitialized,
    Initialized,
    Updating,
    Rendering,
    Stopped,
}

impl DriverState {
    pub fn name(&self) -> &'static str {
        match self {
            DriverState::Uninitialized => "Uninitialized",
            DriverState::Initialized => "Initialized",
            DriverState::Updating => "Updating",
            DriverState::Rendering => "Rendering",
            DriverState::Stopped => "Stopped",
        }
    }

    pub fn can_transition_to(&self, to: DriverState) -> bool {
        use DriverState::*;
        match (self, to) {
            (Uninitialized, Initialized)
            | (Initialized, Updating)
            | (Updating, Rendering)
            | (Rendering, Updating) => true,
            (Stopped, _) => false,
            (_, Stopped) => true,
            _ => false,
        }
    }
}

///Something the driver updates and renders every frame.
pub trait Element {
    ///Used in log messages.
    fn name(&self) -> &str {
        "element"
    }

    ///Creates resources, pipelines and pre-recorded command buffers.
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), FrameError>;

    ///Called zero or more times per rendered frame. Must not touch per-frame resources.
    fn update(&mut self, _ctx: &mut UpdateContext<'_>) -> Result<(), FrameError> {
        Ok(())
    }

    fn render(&mut self, frame: &mut Frame<'_>) -> Result<(), FrameError>;

    ///Called once after the device became idle, right before the element is dropped.
    fn finalize(&mut self, _device: &Arc<dyn Device>) -> Result<(), FrameError> {
        Ok(())
    }
}

pub struct InitContext<'a> {
    pub device: &'a Arc<dyn Device>,
    pub window: &'a dyn Window,
    ///Elements register their UI callbacks here.
    pub overlay: &'a mut Overlay,
}

pub struct UpdateContext<'a> {
    input: &'a dyn Input,
    window: &'a mut dyn Window,
    time: FrameTime,
    step: Duration,
    tick: u64,
    stop_requested: &'a mut bool,
}

impl<'a> UpdateContext<'a> {
    pub fn input(&self) -> &dyn Input {
        self.input
    }

    pub fn window(&self) -> &dyn Window {
        &*self.window
    }

    pub fn window_mut(&mut self) -> &mut dyn Window {
        &mut *self.window
    }

    ///Time of the frame this update belongs to.
    pub fn time(&self) -> FrameTime {
        self.time
    }

    ///Time this update advances.
    pub fn step(&self) -> Duration {
        self.step
    }

    ///Number of update ticks before this one.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    ///Ends the run after the current update. Work that was already submitted still completes.
    pub fn stop(&mut self) {
        *self.stop_requested = true;
    }
}

///The frame in progress. Command buffers submitted here are executed in submission order when the frame ends.
pub struct Frame<'a> {
    device: &'a Arc<dyn Device>,
    window: &'a dyn Window,
    queue: &'a mut SubmissionQueue,
    time: FrameTime,
    frame: u64,
    in_flight_index: usize,
}

impl<'a> Frame<'a> {
    ///Token for writes that are ordered against the previous use of this frame's in-flight slot.
    pub fn with_barriers_on_current_frame(&mut self) -> SyncToken<'_> {
        SyncToken::BarriersOnCurrentFrame(&mut *self.queue)
    }

    pub fn submit_command_buffer_ref(&mut self, buffer: &CommandBuffer) -> Result<(), FrameError> {
        self.queue.submit_by_reference(buffer)
    }

    pub fn submit_command_buffer_ownership(
        &mut self,
        buffer: CommandBuffer,
    ) -> Result<(), FrameError> {
        self.queue.submit_ownership(buffer)
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        self.device
    }

    pub fn window(&self) -> &dyn Window {
        self.window
    }

    pub fn time(&self) -> FrameTime {
        self.time
    }

    ///Number of the frame, counted by the window.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn in_flight_index(&self) -> usize {
        self.in_flight_index
    }
}

pub struct DriverConfig {
    ///Stops after that many rendered frames. Runs until an element stops otherwise.
    pub max_frames: Option<u64>,
    pub clock: FrameClock,
    pub timer: Box<dyn UpdateTimer>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            max_frames: None,
            clock: FrameClock::realtime(),
            timer: Box::new(VaryingUpdateTimer),
        }
    }
}

impl DriverConfig {
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn with_clock(mut self, clock: FrameClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timer(mut self, timer: impl UpdateTimer + 'static) -> Self {
        self.timer = Box::new(timer);
        self
    }
}

impl std::fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverConfig")
            .field("max_frames", &self.max_frames)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

pub struct FrameDriver {
    device: Arc<dyn Device>,
    window: Box<dyn Window>,
    input: Box<dyn Input>,
    ui: Box<dyn Ui>,
    overlay: Overlay,
    ///In order of acquisition.
    elements: Vec<Box<dyn Element>>,
    queue: Option<SubmissionQueue>,
    config: DriverConfig,
    state: DriverState,
    stop_requested: bool,
    update_ticks: u64,
    frames_rendered: u64,
}

impl FrameDriver {
    ///Driver without elements, using a [HeadlessUi] and the default [DriverConfig].
    pub fn new(device: Arc<dyn Device>, window: Box<dyn Window>, input: Box<dyn Input>) -> Self {
        FrameDriver {
            device,
            window,
            input,
            ui: Box::new(HeadlessUi::new()),
            overlay: Overlay::new(),
            elements: Vec::new(),
            queue: None,
            config: DriverConfig::default(),
            state: DriverState::Uninitialized,
            stop_requested: false,
            update_ticks: 0,
            frames_rendered: 0,
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ui(mut self, ui: Box<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_element(mut self, element: impl Element + 'static) -> Result<Self, FrameError> {
        self.add_element(element)?;
        Ok(self)
    }

    pub fn add_element(&mut self, element: impl Element + 'static) -> Result<(), FrameError> {
        if self.state != DriverState::Uninitialized {
            return Err(DriverError::ElementAfterInitialize(self.state.name()).into());
        }
        self.elements.push(Box::new(element));
        Ok(())
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn window(&self) -> &dyn Window {
        &*self.window
    }

    pub fn overlay_mut(&mut self) -> &mut Overlay {
        &mut self.overlay
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn update_ticks(&self) -> u64 {
        self.update_ticks
    }

    fn transition(&mut self, to: DriverState) -> Result<(), DriverError> {
        if !self.state.can_transition_to(to) {
            return Err(DriverError::InvalidTransition {
                from: self.state.name(),
                to: to.name(),
            });
        }
        self.state = to;
        Ok(())
    }

    ///Creates the submission queue and initializes all elements in order.
    ///
    /// If an element fails, the driver is torn down and stays [Stopped](DriverState::Stopped).
    pub fn initialize(&mut self) -> Result<(), FrameError> {
        self.transition(DriverState::Initialized)?;

        #[cfg(feature = "logging")]
        log::info!(
            "Initializing {} elements on {} with {} frames in flight",
            self.elements.len(),
            self.device.name(),
            self.window.frames_in_flight()
        );

        let result = self.initialize_elements();
        if let Err(e) = result {
            #[cfg(feature = "logging")]
            log::error!("Initialization failed: {}", e);
            if let Err(_teardown) = self.teardown() {
                #[cfg(feature = "logging")]
                log::error!("Teardown after failed initialization failed: {}", _teardown);
            }
            return Err(e);
        }
        Ok(())
    }

    fn initialize_elements(&mut self) -> Result<(), FrameError> {
        self.queue = Some(SubmissionQueue::new(
            &self.device,
            self.window.frames_in_flight(),
        )?);

        let mut ctx = InitContext {
            device: &self.device,
            window: &*self.window,
            overlay: &mut self.overlay,
        };
        for element in self.elements.iter_mut() {
            #[cfg(feature = "logging")]
            log::info!("Initializing {}", element.name());
            element.initialize(&mut ctx)?;
        }
        Ok(())
    }

    ///Runs until an element stops, `max_frames` frames were rendered or an error occurs. Initializes first if needed.
    ///
    /// Always ends [Stopped](DriverState::Stopped) with an idle device and all elements dropped.
    pub fn run(&mut self) -> Result<(), FrameError> {
        if self.state == DriverState::Uninitialized {
            self.initialize()?;
        }

        let result = self.run_loop();
        let teardown = self.teardown();

        match result {
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!(
                    "Stopping after {} frames: {}{}",
                    self.frames_rendered,
                    e,
                    if e.is_device_lost() {
                        ", device lost"
                    } else {
                        ""
                    }
                );
                Err(e)
            }
            Ok(()) => teardown,
        }
    }

    fn should_stop(&self) -> bool {
        self.stop_requested
            || self
                .config
                .max_frames
                .map(|max| self.frames_rendered >= max)
                .unwrap_or(false)
    }

    fn run_loop(&mut self) -> Result<(), FrameError> {
        while !self.should_stop() {
            let time = self.config.clock.tick();

            self.transition(DriverState::Updating)?;
            self.update(time)?;
            if self.stop_requested {
                #[cfg(feature = "logging")]
                log::info!("Stop requested at update tick {}", self.update_ticks);
                break;
            }

            self.transition(DriverState::Rendering)?;
            self.render(time)?;

            #[cfg(feature = "profiling")]
            puffin::GlobalProfiler::lock().new_frame();
        }
        Ok(())
    }

    fn update(&mut self, time: FrameTime) -> Result<(), FrameError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let updates = self.config.timer.updates_for(&time);
        let step = self.config.timer.update_step(&time);
        for _ in 0..updates {
            self.input.poll();
            let mut ctx = UpdateContext {
                input: &*self.input,
                window: &mut *self.window,
                time,
                step,
                tick: self.update_ticks,
                stop_requested: &mut self.stop_requested,
            };
            for element in self.elements.iter_mut() {
                element.update(&mut ctx)?;
            }
            self.update_ticks += 1;
            if self.stop_requested {
                break;
            }
        }
        Ok(())
    }

    fn render(&mut self, time: FrameTime) -> Result<(), FrameError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let queue = self
            .queue
            .as_mut()
            .ok_or(SubmissionError::NoFrameInProgress)?;
        let frame_number = self.window.current_frame();
        let in_flight_index = self.window.current_in_flight_index();

        queue.begin_frame(in_flight_index)?;
        {
            let mut frame = Frame {
                device: &self.device,
                window: &*self.window,
                queue: &mut *queue,
                time,
                frame: frame_number,
                in_flight_index,
            };
            for element in self.elements.iter_mut() {
                element.render(&mut frame)?;
            }
        }

        self.overlay
            .draw(&mut *self.ui, &FrameStats::new(frame_number, time.delta));

        #[cfg(feature = "logging")]
        log::trace!(
            "Frame {} on slot {}: {} command buffers",
            frame_number,
            in_flight_index,
            queue.pending()
        );

        queue.end_frame()?;
        self.window.present()?;
        self.frames_rendered += 1;
        Ok(())
    }

    ///Waits for the device, then finalizes and drops all elements in reverse order. Returns the first error that occurred.
    fn teardown(&mut self) -> Result<(), FrameError> {
        if self.state == DriverState::Stopped {
            return Ok(());
        }
        self.state = DriverState::Stopped;

        #[cfg(feature = "logging")]
        log::info!(
            "Tearing down {} elements after {} frames",
            self.elements.len(),
            self.frames_rendered
        );

        let mut first_error = match self.queue.as_mut() {
            Some(queue) => queue.wait_idle(),
            None => self.device.wait_idle().map_err(FrameError::from),
        }
        .err();

        while let Some(mut element) = self.elements.pop() {
            if let Err(e) = element.finalize(&self.device) {
                #[cfg(feature = "logging")]
                log::error!("Finalizing {} failed: {}", element.name(), e);
                first_error.get_or_insert(e);
            }
            drop(element);
        }

        self.queue = None;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        if self.state != DriverState::Stopped {
            #[cfg(feature = "logging")]
            log::warn!("Frame driver dropped while {}, tearing down", self.state.name());
            if let Err(_e) = self.teardown() {
                #[cfg(feature = "logging")]
                log::error!("Teardown in drop failed: {}", _e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ash::vk;

    use super::*;
    use crate::{
        error::DeviceError,
        input::{KeyCode, ScriptedInput},
        presentation::OffscreenWindow,
        resources::DEFAULT_COLOR_FORMAT,
        sim::SimDevice,
    };

    type Log = Arc<Mutex<Vec<String>>>;

    struct Probe {
        name: &'static str,
        log: Log,
        fail_render_at: Option<u64>,
    }

    impl Probe {
        fn new(name: &'static str, log: &Log) -> Self {
            Probe {
                name,
                log: log.clone(),
                fail_render_at: None,
            }
        }

        fn push(&self, event: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} {}", self.name, event));
        }
    }

    impl Element for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), FrameError> {
            self.push("init");
            Ok(())
        }

        fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), FrameError> {
            if ctx.input().key_pressed(KeyCode::Escape) {
                ctx.stop();
            }
            Ok(())
        }

        fn render(&mut self, frame: &mut Frame<'_>) -> Result<(), FrameError> {
            if self.fail_render_at == Some(frame.frame()) {
                return Err(FrameError::Other("render failed".to_owned()));
            }
            self.push(&format!("render {}", frame.in_flight_index()));
            Ok(())
        }

        fn finalize(&mut self, _device: &Arc<dyn Device>) -> Result<(), FrameError> {
            self.push("finalize");
            Ok(())
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.push("drop");
        }
    }

    fn driver(sim: &Arc<SimDevice>, frames_in_flight: usize, input: ScriptedInput) -> FrameDriver {
        let device = sim.clone().into_device();
        let window = OffscreenWindow::new(
            &device,
            vk::Extent2D {
                width: 4,
                height: 4,
            },
            frames_in_flight,
            DEFAULT_COLOR_FORMAT,
        )
        .unwrap();
        FrameDriver::new(device, Box::new(window), Box::new(input)).with_config(
            DriverConfig::default().with_clock(FrameClock::simulated(Duration::from_millis(10))),
        )
    }

    #[test]
    fn impl_send_sync() {
        static_assertions::assert_impl_all!(DriverConfig: Send);
    }

    #[test]
    fn transitions() {
        use DriverState::*;
        assert!(Uninitialized.can_transition_to(Initialized));
        assert!(Updating.can_transition_to(Rendering));
        assert!(Rendering.can_transition_to(Updating));
        assert!(Rendering.can_transition_to(Stopped));
        assert!(!Uninitialized.can_transition_to(Rendering));
        assert!(!Initialized.can_transition_to(Rendering));
        assert!(!Stopped.can_transition_to(Initialized));
        assert!(!Stopped.can_transition_to(Stopped));
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let sim = SimDevice::new();
        let mut driver = driver(&sim, 2, ScriptedInput::new());
        driver.initialize().unwrap();
        assert_eq!(driver.state(), DriverState::Initialized);
        assert!(matches!(
            driver.initialize(),
            Err(FrameError::Driver(DriverError::InvalidTransition {
                from: "Initialized",
                to: "Initialized"
            }))
        ));
        let log = Log::default();
        assert!(matches!(
            driver.add_element(Probe::new("late", &log)),
            Err(FrameError::Driver(DriverError::ElementAfterInitialize(_)))
        ));
    }

    #[test]
    fn elements_are_released_in_reverse_order() {
        let sim = SimDevice::new();
        let log = Log::default();
        let mut driver = driver(&sim, 2, ScriptedInput::new())
            .with_element(Probe::new("a", &log))
            .unwrap()
            .with_element(Probe::new("b", &log))
            .unwrap();
        driver.config.max_frames = Some(3);
        driver.run().unwrap();

        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.frames_rendered(), 3);
        assert_eq!(sim.pending_submissions(), 0);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a init", "b init", "a render 0", "b render 0", "a render 1", "b render 1",
                "a render 0", "b render 0", "b finalize", "b drop", "a finalize", "a drop",
            ]
        );
    }

    #[test]
    fn stop_cancels_the_next_frame() {
        let sim = SimDevice::new();
        let log = Log::default();
        let mut driver = driver(&sim, 2, ScriptedInput::new().press_at(2, KeyCode::Escape))
            .with_element(Probe::new("a", &log))
            .unwrap();
        driver.run().unwrap();

        //ticks 0 and 1 render, tick 2 stops
        assert_eq!(driver.frames_rendered(), 2);
        assert_eq!(driver.update_ticks(), 3);
        assert!(sim.hazards().is_empty());
    }

    #[test]
    fn element_error_tears_down() {
        let sim = SimDevice::new();
        let log = Log::default();
        let mut failing = Probe::new("a", &log);
        failing.fail_render_at = Some(1);
        let mut driver = driver(&sim, 2, ScriptedInput::new())
            .with_element(failing)
            .unwrap();

        assert!(matches!(driver.run(), Err(FrameError::Other(_))));
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.frames_rendered(), 1);
        let log = log.lock().unwrap();
        assert_eq!(log[log.len() - 2..], ["a finalize", "a drop"]);
    }

    #[test]
    fn lost_device_ends_the_run() {
        let sim = SimDevice::new();
        let mut driver = driver(&sim, 2, ScriptedInput::new());
        driver.initialize().unwrap();
        sim.lose_device();

        let err = driver.run().unwrap_err();
        assert!(err.is_device_lost());
        assert!(matches!(err, FrameError::Device(DeviceError::Lost)));
        assert_eq!(driver.state(), DriverState::Stopped);
    }
}
