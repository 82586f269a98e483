//! # Overlay
//!
//! Per-frame UI callbacks. Frameline does not render UI itself, it drives callbacks against the [Ui] trait, which is the widget
//! surface an immediate-mode UI backend has to implement. Values the UI changes are shared with elements through [Tunable]s.
//!
//! [HeadlessUi] implements [Ui] without any output. It remembers which widgets were drawn and can inject values, which is
//! what tests and headless runs use.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};

use ahash::AHashMap;

use crate::context::lock;

///Widget surface of an immediate-mode UI. All widget functions return true if the user changed the value.
pub trait Ui {
    ///Called once per frame before any callback runs.
    fn new_frame(&mut self) {}
    ///Opens a window. Widgets until [end_window](Self::end_window) are placed inside it.
    fn begin_window(&mut self, title: &str);
    fn end_window(&mut self);
    fn text(&mut self, text: &str);
    fn separator(&mut self);
    fn slider_f32(&mut self, label: &str, min: f32, max: f32, value: &mut f32) -> bool;
    fn input_f32(&mut self, label: &str, value: &mut f32) -> bool;
    ///Selection of one of `items`. `current` is the selected index.
    fn combo(&mut self, label: &str, items: &[&str], current: &mut usize) -> bool;
}

///Timing information passed to every overlay callback.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub ms_per_frame: f32,
    pub fps: f32,
}

impl FrameStats {
    pub fn new(frame: u64, delta: Duration) -> Self {
        let secs = delta.as_secs_f32();
        FrameStats {
            frame,
            ms_per_frame: secs * 1000.0,
            fps: if secs > 0.0 { 1.0 / secs } else { 0.0 },
        }
    }
}

pub type OverlayCallback = Box<dyn FnMut(&mut dyn Ui, &FrameStats) + Send>;

///Ordered set of UI callbacks, executed once per rendered frame.
#[derive(Default)]
pub struct Overlay {
    callbacks: Vec<(String, OverlayCallback)>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    ///Adds the frame time window of the framebuffer example.
    pub fn with_stats_window(mut self) -> Self {
        self.add("frame stats", |ui, stats| {
            ui.begin_window("Frame");
            ui.text(&format!(
                "{:.3} ms/frame ({:.1} FPS)",
                stats.ms_per_frame, stats.fps
            ));
            ui.text(&format!("frame {}", stats.frame));
            ui.end_window();
        });
        self
    }

    pub fn add(
        &mut self,
        name: impl Into<String>,
        callback: impl FnMut(&mut dyn Ui, &FrameStats) + Send + 'static,
    ) -> &mut Self {
        self.callbacks.push((name.into(), Box::new(callback)));
        self
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    ///Runs all callbacks in order of registration.
    pub fn draw(&mut self, ui: &mut dyn Ui, stats: &FrameStats) {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        ui.new_frame();
        for (_name, callback) in self.callbacks.iter_mut() {
            callback(&mut *ui, stats);
        }
    }
}

impl Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.callbacks.iter().map(|(name, _)| name))
            .finish()
    }
}

///Value shared between the UI and an element. Cloning shares the value.
pub struct Tunable<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for Tunable<T> {
    fn clone(&self) -> Self {
        Tunable {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Tunable<T> {
    pub fn new(value: T) -> Self {
        Tunable {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub fn get(&self) -> T {
        lock(&self.inner).clone()
    }

    pub fn set(&self, value: T) {
        *lock(&self.inner) = value;
    }

    ///Lets `f` change the value in place. Returns whatever `f` returns.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = lock(&self.inner);
        f(&mut *guard)
    }
}

impl<T: Debug> Debug for Tunable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        lock(&self.inner).fmt(f)
    }
}

///Value injected into a [HeadlessUi] widget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UiValue {
    F32(f32),
    Index(usize),
}

///[Ui] without output. See the [module](self) documentation.
#[derive(Debug, Default)]
pub struct HeadlessUi {
    inject: AHashMap<String, UiValue>,
    drawn: Vec<String>,
    open_windows: usize,
}

impl HeadlessUi {
    pub fn new() -> Self {
        Self::default()
    }

    ///Sets the widget labeled `label` to `value` the next time it is drawn.
    pub fn inject(&mut self, label: &str, value: UiValue) {
        self.inject.insert(label.to_owned(), value);
    }

    ///Labels and titles drawn during the last frame, in order.
    pub fn drawn(&self) -> &[String] {
        &self.drawn
    }

    fn take_f32(&mut self, label: &str, value: &mut f32) -> bool {
        self.drawn.push(label.to_owned());
        match self.inject.remove(label) {
            Some(UiValue::F32(v)) => {
                *value = v;
                true
            }
            _ => false,
        }
    }
}

impl Ui for HeadlessUi {
    fn new_frame(&mut self) {
        self.drawn.clear();
        #[cfg(feature = "logging")]
        if self.open_windows != 0 {
            log::warn!("{} UI windows were not closed", self.open_windows);
        }
        self.open_windows = 0;
    }

    fn begin_window(&mut self, title: &str) {
        self.open_windows += 1;
        self.drawn.push(title.to_owned());
    }

    fn end_window(&mut self) {
        self.open_windows = self.open_windows.saturating_sub(1);
    }

    fn text(&mut self, text: &str) {
        self.drawn.push(text.to_owned());
    }

    fn separator(&mut self) {}

    fn slider_f32(&mut self, label: &str, min: f32, max: f32, value: &mut f32) -> bool {
        let changed = self.take_f32(label, value);
        *value = value.clamp(min, max);
        changed
    }

    fn input_f32(&mut self, label: &str, value: &mut f32) -> bool {
        self.take_f32(label, value)
    }

    fn combo(&mut self, label: &str, items: &[&str], current: &mut usize) -> bool {
        self.drawn.push(label.to_owned());
        match self.inject.remove(label) {
            Some(UiValue::Index(idx)) if idx < items.len() => {
                *current = idx;
                true
            }
            _ => false,
        }
    }
}
