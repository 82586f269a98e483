//! # Input
//!
//! The [FrameDriver](crate::driver::FrameDriver) polls its [Input] once per update tick, right before the elements update. Keys are
//! identified by winit's physical [KeyCode].
//!
//! - [InputState] is fed with window events by whoever owns the event loop.
//! - [ScriptedInput] presses keys at predefined ticks, used for headless runs and tests.

use ahash::{AHashMap, AHashSet};
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::PhysicalKey,
};

pub use winit::keyboard::KeyCode;

pub trait Input {
    ///Advances to the next update tick.
    fn poll(&mut self);
    ///True if `key` went down since the previous tick.
    fn key_pressed(&self, key: KeyCode) -> bool;
    ///True while `key` is held.
    fn key_down(&self, key: KeyCode) -> bool {
        self.key_pressed(key)
    }
}

///Event fed keyboard state.
#[derive(Debug, Default)]
pub struct InputState {
    down: AHashSet<KeyCode>,
    //presses since the last poll
    incoming: AHashSet<KeyCode>,
    just_pressed: AHashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.down.insert(key) {
            self.incoming.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.down.remove(&key);
    }

    ///Handles keyboard events, ignores everything else.
    pub fn on_window_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if let PhysicalKey::Code(code) = event.physical_key {
                match event.state {
                    ElementState::Pressed => self.on_key_pressed(code),
                    ElementState::Released => self.on_key_released(code),
                }
            }
        }
    }
}

impl Input for InputState {
    fn poll(&mut self) {
        self.just_pressed = std::mem::take(&mut self.incoming);
    }

    fn key_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }

    fn key_down(&self, key: KeyCode) -> bool {
        self.down.contains(&key)
    }
}

///Input that presses keys at fixed update ticks. The first [poll](Input::poll) enters tick 0.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    schedule: AHashMap<u64, Vec<KeyCode>>,
    tick: Option<u64>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    ///Presses `key` for the duration of tick `tick`.
    pub fn press_at(mut self, tick: u64, key: KeyCode) -> Self {
        self.schedule.entry(tick).or_default().push(key);
        self
    }

    ///Current tick, `None` before the first poll.
    pub fn tick(&self) -> Option<u64> {
        self.tick
    }
}

impl Input for ScriptedInput {
    fn poll(&mut self) {
        self.tick = Some(self.tick.map(|t| t + 1).unwrap_or(0));
    }

    fn key_pressed(&self, key: KeyCode) -> bool {
        self.tick
            .and_then(|t| self.schedule.get(&t))
            .map(|keys| keys.contains(&key))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presses_are_visible_for_one_tick() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyC);
        assert!(!input.key_pressed(KeyCode::KeyC));

        input.poll();
        assert!(input.key_pressed(KeyCode::KeyC));
        assert!(input.key_down(KeyCode::KeyC));

        //held, but not pressed again
        input.poll();
        assert!(!input.key_pressed(KeyCode::KeyC));
        assert!(input.key_down(KeyCode::KeyC));

        input.on_key_released(KeyCode::KeyC);
        input.poll();
        assert!(!input.key_down(KeyCode::KeyC));
    }

    #[test]
    fn scripted_presses() {
        let mut input = ScriptedInput::new()
            .press_at(1, KeyCode::KeyC)
            .press_at(3, KeyCode::Escape);
        assert!(!input.key_pressed(KeyCode::KeyC));

        let mut seen = Vec::new();
        for _ in 0..5 {
            input.poll();
            if input.key_pressed(KeyCode::KeyC) {
                seen.push((input.tick(), KeyCode::KeyC));
            }
            if input.key_pressed(KeyCode::Escape) {
                seen.push((input.tick(), KeyCode::Escape));
            }
        }
        assert_eq!(
            seen,
            vec![(Some(1), KeyCode::KeyC), (Some(3), KeyCode::Escape)]
        );
    }
}
