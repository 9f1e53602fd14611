// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashSet;

use winit::{
    event::{ElementState, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

/// Keyboard and cursor state accumulated from window events, queried once
/// per frame by the application loop.
#[derive(Debug, Default)]
pub struct InputState {
    held: HashSet<KeyCode>,
    cursor: Option<(f64, f64)>,
    last_cursor: Option<(f64, f64)>,
}

impl InputState {
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.set_key(code, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => self.set_cursor(position.x, position.y),
            WindowEvent::Focused(false) => {
                tracing::debug!("focus lost, releasing {} held keys", self.held.len());
                self.held.clear();
            }
            _ => {}
        }
    }

    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
    }

    pub fn key_down(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    pub fn set_cursor(&mut self, x: f64, y: f64) {
        self.cursor = Some((x, y));
    }

    pub fn cursor_position(&self) -> Option<(f64, f64)> {
        self.cursor
    }

    /// Cursor movement since the previous call. The first sample only
    /// establishes a reference point and yields no movement.
    pub fn take_cursor_delta(&mut self) -> (f32, f32) {
        let delta = match (self.last_cursor, self.cursor) {
            (Some((lx, ly)), Some((x, y))) => ((x - lx) as f32, (y - ly) as f32),
            _ => (0.0, 0.0),
        };
        self.last_cursor = self.cursor;
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_press_and_release() {
        let mut input = InputState::default();
        input.set_key(KeyCode::KeyW, true);
        assert!(input.key_down(KeyCode::KeyW));
        assert!(!input.key_down(KeyCode::KeyS));
        input.set_key(KeyCode::KeyW, false);
        assert!(!input.key_down(KeyCode::KeyW));
    }

    #[test]
    fn first_cursor_sample_has_no_delta() {
        let mut input = InputState::default();
        assert_eq!(input.take_cursor_delta(), (0.0, 0.0));
        input.set_cursor(100.0, 50.0);
        assert_eq!(input.take_cursor_delta(), (0.0, 0.0));
        input.set_cursor(110.0, 40.0);
        assert_eq!(input.take_cursor_delta(), (10.0, -10.0));
        assert_eq!(input.take_cursor_delta(), (0.0, 0.0));
    }
}
