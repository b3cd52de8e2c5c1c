use glam::Vec2;
use opendom_render::uniforms::{InputSnapshot, MOUSE_LEFT, MOUSE_RIGHT, MovementKeys};
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// 把 winit 的窗口事件累积成每帧一份的 [`InputSnapshot`]
#[derive(Debug, Default)]
pub struct InputState {
    cursor: Vec2,
    mouse_buttons: u32,
    movement: MovementKeys,
    window_size: [u32; 2],
}

// new & init
impl InputState {
    pub fn new(window_size: [u32; 2]) -> Self {
        Self {
            window_size,
            ..Default::default()
        }
    }
}

// getters
impl InputState {
    #[inline]
    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            cursor: self.cursor,
            mouse_buttons: self.mouse_buttons,
            movement: self.movement,
            window_size: self.window_size,
        }
    }

    #[inline]
    pub fn window_size(&self) -> [u32; 2] {
        self.window_size
    }
}

// update
impl InputState {
    /// 不关心的事件直接忽略
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => self.on_cursor_moved(position.x, position.y),
            WindowEvent::MouseInput { state, button, .. } => self.on_mouse_button(*button, *state),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state,
                        ..
                    },
                ..
            } => self.on_key(*key_code, *state),
            WindowEvent::Resized(size) => self.on_resized(size.width, size.height),
            WindowEvent::Focused(false) => self.release_all(),
            _ => {}
        }
    }

    pub fn on_cursor_moved(&mut self, x: f64, y: f64) {
        self.cursor = Vec2::new(x as f32, y as f32);
    }

    pub fn on_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        let bit = match button {
            MouseButton::Left => MOUSE_LEFT,
            MouseButton::Right => MOUSE_RIGHT,
            _ => return,
        };
        match state {
            ElementState::Pressed => self.mouse_buttons |= bit,
            ElementState::Released => self.mouse_buttons &= !bit,
        }
    }

    pub fn on_key(&mut self, key_code: KeyCode, state: ElementState) {
        let pressed = state.is_pressed();
        match key_code {
            KeyCode::KeyW => self.movement.forward = pressed,
            KeyCode::KeyS => self.movement.back = pressed,
            KeyCode::KeyA => self.movement.left = pressed,
            KeyCode::KeyD => self.movement.right = pressed,
            _ => {}
        }
    }

    pub fn on_resized(&mut self, width: u32, height: u32) {
        self.window_size = [width, height];
    }

    /// 失去焦点后收不到 release 事件，全部视为松开
    pub fn release_all(&mut self) {
        self.mouse_buttons = 0;
        self.movement = MovementKeys::default();
    }
}
