use glam::{Mat4, Vec2, Vec3};

use crate::uniforms::InputSnapshot;

/// 每帧的平移距离
pub const CAMERA_MOVE_SPEED: f32 = 0.002;
/// 每像素的旋转弧度
pub const CAMERA_ROTATE_SPEED: f32 = 0.01;

/// 直接修改 view 矩阵的相机控制器
///
/// - WASD 在相机空间中平移
/// - 按住右键拖动旋转
#[derive(Debug, Default)]
pub struct CameraController {
    turning: bool,
    last_cursor: Vec2,
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_turning(&self) -> bool {
        self.turning
    }

    pub fn update(&mut self, view: &mut Mat4, input: &InputSnapshot) {
        if self.turning {
            let delta = input.cursor - self.last_cursor;
            *view = *view
                * Mat4::from_rotation_y(delta.x * CAMERA_ROTATE_SPEED)
                * Mat4::from_rotation_x(-delta.y * CAMERA_ROTATE_SPEED);
            self.last_cursor = input.cursor;
            if !input.right_pressed() {
                self.turning = false;
            }
        } else if input.right_pressed() {
            // 按下的这一帧只记录起点
            self.turning = true;
            self.last_cursor = input.cursor;
        }

        let keys = input.movement;
        let axis = |positive: bool, negative: bool| (positive as i32 - negative as i32) as f32 * CAMERA_MOVE_SPEED;
        let velocity = Vec3::new(axis(keys.left, keys.right), 0.0, axis(keys.back, keys.forward));
        if velocity != Vec3::ZERO {
            *view *= Mat4::from_translation(velocity);
        }
    }
}
