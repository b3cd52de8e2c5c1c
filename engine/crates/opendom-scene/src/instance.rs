use glam::{Mat4, Quat, Vec3, Vec4};

use crate::id_sequence::InstanceId;

/// 单个实例的 GPU 布局，作为 per-instance vertex 数据读取
///
/// - location 3..=6: rotation 的四列
/// - location 7: position
/// - location 8: scale
/// - location 9: instance_id
/// - location 10: selected
///
/// 结构体按 16 字节对齐，末尾的 padding 让大小保持 16 的整数倍
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Instance {
    pub rotation: Mat4,
    pub position: Vec4,
    pub scale: Vec4,
    /// 由 entity store 在 add 时写入，调用者传入的值会被覆盖
    pub instance_id: u32,
    /// 0 或 1
    pub selected: u32,
    _padding: [u32; 2],
}

// new & init
impl Instance {
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            rotation: Mat4::from_quat(rotation),
            position: position.extend(1.0),
            scale: scale.extend(1.0),
            instance_id: 0,
            selected: 0,
            _padding: [0; 2],
        }
    }

    #[inline]
    pub fn identity() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)
    }

    #[inline]
    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected as u32;
        self
    }

    #[inline]
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec4::new(scale, scale, scale, 1.0);
        self
    }
}

// getters
impl Instance {
    #[inline]
    pub fn id(&self) -> InstanceId {
        InstanceId(self.instance_id)
    }

    #[inline]
    pub fn is_selected(&self) -> bool {
        self.selected != 0
    }

    /// T * R * S，与 vertex shader 中的组合顺序一致
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position.truncate()) * self.rotation * Mat4::from_scale(self.scale.truncate())
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::identity()
    }
}
