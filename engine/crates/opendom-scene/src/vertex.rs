use glam::Vec3;

/// 单个顶点，布局与 vertex shader 的 location 0..=2 对应
///
/// 三个字段都是 vec4：position.w = 1，normal.w 仅作填充
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub normal: [f32; 4],
}

impl Vertex {
    /// 默认颜色：不透明白色
    pub const DEFAULT_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

    #[inline]
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: [position.x, position.y, position.z, 1.0],
            color: Self::DEFAULT_COLOR,
            normal: [normal.x, normal.y, normal.z, 0.0],
        }
    }

    #[inline]
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 48);
        assert_eq!(std::mem::offset_of!(Vertex, color), 16);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 32);
    }

    #[test]
    fn test_vertex_defaults_to_opaque_white() {
        let v = Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::Y);
        assert_eq!(v.position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(v.color, [1.0; 4]);
        assert_eq!(v.normal, [0.0, 1.0, 0.0, 0.0]);

        let red = v.with_color([1.0, 0.0, 0.0, 1.0]);
        assert_eq!(red.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(red.position, v.position);
    }
}
