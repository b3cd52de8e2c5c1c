use std::{mem::offset_of, ops::Range};

use ash::vk;
use glam::{Mat4, Vec2};
use opendom_gfx::resources::buffer::GfxBuffer;

pub const CAMERA_FOV_DEGREES: f32 = 80.0;
pub const CAMERA_NEAR: f32 = 0.1;
pub const CAMERA_FAR: f32 = 50.0;

/// `frame_id` 在 1..=FRAME_ID_CYCLE 之间循环
pub const FRAME_ID_CYCLE: u32 = 15;

/// 鼠标按键的位掩码
pub const MOUSE_LEFT: u32 = 0b10;
pub const MOUSE_RIGHT: u32 = 0b01;

/// uniform buffer，binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraBlock {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl Default for CameraBlock {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

impl CameraBlock {
    /// 交换链尺寸变化后根据新的宽高比重新计算投影
    pub fn update_projection(&mut self, extent: vk::Extent2D) {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        self.proj = Mat4::perspective_rh(CAMERA_FOV_DEGREES.to_radians(), aspect, CAMERA_NEAR, CAMERA_FAR);
    }
}

/// storage buffer，binding 1
///
/// 字段顺序与 shader 中的声明一致，selection 相关的数据由 shader 写入
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InputBlock {
    /// xy: 光标位置；zw: 框选的起点
    pub mouse: [f32; 4],
    pub window_size: [f32; 2],
    pub mouse_buttons: u32,
    pub selection_buffer_length: u32,
    /// 用于判断 selection 发生在多久之前
    pub frame_id: u32,
    pub selection_map: [u8; 4096],
    pub selection_buffer: [u8; 256],
}

impl Default for InputBlock {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// 窗口系统在一帧开始时的输入状态
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    pub cursor: Vec2,
    /// [`MOUSE_LEFT`] | [`MOUSE_RIGHT`]
    pub mouse_buttons: u32,
    pub movement: MovementKeys,
    pub window_size: [u32; 2],
}

impl InputSnapshot {
    #[inline]
    pub fn left_pressed(&self) -> bool {
        self.mouse_buttons & MOUSE_LEFT != 0
    }

    #[inline]
    pub fn right_pressed(&self) -> bool {
        self.mouse_buttons & MOUSE_RIGHT != 0
    }
}

/// WASD
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl InputBlock {
    /// host 每帧写入的字节区间
    ///
    /// `selection_buffer_length` 和两个 selection 数组由 shader 写入，只在创建时清零一次
    pub const HOST_RANGES: [Range<usize>; 2] = [
        0..offset_of!(InputBlock, selection_buffer_length),
        offset_of!(InputBlock, frame_id)..offset_of!(InputBlock, selection_map),
    ];

    /// (偏移, 数据) 形式给出 host 负责的字段
    pub fn host_owned_bytes(&self) -> impl Iterator<Item = (usize, &[u8])> {
        let bytes = bytemuck::bytes_of(self);
        Self::HOST_RANGES.into_iter().map(move |range| (range.start, &bytes[range]))
    }

    /// # param
    /// * render_size - 交换链的实际尺寸
    pub fn apply_snapshot(&mut self, snapshot: &InputSnapshot, render_size: vk::Extent2D) {
        self.window_size = [render_size.width as f32, render_size.height as f32];
        self.frame_id = if self.frame_id == FRAME_ID_CYCLE { 1 } else { self.frame_id + 1 };
        self.mouse_buttons = snapshot.mouse_buttons;

        self.mouse[0] = snapshot.cursor.x;
        self.mouse[1] = snapshot.cursor.y;
        // 左键未按下时框选起点跟随光标
        if self.mouse_buttons & MOUSE_LEFT == 0 {
            self.mouse[2] = snapshot.cursor.x;
            self.mouse[3] = snapshot.cursor.y;
        }
    }
}

/// 两个 buffer 在各自的 binding 上的描述
#[derive(Debug, Clone, Copy)]
pub struct UniformBindings {
    pub camera: vk::DescriptorBufferInfo,
    pub input: vk::DescriptorBufferInfo,
}

/// camera 与 input 两个常驻映射的 buffer
///
/// host 端保留一份拷贝。camera 每帧整体写入，input 只写 host 负责的字段
pub struct GpuUniforms {
    camera_buffer: GfxBuffer,
    input_buffer: GfxBuffer,

    pub camera: CameraBlock,
    pub input: InputBlock,
}

// new & init
impl GpuUniforms {
    pub fn new() -> anyhow::Result<Self> {
        let camera_buffer = GfxBuffer::new(
            size_of::<CameraBlock>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            true,
            "camera-block",
        )?;
        let input_buffer = GfxBuffer::new(
            size_of::<InputBlock>() as vk::DeviceSize,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            true,
            "input-block",
        )?;

        let uniforms = Self {
            camera_buffer,
            input_buffer,
            camera: CameraBlock::default(),
            input: InputBlock::default(),
        };
        // selection 数据只在这里清零
        uniforms.input_buffer.write_pod(&uniforms.input)?;
        uniforms.flush()?;
        Ok(uniforms)
    }

    pub fn destroy(self) {
        self.camera_buffer.destroy();
        self.input_buffer.destroy();
    }
}

// getters
impl GpuUniforms {
    pub fn bindings(&self) -> UniformBindings {
        UniformBindings {
            camera: vk::DescriptorBufferInfo {
                buffer: self.camera_buffer.vk_buffer(),
                offset: 0,
                range: vk::WHOLE_SIZE,
            },
            input: vk::DescriptorBufferInfo {
                buffer: self.input_buffer.vk_buffer(),
                offset: 0,
                range: vk::WHOLE_SIZE,
            },
        }
    }
}

// update
impl GpuUniforms {
    /// 将 host 端的数据写入映射内存，不覆盖 shader 写入的 selection 数据
    pub fn flush(&self) -> anyhow::Result<()> {
        self.camera_buffer.write_pod(&self.camera)?;
        for (offset, bytes) in self.input.host_owned_bytes() {
            self.input_buffer.write_bytes(offset as vk::DeviceSize, bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn snapshot(x: f32, y: f32, buttons: u32) -> InputSnapshot {
        InputSnapshot {
            cursor: Vec2::new(x, y),
            mouse_buttons: buttons,
            ..Default::default()
        }
    }

    #[test]
    fn test_block_layout() {
        assert_eq!(size_of::<CameraBlock>(), 192);
        assert_eq!(size_of::<InputBlock>(), 16 + 8 + 12 + 4096 + 256);
        assert_eq!(offset_of!(InputBlock, frame_id), 32);
        assert_eq!(offset_of!(InputBlock, selection_map), 36);
    }

    #[test]
    fn test_host_ranges_skip_selection_fields() {
        let length_field = offset_of!(InputBlock, selection_buffer_length);
        let length_field = length_field..length_field + size_of::<u32>();
        let selection_start = offset_of!(InputBlock, selection_map);

        for range in InputBlock::HOST_RANGES {
            assert!(range.end <= length_field.start || range.start >= length_field.end);
            assert!(range.end <= selection_start);
        }
        let covered: usize = InputBlock::HOST_RANGES.iter().map(|r| r.len()).sum();
        // mouse + window_size + mouse_buttons + frame_id
        assert_eq!(covered, 16 + 8 + 4 + 4);
    }

    #[test]
    fn test_flush_keeps_shader_selection() {
        // 模拟映射内存：shader 已经写入了 selection 结果
        let mut shader_side = InputBlock::default();
        shader_side.selection_buffer_length = 3;
        shader_side.selection_map[7] = 0xab;
        shader_side.selection_buffer[..3].copy_from_slice(&[1, 2, 3]);
        let mut mapped = bytemuck::bytes_of(&shader_side).to_vec();

        let mut host = InputBlock::default();
        host.apply_snapshot(&snapshot(10.0, 20.0, MOUSE_LEFT), EXTENT);
        for (offset, bytes) in host.host_owned_bytes() {
            mapped[offset..offset + bytes.len()].copy_from_slice(bytes);
        }

        let result: InputBlock = bytemuck::pod_read_unaligned(&mapped);
        assert_eq!(result.mouse, [10.0, 20.0, 10.0, 20.0]);
        assert_eq!(result.window_size, [800.0, 600.0]);
        assert_eq!(result.mouse_buttons, MOUSE_LEFT);
        assert_eq!(result.frame_id, 1);

        assert_eq!(result.selection_buffer_length, 3);
        assert_eq!(result.selection_map[7], 0xab);
        assert_eq!(&result.selection_buffer[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_frame_id_cycles() {
        let mut input = InputBlock::default();
        let ids: Vec<u32> = (0..17)
            .map(|_| {
                input.apply_snapshot(&InputSnapshot::default(), EXTENT);
                input.frame_id
            })
            .collect();
        assert_eq!(ids[0], 1);
        assert_eq!(ids[14], 15);
        assert_eq!(ids[15], 1);
        assert_eq!(ids[16], 2);
    }

    #[test]
    fn test_drag_start_follows_cursor_until_left_pressed() {
        let mut input = InputBlock::default();
        input.apply_snapshot(&snapshot(10.0, 20.0, 0), EXTENT);
        assert_eq!(input.mouse, [10.0, 20.0, 10.0, 20.0]);

        input.apply_snapshot(&snapshot(30.0, 40.0, MOUSE_LEFT), EXTENT);
        assert_eq!(input.mouse, [30.0, 40.0, 10.0, 20.0]);

        // 右键不影响框选
        input.apply_snapshot(&snapshot(50.0, 60.0, MOUSE_RIGHT), EXTENT);
        assert_eq!(input.mouse, [50.0, 60.0, 50.0, 60.0]);
        assert_eq!(input.mouse_buttons, MOUSE_RIGHT);
        assert_eq!(input.window_size, [800.0, 600.0]);
    }

    #[test]
    fn test_projection_follows_aspect() {
        let mut camera = CameraBlock::default();
        camera.update_projection(EXTENT);
        let wide = camera.proj;
        camera.update_projection(vk::Extent2D {
            width: 600,
            height: 600,
        });
        assert!((wide.x_axis.x * 800.0 / 600.0 - camera.proj.x_axis.x).abs() < 1e-5);
        assert_eq!(wide.y_axis.y, camera.proj.y_axis.y);
    }

    #[test]
    fn test_snapshot_buttons() {
        let s = snapshot(0.0, 0.0, MOUSE_LEFT | MOUSE_RIGHT);
        assert!(s.left_pressed() && s.right_pressed());
        assert!(!snapshot(0.0, 0.0, MOUSE_RIGHT).left_pressed());
    }
}
