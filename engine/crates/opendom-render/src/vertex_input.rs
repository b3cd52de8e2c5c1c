use std::mem::offset_of;

use ash::vk;
use opendom_scene::{instance::Instance, vertex::Vertex};

pub const VERTEX_BINDING: u32 = 0;
pub const INSTANCE_BINDING: u32 = 1;

/// binding 0 逐顶点，binding 1 逐实例
pub fn vertex_bindings() -> Vec<vk::VertexInputBindingDescription> {
    vec![
        vk::VertexInputBindingDescription {
            binding: VERTEX_BINDING,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
        vk::VertexInputBindingDescription {
            binding: INSTANCE_BINDING,
            stride: size_of::<Instance>() as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        },
    ]
}

/// location 与 vertex shader 的输入一一对应
pub fn vertex_attributes() -> Vec<vk::VertexInputAttributeDescription> {
    let vec4 = vk::Format::R32G32B32A32_SFLOAT;
    let attr = |location: u32, binding: u32, format: vk::Format, offset: usize| vk::VertexInputAttributeDescription {
        location,
        binding,
        format,
        offset: offset as u32,
    };

    let rotation = offset_of!(Instance, rotation);
    let column = size_of::<[f32; 4]>();

    vec![
        attr(0, VERTEX_BINDING, vec4, offset_of!(Vertex, position)),
        attr(1, VERTEX_BINDING, vec4, offset_of!(Vertex, color)),
        attr(2, VERTEX_BINDING, vec4, offset_of!(Vertex, normal)),
        // mat4 占用 4 个 location，每列一个
        attr(3, INSTANCE_BINDING, vec4, rotation),
        attr(4, INSTANCE_BINDING, vec4, rotation + column),
        attr(5, INSTANCE_BINDING, vec4, rotation + column * 2),
        attr(6, INSTANCE_BINDING, vec4, rotation + column * 3),
        attr(7, INSTANCE_BINDING, vec4, offset_of!(Instance, position)),
        attr(8, INSTANCE_BINDING, vec4, offset_of!(Instance, scale)),
        attr(9, INSTANCE_BINDING, vk::Format::R32_UINT, offset_of!(Instance, instance_id)),
        attr(10, INSTANCE_BINDING, vk::Format::R32_UINT, offset_of!(Instance, selected)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings() {
        let bindings = vertex_bindings();
        assert_eq!(bindings[0].stride, 48);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);
        assert_eq!(bindings[1].stride, 112);
        assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
    }

    #[test]
    fn test_attribute_layout() {
        let attrs = vertex_attributes();
        assert_eq!(attrs.len(), 11);

        let layout: Vec<(u32, u32, u32)> = attrs.iter().map(|a| (a.location, a.binding, a.offset)).collect();
        assert_eq!(
            layout,
            vec![
                (0, 0, 0),
                (1, 0, 16),
                (2, 0, 32),
                (3, 1, 0),
                (4, 1, 16),
                (5, 1, 32),
                (6, 1, 48),
                (7, 1, 64),
                (8, 1, 80),
                (9, 1, 96),
                (10, 1, 100),
            ]
        );
        assert!(attrs[9..].iter().all(|a| a.format == vk::Format::R32_UINT));
    }
}
