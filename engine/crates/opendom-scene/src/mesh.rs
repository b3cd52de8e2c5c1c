use crate::vertex::Vertex;

/// host 端的网格数据
///
/// 已经展开为三角形列表，每个三角形角点对应一个顶点，没有 index buffer
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    /// 模型文件里引用的材质路径，目前只做记录
    pub material_path: Option<String>,
}

// new & init
impl MeshData {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            material_path: None,
        }
    }
}

// getters
impl MeshData {
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[inline]
    pub fn byte_size(&self) -> u64 {
        size_of_val(self.vertices.as_slice()) as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_sizes() {
        let mesh = MeshData::new(vec![Vertex::default(); 3]);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.byte_size(), 3 * 48);
        assert_eq!(mesh.as_bytes().len(), 144);
        assert!(!mesh.is_empty());
        assert!(MeshData::default().is_empty());
    }
}
