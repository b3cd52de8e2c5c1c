use std::path::Path;

use anyhow::Context;
use glam::Vec3;
use opendom_scene::{mesh::MeshData, vertex::Vertex};

/// 读取 obj 文件，展开成不带 index 的三角形列表
pub struct ObjImporter {}

impl ObjImporter {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<MeshData> {
        let path = path.as_ref();
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ignore_lines: true,
                ignore_points: true,
                ..Default::default()
            },
        )
        .with_context(|| format!("failed to load obj {}", path.display()))?;

        let mut vertices = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            vertices.extend(expand_triangles(&mesh.positions, &mesh.normals, &mesh.indices).with_context(|| {
                format!("invalid mesh {} in {}", model.name, path.display())
            })?);
        }

        // mtl 缺失不影响几何数据
        let material_path = match materials {
            Ok(materials) => materials.into_iter().find_map(|m| m.diffuse_texture),
            Err(err) => {
                log::warn!("no material for {}: {}", path.display(), err);
                None
            }
        };

        log::info!("loaded {} meshes, {} vertices from {}", models.len(), vertices.len(), path.display());
        Ok(MeshData {
            vertices,
            material_path,
        })
    }
}

/// 每个三角形角点生成一个顶点；没有法线时填 0
///
/// position 和 normal 共用同一套 index（`single_index`）
fn expand_triangles(positions: &[f32], normals: &[f32], indices: &[u32]) -> anyhow::Result<Vec<Vertex>> {
    anyhow::ensure!(indices.len() % 3 == 0, "index count {} is not a multiple of 3", indices.len());
    let has_normals = !normals.is_empty();
    if has_normals {
        anyhow::ensure!(normals.len() == positions.len(), "normal count does not match position count");
    }

    let vertex_count = positions.len() / 3;
    indices
        .iter()
        .map(|&index| -> anyhow::Result<Vertex> {
            let i = index as usize;
            anyhow::ensure!(i < vertex_count, "index {} out of range ({} positions)", i, vertex_count);

            let position = Vec3::from_slice(&positions[i * 3..i * 3 + 3]);
            let normal = if has_normals { Vec3::from_slice(&normals[i * 3..i * 3 + 3]) } else { Vec3::ZERO };
            Ok(Vertex::new(position, normal))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_POSITIONS: [f32; 12] = [
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        1.0, 1.0, 0.0, //
        0.0, 1.0, 0.0,
    ];
    const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

    #[test]
    fn test_expand_one_vertex_per_corner() {
        let vertices = expand_triangles(&QUAD_POSITIONS, &[], &QUAD_INDICES).unwrap();
        assert_eq!(vertices.len(), 6);
        assert_eq!(vertices[2].position, [1.0, 1.0, 0.0, 1.0]);
        assert_eq!(vertices[5].position, [0.0, 1.0, 0.0, 1.0]);
        assert!(vertices.iter().all(|v| v.color == Vertex::DEFAULT_COLOR));
        assert!(vertices.iter().all(|v| v.normal == [0.0; 4]));
    }

    #[test]
    fn test_expand_keeps_normals() {
        let normals = [0.0, 0.0, 1.0].repeat(4);
        let vertices = expand_triangles(&QUAD_POSITIONS, &normals, &QUAD_INDICES).unwrap();
        assert!(vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_expand_rejects_bad_input() {
        assert!(expand_triangles(&QUAD_POSITIONS, &[], &[0, 1]).is_err());
        assert!(expand_triangles(&QUAD_POSITIONS, &[], &[0, 1, 4]).is_err());
        assert!(expand_triangles(&QUAD_POSITIONS, &[0.0, 0.0, 1.0], &QUAD_INDICES).is_err());
    }

    #[test]
    fn test_load_obj_file() {
        let dir = std::env::temp_dir().join(format!("opendom-obj-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("quad.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();

        let mesh = ObjImporter::load(&path).unwrap();
        // 四边形被三角化成两个三角形
        assert_eq!(mesh.vertex_count(), 6);
        assert!(mesh.material_path.is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(ObjImporter::load("/definitely/not/here.obj").is_err());
    }
}
