use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
/// 相对路径会被拼接到工作区根目录下，绝对路径保持不变。
///
/// # 使用示例
/// ```ignore
/// let model = OpendomPath::assets_path("SpaceShipDetailed.obj"); // assets/SpaceShipDetailed.obj
/// let shader = OpendomPath::shader_path("vertex.spv");          // shaders/vertex.spv
/// ```
pub struct OpendomPath {}
// 核心路径
impl OpendomPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // 当前 crate 位于工作区根目录下的一级子目录
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    /// 将配置中的路径解析为绝对路径
    pub fn resolve(path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() { path.to_path_buf() } else { Self::workspace_path().join(path) }
    }
}
// 根目录下
impl OpendomPath {
    /// 获取 `assets/` 目录下的文件路径
    pub fn assets_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("assets").join(filename)
    }

    /// 获取 `shaders/` 目录下编译好的 SPIR-V
    pub fn shader_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("shaders").join(filename)
    }

    /// 默认配置文件
    pub fn config_path() -> PathBuf {
        Self::workspace_path().join("opendom.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_path_under_workspace() {
        let resolved = OpendomPath::resolve("shaders/vertex.spv");
        assert!(resolved.starts_with(OpendomPath::workspace_path()));
        assert!(resolved.ends_with("shaders/vertex.spv"));
    }

    #[test]
    fn test_resolve_keeps_absolute_path() {
        let abs = OpendomPath::workspace_path().join("x.obj");
        assert_eq!(OpendomPath::resolve(&abs), abs);
    }

    #[test]
    fn test_well_known_paths() {
        assert!(OpendomPath::shader_path("fragment.spv").ends_with("shaders/fragment.spv"));
        assert!(OpendomPath::config_path().ends_with("opendom.toml"));
    }
}
