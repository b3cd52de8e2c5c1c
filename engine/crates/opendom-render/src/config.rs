use std::path::{Path, PathBuf};

use anyhow::Context;
use opendom_crate_tools::resource::OpendomPath;

/// 渲染器的所有可调参数
///
/// 可以由 toml 文件覆盖，缺省字段使用默认值
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub app_name: String,
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,

    /// acquire 的超时时间，超时后跳过本帧
    pub acquire_timeout_ns: u64,
    /// 等待目标 image 上一帧完成的超时时间，超时后跳过本帧
    pub image_fence_timeout_ns: u64,

    /// 交换链 image 数量上限，超过属于配置错误
    pub max_swapchain_images: usize,

    pub initial_entity_capacity: usize,
    pub entity_growth: usize,
    pub initial_instance_capacity: usize,
    pub instance_growth: usize,

    /// staging buffer 能容纳的顶点数
    pub staging_vertex_capacity: usize,

    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    /// 启动时加载的 obj 模型
    pub model_path: PathBuf,

    /// 支持时使用 IMMEDIATE，否则 MAILBOX，最后 FIFO
    pub prefer_immediate_present: bool,
    pub enable_validation: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "opendom".to_string(),
            window_title: "OpenDom".to_string(),
            window_width: 1280,
            window_height: 720,

            acquire_timeout_ns: 100_000_000,
            image_fence_timeout_ns: 100_000,

            max_swapchain_images: 8,

            initial_entity_capacity: 128,
            entity_growth: 512,
            initial_instance_capacity: 64,
            instance_growth: 64,

            staging_vertex_capacity: 500_000,

            vertex_shader: PathBuf::from("shaders/vertex.spv"),
            fragment_shader: PathBuf::from("shaders/fragment.spv"),
            model_path: PathBuf::from("assets/SpaceShipDetailed.obj"),

            prefer_immediate_present: true,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl RendererConfig {
    /// 文件不存在时使用默认值；文件存在但内容非法属于配置错误
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.entity_growth > 0, "entity_growth must be positive");
        anyhow::ensure!(self.instance_growth > 0, "instance_growth must be positive");
        // instance buffer 在第一次同步时按初始容量分配，不能为 0
        anyhow::ensure!(self.initial_instance_capacity > 0, "initial_instance_capacity must be positive");
        anyhow::ensure!(self.staging_vertex_capacity > 0, "staging_vertex_capacity must be positive");
        anyhow::ensure!(self.max_swapchain_images >= 2, "max_swapchain_images must be at least 2");
        Ok(())
    }

    #[inline]
    pub fn vertex_shader_path(&self) -> PathBuf {
        OpendomPath::resolve(&self.vertex_shader)
    }

    #[inline]
    pub fn fragment_shader_path(&self) -> PathBuf {
        OpendomPath::resolve(&self.fragment_shader)
    }

    #[inline]
    pub fn model_path(&self) -> PathBuf {
        OpendomPath::resolve(&self.model_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.max_swapchain_images, 8);
        assert_eq!(config.initial_entity_capacity, 128);
        assert_eq!(config.entity_growth, 512);
        assert_eq!(config.initial_instance_capacity, 64);
        assert_eq!(config.instance_growth, 64);
        assert_eq!(config.staging_vertex_capacity, 500_000);
        assert_eq!(config.acquire_timeout_ns, 100_000_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml(
            r#"
            window_title = "viewer"
            instance_growth = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.window_title, "viewer");
        assert_eq!(config.instance_growth, 16);
        assert_eq!(config.entity_growth, 512);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(RendererConfig::from_toml("instance_growth = 0").is_err());
        assert!(RendererConfig::from_toml("max_swapchain_images = \"many\"").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = RendererConfig::load_or_default("/definitely/not/here/opendom.toml").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_shader_paths_resolved() {
        let config = RendererConfig::default();
        assert!(config.vertex_shader_path().is_absolute());
        assert!(config.fragment_shader_path().ends_with("shaders/fragment.spv"));
        assert!(config.model_path().ends_with("assets/SpaceShipDetailed.obj"));
    }
}
