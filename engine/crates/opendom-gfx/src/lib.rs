//! Vulkan RHI (Rendering Hardware Interface) 抽象层
//!
//! 提供对 Vulkan API 的薄封装：设备、队列、命令缓冲、同步原语、
//! buffer/image、render pass、管线以及交换链。
//! 所有 Vulkan 资源通过 [`gfx::Gfx`] 单例统一访问，简化生命周期和借用关系。
//!
//! 初始化阶段的失败（缺少 GPU 特性、shader 文件不可读等）以 `anyhow::Error` 返回，
//! 由上层决定如何终止进程。

pub mod commands;
pub mod descriptors;
pub mod foundation;
pub mod gfx;
pub mod gfx_core;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
