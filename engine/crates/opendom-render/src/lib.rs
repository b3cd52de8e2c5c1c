//! OpenDom 渲染核心
//!
//! - [`present_chain`]: 交换链、深度缓冲、framebuffer、描述符与管线，失效时整体重建
//! - [`frame_sync`]: acquire / wait / submit / present 的帧状态机
//! - [`entity_store`] 与 [`instance_sync`]: 实例数组的增长以及脏区间上传
//! - [`mesh_upload`]: 通过共享 staging buffer 串行上传顶点数据
//! - [`command_list`]: 每张交换链图像一份缓存的绘制命令
//! - [`render_state`]: 驱动循环使用的入口

pub mod camera;
pub mod command_list;
pub mod config;
pub mod entity_store;
mod frame_backend;
pub mod frame_sync;
pub mod instance_sync;
pub mod mesh_upload;
pub mod present_chain;
pub mod render_state;
pub mod sync;
pub mod uniforms;
pub mod vertex_input;
