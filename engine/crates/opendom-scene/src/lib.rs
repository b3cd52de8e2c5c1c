//! 场景数据层
//!
//! 这里的类型全部与 GPU 无关：顶点与实例的内存布局和 shader 保持一致，
//! 容器负责容量增长与脏区间合并，上传逻辑由 render 层完成。

pub mod dirty_ranges;
pub mod growable;
pub mod id_sequence;
pub mod instance;
pub mod mesh;
pub mod vertex;
