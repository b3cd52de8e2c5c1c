pub mod framebuffer;
pub mod graphics_pipeline;
pub mod render_pass;
pub mod shader;
