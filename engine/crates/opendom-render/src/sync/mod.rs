pub mod frame_signals;
pub mod gpu_token;
