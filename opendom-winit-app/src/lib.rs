pub mod app;
pub mod input_state;
pub mod obj_importer;
