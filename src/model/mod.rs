pub mod drop_area;
pub mod error;
pub mod loaded_file;
pub mod output;
pub mod settings;
