pub mod fs;
pub mod guard;
