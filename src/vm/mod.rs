pub mod bridge;
pub mod controller;
