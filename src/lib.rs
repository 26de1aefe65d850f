pub mod config;
pub mod error;
pub mod geometry;
pub mod robot;
pub mod system;
pub mod tracking;
pub mod vision;
