pub mod config;
pub mod overlay;
pub mod progress;
pub mod task;
