pub mod config;
pub mod file_system;
pub mod host_bridge;
pub mod logger;
pub mod output;
