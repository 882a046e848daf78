pub mod app;
pub mod archive;
pub mod cli;
pub mod config;
pub mod journaling;
pub mod pomodoro;
pub mod storage;
pub mod store;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use store::Store;
