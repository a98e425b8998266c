pub mod config;
pub mod logging;

pub mod crypto;
pub mod downloader;
pub mod http;
pub mod playlist;
pub mod progress;
pub mod segment;
