pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod network;
pub mod server;
pub mod storage;
pub mod types;
