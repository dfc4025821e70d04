//! Side-channel server
//!
//! Publishers are reached through one TCP listener per admin. Each topic
//! sender serves its topic URI on it; receivers dial in and get frames.

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::{ConnectionHandle, EndpointServer, SocketHandler};
