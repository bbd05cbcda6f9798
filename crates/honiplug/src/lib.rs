//! HoniPlug - Plugin host server
//!
//! This crate wires the plugin runtime into a network service:
//! - Layered configuration (defaults, TOML file, environment)
//! - Static credential table for authenticated endpoints
//! - WebSocket streaming endpoint carrying plugin output channels
//! - HTTP routes for content ingest and server administration

// Configuration
pub mod config;

// Credentials and roles
pub mod auth;

// HTTP API errors
pub mod error;

// Administrative actions
pub mod admin;

// HTTP and WebSocket server
pub mod server;
