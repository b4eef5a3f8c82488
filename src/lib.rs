//! Portal Assist - streaming chat client and inference proxy for the admin
//! portal assistant.
//!
//! This library provides:
//! - CLI command parsing and a streaming terminal chat
//! - An HTTP proxy that forwards chat turns to the inference service
//! - Configuration loading
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐         ┌─────────────┐
//! │     CLI     │──SSE───▶│  HTTP proxy │──▶ inference service
//! └──────┬──────┘         └──────┬──────┘
//!        │                       │
//!  ┌─────┴─────┐          ┌──────┴──────┐
//!  │ chat-core │          │    Core     │
//!  └───────────┘          └─────────────┘
//! ```
//!
//! The streaming aggregation itself (frame decoding, chunk interpretation,
//! message reduction, turn lifecycle) lives in the `chat-core` crate.

pub mod api;
pub mod cli;
pub mod config;
pub mod core;

pub use config::Config;
