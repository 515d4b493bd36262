//! Resume Gateway - streaming relay between resume uploads and a scoring service
//!
//! This crate provides an HTTP gateway that re-encodes multipart uploads on
//! the fly and relays the scoring service's reply, buffered or streamed.

pub mod config;
pub mod cors;
pub mod error;
pub mod relay;
pub mod server;
pub mod testing;

pub use error::GatewayError;
pub use server::{AppState, GatewayServer, create_router};
