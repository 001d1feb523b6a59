//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id + trace layers)
//!     → request.rs (buffer body, extract host, remote address, principal)
//!     → Gateway::handle (routing, policies, downstream call)
//!     → response.rs (DownstreamResponse → axum Response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{InboundRequest, Principal};
pub use server::HttpServer;
