//! Streaming Server
//!
//! HTTP routes plus a WebSocket endpoint on which clients open channels and
//! receive plugin output in real time.

mod channel;
mod connection;
mod handler;
mod protocol;
mod router;
mod state;

pub use channel::*;
pub use connection::*;
pub use handler::*;
pub use protocol::*;
pub use router::*;
pub use state::*;
