//! Multiplexed WebSocket Handler
//!
//! One socket per browser carries any number of conversations. Every message
//! in either direction names its conversation by `id`; answers from different
//! conversations interleave freely on the shared connection.

pub(crate) mod dispatch;
mod handler;
mod protocol;

pub use handler::handle_multiplexed_ws;
pub use protocol::{ClientCommand, InboundMessage, ServerMessage};
