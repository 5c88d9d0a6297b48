//! Chat session I/O — transports and the connection manager.

pub mod bridge;
pub mod cli;
pub mod connection;
pub mod memory;
pub mod transport;

pub use bridge::BridgeTransport;
pub use cli::CliTransport;
pub use connection::{ConnectionManager, ConnectionState, Outbound, ReconnectPolicy};
pub use memory::{MemoryTransport, SentMessage};
pub use transport::{
    ChatClient, EventReceiver, InboundMessage, MessageStream, SessionSpec, Transport,
    TransportEvent,
};
