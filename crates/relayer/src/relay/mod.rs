//! WebSocket relay: connection registry and broadcast-except-sender fan-out.

mod connection;
mod frame;
mod hub;
pub mod session;

pub use connection::{Connection, ConnectionId, DeliveryError, Outlet};
pub use frame::Frame;
pub use hub::{Hub, HubStats};
