//! Spectator WebSocket client for the game's room protocol.

pub mod close_codes;
pub mod connection;
pub mod listener;
pub mod reconnect;
pub mod url;

pub use connection::{ConnectionEvent, ConnectionOptions, ConnectionStatus, GameConnection};
pub use listener::SpriteSyncListener;
pub use reconnect::{reconnect_delay, should_reconnect};
