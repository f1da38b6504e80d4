pub mod atlas;
pub mod bundle;
pub mod config;
pub mod error;
pub mod extractors;
pub mod format;
pub mod game;
pub mod live;
pub mod sandbox;
pub mod server;
pub mod sprites;
pub mod transform;
pub mod ws;
