//! Live game state relayed from the room socket. Shop and weather views are
//! plain reducers over `Welcome` / `PartialState` messages; [`LiveHub`] holds
//! the current state and fans changes out to subscribers.

pub mod hub;
pub mod patch;
pub mod shop;
pub mod weather;

pub use hub::{LiveEvent, LiveHub};
pub use patch::{LiveMessage, PatchOp, StatePatch};
