//! Realtime channels over the Phoenix websocket protocol: broadcast,
//! presence and postgres changes.

mod channel;
mod client;
mod error;
pub mod message;
mod presence;

pub use channel::{
    ChannelCallback, ChannelEvent, ChannelInfo, ChannelOptions, ChannelState,
    PostgresChangesFilter,
};
pub use client::{build_websocket_url, RealtimeClient, RealtimeConfig};
pub use error::RealtimeError;
pub use presence::{PresenceChanges, PresenceEvent, PresenceState, Presences};
