//! Game simulation modules

pub mod grid;
pub mod map;
pub mod names;
pub mod pathfinding;
pub mod spawn;
pub mod sync;
pub mod world;

pub use sync::{WorldHandle, WorldSync};

use crate::ws::protocol::{ClientMsg, ServerMsg};
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

/// Something a connection did, routed to the world task
#[derive(Debug)]
pub enum InputEvent {
    /// Connection established. Once the player exists and its bootstrap is
    /// queued, the world replies with a broadcast subscription that only
    /// sees events from that point on.
    Joined {
        events: oneshot::Sender<broadcast::Receiver<ServerMsg>>,
    },
    /// Connection closed
    Left,
    /// Client intent
    Msg(ClientMsg),
}

/// Input received from a WebSocket connection
#[derive(Debug)]
pub struct PlayerInput {
    pub conn_id: Uuid,
    pub event: InputEvent,
}
