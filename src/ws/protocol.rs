//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::map::{Cell, MapDefinition};
use crate::game::world::{NpcAgent, Player};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Request a route between two cells
    Run { from: Cell, to: Cell },

    /// The player picked up a can
    CanCollected,

    /// The player lost a can
    CanRobbed,

    /// Emotes; the payload is relayed untouched and may be absent
    Jump(Option<Value>),
    Dance(Option<Value>),
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Bootstrap sent only to a client that just joined
    InitPlayer {
        map: MapDefinition,
        players: Vec<Player>,
        drunkie: NpcAgent,
        id: Uuid,
    },

    /// Full roster after a join or leave
    Players(Vec<Player>),

    /// A player started a new trip
    Run(Player),

    CanCollected(Player),
    CanRobbed(Player),

    Jump(Value),
    Dance(Value),

    /// The NPC started a new trip
    DrunkieMove(NpcAgent),
}

impl ServerMsg {
    /// Event name as it appears on the wire
    pub fn event(&self) -> &'static str {
        match self {
            ServerMsg::InitPlayer { .. } => "initPlayer",
            ServerMsg::Players(_) => "players",
            ServerMsg::Run(_) => "run",
            ServerMsg::CanCollected(_) => "canCollected",
            ServerMsg::CanRobbed(_) => "canRobbed",
            ServerMsg::Jump(_) => "jump",
            ServerMsg::Dance(_) => "dance",
            ServerMsg::DrunkieMove(_) => "drunkieMove",
        }
    }
}
