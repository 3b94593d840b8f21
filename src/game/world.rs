//! Authoritative world record: connected players and the wandering NPC

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::map::Cell;

/// Player state (authoritative)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Connection id of the owning client
    pub id: Uuid,
    #[serde(rename = "name")]
    pub display_name: String,
    /// Start of the most recent trip, or the spawn cell
    pub position: Cell,
    /// Most recent route, set after the first successful move
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Cell>>,
    #[serde(rename = "cansCount")]
    pub resource_count: u32,
}

impl Player {
    pub fn new(id: Uuid, display_name: String, position: Cell) -> Self {
        Self {
            id,
            display_name,
            position,
            path: None,
            resource_count: 0,
        }
    }
}

/// The single non-player agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcAgent {
    pub position: Cell,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Cell>>,
}

impl NpcAgent {
    pub fn new(position: Cell) -> Self {
        Self {
            position,
            path: None,
        }
    }
}

/// All players (in join order) plus the NPC
#[derive(Debug, Clone)]
pub struct WorldState {
    players: Vec<Player>,
    npc: NpcAgent,
}

impl WorldState {
    pub fn new(npc: NpcAgent) -> Self {
        Self {
            players: Vec::new(),
            npc,
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn npc(&self) -> &NpcAgent {
        &self.npc
    }

    /// Add a player. Returns `None` if the id is already taken.
    pub fn add_player(&mut self, player: Player) -> Option<&Player> {
        if self.player(player.id).is_some() {
            return None;
        }
        self.players.push(player);
        self.players.last()
    }

    pub fn remove_player(&mut self, id: Uuid) -> Option<Player> {
        let idx = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(idx))
    }

    /// Record a trip: the player is placed at its start and the route is stored.
    pub fn set_route(&mut self, id: Uuid, from: Cell, path: Vec<Cell>) -> Option<&Player> {
        let player = self.player_mut(id)?;
        player.position = from;
        player.path = Some(path);
        Some(&*player)
    }

    pub fn collect(&mut self, id: Uuid) -> Option<&Player> {
        let player = self.player_mut(id)?;
        player.resource_count = player.resource_count.saturating_add(1);
        Some(&*player)
    }

    /// Take one resource away; never drops below zero.
    pub fn rob(&mut self, id: Uuid) -> Option<&Player> {
        let player = self.player_mut(id)?;
        player.resource_count = player.resource_count.saturating_sub(1);
        Some(&*player)
    }

    pub fn set_npc_route(&mut self, from: Cell, path: Vec<Cell>) -> &NpcAgent {
        self.npc.position = from;
        self.npc.path = Some(path);
        &self.npc
    }
}
