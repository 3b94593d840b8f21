//! World task: applies client intents to the world state and broadcasts results
//!
//! A single task owns all mutable state. Inputs arrive over an mpsc channel
//! and the NPC wander tick comes from one interval owned by the same task, so
//! every step runs to completion before the next one starts and the NPC ticks
//! once per period no matter how many clients are connected.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, ServerMsg};
use crate::ws::registry::ClientRegistry;

use super::grid::Grid;
use super::map::{Cell, MapDefinition};
use super::names::random_name;
use super::pathfinding::{PathError, PathFinder};
use super::spawn::{SpawnError, SpawnSampler};
use super::world::{NpcAgent, Player, WorldState};
use super::{InputEvent, PlayerInput};

/// Why an intent produced no state change
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("unknown player {0}")]
    UnknownPlayer(Uuid),

    #[error("player {0} already joined")]
    AlreadyJoined(Uuid),

    #[error(transparent)]
    NoPath(#[from] PathError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Cloneable handle to the running world task
#[derive(Clone)]
pub struct WorldHandle {
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub clients: Arc<ClientRegistry>,
    player_count: Arc<AtomicUsize>,
}

impl WorldHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}

/// The authoritative world
pub struct WorldSync {
    map: Arc<MapDefinition>,
    grid: Arc<Grid>,
    state: WorldState,
    finder: PathFinder,
    sampler: SpawnSampler,
    rng: ChaCha8Rng,
    input_rx: mpsc::Receiver<PlayerInput>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    clients: Arc<ClientRegistry>,
    player_count: Arc<AtomicUsize>,
}

impl WorldSync {
    /// Build the grid, place the NPC and wire up channels.
    pub fn new(map: MapDefinition, seed: u64) -> Result<(Self, WorldHandle), SpawnError> {
        let grid = Grid::build(&map);
        let sampler = SpawnSampler::default();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let npc = NpcAgent::new(sampler.sample(&map, &grid, &mut rng)?);
        debug!(
            width = grid.width(),
            height = grid.height(),
            walkable = grid.walkable_count(),
            "Grid built"
        );

        Ok(Self::from_parts(map, grid, npc, rng))
    }

    fn from_parts(
        map: MapDefinition,
        grid: Grid,
        npc: NpcAgent,
        rng: ChaCha8Rng,
    ) -> (Self, WorldHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(256);
        let clients = Arc::new(ClientRegistry::new());
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = WorldHandle {
            input_tx,
            clients: clients.clone(),
            player_count: player_count.clone(),
        };

        let world = Self {
            map: Arc::new(map),
            grid: Arc::new(grid),
            state: WorldState::new(npc),
            finder: PathFinder::new(),
            sampler: SpawnSampler::default(),
            rng,
            input_rx,
            broadcast_tx,
            clients,
            player_count,
        };

        (world, handle)
    }

    #[cfg(test)]
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Observe every broadcast from now on, as a long-connected client would.
    #[cfg(test)]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.broadcast_tx.subscribe()
    }

    /// Run until every input sender is dropped.
    pub async fn run(mut self, wander_every: Duration) {
        info!(
            players = self.state.player_count(),
            wander_ms = wander_every.as_millis() as u64,
            "World started"
        );

        let mut wander = interval_at(Instant::now() + wander_every, wander_every);
        wander.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                input = self.input_rx.recv() => match input {
                    Some(input) => self.handle(input),
                    None => break,
                },
                _ = wander.tick() => self.wander_tick(),
            }
        }

        info!("World stopped");
    }

    /// Apply one input. Failures are logged and dropped; clients just see no broadcast.
    pub fn handle(&mut self, input: PlayerInput) {
        let conn_id = input.conn_id;
        let result = match input.event {
            InputEvent::Joined { events } => self.join(conn_id).map(|rx| {
                // The connection may have closed while waiting
                let _ = events.send(rx);
            }),
            InputEvent::Left => self.leave(conn_id),
            InputEvent::Msg(ClientMsg::Run { from, to }) => self.run_to(conn_id, from, to),
            InputEvent::Msg(ClientMsg::CanCollected) => self.collect(conn_id),
            InputEvent::Msg(ClientMsg::CanRobbed) => self.rob(conn_id),
            InputEvent::Msg(ClientMsg::Jump(payload)) => {
                self.emit_all(ServerMsg::Jump(payload.unwrap_or_default()));
                Ok(())
            }
            InputEvent::Msg(ClientMsg::Dance(payload)) => {
                self.emit_all(ServerMsg::Dance(payload.unwrap_or_default()));
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(IntentError::Spawn(e)) => {
                warn!(conn_id = %conn_id, error = %e, "Could not spawn player");
            }
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "Intent dropped");
            }
        }
    }

    /// Spawn a player, bootstrap its client, and tell everyone.
    ///
    /// The returned subscription starts right after `initPlayer` is queued,
    /// so the joiner never sees an event the bootstrap already covers.
    pub fn join(
        &mut self,
        conn_id: Uuid,
    ) -> Result<broadcast::Receiver<ServerMsg>, IntentError> {
        if self.state.player(conn_id).is_some() {
            return Err(IntentError::AlreadyJoined(conn_id));
        }

        let position = self.sampler.sample(&self.map, &self.grid, &mut self.rng)?;
        let name = random_name(&mut self.rng);
        self.state
            .add_player(Player::new(conn_id, name, position))
            .ok_or(IntentError::AlreadyJoined(conn_id))?;
        self.sync_player_count();

        self.clients.send_to(
            &conn_id,
            ServerMsg::InitPlayer {
                map: self.map.as_ref().clone(),
                players: self.state.players().to_vec(),
                drunkie: self.state.npc().clone(),
                id: conn_id,
            },
        );
        let events = self.broadcast_tx.subscribe();
        self.emit_all(ServerMsg::Players(self.state.players().to_vec()));

        info!(
            conn_id = %conn_id,
            x = position.x(),
            y = position.y(),
            player_count = self.state.player_count(),
            "Player joined"
        );
        Ok(events)
    }

    pub fn leave(&mut self, conn_id: Uuid) -> Result<(), IntentError> {
        self.state
            .remove_player(conn_id)
            .ok_or(IntentError::UnknownPlayer(conn_id))?;
        self.sync_player_count();

        self.emit_all(ServerMsg::Players(self.state.players().to_vec()));

        info!(
            conn_id = %conn_id,
            player_count = self.state.player_count(),
            "Player left"
        );
        Ok(())
    }

    /// `from` is taken as given; only the route between the two cells is checked.
    pub fn run_to(&mut self, conn_id: Uuid, from: Cell, to: Cell) -> Result<(), IntentError> {
        if self.state.player(conn_id).is_none() {
            return Err(IntentError::UnknownPlayer(conn_id));
        }

        let path = self.finder.find_path(&self.grid, from, to)?;
        let player = self
            .state
            .set_route(conn_id, from, path)
            .ok_or(IntentError::UnknownPlayer(conn_id))?
            .clone();

        self.emit_all(ServerMsg::Run(player));
        Ok(())
    }

    pub fn collect(&mut self, conn_id: Uuid) -> Result<(), IntentError> {
        let player = self
            .state
            .collect(conn_id)
            .ok_or(IntentError::UnknownPlayer(conn_id))?
            .clone();

        self.emit_all(ServerMsg::CanCollected(player));
        Ok(())
    }

    pub fn rob(&mut self, conn_id: Uuid) -> Result<(), IntentError> {
        let player = self
            .state
            .rob(conn_id)
            .ok_or(IntentError::UnknownPlayer(conn_id))?
            .clone();

        self.emit_all(ServerMsg::CanRobbed(player));
        Ok(())
    }

    /// Pick a random destination for the NPC and start it walking there.
    ///
    /// The NPC's position stays at the start of the new trip.
    pub fn wander(&mut self) -> Result<(), IntentError> {
        let from = self.state.npc().position;
        let to = self.sampler.sample(&self.map, &self.grid, &mut self.rng)?;
        let path = self.finder.find_path(&self.grid, from, to)?;

        let npc = self.state.set_npc_route(from, path).clone();
        self.emit_all(ServerMsg::DrunkieMove(npc));
        Ok(())
    }

    fn wander_tick(&mut self) {
        if let Err(e) = self.wander() {
            debug!(error = %e, "Wander tick skipped");
        }
    }

    fn emit_all(&self, msg: ServerMsg) {
        // No receivers just means nobody is connected
        let _ = self.broadcast_tx.send(msg);
    }

    fn sync_player_count(&self) {
        self.player_count
            .store(self.state.player_count(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::Obstacle;
    use serde_json::json;
    use tokio::sync::oneshot;
    use tokio_test::{assert_err, assert_ok};

    /// 6x6 grid with no obstacles
    fn open_map() -> MapDefinition {
        MapDefinition {
            size: [3, 3],
            grid_division: 2,
            obstacles: Vec::new(),
        }
    }

    fn world(map: MapDefinition) -> (WorldSync, WorldHandle) {
        WorldSync::new(map, 1234).unwrap()
    }

    fn connect(world: &mut WorldSync, handle: &WorldHandle) -> (Uuid, mpsc::Receiver<ServerMsg>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(16);
        handle.clients.register(id, tx);
        let _events = assert_ok!(world.join(id));
        (id, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn intent(conn_id: Uuid, msg: ClientMsg) -> PlayerInput {
        PlayerInput {
            conn_id,
            event: InputEvent::Msg(msg),
        }
    }

    #[test]
    fn npc_starts_on_walkable_cell() {
        let (world, _handle) = world(MapDefinition::yard());
        let grid = Grid::build(&MapDefinition::yard());
        assert!(grid.is_walkable(world.state().npc().position));
        assert!(world.state().npc().path.is_none());
    }

    #[test]
    fn join_bootstraps_client_and_broadcasts_roster() {
        let (mut world, handle) = world(MapDefinition::yard());
        let mut all = world.subscribe();

        let (a, mut direct_a) = connect(&mut world, &handle);

        match direct_a.try_recv().unwrap() {
            ServerMsg::InitPlayer {
                map,
                players,
                drunkie,
                id,
            } => {
                assert_eq!(id, a);
                assert_eq!(map, MapDefinition::yard());
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].resource_count, 0);
                assert_eq!(&drunkie, world.state().npc());
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(
            drain(&mut all),
            vec![ServerMsg::Players(world.state().players().to_vec())]
        );

        let (b, mut direct_b) = connect(&mut world, &handle);

        assert!(direct_a.try_recv().is_err());
        assert!(matches!(direct_b.try_recv(), Ok(ServerMsg::InitPlayer { id, .. }) if id == b));
        match drain(&mut all).as_slice() {
            [ServerMsg::Players(roster)] => {
                let ids: Vec<Uuid> = roster.iter().map(|p| p.id).collect();
                assert_eq!(ids, vec![a, b]);
            }
            other => panic!("unexpected broadcasts {other:?}"),
        }
        assert_eq!(handle.player_count(), 2);
    }

    #[test]
    fn joiner_sees_nothing_older_than_its_bootstrap() {
        let (mut world, handle) = world(open_map());
        let (a, _direct_a) = connect(&mut world, &handle);

        // B's connection is up, but its join is queued behind other activity
        let b = Uuid::new_v4();
        let (tx, mut direct_b) = mpsc::channel(16);
        handle.clients.register(b, tx);
        let (events, mut reply) = oneshot::channel();

        let p0 = world.state().player(a).unwrap().position;
        let p1 = if p0 == Cell(5, 5) { Cell(0, 0) } else { Cell(5, 5) };
        world.handle(intent(a, ClientMsg::Run { from: p0, to: p1 }));
        world.wander_tick();
        assert!(direct_b.try_recv().is_err());

        world.handle(PlayerInput {
            conn_id: b,
            event: InputEvent::Joined { events },
        });

        match direct_b.try_recv() {
            Ok(ServerMsg::InitPlayer { id, players, drunkie, .. }) => {
                assert_eq!(id, b);
                // The snapshot already carries the earlier run and wander
                assert!(players.iter().any(|p| p.id == a && p.path.is_some()));
                assert!(drunkie.path.is_some());
            }
            other => panic!("unexpected first frame {other:?}"),
        }
        let mut events_b = reply.try_recv().unwrap();
        assert_eq!(
            drain(&mut events_b),
            vec![ServerMsg::Players(world.state().players().to_vec())]
        );

        assert_ok!(world.collect(a));
        assert!(matches!(events_b.try_recv(), Ok(ServerMsg::CanCollected(p)) if p.id == a));
    }

    #[test]
    fn rejected_join_sends_no_subscription() {
        let (mut world, handle) = world(open_map());
        let (a, _direct) = connect(&mut world, &handle);
        let (events, mut reply) = oneshot::channel();

        world.handle(PlayerInput {
            conn_id: a,
            event: InputEvent::Joined { events },
        });

        assert!(matches!(
            reply.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn spawned_players_stand_on_walkable_cells() {
        let (mut world, handle) = world(MapDefinition::yard());
        let grid = Grid::build(&MapDefinition::yard());

        for _ in 0..20 {
            connect(&mut world, &handle);
        }

        assert!(world
            .state()
            .players()
            .iter()
            .all(|p| grid.is_walkable(p.position)));
    }

    #[test]
    fn duplicate_join_is_ignored() {
        let (mut world, handle) = world(open_map());
        let (a, _direct) = connect(&mut world, &handle);
        let mut all = world.subscribe();

        assert!(matches!(world.join(a), Err(IntentError::AlreadyJoined(id)) if id == a));
        assert!(drain(&mut all).is_empty());
        assert_eq!(world.state().player_count(), 1);
    }

    #[test]
    fn spawn_exhaustion_adds_nobody() {
        let map = MapDefinition {
            size: [2, 2],
            grid_division: 1,
            obstacles: vec![Obstacle::new([2, 2], Cell(0, 0), 0)],
        };
        let grid = Grid::build(&map);
        let (mut world, _handle) = WorldSync::from_parts(
            map,
            grid,
            NpcAgent::new(Cell(0, 0)),
            ChaCha8Rng::seed_from_u64(9),
        );
        let mut all = world.subscribe();

        let err = assert_err!(world.join(Uuid::new_v4()));
        assert!(matches!(err, IntentError::Spawn(SpawnError::Exhausted { attempts: 100 })));
        assert_eq!(world.state().player_count(), 0);
        assert!(drain(&mut all).is_empty());
    }

    #[test]
    fn leave_broadcasts_remaining_roster() {
        let (mut world, handle) = world(open_map());
        let (a, _da) = connect(&mut world, &handle);
        let (b, _db) = connect(&mut world, &handle);
        let mut all = world.subscribe();

        world.handle(PlayerInput {
            conn_id: a,
            event: InputEvent::Left,
        });

        match drain(&mut all).as_slice() {
            [ServerMsg::Players(roster)] => {
                assert_eq!(roster.len(), 1);
                assert_eq!(roster[0].id, b);
            }
            other => panic!("unexpected broadcasts {other:?}"),
        }
        assert_eq!(handle.player_count(), 1);

        // Second leave for the same id does nothing
        assert!(matches!(world.leave(a), Err(IntentError::UnknownPlayer(_))));
        assert!(drain(&mut all).is_empty());
        assert_eq!(world.state().player_count(), 1);
    }

    #[test]
    fn run_broadcasts_route_from_trip_start() {
        let (mut world, handle) = world(open_map());
        let (a, _direct) = connect(&mut world, &handle);
        let mut all = world.subscribe();

        let p0 = world.state().player(a).unwrap().position;
        let p1 = if p0 == Cell(5, 5) { Cell(0, 0) } else { Cell(5, 5) };

        world.handle(intent(a, ClientMsg::Run { from: p0, to: p1 }));

        match drain(&mut all).as_slice() {
            [ServerMsg::Run(player)] => {
                assert_eq!(player.id, a);
                assert_eq!(player.position, p0);
                let path = player.path.as_ref().unwrap();
                assert_eq!(path.first(), Some(&p0));
                assert_eq!(path.last(), Some(&p1));
            }
            other => panic!("unexpected broadcasts {other:?}"),
        }
        assert_eq!(world.state().player(a).unwrap().position, p0);
    }

    #[test]
    fn run_trusts_client_start() {
        let (mut world, handle) = world(open_map());
        let (a, _direct) = connect(&mut world, &handle);

        assert_ok!(world.run_to(a, Cell(0, 5), Cell(0, 4)));

        let player = world.state().player(a).unwrap();
        assert_eq!(player.position, Cell(0, 5));
        assert_eq!(player.path, Some(vec![Cell(0, 5), Cell(0, 4)]));
    }

    #[test]
    fn unreachable_run_is_dropped_silently() {
        let (mut world, handle) = world(MapDefinition::yard());
        let (a, _direct) = connect(&mut world, &handle);
        let before = world.state().player(a).unwrap().clone();
        let mut all = world.subscribe();

        // Inside the fenced pen
        world.handle(intent(
            a,
            ClientMsg::Run {
                from: Cell(1, 1),
                to: Cell(9, 9),
            },
        ));
        // Onto the fence itself
        world.handle(intent(
            a,
            ClientMsg::Run {
                from: Cell(1, 1),
                to: Cell(0, 0),
            },
        ));

        assert!(drain(&mut all).is_empty());
        assert_eq!(world.state().player(a), Some(&before));
    }

    #[test]
    fn resource_counts() {
        let (mut world, handle) = world(open_map());
        let (a, _direct) = connect(&mut world, &handle);
        let mut all = world.subscribe();

        for _ in 0..3 {
            world.handle(intent(a, ClientMsg::CanRobbed));
        }
        world.handle(intent(a, ClientMsg::CanCollected));
        world.handle(intent(a, ClientMsg::CanCollected));
        world.handle(intent(a, ClientMsg::CanRobbed));

        let counts: Vec<(&str, u32)> = drain(&mut all)
            .into_iter()
            .map(|msg| match msg {
                ServerMsg::CanRobbed(p) => ("robbed", p.resource_count),
                ServerMsg::CanCollected(p) => ("collected", p.resource_count),
                other => panic!("unexpected broadcast {other:?}"),
            })
            .collect();

        assert_eq!(
            counts,
            vec![
                ("robbed", 0),
                ("robbed", 0),
                ("robbed", 0),
                ("collected", 1),
                ("collected", 2),
                ("robbed", 1),
            ]
        );
    }

    #[test]
    fn unknown_player_intents_are_noops() {
        let (mut world, handle) = world(open_map());
        let (_a, _direct) = connect(&mut world, &handle);
        let mut all = world.subscribe();
        let ghost = Uuid::new_v4();

        world.handle(intent(ghost, ClientMsg::CanCollected));
        world.handle(intent(ghost, ClientMsg::CanRobbed));
        world.handle(intent(
            ghost,
            ClientMsg::Run {
                from: Cell(0, 0),
                to: Cell(1, 1),
            },
        ));
        world.handle(PlayerInput {
            conn_id: ghost,
            event: InputEvent::Left,
        });

        assert!(drain(&mut all).is_empty());
        assert_eq!(world.state().player_count(), 1);
    }

    #[test]
    fn emotes_are_relayed_verbatim() {
        let (mut world, handle) = world(open_map());
        let (a, _direct) = connect(&mut world, &handle);
        let before = world.state().players().to_vec();
        let mut all = world.subscribe();

        let payload = json!({ "id": a, "anything": [1, 2, 3] });
        world.handle(intent(a, ClientMsg::Jump(Some(payload.clone()))));
        world.handle(intent(a, ClientMsg::Dance(Some(json!("solo")))));
        world.handle(intent(a, ClientMsg::Jump(None)));

        assert_eq!(
            drain(&mut all),
            vec![
                ServerMsg::Jump(payload),
                ServerMsg::Dance(json!("solo")),
                ServerMsg::Jump(serde_json::Value::Null),
            ]
        );
        assert_eq!(world.state().players(), before.as_slice());
    }

    #[test]
    fn wander_keeps_npc_at_trip_start() {
        let (mut world, _handle) = world(open_map());
        let mut all = world.subscribe();
        let start = world.state().npc().position;

        assert_ok!(world.wander());

        match drain(&mut all).as_slice() {
            [ServerMsg::DrunkieMove(npc)] => {
                assert_eq!(npc.position, start);
                let path = npc.path.as_ref().unwrap();
                assert_eq!(path.first(), Some(&start));
            }
            other => panic!("unexpected broadcasts {other:?}"),
        }
        assert_eq!(world.state().npc().position, start);
    }

    #[test]
    fn wander_skips_unreachable_targets() {
        // Row of five cells with a post at x=1: only (0, 0) is reachable from the NPC.
        let map = MapDefinition {
            size: [5, 1],
            grid_division: 1,
            obstacles: vec![Obstacle::new([1, 1], Cell(1, 0), 0)],
        };
        let grid = Grid::build(&map);
        let (mut world, _handle) = WorldSync::from_parts(
            map,
            grid,
            NpcAgent::new(Cell(0, 0)),
            ChaCha8Rng::seed_from_u64(77),
        );
        let mut all = world.subscribe();

        let mut moved = 0;
        let mut skipped = 0;
        for _ in 0..60 {
            match world.wander() {
                Ok(()) => moved += 1,
                Err(IntentError::NoPath(_)) => skipped += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }

        let moves = drain(&mut all);
        assert_eq!(moves.len(), moved);
        assert!(moved > 0 && skipped > 0);
        for msg in moves {
            assert_eq!(
                msg,
                ServerMsg::DrunkieMove(NpcAgent {
                    position: Cell(0, 0),
                    path: Some(vec![Cell(0, 0)]),
                })
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn npc_ticks_once_per_period_regardless_of_players() {
        let (world, handle) = world(open_map());
        let mut all = world.subscribe();
        let period = Duration::from_secs(4);
        let task = tokio::spawn(world.run(period));

        for _ in 0..3 {
            let (events, _rx) = oneshot::channel();
            handle
                .input_tx
                .send(PlayerInput {
                    conn_id: Uuid::new_v4(),
                    event: InputEvent::Joined { events },
                })
                .await
                .unwrap();
        }

        tokio::time::sleep(period * 3 + Duration::from_millis(1)).await;

        let received = drain(&mut all);
        let rosters = received
            .iter()
            .filter(|m| matches!(m, ServerMsg::Players(_)))
            .count();
        let moves = received
            .iter()
            .filter(|m| matches!(m, ServerMsg::DrunkieMove(_)))
            .count();

        assert_eq!(rosters, 3);
        assert_eq!(moves, 3);
        assert_eq!(handle.player_count(), 3);

        task.abort();
    }
}
