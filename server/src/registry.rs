//! Room registry: the single owner of live sessions and live rooms
//!
//! All room and session mutation goes through [`RegistryState`], which is only
//! ever reached through the one mutex inside [`Registry`]. Inputs, joins and
//! ticks therefore never observe a half-updated room, and a player's velocity
//! can't change in the middle of a tick.

use crate::config::ServerConfig;
use crate::room_code;
use crate::session::{outbound_queue, Assignment, Session, SessionId};
use crate::tick::{self, Simulation, SnakeRules};
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    velocity_for_key, ClientMessage, Game, Outcome, ServerMessage, Slot, PLAYER_ONE, PLAYER_TWO,
};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Lifecycle of a room. A room only ever moves from waiting to running; it is
/// removed from the registry rather than entering a finished state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Created, waiting for the second player
    Waiting,
    /// Both slots filled and the tick driver started
    Running,
}

/// A live game plus the sessions seated in it
#[derive(Debug)]
pub struct Room {
    /// Distinguishes this room from any earlier room that held the same code
    pub generation: u64,
    pub game: Game,
    pub members: BTreeMap<Slot, SessionId>,
    pub phase: RoomPhase,
}

/// Result of a join request, after the reply has been queued to the requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The requester now holds slot 2. `start_driver` is true for exactly
    /// one join per room.
    Joined {
        code: String,
        generation: u64,
        start_driver: bool,
    },
    UnknownCode,
    TooManyPlayers,
    /// The requester already has a room; nothing changed
    AlreadyAssigned,
    UnknownSession,
}

/// What one tick did to a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickStatus {
    Continuing,
    /// The game ended and the room was removed
    Finished { winner: String },
    /// The room no longer exists, or the code now names a different room
    Vanished,
}

/// Read-only summary of a room for operators and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub code: String,
    pub generation: u64,
    pub phase: RoomPhase,
    pub members: BTreeMap<Slot, SessionId>,
    pub game: Game,
}

/// Registry state proper. Plain data with no locking of its own.
#[derive(Debug)]
pub struct RegistryState {
    sessions: HashMap<SessionId, Session>,
    rooms: HashMap<String, Room>,
    next_session_id: SessionId,
    next_generation: u64,
    grid_size: i32,
    code_length: usize,
}

impl RegistryState {
    pub fn new(grid_size: i32, code_length: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            rooms: HashMap::new(),
            next_session_id: 1,
            next_generation: 1,
            grid_size,
            code_length,
        }
    }

    /// Adds a session whose outbound queue feeds `outbound`.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id += 1;

        self.sessions.insert(id, Session::new(id, addr, outbound));
        info!("Session {} connected from {}", id, addr);
        id
    }

    /// Removes a session and vacates its room slot. Dropping the session
    /// drops its queue sender, which lets the writer loop finish. A room
    /// left without members is destroyed. Returns false if the session was
    /// already gone.
    pub fn deregister(&mut self, id: SessionId) -> bool {
        let Some(session) = self.sessions.remove(&id) else {
            return false;
        };
        info!(
            "Session {} from {} disconnected after {:?}",
            id,
            session.addr,
            session.connected_at.elapsed()
        );

        if let Some(assignment) = session.assignment() {
            let now_empty = match self.rooms.get_mut(&assignment.code) {
                Some(room) => {
                    room.members.remove(&assignment.slot);
                    room.members.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.rooms.remove(&assignment.code);
                info!("Room {} removed, no players left", assignment.code);
            }
        }
        true
    }

    /// Creates a room with the requester in slot 1 and replies with its
    /// code. Returns `None` for unknown or already-assigned sessions.
    pub fn create_room<R: Rng + ?Sized>(
        &mut self,
        id: SessionId,
        client: Option<String>,
        rng: &mut R,
    ) -> Option<String> {
        let session = self.sessions.get(&id)?;
        if session.is_assigned() {
            warn!("Session {} asked for a new game while already in a room", id);
            return None;
        }

        let rooms = &self.rooms;
        let code = room_code::generate_unique(rng, self.code_length, |c| rooms.contains_key(c));
        let identity = client.unwrap_or_else(|| id.to_string());

        let mut game = Game::new(self.grid_size, rng);
        game.seat(PLAYER_ONE, identity.clone(), rng);

        let mut members = BTreeMap::new();
        members.insert(PLAYER_ONE, id);
        let generation = self.next_generation;
        self.next_generation += 1;
        self.rooms.insert(
            code.clone(),
            Room {
                generation,
                game,
                members,
                phase: RoomPhase::Waiting,
            },
        );

        let session = self.sessions.get_mut(&id)?;
        session.assign(Assignment {
            code: code.clone(),
            slot: PLAYER_ONE,
            identity,
        });
        session.send(ServerMessage::GameCode(code.clone()));

        info!("Session {} created room {}", id, code);
        Some(code)
    }

    /// Seats the requester in slot 2 of room `code`, or replies with the
    /// reason it can't. Rejections leave every room and session untouched.
    pub fn join_room<R: Rng + ?Sized>(
        &mut self,
        id: SessionId,
        client: Option<String>,
        code: &str,
        rng: &mut R,
    ) -> JoinOutcome {
        let Some(session) = self.sessions.get_mut(&id) else {
            return JoinOutcome::UnknownSession;
        };
        if session.is_assigned() {
            warn!("Session {} asked to join {} while already in a room", id, code);
            return JoinOutcome::AlreadyAssigned;
        }

        let Some(room) = self.rooms.get_mut(code) else {
            debug!("Session {} tried unknown room code {}", id, code);
            session.send(ServerMessage::UnknownCode);
            return JoinOutcome::UnknownCode;
        };
        if room.members.contains_key(&PLAYER_TWO) || room.game.is_full() {
            debug!("Session {} turned away from full room {}", id, code);
            session.send(ServerMessage::TooManyPlayers);
            return JoinOutcome::TooManyPlayers;
        }

        let identity = client.unwrap_or_else(|| id.to_string());
        room.game.seat(PLAYER_TWO, identity.clone(), rng);
        room.members.insert(PLAYER_TWO, id);

        let start_driver = room.phase == RoomPhase::Waiting;
        room.phase = RoomPhase::Running;

        session.assign(Assignment {
            code: code.to_string(),
            slot: PLAYER_TWO,
            identity,
        });
        session.send(ServerMessage::GameCode(code.to_string()));

        info!("Session {} joined room {}", id, code);
        JoinOutcome::Joined {
            code: code.to_string(),
            generation: room.generation,
            start_driver,
        }
    }

    /// Turns a key press into a velocity change for the requester's player.
    /// Ignored unless the requester sits in a running room. Returns whether
    /// a velocity changed.
    pub fn apply_input(&mut self, id: SessionId, key: i64) -> bool {
        let Some(assignment) = self.sessions.get(&id).and_then(Session::assignment) else {
            debug!("Ignoring input from unassigned session {}", id);
            return false;
        };
        let Some(room) = self.rooms.get_mut(&assignment.code) else {
            return false;
        };
        if room.phase != RoomPhase::Running {
            return false;
        }

        match velocity_for_key(key) {
            Ok(velocity) => room.game.set_velocity(assignment.slot, velocity),
            Err(e) => {
                debug!("Session {}: {}", id, e);
                false
            }
        }
    }

    /// Runs one simulation step for room `code` and queues the result to
    /// every member. A finished game is announced and its room removed.
    ///
    /// Only the running room of the given `generation` is ticked. A code that
    /// was freed and handed to a newer room reports `Vanished` to the old
    /// room's driver.
    pub fn tick_room(
        &mut self,
        code: &str,
        generation: u64,
        simulation: &dyn Simulation,
    ) -> TickStatus {
        let Some(room) = self.rooms.get_mut(code) else {
            return TickStatus::Vanished;
        };
        if room.generation != generation || room.phase != RoomPhase::Running {
            return TickStatus::Vanished;
        }

        let (game, outcome) = simulation.advance(&room.game);
        room.game = game;
        let members: Vec<SessionId> = room.members.values().copied().collect();

        match outcome {
            Outcome::Continuing => {
                let state = ServerMessage::GameState(room.game.clone());
                self.broadcast(&members, &state);
                TickStatus::Continuing
            }
            Outcome::Won { winner, .. } => {
                self.broadcast(
                    &members,
                    &ServerMessage::GameOver {
                        winner: winner.clone(),
                    },
                );
                self.rooms.remove(code);
                info!("Room {} finished, winner {:?}", code, winner);
                TickStatus::Finished { winner }
            }
        }
    }

    fn broadcast(&self, members: &[SessionId], message: &ServerMessage) {
        for id in members {
            if let Some(session) = self.sessions.get(id) {
                session.send(message.clone());
            }
        }
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn room(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// Shared handle to the registry, cloned into every session task and tick
/// driver.
#[derive(Clone)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
    simulation: Arc<dyn Simulation>,
    tick_period: Duration,
    queue_capacity: usize,
}

impl Registry {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_simulation(config, Arc::new(SnakeRules))
    }

    /// Builds a registry whose rooms advance with `simulation` instead of
    /// the standard snake rules.
    pub fn with_simulation(config: &ServerConfig, simulation: Arc<dyn Simulation>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::new(
                config.grid_size,
                config.code_length,
            ))),
            simulation,
            tick_period: config.tick_period,
            queue_capacity: config.queue_capacity,
        }
    }

    /// Registers a new session and hands back the receiving end of its
    /// outbound queue for the writer loop.
    pub async fn register(&self, addr: SocketAddr) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = outbound_queue(self.queue_capacity);
        let id = self.state.lock().await.register(addr, tx);
        (id, rx)
    }

    pub async fn deregister(&self, id: SessionId) -> bool {
        self.state.lock().await.deregister(id)
    }

    pub async fn create_room(&self, id: SessionId, client: Option<String>) -> Option<String> {
        let mut state = self.state.lock().await;
        state.create_room(id, client, &mut rand::thread_rng())
    }

    /// Joins a room and, on the join that fills it, starts its tick driver.
    pub async fn join_room(
        &self,
        id: SessionId,
        client: Option<String>,
        code: &str,
    ) -> JoinOutcome {
        let outcome = {
            let mut state = self.state.lock().await;
            state.join_room(id, client, code, &mut rand::thread_rng())
        };

        if let JoinOutcome::Joined {
            code,
            generation,
            start_driver: true,
        } = &outcome
        {
            tick::spawn_tick_driver(self.clone(), code.clone(), *generation, self.tick_period);
        }
        outcome
    }

    pub async fn apply_input(&self, id: SessionId, key: i64) -> bool {
        self.state.lock().await.apply_input(id, key)
    }

    /// Routes one decoded client message.
    pub async fn dispatch(&self, id: SessionId, message: ClientMessage) {
        match message {
            ClientMessage::NewGame { client } => {
                self.create_room(id, client).await;
            }
            ClientMessage::JoinGame { client, code } => {
                self.join_room(id, client, &code).await;
            }
            ClientMessage::Input { key, .. } => {
                self.apply_input(id, key).await;
            }
        }
    }

    pub async fn tick_room(&self, code: &str, generation: u64) -> TickStatus {
        let mut state = self.state.lock().await;
        state.tick_room(code, generation, self.simulation.as_ref())
    }

    pub async fn room_info(&self, code: &str) -> Option<RoomInfo> {
        let state = self.state.lock().await;
        state.room(code).map(|room| RoomInfo {
            code: code.to_string(),
            generation: room.generation,
            phase: room.phase,
            members: room.members.clone(),
            game: room.game.clone(),
        })
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.session_count()
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.room_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::Position;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(99)
    }

    struct Connected {
        id: SessionId,
        rx: mpsc::Receiver<ServerMessage>,
    }

    fn connect(state: &mut RegistryState) -> Connected {
        let (tx, rx) = outbound_queue(16);
        let id = state.register(test_addr(), tx);
        Connected { id, rx }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Steps every player one cell along its velocity and never ends.
    struct Drift;

    impl Simulation for Drift {
        fn advance(&self, game: &Game) -> (Game, Outcome) {
            let mut next = game.clone();
            for player in next.players.values_mut() {
                player.position = player.position.offset(player.velocity);
            }
            (next, Outcome::Continuing)
        }
    }

    /// Declares slot 2 the winner on the first tick.
    struct SecondWins;

    impl Simulation for SecondWins {
        fn advance(&self, game: &Game) -> (Game, Outcome) {
            let winner = game
                .player(PLAYER_TWO)
                .map(|player| player.id.clone())
                .unwrap_or_default();
            (
                game.clone(),
                Outcome::Won {
                    slot: PLAYER_TWO,
                    winner,
                },
            )
        }
    }

    #[test]
    fn test_register_and_deregister() {
        let mut state = RegistryState::new(20, 5);
        let first = connect(&mut state);
        let second = connect(&mut state);

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(state.session_count(), 2);

        assert!(state.deregister(first.id));
        assert!(!state.deregister(first.id));
        assert_eq!(state.session_count(), 1);
    }

    #[test]
    fn test_deregister_closes_outbound_queue() {
        let mut state = RegistryState::new(20, 5);
        let mut alice = connect(&mut state);

        state.deregister(alice.id);
        assert!(matches!(
            alice.rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_create_room_assigns_slot_one() {
        let mut state = RegistryState::new(20, 5);
        let mut alice = connect(&mut state);

        let code = state
            .create_room(alice.id, Some("alice".to_string()), &mut rng())
            .unwrap();
        assert_eq!(code.len(), 5);

        assert_eq!(drain(&mut alice.rx), vec![ServerMessage::GameCode(code.clone())]);

        let room = state.room(&code).unwrap();
        assert_eq!(room.phase, RoomPhase::Waiting);
        assert_eq!(room.members.get(&PLAYER_ONE), Some(&alice.id));
        assert_eq!(room.game.player(PLAYER_ONE).unwrap().id, "alice");

        let assignment = state.session(alice.id).unwrap().assignment().unwrap();
        assert_eq!(assignment.code, code);
        assert_eq!(assignment.slot, PLAYER_ONE);
    }

    #[test]
    fn test_create_room_defaults_identity_to_session_id() {
        let mut state = RegistryState::new(20, 5);
        let alice = connect(&mut state);

        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        let room = state.room(&code).unwrap();
        assert_eq!(room.game.player(PLAYER_ONE).unwrap().id, alice.id.to_string());
    }

    #[test]
    fn test_second_new_game_is_ignored() {
        let mut state = RegistryState::new(20, 5);
        let mut alice = connect(&mut state);

        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        assert!(state.create_room(alice.id, None, &mut rng()).is_none());
        assert_eq!(state.room_count(), 1);
        assert_eq!(drain(&mut alice.rx), vec![ServerMessage::GameCode(code)]);
    }

    #[test]
    fn test_join_room_assigns_slot_two_and_starts_once() {
        let mut state = RegistryState::new(20, 5);
        let alice = connect(&mut state);
        let mut bob = connect(&mut state);

        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        let generation = state.room(&code).unwrap().generation;
        let outcome = state.join_room(bob.id, Some("bob".to_string()), &code, &mut rng());
        assert_eq!(
            outcome,
            JoinOutcome::Joined {
                code: code.clone(),
                generation,
                start_driver: true
            }
        );
        assert_eq!(drain(&mut bob.rx), vec![ServerMessage::GameCode(code.clone())]);

        let room = state.room(&code).unwrap();
        assert_eq!(room.phase, RoomPhase::Running);
        assert_eq!(room.members.get(&PLAYER_TWO), Some(&bob.id));
        assert_eq!(room.game.player(PLAYER_TWO).unwrap().id, "bob");

        // Repeating the join (same or another session) never starts a second driver.
        let again = state.join_room(bob.id, None, &code, &mut rng());
        assert_eq!(again, JoinOutcome::AlreadyAssigned);
        let carol = connect(&mut state);
        let third = state.join_room(carol.id, None, &code, &mut rng());
        assert_eq!(third, JoinOutcome::TooManyPlayers);
    }

    #[test]
    fn test_join_unknown_code_changes_nothing() {
        let mut state = RegistryState::new(20, 5);
        let alice = connect(&mut state);
        let mut bob = connect(&mut state);
        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        let before: Vec<_> = state.room(&code).unwrap().members.clone().into_iter().collect();

        let outcome = state.join_room(bob.id, None, "nope!", &mut rng());
        assert_eq!(outcome, JoinOutcome::UnknownCode);
        assert_eq!(drain(&mut bob.rx), vec![ServerMessage::UnknownCode]);

        assert_eq!(state.room_count(), 1);
        assert!(!state.session(bob.id).unwrap().is_assigned());
        let after: Vec<_> = state.room(&code).unwrap().members.clone().into_iter().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_join_full_room_is_rejected() {
        let mut state = RegistryState::new(20, 5);
        let alice = connect(&mut state);
        let bob = connect(&mut state);
        let mut carol = connect(&mut state);

        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        state.join_room(bob.id, None, &code, &mut rng());

        let outcome = state.join_room(carol.id, Some("carol".to_string()), &code, &mut rng());
        assert_eq!(outcome, JoinOutcome::TooManyPlayers);
        assert_eq!(drain(&mut carol.rx), vec![ServerMessage::TooManyPlayers]);

        let room = state.room(&code).unwrap();
        assert_eq!(room.members.get(&PLAYER_ONE), Some(&alice.id));
        assert_eq!(room.members.get(&PLAYER_TWO), Some(&bob.id));
        assert!(!state.session(carol.id).unwrap().is_assigned());
    }

    #[test]
    fn test_input_requires_running_room() {
        let mut state = RegistryState::new(20, 5);
        let alice = connect(&mut state);
        let bob = connect(&mut state);

        assert!(!state.apply_input(alice.id, 38));

        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        assert!(!state.apply_input(alice.id, 38));

        state.join_room(bob.id, None, &code, &mut rng());
        assert!(state.apply_input(alice.id, 38));
        assert!(state.apply_input(bob.id, 65));
        assert!(!state.apply_input(bob.id, 13));

        let game = &state.room(&code).unwrap().game;
        assert_eq!(game.player(PLAYER_ONE).unwrap().velocity, Position::new(0, 1));
        assert_eq!(game.player(PLAYER_TWO).unwrap().velocity, Position::new(-1, 0));
    }

    #[test]
    fn test_tick_broadcasts_state_to_both_members() {
        let mut state = RegistryState::new(20, 5);
        let mut alice = connect(&mut state);
        let mut bob = connect(&mut state);
        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        state.join_room(bob.id, None, &code, &mut rng());
        drain(&mut alice.rx);
        drain(&mut bob.rx);

        let generation = state.room(&code).unwrap().generation;
        assert_eq!(state.tick_room(&code, generation, &Drift), TickStatus::Continuing);

        let game = state.room(&code).unwrap().game.clone();
        assert_eq!(game.player(PLAYER_ONE).unwrap().position, Position::new(4, 10));
        assert_eq!(drain(&mut alice.rx), vec![ServerMessage::GameState(game.clone())]);
        assert_eq!(drain(&mut bob.rx), vec![ServerMessage::GameState(game)]);
    }

    #[test]
    fn test_tick_game_over_removes_room() {
        let mut state = RegistryState::new(20, 5);
        let mut alice = connect(&mut state);
        let mut bob = connect(&mut state);
        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        state.join_room(bob.id, Some("bob".to_string()), &code, &mut rng());
        drain(&mut alice.rx);
        drain(&mut bob.rx);

        let generation = state.room(&code).unwrap().generation;
        let status = state.tick_room(&code, generation, &SecondWins);
        assert_eq!(
            status,
            TickStatus::Finished {
                winner: "bob".to_string()
            }
        );
        let over = ServerMessage::GameOver {
            winner: "bob".to_string(),
        };
        assert_eq!(drain(&mut alice.rx), vec![over.clone()]);
        assert_eq!(drain(&mut bob.rx), vec![over]);

        assert!(state.room(&code).is_none());
        assert_eq!(
            state.tick_room(&code, generation, &SecondWins),
            TickStatus::Vanished
        );
    }

    #[test]
    fn test_room_removed_when_last_member_leaves() {
        let mut state = RegistryState::new(20, 5);
        let alice = connect(&mut state);
        let bob = connect(&mut state);
        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        state.join_room(bob.id, None, &code, &mut rng());
        let generation = state.room(&code).unwrap().generation;

        state.deregister(alice.id);
        assert!(state.room(&code).is_some());
        assert_eq!(state.tick_room(&code, generation, &Drift), TickStatus::Continuing);

        state.deregister(bob.id);
        assert!(state.room(&code).is_none());
        assert_eq!(state.tick_room(&code, generation, &Drift), TickStatus::Vanished);
    }

    #[test]
    fn test_waiting_room_is_never_ticked() {
        let mut state = RegistryState::new(20, 5);
        let mut alice = connect(&mut state);
        let code = state.create_room(alice.id, None, &mut rng()).unwrap();
        let room = state.room(&code).unwrap();
        let (generation, before) = (room.generation, room.game.clone());
        drain(&mut alice.rx);

        assert_eq!(state.tick_room(&code, generation, &Drift), TickStatus::Vanished);
        assert_eq!(state.room(&code).unwrap().game, before);
        assert!(drain(&mut alice.rx).is_empty());
    }

    #[test]
    fn test_reused_code_is_not_ticked_by_old_driver() {
        // One-letter codes make reuse of a freed code quick to reach.
        let mut state = RegistryState::new(20, 1);
        let mut seeded = rng();
        let alice = connect(&mut state);
        let bob = connect(&mut state);
        let old_code = state.create_room(alice.id, None, &mut seeded).unwrap();
        let old_generation = match state.join_room(bob.id, None, &old_code, &mut seeded) {
            JoinOutcome::Joined { generation, .. } => generation,
            other => panic!("Expected join, got {:?}", other),
        };
        state.deregister(alice.id);
        state.deregister(bob.id);
        assert!(state.room(&old_code).is_none());

        let mut carol = loop {
            let candidate = connect(&mut state);
            let code = state.create_room(candidate.id, None, &mut seeded).unwrap();
            if code == old_code {
                break candidate;
            }
            state.deregister(candidate.id);
        };
        let before = state.room(&old_code).unwrap().game.clone();
        drain(&mut carol.rx);

        // The new room is still waiting, and belongs to another generation.
        assert_eq!(
            state.tick_room(&old_code, old_generation, &Drift),
            TickStatus::Vanished
        );
        let room = state.room(&old_code).unwrap();
        assert_ne!(room.generation, old_generation);
        assert_eq!(room.phase, RoomPhase::Waiting);
        assert_eq!(room.game, before);
        assert!(drain(&mut carol.rx).is_empty());

        // Once it fills, only its own generation drives it.
        let dave = connect(&mut state);
        let new_generation = match state.join_room(dave.id, None, &old_code, &mut seeded) {
            JoinOutcome::Joined {
                generation,
                start_driver,
                ..
            } => {
                assert!(start_driver);
                generation
            }
            other => panic!("Expected join, got {:?}", other),
        };
        assert_eq!(
            state.tick_room(&old_code, old_generation, &Drift),
            TickStatus::Vanished
        );
        assert_eq!(
            state.tick_room(&old_code, new_generation, &Drift),
            TickStatus::Continuing
        );
    }

    #[test]
    fn test_departed_player_stays_in_game_and_can_win() {
        let mut state = RegistryState::new(20, 5);
        let mut alice = connect(&mut state);
        let bob = connect(&mut state);
        let code = state
            .create_room(alice.id, Some("alice".to_string()), &mut rng())
            .unwrap();
        state.join_room(bob.id, Some("bob".to_string()), &code, &mut rng());
        let generation = state.room(&code).unwrap().generation;

        state.deregister(bob.id);
        let room = state.room(&code).unwrap();
        assert!(!room.members.contains_key(&PLAYER_TWO));
        assert_eq!(room.game.player(PLAYER_TWO).unwrap().id, "bob");
        drain(&mut alice.rx);

        // Alice keeps heading right until she leaves the grid.
        let mut status = TickStatus::Continuing;
        let mut last = None;
        for _ in 0..40 {
            status = state.tick_room(&code, generation, &SnakeRules);
            last = drain(&mut alice.rx).pop();
            if status != TickStatus::Continuing {
                break;
            }
        }
        assert_eq!(
            status,
            TickStatus::Finished {
                winner: "bob".to_string()
            }
        );
        assert_eq!(
            last,
            Some(ServerMessage::GameOver {
                winner: "bob".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_registry_join_starts_tick_driver() {
        let config = ServerConfig {
            tick_period: Duration::from_millis(10),
            ..ServerConfig::default()
        };
        let registry = Registry::with_simulation(&config, Arc::new(Drift));

        let (alice, mut alice_rx) = registry.register(test_addr()).await;
        let (bob, mut bob_rx) = registry.register(test_addr()).await;

        registry
            .dispatch(alice, ClientMessage::NewGame { client: None })
            .await;
        let code = match alice_rx.recv().await {
            Some(ServerMessage::GameCode(code)) => code,
            other => panic!("Expected game code, got {:?}", other),
        };

        registry
            .dispatch(
                bob,
                ClientMessage::JoinGame {
                    client: None,
                    code: code.clone(),
                },
            )
            .await;
        assert_eq!(bob_rx.recv().await, Some(ServerMessage::GameCode(code.clone())));

        for rx in [&mut alice_rx, &mut bob_rx] {
            let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap();
            assert!(matches!(message, Some(ServerMessage::GameState(_))));
        }

        let info = registry.room_info(&code).await.unwrap();
        assert_eq!(info.phase, RoomPhase::Running);
        assert_eq!(info.members.len(), 2);
    }
}
