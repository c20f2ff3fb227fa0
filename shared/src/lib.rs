//! Types shared between the room server and its clients: the grid model the
//! snake game runs on, the JSON wire protocol and the per-tick simulation.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod protocol;
pub mod simulation;

pub use protocol::{velocity_for_key, ClientMessage, Envelope, ProtocolError, ServerMessage};
pub use simulation::{advance, Outcome};

pub const GRID_SIZE: i32 = 20;
pub const MAX_PLAYERS: usize = 2;

/// Player slot inside a room. Slot 1 belongs to the room's creator, slot 2 to
/// whoever joins with the code.
pub type Slot = u8;

pub const PLAYER_ONE: Slot = 1;
pub const PLAYER_TWO: Slot = 2;

/// A cell on the grid. Also used for velocities, which are unit steps or zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "X")]
    pub x: i32,
    #[serde(rename = "Y")]
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, velocity: Position) -> Position {
        Position::new(self.x + velocity.x, self.y + velocity.y)
    }

    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }

    /// Both axes are checked against the inclusive range `[0, grid_size]`.
    pub fn within(self, grid_size: i32) -> bool {
        (0..=grid_size).contains(&self.x) && (0..=grid_size).contains(&self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Player {
    #[serde(rename = "ID")]
    pub id: String,
    pub position: Position,
    pub velocity: Position,
    /// Trailing segments, oldest first. The last segment is the head.
    #[serde(rename = "Snake")]
    pub body: Vec<Position>,
}

impl Player {
    /// Builds a player at the spawn point of `slot`. Player one starts on the
    /// left moving right, player two starts on the right standing still.
    pub fn spawn(slot: Slot, id: impl Into<String>, grid_size: i32) -> Option<Self> {
        let mid = grid_size / 2;
        let (body, velocity) = match slot {
            PLAYER_ONE => (
                vec![
                    Position::new(1, mid),
                    Position::new(2, mid),
                    Position::new(3, mid),
                ],
                Position::new(1, 0),
            ),
            PLAYER_TWO => (
                vec![
                    Position::new(grid_size, mid),
                    Position::new(grid_size - 1, mid),
                    Position::new(grid_size - 2, mid),
                ],
                Position::default(),
            ),
            _ => return None,
        };

        Some(Self {
            id: id.into(),
            position: body[body.len() - 1],
            velocity,
            body,
        })
    }

    pub fn occupies(&self, cell: Position) -> bool {
        self.body.contains(&cell)
    }
}

/// State of one room's game, serialized whole into every `gameState` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Game {
    pub players: BTreeMap<Slot, Player>,
    pub food: Position,
    pub grid_size: i32,
}

impl Game {
    /// Creates an empty game with food already placed.
    pub fn new<R: Rng + ?Sized>(grid_size: i32, rng: &mut R) -> Self {
        let mut game = Self {
            players: BTreeMap::new(),
            food: Position::default(),
            grid_size,
        };
        game.relocate_food(rng);
        game
    }

    /// Puts a new player into `slot`. Returns false if the slot is unknown,
    /// already taken, or the game is full. Food covered by the new body is
    /// moved.
    pub fn seat<R: Rng + ?Sized>(
        &mut self,
        slot: Slot,
        id: impl Into<String>,
        rng: &mut R,
    ) -> bool {
        if self.is_full() || self.players.contains_key(&slot) {
            return false;
        }
        let Some(player) = Player::spawn(slot, id, self.grid_size) else {
            return false;
        };

        self.players.insert(slot, player);
        if !self.food_is_clear() {
            self.relocate_food(rng);
        }
        true
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn player(&self, slot: Slot) -> Option<&Player> {
        self.players.get(&slot)
    }

    /// Returns false if nobody sits in `slot`.
    pub fn set_velocity(&mut self, slot: Slot, velocity: Position) -> bool {
        match self.players.get_mut(&slot) {
            Some(player) => {
                player.velocity = velocity;
                true
            }
            None => false,
        }
    }

    pub fn opponent(&self, slot: Slot) -> Option<(Slot, &Player)> {
        self.players
            .iter()
            .find(|(other, _)| **other != slot)
            .map(|(other, player)| (*other, player))
    }

    pub fn food_is_clear(&self) -> bool {
        !self.players.values().any(|player| player.occupies(self.food))
    }

    /// Moves the food to a random cell in `[0, grid_size)` that no body covers.
    /// The food stays put when every cell is taken.
    pub fn relocate_food<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let free: Vec<Position> = (0..self.grid_size)
            .flat_map(|x| (0..self.grid_size).map(move |y| Position::new(x, y)))
            .filter(|cell| !self.players.values().any(|player| player.occupies(*cell)))
            .collect();

        if let Some(cell) = free.choose(rng) {
            self.food = *cell;
        }
    }
}
