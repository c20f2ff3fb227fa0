//! # Snake Room Server Library
//!
//! This library provides the server side of a two-player snake game played
//! over WebSockets. Players meet in rooms identified by short codes, and every
//! running room advances on its own fixed tick, broadcasting the full game
//! state to both players after each step.
//!
//! ## Core Responsibilities
//!
//! ### Room Lifecycle
//! A client asks for a new game and receives a room code. A second client
//! joins with that code; the join that fills the room starts its tick driver,
//! exactly once. A room is removed when its game ends or its last player
//! leaves.
//!
//! ### Authoritative Simulation
//! The server runs the game rules (see [`shared::advance`]). Clients only send
//! key presses, which change their own player's velocity.
//!
//! ### Per-Connection Fan-Out
//! Every session owns a bounded outbound queue drained by its own writer task.
//! Broadcasting never waits on a socket: a message for a full queue is
//! dropped and logged, so one stalled client can't hold up the other or the
//! tick loop.
//!
//! ## Architecture Design
//!
//! ### Task Layout
//! - **Accept loop** ([`network`]): upgrades TCP connections to WebSockets on
//!   the configured path
//! - **Reader / writer pair** ([`session`]): one of each per connection
//! - **Tick driver** ([`tick`]): one per running room
//!
//! ### Shared State
//! Sessions and rooms live in one [`registry::RegistryState`] behind a single
//! mutex. Joins, inputs and ticks all take that lock, so a tick never races a
//! velocity change and no task sees a half-built room.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         listen_addr: "127.0.0.1:8080".to_string(),
//!         tick_period: Duration::from_millis(500),
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod registry;
pub mod room_code;
pub mod session;
pub mod tick;

pub use config::ServerConfig;
pub use error::ServerError;
pub use network::Server;
pub use registry::{JoinOutcome, Registry, RoomInfo, RoomPhase, TickStatus};
pub use session::SessionId;
pub use tick::{Simulation, SnakeRules};
