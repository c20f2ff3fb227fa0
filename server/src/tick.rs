//! Per-room tick driver.
//!
//! A driver is spawned exactly once per room, on the join that fills it, and
//! stops either when its game ends or when it finds the room gone. Rooms are
//! addressed by code and generation, so a driver never picks up a later room
//! that was handed the same code.

use crate::registry::{Registry, TickStatus};
use log::info;
use shared::{Game, Outcome};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Rules that move a room's game forward by one tick.
pub trait Simulation: Send + Sync + 'static {
    fn advance(&self, game: &Game) -> (Game, Outcome);
}

/// The standard snake rules from [`shared::advance`], with food placed by the
/// thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeRules;

impl Simulation for SnakeRules {
    fn advance(&self, game: &Game) -> (Game, Outcome) {
        shared::advance(game, &mut rand::thread_rng())
    }
}

pub fn spawn_tick_driver(
    registry: Registry,
    code: String,
    generation: u64,
    period: Duration,
) -> JoinHandle<TickStatus> {
    tokio::spawn(run_tick_driver(registry, code, generation, period))
}

/// Ticks room `code` of the given `generation` every `period` until it
/// finishes or disappears, and returns the status that stopped it.
pub async fn run_tick_driver(
    registry: Registry,
    code: String,
    generation: u64,
    period: Duration,
) -> TickStatus {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    ticker.tick().await;
    info!("Tick driver for room {} started", code);

    let mut ticks: u64 = 0;
    loop {
        ticker.tick().await;
        ticks += 1;

        match registry.tick_room(&code, generation).await {
            TickStatus::Continuing => {}
            TickStatus::Finished { winner } => {
                info!(
                    "Tick driver for room {} stopped after {} ticks, {:?} won",
                    code, ticks, winner
                );
                return TickStatus::Finished { winner };
            }
            TickStatus::Vanished => {
                info!("Room {} is gone, tick driver stopped", code);
                return TickStatus::Vanished;
            }
        }
    }
}
