//! One tick of the two-player snake game.
//!
//! [`advance`] never mutates its input; the only source of nondeterminism is
//! the random generator used to relocate eaten food.

use crate::{Game, Slot};
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continuing,
    /// The game ended. `slot` and `winner` name the surviving player; the
    /// winner identity is empty when the loser had no opponent.
    Won { slot: Slot, winner: String },
}

/// Advances `game` by one tick and reports whether somebody lost.
///
/// Players are always visited in slot order, so when both players lose in
/// the same phase of a tick the lower slot is the one reported as loser.
pub fn advance<R: Rng + ?Sized>(game: &Game, rng: &mut R) -> (Game, Outcome) {
    let mut next = game.clone();

    for player in next.players.values_mut() {
        player.position = player.position.offset(player.velocity);
    }

    let grid_size = next.grid_size;
    let out_of_bounds = next
        .players
        .iter()
        .find(|(_, player)| !player.position.within(grid_size))
        .map(|(slot, _)| *slot);
    if let Some(loser) = out_of_bounds {
        let outcome = defeat(&next, loser);
        return (next, outcome);
    }

    // The food cell becomes a new segment and the head steps past it.
    let food = next.food;
    let mut food_eaten = false;
    for player in next.players.values_mut() {
        if player.position == food {
            player.body.push(player.position);
            player.position = player.position.offset(player.velocity);
            food_eaten = true;
        }
    }

    let mut collided = None;
    for (slot, player) in next.players.iter_mut() {
        if player.velocity.is_zero() {
            continue;
        }
        if player.occupies(player.position) {
            collided = Some(*slot);
            break;
        }
        player.body.push(player.position);
        player.body.remove(0);
    }
    if let Some(loser) = collided {
        let outcome = defeat(&next, loser);
        return (next, outcome);
    }

    // Relocated after the bodies moved so the new cell is clear of every
    // segment as of the end of this tick.
    if food_eaten {
        next.relocate_food(rng);
    }

    (next, Outcome::Continuing)
}

fn defeat(game: &Game, loser: Slot) -> Outcome {
    match game.opponent(loser) {
        Some((slot, player)) => Outcome::Won {
            slot,
            winner: player.id.clone(),
        },
        None => Outcome::Won {
            slot: if loser == crate::PLAYER_ONE {
                crate::PLAYER_TWO
            } else {
                crate::PLAYER_ONE
            },
            winner: String::new(),
        },
    }
}
