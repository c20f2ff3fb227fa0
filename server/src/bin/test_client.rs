//! Scripted WebSocket client for smoke testing a running server.
//!
//! Creates a game (or joins one with `--join CODE`), then cycles through a
//! fixed list of key presses once per second and prints everything the
//! server sends until the game ends or the connection closes.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use shared::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::time::interval;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Arrow keys: up, left, down, right
const KEY_SCRIPT: [i64; 4] = [38, 37, 40, 39];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short, long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Join an existing room instead of creating one
    #[arg(short, long)]
    join: Option<String>,

    /// Identity sent with every message
    #[arg(short, long, default_value = "test-client")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = Some(args.name.clone());

    let (socket, _) = connect_async(args.url.as_str()).await?;
    info!("Connected to {}", args.url);
    let (mut sink, mut stream) = socket.split();

    let opening = match args.join {
        Some(code) => ClientMessage::JoinGame { client: client.clone(), code },
        None => ClientMessage::NewGame { client: client.clone() },
    };
    sink.send(Message::Text(opening.to_json()?)).await?;

    let mut keys = KEY_SCRIPT.iter().cycle();
    let mut ticker = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Connection error: {}", e);
                        break;
                    }
                };

                match ServerMessage::parse(&text) {
                    Ok(ServerMessage::GameCode(code)) => info!("Room code: {}", code),
                    Ok(ServerMessage::UnknownCode) => {
                        info!("Server does not know that room code");
                        break;
                    }
                    Ok(ServerMessage::TooManyPlayers) => {
                        info!("That room is already full");
                        break;
                    }
                    Ok(ServerMessage::GameState(game)) => {
                        for (slot, player) in &game.players {
                            info!(
                                "  Player {} ({}): head=({}, {}) length={}",
                                slot,
                                player.id,
                                player.position.x,
                                player.position.y,
                                player.body.len()
                            );
                        }
                        info!("  Food at ({}, {})", game.food.x, game.food.y);
                    }
                    Ok(ServerMessage::GameOver { winner }) => {
                        if winner == args.name {
                            info!("Game over, we won");
                        } else {
                            info!("Game over, {} won", winner);
                        }
                        break;
                    }
                    Err(e) => warn!("Unreadable message from server: {}", e),
                }
            }
            _ = ticker.tick() => {
                if let Some(key) = keys.next() {
                    let input = ClientMessage::Input { client: client.clone(), key: *key };
                    sink.send(Message::Text(input.to_json()?)).await?;
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    info!("Test client finished");
    Ok(())
}
