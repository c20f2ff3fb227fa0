//! JSON wire protocol.
//!
//! Every frame carries one flat envelope whose `type` field names the message
//! kind. Envelopes are decoded once at the connection boundary into the closed
//! [`ClientMessage`] / [`ServerMessage`] enums; nothing past that boundary
//! looks at the `type` string.

use crate::{Game, Position};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown message type `{0}`")]
    UnknownKind(String),
    #[error("`{kind}` message is missing `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("unrecognized key code {0}")]
    InvalidKey(i64),
}

/// Raw message envelope as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<Game>,
}

impl Envelope {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    NewGame { client: Option<String> },
    JoinGame { client: Option<String>, code: String },
    Input { client: Option<String>, key: i64 },
}

impl ClientMessage {
    pub const NEW_GAME: &'static str = "newGame";
    pub const JOIN_GAME: &'static str = "joinGame";
    pub const KEYDOWN: &'static str = "keydown";

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::try_from(envelope)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&Envelope::from(self))?)
    }

    /// The identity the client claims for itself, if it sent one.
    pub fn client(&self) -> Option<&str> {
        match self {
            ClientMessage::NewGame { client }
            | ClientMessage::JoinGame { client, .. }
            | ClientMessage::Input { client, .. } => client.as_deref(),
        }
    }
}

impl TryFrom<Envelope> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let Envelope {
            kind,
            client,
            value,
            key,
            ..
        } = envelope;

        match kind.as_str() {
            Self::NEW_GAME => Ok(ClientMessage::NewGame { client }),
            Self::JOIN_GAME => {
                let code = value.ok_or(ProtocolError::MissingField {
                    kind: Self::JOIN_GAME,
                    field: "value",
                })?;
                Ok(ClientMessage::JoinGame { client, code })
            }
            Self::KEYDOWN => {
                let key = key.ok_or(ProtocolError::MissingField {
                    kind: Self::KEYDOWN,
                    field: "key",
                })?;
                Ok(ClientMessage::Input { client, key })
            }
            _ => Err(ProtocolError::UnknownKind(kind)),
        }
    }
}

impl From<&ClientMessage> for Envelope {
    fn from(message: &ClientMessage) -> Self {
        match message {
            ClientMessage::NewGame { client } => Envelope {
                client: client.clone(),
                ..Envelope::new(ClientMessage::NEW_GAME)
            },
            ClientMessage::JoinGame { client, code } => Envelope {
                client: client.clone(),
                value: Some(code.clone()),
                ..Envelope::new(ClientMessage::JOIN_GAME)
            },
            ClientMessage::Input { client, key } => Envelope {
                client: client.clone(),
                key: Some(*key),
                ..Envelope::new(ClientMessage::KEYDOWN)
            },
        }
    }
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    GameCode(String),
    UnknownCode,
    TooManyPlayers,
    GameState(Game),
    GameOver { winner: String },
}

impl ServerMessage {
    pub const GAME_CODE: &'static str = "gameCode";
    pub const UNKNOWN_CODE: &'static str = "unknownCode";
    pub const TOO_MANY_PLAYERS: &'static str = "tooManyPlayers";
    pub const GAME_STATE: &'static str = "gameState";
    pub const GAME_OVER: &'static str = "gameOver";

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::GameCode(_) => Self::GAME_CODE,
            ServerMessage::UnknownCode => Self::UNKNOWN_CODE,
            ServerMessage::TooManyPlayers => Self::TOO_MANY_PLAYERS,
            ServerMessage::GameState(_) => Self::GAME_STATE,
            ServerMessage::GameOver { .. } => Self::GAME_OVER,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::try_from(envelope)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&Envelope::from(self))?)
    }
}

impl From<&ServerMessage> for Envelope {
    fn from(message: &ServerMessage) -> Self {
        let envelope = Envelope::new(message.kind());
        match message {
            ServerMessage::GameCode(code) => Envelope {
                value: Some(code.clone()),
                ..envelope
            },
            ServerMessage::UnknownCode | ServerMessage::TooManyPlayers => envelope,
            ServerMessage::GameState(game) => Envelope {
                game_state: Some(game.clone()),
                ..envelope
            },
            ServerMessage::GameOver { winner } => Envelope {
                value: Some(winner.clone()),
                ..envelope
            },
        }
    }
}

impl TryFrom<Envelope> for ServerMessage {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        match envelope.kind.as_str() {
            Self::GAME_CODE => envelope
                .value
                .map(ServerMessage::GameCode)
                .ok_or(ProtocolError::MissingField {
                    kind: Self::GAME_CODE,
                    field: "value",
                }),
            Self::UNKNOWN_CODE => Ok(ServerMessage::UnknownCode),
            Self::TOO_MANY_PLAYERS => Ok(ServerMessage::TooManyPlayers),
            Self::GAME_STATE => envelope
                .game_state
                .map(ServerMessage::GameState)
                .ok_or(ProtocolError::MissingField {
                    kind: Self::GAME_STATE,
                    field: "gameState",
                }),
            Self::GAME_OVER => Ok(ServerMessage::GameOver {
                winner: envelope.value.unwrap_or_default(),
            }),
            _ => Err(ProtocolError::UnknownKind(envelope.kind)),
        }
    }
}

/// Maps a browser key code to a unit velocity. Arrow keys and WASD both map
/// onto the same four directions.
pub fn velocity_for_key(key_code: i64) -> Result<Position, ProtocolError> {
    match key_code {
        37 | 65 => Ok(Position::new(-1, 0)), // left, A
        38 | 87 => Ok(Position::new(0, 1)),  // up, W
        39 | 68 => Ok(Position::new(1, 0)),  // right, D
        40 | 83 => Ok(Position::new(0, -1)), // down, S
        _ => Err(ProtocolError::InvalidKey(key_code)),
    }
}
