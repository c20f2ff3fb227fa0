//! Runtime settings for the room server.

use crate::error::ServerError;
use std::time::Duration;

/// Largest grid a room may use. Food placement scans every cell.
pub const MAX_GRID_SIZE: i32 = 1000;

/// Settings shared by the accept loop, the registry and every tick driver.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub listen_addr: String,
    /// Request path clients must use for the WebSocket upgrade
    pub ws_path: String,
    /// Time between two simulation ticks of a running room
    pub tick_period: Duration,
    /// Side length of the square grid every game is played on
    pub grid_size: i32,
    /// Number of letters in a freshly generated room code
    pub code_length: usize,
    /// Outbound messages a session may have queued before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            ws_path: "/ws".to_string(),
            tick_period: Duration::from_secs(1),
            grid_size: shared::GRID_SIZE,
            code_length: 5,
            queue_capacity: 32,
        }
    }
}

impl ServerConfig {
    /// Rejects settings the server cannot run with.
    ///
    /// A grid smaller than six cells has no room for both spawn layouts,
    /// and a zero tick period or queue capacity would panic inside tokio.
    pub fn validate(&self) -> Result<(), ServerError> {
        if !(6..=MAX_GRID_SIZE).contains(&self.grid_size) {
            return Err(ServerError::InvalidConfig(format!(
                "grid size must be between 6 and {}, got {}",
                MAX_GRID_SIZE, self.grid_size
            )));
        }
        if self.tick_period.is_zero() {
            return Err(ServerError::InvalidConfig(
                "tick period must be greater than zero".to_string(),
            ));
        }
        if self.code_length == 0 {
            return Err(ServerError::InvalidConfig(
                "room code length must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "queue capacity must be greater than zero".to_string(),
            ));
        }
        if !self.ws_path.starts_with('/') {
            return Err(ServerError::InvalidConfig(format!(
                "websocket path must start with '/', got {:?}",
                self.ws_path
            )));
        }
        Ok(())
    }
}
