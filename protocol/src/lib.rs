//! Wire vocabulary shared between the game server and its clients.
//!
//! Everything on the socket is JSON: client commands arrive in a
//! [`ClientEnvelope`], server traffic leaves as a [`ServerFrame`] (either an
//! event or an ack for a command that carried an id).

pub mod commands;
pub mod events;
pub mod types;

pub use commands::{ClientCommand, ClientEnvelope, Handshake};
pub use events::{AckError, AckFrame, ServerEvent, ServerFrame};
pub use types::*;

/// Side length of the navigable world grid, in game units.
pub const WORLD_SIZE: i32 = 6144;

/// Quantization step used by pathfinding and walker waypoints.
pub const GRID_STEP: i32 = 32;

/// Returns the protocol crate version string.
pub fn protocol_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_pkg() {
        assert_eq!(protocol_version(), env!("CARGO_PKG_VERSION"));
    }
}
