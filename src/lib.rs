//! Core state machinery for the Jeux tic-tac-toe game server: the wire
//! protocol, the game engine, players and their ratings, invitations, and
//! the client session/registry objects that tie them together.
//!
//! The binary entry point (CLI parsing, logging setup, the accept loop and
//! signal handling) lives in `src/main.rs`; everything in this crate is the
//! concurrent core that a connection's service thread drives.

pub mod client_registry;
pub mod error;
pub mod game;
pub mod invitation;
pub mod logging;
pub mod player;
pub mod player_registry;
pub mod protocol;
pub mod service;
pub mod session;
pub mod sparse_list;

/// Initial rating assigned to a newly registered player.
pub const PLAYER_INITIAL_RATING: i32 = 1500;

/// Compile-time upper bound on concurrently connected sessions.
pub const MAX_CLIENTS: usize = 64;
