//! Client-side session subsystem for the chess web app: matchmaking, a
//! reconnect-aware connection layer, optimistic move submission reconciled
//! against the authoritative server state, and per-session chat.
//!
//! The server's position snapshot is the single source of truth. Every
//! state-bearing event replaces the local position wholesale, so the client
//! converges with the server no matter how many events were missed.

pub mod chat;
pub mod client;
pub mod connection;
pub mod game;
pub mod matchmaking;
pub mod models;
pub mod websocket;

pub use client::ChessClient;

#[cfg(test)]
pub(crate) mod test_util;
