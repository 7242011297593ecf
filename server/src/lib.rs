//! # State Sync Server Library
//!
//! Authoritative server side of the state synchronization engine. A land
//! (one kind of game instance) owns a state tree built from
//! [`shared::sync::SyncField`]s; the server applies client actions to it,
//! and every tick sends each connected player the part of the tree they are
//! allowed to see.
//!
//! ## Core Responsibilities
//!
//! ### Per-Viewer Snapshots
//! Every sync round produces one broadcast part shared by all players and
//! one per-player part for each viewer. Fields tagged server-only never
//! leave the process; per-player and masked fields are filtered before
//! encoding.
//!
//! ### Dirty Tracking
//! Only fields mutated since the previous round are sent in incremental
//! mode. When most of the state keeps changing, the change-rate EMA
//! switches rounds to full snapshots until the rate drops again.
//!
//! ### Schema Handshake
//! Clients present the hash of the protocol schema they were generated
//! from. Mismatches are rejected or logged depending on
//! [`config::MismatchPolicy`].
//!
//! ## Module Organization
//!
//! - `land`: the [`land::Land`] trait implemented by game logic
//! - `runtime`: [`runtime::LandRuntime`], the tick → snapshot → clear cycle
//! - `client_manager`: connections, action queues and timeouts
//! - `network`: UDP transport and the main loop
//! - `arena`: a demo land exercising every sync policy
//! - `config`, `error`: settings and error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::arena::ArenaLand;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::error::ServerError> {
//!     let config = ServerConfig {
//!         tick_rate: 20,
//!         ..Default::default()
//!     };
//!     let mut server = Server::new(&config, ArenaLand::default()).await?;
//!     server.run().await
//! }
//! ```
//!
//! The server runs a few internal async tasks:
//! - **Network Receiver**: decodes incoming packets for the main loop
//! - **Network Sender**: drains the outgoing packet queue
//! - **Timeout Checker**: drops clients that went silent
//! - **Main Loop**: handles packets, applies actions and sends sync rounds

pub mod arena;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod land;
pub mod network;
pub mod runtime;
