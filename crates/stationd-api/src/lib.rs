// Copyright 2026 Stationd contributors

//! The loopback HTTP+JSON control-plane API (spec §4.I / §6).
//!
//! This crate only translates HTTP requests into calls against
//! `stationd-scheduler`/`stationd-store`/`stationd-ledger` and back; it owns
//! no domain logic of its own. `stationd-daemon` constructs the shared
//! [`state::AppState`] and hands it to [`server::ApiServer`].

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

pub use error::ApiError;
pub use server::{ApiConfig, ApiServer};
pub use state::AppState;
