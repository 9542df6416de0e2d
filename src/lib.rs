//! Library surface for the relay: exposes the router and state so
//! integration tests can drive the HTTP surface without a process.
//! The binary entrypoint lives in src/main.rs.

pub mod config;
pub mod error;
pub mod extract;
pub mod prepare;
pub mod routes;
pub mod state;
pub mod turn;
pub mod vision;

pub use routes::router;
pub use state::AppState;
