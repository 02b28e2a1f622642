pub mod accounts;
pub mod app;
pub mod catalog;
pub mod catalog_handlers;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod hasher;
pub mod metrics;
pub mod omdb;
pub mod pg_store;
pub mod user_handlers;

pub use app::{build_router, build_state, AppState, Collaborators};
