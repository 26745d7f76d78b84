//! Shared fixtures for integration tests

#![allow(dead_code)]

mod cache;
mod server;

pub use cache::{TestCache, read, seed};
pub use server::spawn_truncating_server;
