//! MobiMarket backend library.
//!
//! Exposes the router, state and stores so the binary, the CLI and the
//! integration tests build the same application.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;
