//! MobiMarket Core - Shared domain types.
//!
//! This crate provides the types used across all MobiMarket components:
//! - `server` - HTTP API over the catalog, users, reviews and orders
//! - `cli` - Command-line tools for migrations, seeding and user management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP. Anything that talks to the outside world lives in `server`.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, prices, emails, ratings, statuses and the
//!   catalog/order models built from them

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
